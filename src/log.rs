//! Buffered logging drained through the protocol.
//!
//! The session formats status lines into a bounded buffer and forwards the
//! accumulated bytes as log-message notifications whenever it gets a
//! chance. The buffer drops whatever does not fit; losing a log line is
//! always preferable to stalling the protocol.

use core::fmt;

/// Capacity of the log buffer between two pumps.
pub const LOG_BUFFER_SIZE: usize = 512;

/// Bounded byte buffer with [core::fmt::Write].
pub struct LogBuffer {
    buf: heapless::Vec<u8, LOG_BUFFER_SIZE>,
}

impl LogBuffer {
    pub const fn new() -> Self {
        LogBuffer {
            buf: heapless::Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Keep what fits, drop the rest.
        let room = LOG_BUFFER_SIZE - self.buf.len();
        let take = room.min(s.len());
        let _ = self.buf.extend_from_slice(&s.as_bytes()[..take]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn accumulates_formatted_lines() {
        let mut log = LogBuffer::new();
        assert!(log.is_empty());
        writeln!(log, "mainloop: entering").unwrap();
        write!(log, "beacon {}", 3).unwrap();
        assert_eq!(log.as_bytes(), b"mainloop: entering\nbeacon 3");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn overflow_drops_the_tail() {
        let mut log = LogBuffer::new();
        for _ in 0..LOG_BUFFER_SIZE {
            write!(log, "x").unwrap();
        }
        write!(log, "overflow").unwrap();
        assert_eq!(log.as_bytes().len(), LOG_BUFFER_SIZE);
        assert!(log.as_bytes().iter().all(|b| *b == b'x'));
    }
}
