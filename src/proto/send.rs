//! PDU send path.

use super::{
    checksum_add, checksum_finalize, Footer, Header, SCP2EXT_END_MAGIC, SCP2EXT_START_MAGIC, Tag,
};
use crate::Error;
use embedded_io::Write;

/// Framer for SCP-to-host PDUs.
///
/// Owns the outgoing PDU counter: every sent PDU is stamped with the
/// pre-incremented count, so the stream reads 1, 2, 3, ... from the peer's
/// side. [Self::reset_counter] restarts the stream, which the session does
/// right before a connect response.
pub struct PduSender {
    sent: u32,
}

impl PduSender {
    pub const fn new() -> Self {
        PduSender { sent: 0 }
    }

    /// PDUs sent since creation or the last counter reset.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn reset_counter(&mut self) {
        self.sent = 0;
    }

    /// Builds and emits one PDU: header, payload, footer.
    ///
    /// Each write propagates transport failure; there is no partial-frame
    /// recovery.
    pub fn send<S: Write>(
        &mut self,
        port: &mut S,
        ts_ms: u32,
        status: i32,
        unit: u16,
        tag: Tag,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.sent = self.sent.wrapping_add(1);
        let header = Header {
            magic: SCP2EXT_START_MAGIC,
            payload_len: payload.len() as u32,
            counter: self.sent,
            tag: tag.raw(),
            unit,
            status,
            ts_ms,
        };

        let hdr_bytes = header.to_bytes();
        let sum = checksum_add(checksum_add(0, &hdr_bytes), payload);
        let footer = Footer {
            checksum: checksum_finalize(sum),
            magic: SCP2EXT_END_MAGIC,
        };

        port.write_all(&hdr_bytes).map_err(|_| Error::Io)?;
        if !payload.is_empty() {
            port.write_all(payload).map_err(|_| Error::Io)?;
        }
        port.write_all(&footer.to_bytes()).map_err(|_| Error::Io)?;
        port.flush().map_err(|_| Error::Io)?;
        Ok(())
    }
}

impl Default for PduSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockPort, parse_scp_frames};

    #[test]
    fn frame_sums_to_zero() {
        let mut port = MockPort::new();
        let mut tx = PduSender::new();
        tx.send(&mut port, 42, 0, 0, Tag::Beacon, &[1, 2, 3, 4])
            .unwrap();

        assert_eq!(port.tx.len(), Header::SIZE + 4 + Footer::SIZE);
        let sum = checksum_add(0, &port.tx);
        // Header + payload + closing checksum cancel; only the end magic
        // bytes remain.
        let magic_sum = checksum_add(0, &SCP2EXT_END_MAGIC.to_le_bytes());
        assert_eq!(sum, magic_sum);

        let frames = parse_scp_frames(&port.tx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.ts_ms, 42);
        assert_eq!(frames[0].1, vec![1, 2, 3, 4]);
    }

    #[test]
    fn counters_are_gap_free_and_restart_after_reset() {
        let mut port = MockPort::new();
        let mut tx = PduSender::new();
        for _ in 0..3 {
            tx.send(&mut port, 0, 0, 0, Tag::Beacon, &[]).unwrap();
        }
        tx.reset_counter();
        tx.send(&mut port, 0, 0, 0, Tag::ConnectResp, &[]).unwrap();
        tx.send(&mut port, 0, 0, 0, Tag::ScpMemReadResp, &[])
            .unwrap();

        let counters: Vec<u32> = parse_scp_frames(&port.tx)
            .iter()
            .map(|(hdr, _)| hdr.counter)
            .collect();
        assert_eq!(counters, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn empty_payload_frame_is_header_plus_footer() {
        let mut port = MockPort::new();
        let mut tx = PduSender::new();
        tx.send(&mut port, 7, -1, 0, Tag::SmnReadResp, &[]).unwrap();
        let frames = parse_scp_frames(&port.tx);
        assert_eq!(frames[0].0.payload_len, 0);
        assert_eq!(frames[0].0.status, -1);
        assert!(frames[0].1.is_empty());
    }
}
