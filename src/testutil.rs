//! Shared doubles for host tests: a scripted serial port, a fake 100 MHz
//! counter behind a real [Timekeeper], and frame builders/parsers for both
//! wire directions.

use crate::proto::{
    checksum_add, checksum_finalize, EXT2SCP_END_MAGIC, EXT2SCP_START_MAGIC, Footer, Header,
    SCP2EXT_END_MAGIC, SCP2EXT_START_MAGIC, Tag,
};
use crate::timer::{TICKS_PER_MS, Timekeeper};
use core::convert::Infallible;
use core::ptr;
use std::collections::VecDeque;

/// Fake hardware counter. Hands out real [Timekeeper]s over its memory and
/// advances when ticked, usually through [MockPort::auto_tick].
pub struct FakeClock {
    mem: Vec<u32>,
    total_ticks: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            mem: vec![0; 9],
            total_ticks: 0,
        }
    }

    /// Builds a timekeeper over the fake counter block. Resets the count,
    /// like the hardware init does.
    pub fn timekeeper(&mut self) -> Timekeeper {
        unsafe { Timekeeper::new_at(self.mem.as_mut_ptr() as usize) }
    }

    pub fn tick_ms(&mut self, ms: u32) {
        self.tick(u64::from(ms) * u64::from(TICKS_PER_MS));
    }

    pub fn tick(&mut self, ticks: u64) {
        self.total_ticks += ticks;
        let count = unsafe { ptr::read_volatile(self.mem.as_ptr().add(8)) };
        unsafe {
            ptr::write_volatile(
                self.mem.as_mut_ptr().add(8),
                count.wrapping_add(ticks as u32),
            )
        };
    }

    /// Wall time accumulated across all timekeepers of this clock.
    pub fn now_ms(&self) -> u64 {
        self.total_ticks / u64::from(TICKS_PER_MS)
    }
}

/// Scripted serial port: reads from `rx`, collects writes in `tx`, and
/// optionally advances a [FakeClock] by 1 ms per readiness poll so bounded
/// waits make progress.
pub struct MockPort {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    clock: Option<*mut FakeClock>,
}

impl MockPort {
    pub fn new() -> Self {
        MockPort {
            rx: VecDeque::new(),
            tx: Vec::new(),
            clock: None,
        }
    }

    pub fn auto_tick(mut self, clock: &mut FakeClock) -> Self {
        self.clock = Some(clock as *mut FakeClock);
        self
    }
}

impl embedded_io::ErrorType for MockPort {
    type Error = Infallible;
}

impl embedded_io::ReadReady for MockPort {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if let Some(clock) = self.clock {
            unsafe { (*clock).tick_ms(1) };
        }
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.rx.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl embedded_io::Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Frames a host-to-SCP request the way the external controller would.
pub fn frame_request(counter: u32, tag: Tag, payload: &[u8]) -> Vec<u8> {
    frame_with(EXT2SCP_START_MAGIC, counter, tag.raw(), 0, payload)
}

/// Frames a host-to-SCP PDU with full control over the suspicious fields.
pub fn frame_with(magic: u32, counter: u32, tag: u16, unit: u16, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        magic,
        payload_len: payload.len() as u32,
        counter,
        tag,
        unit,
        status: 0,
        ts_ms: 0,
    };
    let hdr_bytes = header.to_bytes();
    let sum = checksum_add(checksum_add(0, &hdr_bytes), payload);
    let footer = Footer {
        checksum: checksum_finalize(sum),
        magic: EXT2SCP_END_MAGIC,
    };

    let mut frame = Vec::with_capacity(Header::SIZE + payload.len() + Footer::SIZE);
    frame.extend_from_slice(&hdr_bytes);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&footer.to_bytes());
    frame
}

/// Splits a captured SCP-to-host byte stream into frames, checking magics
/// and the checksum identity of every frame.
pub fn parse_scp_frames(mut bytes: &[u8]) -> Vec<(Header, Vec<u8>)> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        assert!(bytes.len() >= Header::SIZE + Footer::SIZE, "truncated frame");
        let mut hdr_bytes = [0u8; Header::SIZE];
        hdr_bytes.copy_from_slice(&bytes[..Header::SIZE]);
        let header = Header::from_bytes(&hdr_bytes);
        assert_eq!(header.magic, SCP2EXT_START_MAGIC, "bad start magic");

        let payload_len = header.payload_len as usize;
        let total = Header::SIZE + payload_len + Footer::SIZE;
        assert!(bytes.len() >= total, "frame longer than capture");

        let payload = bytes[Header::SIZE..Header::SIZE + payload_len].to_vec();
        let mut footer_bytes = [0u8; Footer::SIZE];
        footer_bytes.copy_from_slice(&bytes[Header::SIZE + payload_len..total]);
        let footer = Footer::from_bytes(&footer_bytes);
        assert_eq!(footer.magic, SCP2EXT_END_MAGIC, "bad end magic");

        let sum = checksum_add(0, &bytes[..Header::SIZE + payload_len]);
        assert_eq!(sum.wrapping_add(footer.checksum), 0, "checksum mismatch");

        frames.push((header, payload));
        bytes = &bytes[total..];
    }
    frames
}
