//! PDU receive path.
//!
//! A byte-stream driven state machine: header, optional payload, footer.
//! Malformed PDUs are dropped silently: when the framing fields themselves
//! are intact the whole announced PDU is discarded so the stream stays
//! aligned, otherwise the machine falls straight back to expecting a
//! header. A bounded wait that elapses mid-PDU keeps the partial state so
//! the next call resumes where this one stopped.

use super::{
    checksum_add, EXT2SCP_END_MAGIC, EXT2SCP_START_MAGIC, Footer, Header, MAX_PAYLOAD_SIZE,
    MAX_PDU_SIZE, Tag,
};
use crate::Error;
use crate::timer::Timekeeper;
use embedded_io::{Read, ReadReady};

/// Wait bound meaning "no timeout".
pub const INDEFINITE_WAIT: u32 = 0xffff_ffff;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum RecvState {
    Header,
    Payload,
    Footer,
    /// Consuming the announced remainder of a PDU that failed the
    /// sequencing checks, so the stream stays aligned on the next PDU.
    Discard,
}

/// Why a header was refused.
enum HeaderReject {
    /// Magic or length cannot be trusted; the framing itself is broken.
    Structure,
    /// Framing is intact but tag, counter or unit is wrong; the rest of
    /// the PDU can be skipped cleanly.
    Sequencing,
}

/// A complete, validated PDU handed out by [PduReceiver::recv].
///
/// Borrows the receiver's buffer; the payload stays valid until the next
/// receive call.
#[derive(Debug)]
pub struct ReceivedPdu<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

/// Receive state machine for host-to-SCP PDUs.
pub struct PduReceiver {
    buf: [u8; MAX_PDU_SIZE],
    state: RecvState,
    /// Bytes missing to complete the current state.
    left: usize,
    /// Fill level of the buffer.
    off: usize,
    /// Counter value the next valid PDU must carry.
    next_counter: u32,
    /// Number of addressable units; the unit field must stay below it.
    units: u16,
}

impl PduReceiver {
    pub fn new(units: u16) -> Self {
        PduReceiver {
            buf: [0; MAX_PDU_SIZE],
            state: RecvState::Header,
            left: Header::SIZE,
            off: 0,
            next_counter: 1,
            units,
        }
    }

    /// Counter value expected on the next incoming PDU.
    pub fn next_counter(&self) -> u32 {
        self.next_counter
    }

    fn reset(&mut self) {
        self.state = RecvState::Header;
        self.left = Header::SIZE;
        self.off = 0;
    }

    /// Waits for a complete valid PDU or until `timeout_ms` elapsed.
    ///
    /// Returns [Error::TryAgain] on timeout without touching the partial
    /// parse state. [INDEFINITE_WAIT] waits forever.
    pub fn recv<S>(
        &mut self,
        port: &mut S,
        timer: &mut Timekeeper,
        timeout_ms: u32,
    ) -> Result<ReceivedPdu<'_>, Error>
    where
        S: Read + ReadReady,
    {
        let start = timer.millis();
        let (header, payload_len) = loop {
            if port.read_ready().map_err(|_| Error::Io)? {
                // Only take what the current state still needs.
                let n = port
                    .read(&mut self.buf[self.off..self.off + self.left])
                    .map_err(|_| Error::Io)?;
                self.off += n;
                self.left -= n;
                if self.left == 0 {
                    if let Some(done) = self.advance() {
                        break done;
                    }
                }
            }
            if timeout_ms != INDEFINITE_WAIT
                && timer.millis().wrapping_sub(start) >= timeout_ms
            {
                return Err(Error::TryAgain);
            }
        };

        Ok(ReceivedPdu {
            header,
            payload: &self.buf[Header::SIZE..Header::SIZE + payload_len],
        })
    }

    /// Processes a completed state and moves to the next one.
    ///
    /// Returns the header and payload length once a whole PDU has been
    /// accepted.
    fn advance(&mut self) -> Option<(Header, usize)> {
        match self.state {
            RecvState::Header => {
                let mut hdr_bytes = [0u8; Header::SIZE];
                hdr_bytes.copy_from_slice(&self.buf[..Header::SIZE]);
                let header = Header::from_bytes(&hdr_bytes);
                match self.validate_header(&header) {
                    Ok(()) if header.payload_len > 0 => {
                        self.state = RecvState::Payload;
                        self.left = header.payload_len as usize;
                    }
                    Ok(()) => {
                        self.state = RecvState::Footer;
                        self.left = Footer::SIZE;
                    }
                    Err(HeaderReject::Sequencing) => {
                        // Silent drop of the whole PDU; the peer just sees
                        // no response.
                        self.state = RecvState::Discard;
                        self.left = header.payload_len as usize + Footer::SIZE;
                    }
                    Err(HeaderReject::Structure) => {
                        // The length field cannot be trusted either, so
                        // all we can do is hunt for the next header.
                        self.reset();
                    }
                }
                None
            }
            RecvState::Payload => {
                self.state = RecvState::Footer;
                self.left = Footer::SIZE;
                None
            }
            RecvState::Discard => {
                self.reset();
                None
            }
            RecvState::Footer => {
                let mut hdr_bytes = [0u8; Header::SIZE];
                hdr_bytes.copy_from_slice(&self.buf[..Header::SIZE]);
                let header = Header::from_bytes(&hdr_bytes);
                let payload_len = header.payload_len as usize;

                let mut footer_bytes = [0u8; Footer::SIZE];
                footer_bytes
                    .copy_from_slice(&self.buf[Header::SIZE + payload_len..self.off]);
                let footer = Footer::from_bytes(&footer_bytes);

                let sum = checksum_add(0, &self.buf[..Header::SIZE + payload_len]);
                let accepted = sum.wrapping_add(footer.checksum) == 0
                    && footer.magic == EXT2SCP_END_MAGIC;

                self.reset();
                if accepted {
                    self.next_counter = self.next_counter.wrapping_add(1);
                    // The buffer contents stay untouched until the next
                    // receive call, so handing out the range is fine.
                    Some((header, payload_len))
                } else {
                    None
                }
            }
        }
    }

    fn validate_header(&self, header: &Header) -> Result<(), HeaderReject> {
        if header.magic != EXT2SCP_START_MAGIC {
            return Err(HeaderReject::Structure);
        }
        if header.payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(HeaderReject::Structure);
        }
        if !Tag::is_request_raw(header.tag) {
            return Err(HeaderReject::Sequencing);
        }
        if header.counter != self.next_counter {
            return Err(HeaderReject::Sequencing);
        }
        if header.unit >= self.units {
            return Err(HeaderReject::Sequencing);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeClock, MockPort, frame_request, frame_with};

    fn recv_all(
        rx: &mut PduReceiver,
        port: &mut MockPort,
        clock: &mut FakeClock,
        timeout: u32,
    ) -> Option<(Header, Vec<u8>)> {
        let mut timer = clock.timekeeper();
        match rx.recv(port, &mut timer, timeout) {
            Ok(pdu) => Some((pdu.header, pdu.payload.to_vec())),
            Err(Error::TryAgain) => None,
            Err(e) => panic!("unexpected receive error {e:?}"),
        }
    }

    #[test]
    fn accepts_a_valid_request() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        port.rx.extend(frame_request(1, Tag::ScpMemReadReq, &[0xAB; 12]));
        let (hdr, payload) = recv_all(&mut rx, &mut port, &mut clock, 10).unwrap();
        assert_eq!(hdr.tag, Tag::ScpMemReadReq.raw());
        assert_eq!(hdr.counter, 1);
        assert_eq!(payload, vec![0xAB; 12]);
        assert_eq!(rx.next_counter(), 2);
    }

    #[test]
    fn resumes_partial_pdu_across_timeouts() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        let frame = frame_request(1, Tag::ScpMemWriteReq, &[1, 2, 3]);
        let (first, rest) = frame.split_at(10);

        port.rx.extend(first.iter().copied());
        assert!(recv_all(&mut rx, &mut port, &mut clock, 5).is_none());

        port.rx.extend(rest.iter().copied());
        let (hdr, payload) = recv_all(&mut rx, &mut port, &mut clock, 5).unwrap();
        assert_eq!(hdr.tag, Tag::ScpMemWriteReq.raw());
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn sequencing_reject_keeps_stream_aligned() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        // Misnumbered PDU with payload, immediately followed by a good one.
        port.rx
            .extend(frame_request(9, Tag::ScpMemWriteReq, &[0x55; 20]));
        port.rx
            .extend(frame_request(1, Tag::ScpMemReadReq, &[0x66; 12]));

        let (hdr, payload) = recv_all(&mut rx, &mut port, &mut clock, 10).unwrap();
        assert_eq!(hdr.counter, 1);
        assert_eq!(hdr.tag, Tag::ScpMemReadReq.raw());
        assert_eq!(payload, vec![0x66; 12]);
    }

    #[test]
    fn drops_counter_gaps_without_advancing() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        port.rx.extend(frame_request(7, Tag::ConnectReq, &[]));
        assert!(recv_all(&mut rx, &mut port, &mut clock, 10).is_none());
        assert_eq!(rx.next_counter(), 1);

        port.rx.extend(frame_request(1, Tag::ConnectReq, &[]));
        let (hdr, _) = recv_all(&mut rx, &mut port, &mut clock, 10).unwrap();
        assert_eq!(hdr.counter, 1);
        assert_eq!(rx.next_counter(), 2);
    }

    #[test]
    fn rejects_bad_magic_tag_unit_and_oversized_payload() {
        let mut clock = FakeClock::new();

        let bad_magic = frame_with(0x12345678, 1, Tag::ConnectReq.raw(), 0, &[]);
        let response_tag = frame_with(EXT2SCP_START_MAGIC, 1, Tag::ConnectResp.raw(), 0, &[]);
        let unknown_tag = frame_with(EXT2SCP_START_MAGIC, 1, 0x00, 0, &[]);
        let bad_unit = frame_with(EXT2SCP_START_MAGIC, 1, Tag::ConnectReq.raw(), 5, &[]);

        for frame in [bad_magic, response_tag, unknown_tag, bad_unit] {
            let mut port = MockPort::new().auto_tick(&mut clock);
            let mut rx = PduReceiver::new(1);
            port.rx.extend(frame);
            assert!(recv_all(&mut rx, &mut port, &mut clock, 10).is_none());
            assert_eq!(rx.next_counter(), 1);
        }

        // Oversized length in the header is caught before buffering.
        let mut oversize = frame_with(EXT2SCP_START_MAGIC, 1, Tag::ConnectReq.raw(), 0, &[]);
        oversize[4..8].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 1).to_le_bytes());
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);
        port.rx.extend(oversize);
        assert!(recv_all(&mut rx, &mut port, &mut clock, 10).is_none());
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let mut clock = FakeClock::new();
        let frame = frame_request(1, Tag::ScpMmioReadReq, &[0x24, 0x04, 0x01, 0x03]);

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;

                let mut port = MockPort::new().auto_tick(&mut clock);
                let mut rx = PduReceiver::new(1);
                port.rx.extend(corrupted);
                assert!(
                    recv_all(&mut rx, &mut port, &mut clock, 50).is_none(),
                    "flip of bit {bit} in byte {byte} was accepted"
                );
                assert_eq!(rx.next_counter(), 1);
            }
        }
    }

    #[test]
    fn recovers_after_a_dropped_pdu() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        let mut corrupted = frame_request(1, Tag::ConnectReq, &[]);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        port.rx.extend(corrupted);
        assert!(recv_all(&mut rx, &mut port, &mut clock, 10).is_none());

        port.rx.extend(frame_request(1, Tag::ConnectReq, &[]));
        let (hdr, _) = recv_all(&mut rx, &mut port, &mut clock, 10).unwrap();
        assert_eq!(hdr.tag, Tag::ConnectReq.raw());
    }

    #[test]
    fn timeout_elapses_without_input() {
        let mut clock = FakeClock::new();
        let mut port = MockPort::new().auto_tick(&mut clock);
        let mut rx = PduReceiver::new(1);

        let before = clock.now_ms();
        assert!(recv_all(&mut rx, &mut port, &mut clock, 100).is_none());
        assert!(clock.now_ms() - before >= 100);
    }
}
