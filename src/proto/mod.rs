//! Wire model of the serial debug protocol.
//!
//! A PDU is a 24-byte header, an optional payload and an 8-byte footer,
//! little-endian throughout. Both directions use their own start/end magic
//! pair so a captured stream can never be read backwards. The footer
//! carries the two's complement of the byte-wise sum of header plus
//! payload, making the whole frame sum to zero modulo 2^32.

pub mod recv;
pub mod send;

pub use recv::{PduReceiver, ReceivedPdu};
pub use send::PduSender;

/// Start magic of a PDU travelling from the external host to the SCP.
pub const EXT2SCP_START_MAGIC: u32 = u32::from_le_bytes(*b">SCP");
/// End magic of a PDU travelling from the external host to the SCP.
pub const EXT2SCP_END_MAGIC: u32 = u32::from_le_bytes(*b">scp");
/// Start magic of a PDU travelling from the SCP to the external host.
pub const SCP2EXT_START_MAGIC: u32 = u32::from_le_bytes(*b"SCP>");
/// End magic of a PDU travelling from the SCP to the external host.
pub const SCP2EXT_END_MAGIC: u32 = u32::from_le_bytes(*b"scp>");

/// Maximum size of a whole PDU on the wire.
pub const MAX_PDU_SIZE: usize = 4096;
/// Maximum payload size of a single PDU.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PDU_SIZE - Header::SIZE - Footer::SIZE;

static_assertions::const_assert_eq!(
    Header::SIZE + MAX_PAYLOAD_SIZE + Footer::SIZE,
    MAX_PDU_SIZE
);

/// Request, response and notification identifiers.
///
/// Requests are contiguous; the matching response is the request plus
/// [Tag::RESPONSE_OFFSET].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Tag {
    ConnectReq = 0x01,
    ScpMemReadReq = 0x02,
    ScpMemWriteReq = 0x03,
    ScpMmioReadReq = 0x04,
    ScpMmioWriteReq = 0x05,
    SmnReadReq = 0x06,
    SmnWriteReq = 0x07,
    X86MemReadReq = 0x08,
    X86MemWriteReq = 0x09,
    X86MmioReadReq = 0x0a,
    X86MmioWriteReq = 0x0b,

    ConnectResp = 0x41,
    ScpMemReadResp = 0x42,
    ScpMemWriteResp = 0x43,
    ScpMmioReadResp = 0x44,
    ScpMmioWriteResp = 0x45,
    SmnReadResp = 0x46,
    SmnWriteResp = 0x47,
    X86MemReadResp = 0x48,
    X86MemWriteResp = 0x49,
    X86MmioReadResp = 0x4a,
    X86MmioWriteResp = 0x4b,

    Beacon = 0x81,
    LogMsg = 0x82,
}

impl Tag {
    pub const RESPONSE_OFFSET: u16 = 0x40;
    pub const REQUEST_FIRST: u16 = Tag::ConnectReq as u16;
    pub const REQUEST_LAST: u16 = Tag::X86MmioWriteReq as u16;

    pub const fn raw(self) -> u16 {
        self as u16
    }

    /// Raw value names a request the stub understands.
    pub const fn is_request_raw(raw: u16) -> bool {
        raw >= Self::REQUEST_FIRST && raw <= Self::REQUEST_LAST
    }

    pub const fn from_raw(raw: u16) -> Option<Tag> {
        Some(match raw {
            0x01 => Tag::ConnectReq,
            0x02 => Tag::ScpMemReadReq,
            0x03 => Tag::ScpMemWriteReq,
            0x04 => Tag::ScpMmioReadReq,
            0x05 => Tag::ScpMmioWriteReq,
            0x06 => Tag::SmnReadReq,
            0x07 => Tag::SmnWriteReq,
            0x08 => Tag::X86MemReadReq,
            0x09 => Tag::X86MemWriteReq,
            0x0a => Tag::X86MmioReadReq,
            0x0b => Tag::X86MmioWriteReq,
            0x41 => Tag::ConnectResp,
            0x42 => Tag::ScpMemReadResp,
            0x43 => Tag::ScpMemWriteResp,
            0x44 => Tag::ScpMmioReadResp,
            0x45 => Tag::ScpMmioWriteResp,
            0x46 => Tag::SmnReadResp,
            0x47 => Tag::SmnWriteResp,
            0x48 => Tag::X86MemReadResp,
            0x49 => Tag::X86MemWriteResp,
            0x4a => Tag::X86MmioReadResp,
            0x4b => Tag::X86MmioWriteResp,
            0x81 => Tag::Beacon,
            0x82 => Tag::LogMsg,
            _ => return None,
        })
    }

    /// Response tag answering this request tag.
    pub const fn response(self) -> Tag {
        match self {
            Tag::ConnectReq => Tag::ConnectResp,
            Tag::ScpMemReadReq => Tag::ScpMemReadResp,
            Tag::ScpMemWriteReq => Tag::ScpMemWriteResp,
            Tag::ScpMmioReadReq => Tag::ScpMmioReadResp,
            Tag::ScpMmioWriteReq => Tag::ScpMmioWriteResp,
            Tag::SmnReadReq => Tag::SmnReadResp,
            Tag::SmnWriteReq => Tag::SmnWriteResp,
            Tag::X86MemReadReq => Tag::X86MemReadResp,
            Tag::X86MemWriteReq => Tag::X86MemWriteResp,
            Tag::X86MmioReadReq => Tag::X86MmioReadResp,
            Tag::X86MmioWriteReq => Tag::X86MmioWriteResp,
            other => other,
        }
    }
}

/// PDU header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub magic: u32,
    pub payload_len: u32,
    /// Position of this PDU in its direction's stream, starting at 1.
    pub counter: u32,
    pub tag: u16,
    pub unit: u16,
    /// Status of the answered request; zero on requests and notifications.
    pub status: i32,
    /// Originator time in milliseconds since its reset.
    pub ts_ms: u32,
}

impl Header {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.counter.to_le_bytes());
        buf[12..14].copy_from_slice(&self.tag.to_le_bytes());
        buf[14..16].copy_from_slice(&self.unit.to_le_bytes());
        buf[16..20].copy_from_slice(&self.status.to_le_bytes());
        buf[20..24].copy_from_slice(&self.ts_ms.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Header {
        Header {
            magic: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            payload_len: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            counter: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            tag: u16::from_le_bytes([buf[12], buf[13]]),
            unit: u16::from_le_bytes([buf[14], buf[15]]),
            status: i32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            ts_ms: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
        }
    }
}

/// PDU footer.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Footer {
    pub checksum: u32,
    pub magic: u32,
}

impl Footer {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Footer {
        Footer {
            checksum: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            magic: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Adds the bytes of `data` to a running checksum sum.
pub fn checksum_add(sum: u32, data: &[u8]) -> u32 {
    data.iter().fold(sum, |s, b| s.wrapping_add(u32::from(*b)))
}

/// Two's complement closing a checksum sum so the full frame sums to zero.
pub const fn checksum_finalize(sum: u32) -> u32 {
    0xffff_ffffu32.wrapping_sub(sum).wrapping_add(1)
}

/// Connect response payload: the stub's limits and its staging area.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectResponse {
    pub max_pdu_size: u32,
    pub scratch_size: u32,
    /// Local address of the scratch area, for peer-staged bulk transfers.
    pub scratch_addr: u32,
    pub sys_sockets: u32,
    pub ccds_per_socket: u32,
}

impl ConnectResponse {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.max_pdu_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.scratch_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.scratch_addr.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sys_sockets.to_le_bytes());
        buf[16..20].copy_from_slice(&self.ccds_per_socket.to_le_bytes());
        // Trailing pad word stays zero.
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> ConnectResponse {
        ConnectResponse {
            max_pdu_size: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            scratch_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            scratch_addr: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            sys_sockets: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            ccds_per_socket: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        }
    }
}

/// Beacon notification payload.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Beacon {
    /// Beacons emitted since reset, this one included.
    pub beacons_sent: u32,
}

impl Beacon {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.beacons_sent.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Beacon {
        Beacon {
            beacons_sent: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        }
    }
}

/// Leading fields of every memory transfer request.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct XferRequest {
    /// Target address in the request's address space.
    pub addr: u64,
    /// Transfer length in bytes.
    pub len: u32,
}

impl XferRequest {
    pub const SIZE: usize = 12;

    /// Splits a request payload into the transfer fields and the trailing
    /// write data.
    pub fn parse(payload: &[u8]) -> Option<(XferRequest, &[u8])> {
        if payload.len() < Self::SIZE {
            return None;
        }
        let (head, data) = payload.split_at(Self::SIZE);
        let req = XferRequest {
            addr: u64::from_le_bytes([
                head[0], head[1], head[2], head[3], head[4], head[5], head[6], head[7],
            ]),
            len: u32::from_le_bytes([head[8], head[9], head[10], head[11]]),
        };
        Some((req, data))
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.addr.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf
    }
}
