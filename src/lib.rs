//! Serial debug stub for the security co-processor (SCP) of a server-class
//! x86 SoC.
//!
//! The stub exposes the SCP address space plus the surrounding SoC address
//! spaces (SMN and host x86 physical memory/MMIO) to an external controller
//! over the legacy x86 UART, framed in a checksum-protected binary protocol.
//! Platform bring-up hands control to [stub::bring_up] and
//! [stub::SerialStub::run]; everything underneath is a plain
//! peripheral-style driver that can also be driven against substituted test
//! doubles.
#![cfg_attr(not(test), no_std)]

pub mod log;
pub mod map;
pub mod mmio;
pub mod proto;
pub mod stub;
pub mod time;
pub mod timer;
pub mod uart;

#[cfg(test)]
pub(crate) mod testutil;

pub use stub::{SerialStub, bring_up};

/// Wire status code for a successful request.
pub const STATUS_SUCCESS: i32 = 0;

/// Errors shared by the stub core.
///
/// [Error::status_code] maps each kind onto the signed status carried in a
/// response header.
#[derive(Debug, PartialEq, Eq, Copy, Clone, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The bounded wait elapsed without completing; the caller may retry.
    #[error("timed out, try again")]
    TryAgain,
    /// Bad access width or payload length for the chosen operation.
    #[error("invalid parameter")]
    InvalidParameter,
    /// No free mapping slot (or other exhausted hardware resource).
    #[error("invalid state")]
    InvalidState,
    /// The serial transport failed; the session cannot continue.
    #[error("serial I/O failure")]
    Io,
}

impl Error {
    pub const fn status_code(self) -> i32 {
        match self {
            Error::TryAgain => 1,
            Error::InvalidParameter => -1,
            Error::InvalidState => -2,
            Error::Io => -3,
        }
    }
}
