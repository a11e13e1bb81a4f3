//! Mapping-window allocators for the two foreign address spaces the SCP can
//! reach.
//!
//! Both allocators own a fixed table of hardware window slots and hand them
//! out with reference counting: mapping the same base twice reuses the slot
//! and bumps its count, and the control registers are only touched on the
//! first map and the last unmap. [x86::X86Mapper] covers host x86 physical
//! space in 64 MiB windows, [smn::SmnMapper] the SoC-internal SMN bus in
//! 1 MiB windows.

pub mod regs;
pub mod smn;
pub mod x86;

pub use smn::{SmnMapper, SmnMapping};
pub use x86::{MemType, X86Mapper, X86Mapping};
