use arbitrary_int::{u6, u26};
use core::marker::PhantomData;

/// Base address of the x86 mapping-window control block.
pub const X86_CTRL_BASE: usize = 0x0323_0000;
/// Local address where x86 window slot 0 is exposed.
pub const X86_WINDOW_BASE: usize = 0x0400_0000;
/// Size of one x86 mapping window.
pub const X86_SLOT_SIZE: usize = 64 * 1024 * 1024;
/// Number of x86 mapping windows.
pub const X86_SLOT_COUNT: usize = 15;

/// Base address of the SMN mapping-window control block.
pub const SMN_CTRL_BASE: usize = 0x0322_0000;
/// Local address where SMN window slot 0 is exposed.
pub const SMN_WINDOW_BASE: usize = 0x0100_0000;
/// Size of one SMN mapping window.
pub const SMN_SLOT_SIZE: usize = 1024 * 1024;
/// Number of SMN mapping windows.
pub const SMN_SLOT_COUNT: usize = 32;

/// Base-address word of an x86 slot control quad.
///
/// The 64 MiB-aligned x86 physical base is split over the word: bits 26..32
/// of the address land in the low six bits, everything from bit 32 upwards
/// follows.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct X86BaseCtrl {
    #[bits(6..=31, rw)]
    base_hi: u26,
    #[bits(0..=5, rw)]
    base_lo: u6,
}

impl X86BaseCtrl {
    pub fn from_phys_base(base: u64) -> Self {
        Self::builder()
            .with_base_hi(u26::new(((base >> 32) & 0x03ff_ffff) as u32))
            .with_base_lo(u6::new(((base >> 26) & 0x3f) as u8))
            .build()
    }
}

/// One control register shared by two adjacent SMN slots.
///
/// Each half holds the 1 MiB-aligned SMN base shifted down by 20 bits; 0
/// marks the half as free.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SmnSlotPair {
    #[bits(16..=31, rw)]
    odd: u16,
    #[bits(0..=15, rw)]
    even: u16,
}

/// x86 mapping-window control block.
///
/// Each slot owns a quad of control words (base, a fixed `0x12` literal the
/// hardware requires, and the memory type twice), one word in the mask
/// array and one word in the attribute array.
#[derive(derive_mmio::Mmio)]
#[mmio(no_ctors)]
#[repr(C)]
pub struct X86MapCtrl {
    /// Slot control quads, four words per slot.
    slot: [u32; 4 * X86_SLOT_COUNT],
    _reserved0: [u32; 188],
    mask: [u32; X86_SLOT_COUNT],
    _reserved1: [u32; 47],
    attr: [u32; X86_SLOT_COUNT],
}

static_assertions::const_assert_eq!(core::mem::size_of::<X86MapCtrl>(), 0x514);

impl X86MapCtrl {
    pub const fn new_mmio() -> MmioX86MapCtrl<'static> {
        MmioX86MapCtrl {
            ptr: X86_CTRL_BASE as *mut _,
            phantom: PhantomData,
        }
    }

    /// Creates a register block view at an arbitrary base address.
    ///
    /// # Safety
    ///
    /// `base` must point to memory that is valid for volatile access over
    /// the whole block.
    pub const unsafe fn new_mmio_at(base: usize) -> MmioX86MapCtrl<'static> {
        MmioX86MapCtrl {
            ptr: base as *mut _,
            phantom: PhantomData,
        }
    }
}

/// SMN mapping-window control block.
#[derive(derive_mmio::Mmio)]
#[mmio(no_ctors)]
#[repr(C)]
pub struct SmnMapCtrl {
    pair: [SmnSlotPair; SMN_SLOT_COUNT / 2],
}

static_assertions::const_assert_eq!(core::mem::size_of::<SmnMapCtrl>(), 64);

impl SmnMapCtrl {
    pub const fn new_mmio() -> MmioSmnMapCtrl<'static> {
        MmioSmnMapCtrl {
            ptr: SMN_CTRL_BASE as *mut _,
            phantom: PhantomData,
        }
    }

    /// Creates a register block view at an arbitrary base address.
    ///
    /// # Safety
    ///
    /// `base` must point to memory that is valid for volatile access over
    /// the whole block.
    pub const unsafe fn new_mmio_at(base: usize) -> MmioSmnMapCtrl<'static> {
        MmioSmnMapCtrl {
            ptr: base as *mut _,
            phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_base_ctrl_splits_address() {
        // 0xFFFD_FC00_03F8 rounded down to 64 MiB: base 0xFFFD_FC00_0000.
        let base: u64 = 0xFFFD_FC00_0000;
        let word = X86BaseCtrl::from_phys_base(base);
        assert_eq!(word.raw_value(), ((0xFFFDu32) << 6) | 0x3F);
        assert_eq!(word.base_hi().value(), 0xFFFD);
        assert_eq!(word.base_lo().value(), 0x3F);

        assert_eq!(X86BaseCtrl::from_phys_base(0).raw_value(), 0);
        // 64 MiB: bit 26 set -> low field 1.
        assert_eq!(
            X86BaseCtrl::from_phys_base(64 * 1024 * 1024).raw_value(),
            1
        );
    }

    #[test]
    fn smn_pair_packs_halves() {
        let pair = SmnSlotPair::builder()
            .with_odd(0x1234)
            .with_even(0x5678)
            .build();
        assert_eq!(pair.raw_value(), 0x1234_5678);
    }
}
