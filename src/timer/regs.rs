use core::marker::PhantomData;

/// Base address of the free-running counter block used for timekeeping.
///
/// This is the second timer of the SoC; the on-chip bootloader leaves it
/// unused, so the stub can claim it without disturbing anything.
pub const BASE_ADDR: usize = 0x0301_0424;

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Control {
    /// Keep counting past the reload value instead of stopping.
    #[bit(8, rw)]
    free_run: bool,
    #[bit(0, rw)]
    enable: bool,
}

#[derive(derive_mmio::Mmio)]
#[mmio(no_ctors)]
#[repr(C)]
pub struct Counter {
    ctrl: Control,
    _reserved: [u32; 7],
    /// Free-running count, one tick per 10 ns.
    count: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Counter>(), 36);

impl Counter {
    pub const fn new_mmio() -> MmioCounter<'static> {
        MmioCounter {
            ptr: BASE_ADDR as *mut _,
            phantom: PhantomData,
        }
    }

    /// Creates a register block view at an arbitrary base address.
    ///
    /// # Safety
    ///
    /// `base` must point to memory that is valid for volatile access over
    /// the whole block.
    pub const unsafe fn new_mmio_at(base: usize) -> MmioCounter<'static> {
        MmioCounter {
            ptr: base as *mut _,
            phantom: PhantomData,
        }
    }
}
