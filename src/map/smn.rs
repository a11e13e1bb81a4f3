//! SMN address space mapping windows.

use super::regs::{
    MmioSmnMapCtrl, SmnMapCtrl, SMN_SLOT_COUNT, SMN_SLOT_SIZE, SMN_WINDOW_BASE,
};
use crate::Error;

#[derive(Debug, Copy, Clone)]
struct Slot {
    /// 1 MiB-aligned SMN base; 0 while the slot is free. The hardware uses
    /// the same sentinel, which is why SMN base 0 itself cannot be mapped.
    base: u32,
    refs: u32,
}

const FREE: Slot = Slot { base: 0, refs: 0 };

/// Allocator for the thirty-two SMN mapping windows.
///
/// Adjacent slots share one 32-bit control register, the even slot in the
/// low half and the odd slot in the high half.
pub struct SmnMapper {
    regs: MmioSmnMapCtrl<'static>,
    window_base: usize,
    slots: [Slot; SMN_SLOT_COUNT],
}

impl SmnMapper {
    /// Creates the allocator over the SoC control block, with all slots
    /// free.
    pub fn new() -> Self {
        Self {
            regs: SmnMapCtrl::new_mmio(),
            window_base: SMN_WINDOW_BASE,
            slots: [FREE; SMN_SLOT_COUNT],
        }
    }

    /// Creates the allocator over an arbitrary control block and window
    /// origin.
    ///
    /// # Safety
    ///
    /// `regs` must be valid for volatile access and `window_base` must be
    /// the local address where slot 0 of the controlled window set shows up.
    pub unsafe fn new_at(regs: MmioSmnMapCtrl<'static>, window_base: usize) -> Self {
        Self {
            regs,
            window_base,
            slots: [FREE; SMN_SLOT_COUNT],
        }
    }

    /// Maps an SMN address and returns a lease that unmaps on drop.
    pub fn map(&mut self, smn: u32) -> Result<SmnMapping<'_>, Error> {
        let local = self.map_raw(smn)?;
        Ok(SmnMapping {
            mapper: self,
            local,
        })
    }

    /// Maps an SMN address into the local address space.
    ///
    /// Addresses below 1 MiB are unsupported: their window base would
    /// collide with the free-slot sentinel.
    pub fn map_raw(&mut self, smn: u32) -> Result<usize, Error> {
        let base = smn & !(SMN_SLOT_SIZE as u32 - 1);
        let offset = (smn - base) as usize;
        if base == 0 {
            return Err(Error::InvalidParameter);
        }

        let idx = self
            .slots
            .iter()
            .position(|slot| {
                (slot.base == 0 && slot.refs == 0) || slot.base == base
            })
            .ok_or(Error::InvalidState)?;

        if self.slots[idx].base == 0 {
            self.slots[idx].base = base;
            let pair = idx / 2;
            // Safety: idx comes from the slot table, so the pair index is in
            // range. Read-modify-write keeps the neighbouring half intact.
            unsafe {
                let mut ctrl = self.regs.read_pair_unchecked(pair);
                if idx & 1 != 0 {
                    ctrl.set_odd((base >> 20) as u16);
                } else {
                    ctrl.set_even((base >> 20) as u16);
                }
                self.regs.write_pair_unchecked(pair, ctrl);
            }
        }

        self.slots[idx].refs += 1;
        Ok(self.window_base + idx * SMN_SLOT_SIZE + offset)
    }

    /// Releases a mapping previously returned by [Self::map_raw].
    pub fn unmap(&mut self, local: usize) -> Result<(), Error> {
        let idx = local
            .checked_sub(self.window_base)
            .map(|rel| rel / SMN_SLOT_SIZE)
            .filter(|idx| *idx < SMN_SLOT_COUNT)
            .ok_or(Error::InvalidParameter)?;

        let slot = &mut self.slots[idx];
        if slot.refs == 0 {
            return Err(Error::InvalidParameter);
        }
        slot.refs -= 1;
        if slot.refs == 0 {
            slot.base = 0;
            let pair = idx / 2;
            // Safety: idx was bounds-checked above.
            unsafe {
                let mut ctrl = self.regs.read_pair_unchecked(pair);
                if idx & 1 != 0 {
                    ctrl.set_odd(0);
                } else {
                    ctrl.set_even(0);
                }
                self.regs.write_pair_unchecked(pair, ctrl);
            }
        }
        Ok(())
    }
}

impl Default for SmnMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Lease on an SMN mapping window, released on drop.
pub struct SmnMapping<'a> {
    mapper: &'a mut SmnMapper,
    local: usize,
}

impl SmnMapping<'_> {
    /// Local address the mapped SMN address is visible at.
    pub fn addr(&self) -> usize {
        self.local
    }
}

impl Drop for SmnMapping<'_> {
    fn drop(&mut self) {
        let _ = self.mapper.unmap(self.local);
    }
}
