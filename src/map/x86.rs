//! x86 physical address space mapping windows.

use super::regs::{
    MmioX86MapCtrl, X86BaseCtrl, X86MapCtrl, X86_SLOT_COUNT, X86_SLOT_SIZE, X86_WINDOW_BASE,
};
use crate::Error;

/// Memory type programmed into an x86 window slot.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemType {
    Normal = 4,
    Mmio = 6,
}

impl MemType {
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Copy, Clone)]
struct Slot {
    /// 64 MiB-aligned x86 base and memory type; `None` while the slot is
    /// free.
    mapped: Option<(u64, MemType)>,
    refs: u32,
}

const FREE: Slot = Slot {
    mapped: None,
    refs: 0,
};

/// Allocator for the fifteen x86 mapping windows.
///
/// Two mappings of the same base with different memory types occupy two
/// separate slots.
pub struct X86Mapper {
    regs: MmioX86MapCtrl<'static>,
    window_base: usize,
    slots: [Slot; X86_SLOT_COUNT],
}

impl X86Mapper {
    /// Creates the allocator over the SoC control block, with all slots
    /// free.
    pub fn new() -> Self {
        Self {
            regs: X86MapCtrl::new_mmio(),
            window_base: X86_WINDOW_BASE,
            slots: [FREE; X86_SLOT_COUNT],
        }
    }

    /// Creates the allocator over an arbitrary control block and window
    /// origin.
    ///
    /// # Safety
    ///
    /// `regs` must be valid for volatile access and `window_base` must be
    /// the local address where slot 0 of the controlled window set shows up.
    pub unsafe fn new_at(regs: MmioX86MapCtrl<'static>, window_base: usize) -> Self {
        Self {
            regs,
            window_base,
            slots: [FREE; X86_SLOT_COUNT],
        }
    }

    /// Maps an x86 physical address and returns a lease that unmaps on
    /// drop.
    pub fn map(&mut self, phys: u64, mem_type: MemType) -> Result<X86Mapping<'_>, Error> {
        let local = self.map_raw(phys, mem_type)?;
        Ok(X86Mapping {
            mapper: self,
            local,
        })
    }

    /// Maps an x86 physical address into the local address space.
    ///
    /// The returned local address stays valid until the matching
    /// [Self::unmap]. Fails with [Error::InvalidState] when no slot is free
    /// and no existing slot covers `(base, mem_type)`.
    pub fn map_raw(&mut self, phys: u64, mem_type: MemType) -> Result<usize, Error> {
        let base = phys & !(X86_SLOT_SIZE as u64 - 1);
        let offset = (phys - base) as usize;

        let idx = self
            .slots
            .iter()
            .position(|slot| match slot.mapped {
                None => slot.refs == 0,
                Some((b, t)) => b == base && t == mem_type,
            })
            .ok_or(Error::InvalidState)?;

        if self.slots[idx].mapped.is_none() {
            self.slots[idx].mapped = Some((base, mem_type));
            let word = 4 * idx;
            // Safety: idx comes from the slot table, so every index is in
            // range.
            unsafe {
                self.regs
                    .write_slot_unchecked(word, X86BaseCtrl::from_phys_base(base).raw_value());
                // Fixed value the hardware requires in the second word.
                self.regs.write_slot_unchecked(word + 1, 0x12);
                self.regs.write_slot_unchecked(word + 2, mem_type.raw());
                self.regs.write_slot_unchecked(word + 3, mem_type.raw());
                self.regs.write_mask_unchecked(idx, 0xffff_ffff);
                self.regs.write_attr_unchecked(idx, 0xc000_0000);
            }
        }

        self.slots[idx].refs += 1;
        Ok(self.window_base + idx * X86_SLOT_SIZE + offset)
    }

    /// Releases a mapping previously returned by [Self::map_raw].
    ///
    /// The last release of a slot clears its control quad and attribute
    /// word; the mask register stays at all-ones.
    pub fn unmap(&mut self, local: usize) -> Result<(), Error> {
        let idx = local
            .checked_sub(self.window_base)
            .map(|rel| rel / X86_SLOT_SIZE)
            .filter(|idx| *idx < X86_SLOT_COUNT)
            .ok_or(Error::InvalidParameter)?;

        let slot = &mut self.slots[idx];
        if slot.refs == 0 {
            return Err(Error::InvalidParameter);
        }
        slot.refs -= 1;
        if slot.refs == 0 {
            slot.mapped = None;
            let word = 4 * idx;
            // Safety: idx was bounds-checked above.
            unsafe {
                self.regs.write_slot_unchecked(word, 0);
                self.regs.write_slot_unchecked(word + 1, 0);
                self.regs.write_slot_unchecked(word + 2, 0);
                self.regs.write_slot_unchecked(word + 3, 0);
                self.regs.write_mask_unchecked(idx, 0xffff_ffff);
                self.regs.write_attr_unchecked(idx, 0);
            }
        }
        Ok(())
    }
}

impl Default for X86Mapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Lease on an x86 mapping window, released on drop.
pub struct X86Mapping<'a> {
    mapper: &'a mut X86Mapper,
    local: usize,
}

impl X86Mapping<'_> {
    /// Local address the mapped x86 address is visible at.
    pub fn addr(&self) -> usize {
        self.local
    }
}

impl Drop for X86Mapping<'_> {
    fn drop(&mut self) {
        // The lease came out of map_raw, so unmap cannot fail.
        let _ = self.mapper.unmap(self.local);
    }
}
