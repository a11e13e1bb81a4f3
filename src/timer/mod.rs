//! Monotonic millisecond timekeeping over the 100 MHz free-running counter.
//!
//! The counter ticks every 10 ns and wraps every ~43 s, so the timekeeper
//! has to be serviced often enough to observe at most one wrap between two
//! reads. Every receive-loop iteration calls [Timekeeper::millis], which is
//! far more frequent than that.

pub mod regs;

use crate::time::Hertz;
use regs::{Control, Counter, MmioCounter};

/// Rate of the hardware counter.
pub const TICK_FREQ: Hertz = Hertz::from_raw(100_000_000);

/// Counter ticks per millisecond.
pub const TICKS_PER_MS: u32 = TICK_FREQ.raw() / 1000;

/// Millisecond timekeeper.
///
/// Converts the free-running 10 ns counter into a strictly non-decreasing
/// millisecond count, carrying sub-millisecond ticks over between calls.
pub struct Timekeeper {
    regs: MmioCounter<'static>,
    /// Last counter value seen.
    last: u32,
    /// Ticks left over since the last whole-millisecond step.
    sub_ms: u32,
    millis: u32,
}

impl Timekeeper {
    /// Claims the counter block at its SoC address, clears the count and
    /// starts it.
    pub fn new() -> Self {
        Self::start(Counter::new_mmio())
    }

    /// Like [Self::new] over a counter block at an arbitrary base.
    ///
    /// # Safety
    ///
    /// `base` must be valid for volatile access over the counter block.
    pub unsafe fn new_at(base: usize) -> Self {
        Self::start(unsafe { Counter::new_mmio_at(base) })
    }

    fn start(mut regs: MmioCounter<'static>) -> Self {
        regs.write_count(0);
        regs.write_ctrl(
            Control::builder()
                .with_free_run(true)
                .with_enable(true)
                .build(),
        );
        Timekeeper {
            regs,
            last: 0,
            sub_ms: 0,
            millis: 0,
        }
    }

    /// Advances the internal clock by however many ticks passed since the
    /// last call.
    pub fn handle(&mut self) {
        let now = self.regs.read_count();
        // Wrap-safe: a smaller value means the counter wrapped exactly once.
        let ticks = now.wrapping_sub(self.last);
        let total = u64::from(self.sub_ms) + u64::from(ticks);
        self.millis = self.millis.wrapping_add((total / u64::from(TICKS_PER_MS)) as u32);
        self.sub_ms = (total % u64::from(TICKS_PER_MS)) as u32;
        self.last = now;
    }

    /// Milliseconds passed since the timekeeper was started.
    pub fn millis(&mut self) -> u32 {
        self.handle();
        self.millis
    }
}

impl embedded_hal::delay::DelayNs for Timekeeper {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = ns.div_ceil(10);
        let start = self.regs.read_count();
        while self.regs.read_count().wrapping_sub(start) < ticks {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr;

    struct FakeCounter {
        mem: Vec<u32>,
    }

    impl FakeCounter {
        fn new() -> Self {
            FakeCounter { mem: vec![0; 9] }
        }

        fn timekeeper(&mut self) -> Timekeeper {
            unsafe { Timekeeper::new_at(self.mem.as_mut_ptr() as usize) }
        }

        fn set_count(&mut self, value: u32) {
            unsafe { ptr::write_volatile(self.mem.as_mut_ptr().add(8), value) };
        }

        fn ctrl(&self) -> u32 {
            unsafe { ptr::read_volatile(self.mem.as_ptr()) }
        }
    }

    #[test]
    fn start_clears_count_and_enables() {
        let mut fake = FakeCounter::new();
        fake.set_count(1234);
        let mut tk = fake.timekeeper();
        assert_eq!(fake.ctrl(), 0x101);
        assert_eq!(tk.millis(), 0);
    }

    #[test]
    fn accumulates_whole_milliseconds() {
        let mut fake = FakeCounter::new();
        let mut tk = fake.timekeeper();

        fake.set_count(150_000);
        assert_eq!(tk.millis(), 1);

        // The 50 000-tick residue combines with the next 50 000.
        fake.set_count(200_000);
        assert_eq!(tk.millis(), 2);

        fake.set_count(200_000 + 99_999);
        assert_eq!(tk.millis(), 2);
        fake.set_count(200_000 + 100_000);
        assert_eq!(tk.millis(), 3);
    }

    #[test]
    fn survives_counter_wrap() {
        let mut fake = FakeCounter::new();
        let mut tk = fake.timekeeper();

        fake.set_count(u32::MAX - 49_999);
        let before = tk.millis();

        // 50 000 ticks to the wrap plus 50 000 after it: exactly 1 ms.
        fake.set_count(50_000);
        assert_eq!(tk.millis(), before + 1);
    }

    #[test]
    fn millis_is_monotonic() {
        let mut fake = FakeCounter::new();
        let mut tk = fake.timekeeper();
        let mut prev = 0;
        for step in [10_000u32, 90_000, 1, 99_999, 300_000, 12] {
            let cur = unsafe { ptr::read_volatile(fake.mem.as_ptr().add(8)) };
            fake.set_count(cur.wrapping_add(step));
            let now = tk.millis();
            assert!(now >= prev);
            prev = now;
        }
    }
}
