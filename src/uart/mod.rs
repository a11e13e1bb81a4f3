//! Driver for the legacy x86 16550 UART the stub talks through.
//!
//! The device only supports one-byte register accesses, so the driver is
//! generic over a [RegisterAccess] capability of byte-wide reads and
//! writes; [X86UartIo] is the production implementation performing volatile
//! MMIO against the mapped x86 window. The driver exposes the blocking
//! [embedded_io] traits the rest of the stub is written against, plus the
//! [embedded_hal_nb] serial traits for callers that poll.

pub mod regs;

use core::convert::Infallible;

use crate::time::Hertz;
use regs::{
    FifoControl, LineControl, LineStatus, ModemControl, REG_DATA, REG_FCR, REG_IER, REG_LCR,
    REG_MCR, REG_LSR,
};
pub use regs::{REF_CLK, Stopbits, WordSize};

/// Byte-wide register access the UART performs against its device.
///
/// The 16550 rejects anything but single-byte accesses, so the capability
/// is typed to exactly that width.
pub trait RegisterAccess {
    fn read_register(&mut self, offset: u8) -> u8;
    fn write_register(&mut self, offset: u8, value: u8);
}

/// Register access against the UART mapped through the x86 window.
pub struct X86UartIo {
    base: usize,
}

impl X86UartIo {
    /// Creates the access over the local address of the mapped UART.
    ///
    /// # Safety
    ///
    /// `base` must be the live mapping of the UART's x86 physical base and
    /// stay mapped for the lifetime of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterAccess for X86UartIo {
    fn read_register(&mut self, offset: u8) -> u8 {
        unsafe { ((self.base + offset as usize) as *const u8).read_volatile() }
    }

    fn write_register(&mut self, offset: u8, value: u8) {
        unsafe { ((self.base + offset as usize) as *mut u8).write_volatile(value) }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub baudrate: Hertz,
    pub parity: Parity,
    pub stopbits: Stopbits,
    pub wordsize: WordSize,
}

impl Config {
    pub fn baudrate(mut self, baudrate: Hertz) -> Self {
        self.baudrate = baudrate;
        self
    }

    pub fn parity_none(mut self) -> Self {
        self.parity = Parity::None;
        self
    }

    pub fn parity_even(mut self) -> Self {
        self.parity = Parity::Even;
        self
    }

    pub fn parity_odd(mut self) -> Self {
        self.parity = Parity::Odd;
        self
    }

    pub fn stopbits(mut self, stopbits: Stopbits) -> Self {
        self.stopbits = stopbits;
        self
    }

    pub fn wordsize(mut self, wordsize: WordSize) -> Self {
        self.wordsize = wordsize;
        self
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            baudrate: Hertz::from_raw(115_200),
            parity: Parity::None,
            stopbits: Stopbits::One,
            wordsize: WordSize::Eight,
        }
    }
}

impl From<Hertz> for Config {
    fn from(baud: Hertz) -> Self {
        Config::default().baudrate(baud)
    }
}

/// 16550 UART driver.
pub struct Uart16550<Io: RegisterAccess> {
    io: Io,
}

impl<Io: RegisterAccess> Uart16550<Io> {
    /// Creates the driver and programs line parameters, divisor and FIFOs.
    pub fn new(io: Io, config: Config) -> Self {
        let mut uart = Uart16550 { io };
        uart.set_config(&config);
        uart
    }

    fn set_config(&mut self, config: &Config) {
        // All interrupt sources off; the stub polls.
        self.io.write_register(REG_IER, 0);

        let (parity_enable, parity_even) = match config.parity {
            Parity::None => (false, false),
            Parity::Odd => (true, false),
            Parity::Even => (true, true),
        };
        let mut lcr = LineControl::builder()
            .with_divisor_latch(false)
            .with_break_control(false)
            .with_parity_sticky(false)
            .with_parity_even(parity_even)
            .with_parity_enable(parity_enable)
            .with_stopbits(config.stopbits)
            .with_wordsize(config.wordsize)
            .build();

        // Program the divisor behind the latch, then drop back to the data
        // registers.
        let divisor = (REF_CLK.raw() / (16 * config.baudrate.raw())).max(1) as u16;
        lcr.set_divisor_latch(true);
        self.io.write_register(REG_LCR, lcr.raw_value());
        self.io.write_register(REG_DATA, divisor as u8);
        self.io.write_register(REG_IER, (divisor >> 8) as u8);
        lcr.set_divisor_latch(false);
        self.io.write_register(REG_LCR, lcr.raw_value());

        self.io.write_register(
            REG_FCR,
            FifoControl::builder()
                .with_rx_trigger(arbitrary_int::u2::new(0))
                .with_clear_tx(true)
                .with_clear_rx(true)
                .with_enable(true)
                .build()
                .raw_value(),
        );
        self.io.write_register(
            REG_MCR,
            ModemControl::builder()
                .with_aux_out2(true)
                .with_request_to_send(true)
                .with_data_terminal_ready(true)
                .build()
                .raw_value(),
        );
    }

    fn line_status(&mut self) -> LineStatus {
        LineStatus::new_with_raw_value(self.io.read_register(REG_LSR))
    }

    /// A received byte is waiting in the FIFO.
    pub fn data_available(&mut self) -> bool {
        self.line_status().data_ready()
    }

    /// Low level non-blocking read of one byte from the RX FIFO.
    pub fn read_byte(&mut self) -> nb::Result<u8, Infallible> {
        if !self.data_available() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.io.read_register(REG_DATA))
    }

    /// Low level non-blocking write of one byte to the TX holding register.
    pub fn write_byte(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        if !self.line_status().thr_empty() {
            return Err(nb::Error::WouldBlock);
        }
        self.io.write_register(REG_DATA, byte);
        Ok(())
    }
}

impl<Io: RegisterAccess> embedded_io::ErrorType for Uart16550<Io> {
    type Error = Infallible;
}

impl<Io: RegisterAccess> embedded_hal_nb::serial::ErrorType for Uart16550<Io> {
    type Error = Infallible;
}

impl<Io: RegisterAccess> embedded_hal_nb::serial::Read<u8> for Uart16550<Io> {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.read_byte()
    }
}

impl<Io: RegisterAccess> embedded_hal_nb::serial::Write<u8> for Uart16550<Io> {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.write_byte(word)
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if !self.line_status().transmitter_empty() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }
}

impl<Io: RegisterAccess> embedded_io::ReadReady for Uart16550<Io> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.data_available())
    }
}

impl<Io: RegisterAccess> embedded_io::Read for Uart16550<Io> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut read = 0;
        while !self.data_available() {}
        for byte in buf.iter_mut() {
            match self.read_byte() {
                Ok(b) => {
                    *byte = b;
                    read += 1;
                }
                Err(nb::Error::WouldBlock) => break,
            }
        }
        Ok(read)
    }
}

impl<Io: RegisterAccess> embedded_io::Write for Uart16550<Io> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        for byte in buf.iter() {
            nb::block!(self.write_byte(*byte))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        nb::block!(<Self as embedded_hal_nb::serial::Write<u8>>::flush(self))
    }
}
