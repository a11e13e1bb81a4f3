//! Register model of the legacy 16550 UART.
//!
//! The device sits behind a byte-register capability, so there is no MMIO
//! block here; just the register offsets and the bit layouts of the ones
//! the driver touches.

/// Receive buffer / transmit holding register (divisor low with DLAB set).
pub const REG_DATA: u8 = 0;
/// Interrupt enable register (divisor high with DLAB set).
pub const REG_IER: u8 = 1;
/// FIFO control register (write side of offset 2).
pub const REG_FCR: u8 = 2;
/// Line control register.
pub const REG_LCR: u8 = 3;
/// Modem control register.
pub const REG_MCR: u8 = 4;
/// Line status register.
pub const REG_LSR: u8 = 5;

/// Input clock of the legacy UART.
pub const REF_CLK: crate::time::Hertz = crate::time::Hertz::from_raw(1_843_200);

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stopbits {
    One = 0,
    Two = 1,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordSize {
    Five = 0b00,
    Six = 0b01,
    Seven = 0b10,
    Eight = 0b11,
}

#[bitbybit::bitfield(u8, default = 0x0, debug)]
pub struct LineControl {
    /// Switches offsets 0/1 to the baud divisor latch.
    #[bit(7, rw)]
    divisor_latch: bool,
    #[bit(6, rw)]
    break_control: bool,
    #[bit(5, rw)]
    parity_sticky: bool,
    #[bit(4, rw)]
    parity_even: bool,
    #[bit(3, rw)]
    parity_enable: bool,
    #[bit(2, rw)]
    stopbits: Stopbits,
    #[bits(0..=1, rw)]
    wordsize: WordSize,
}

#[bitbybit::bitfield(u8, debug)]
pub struct LineStatus {
    #[bit(7, r)]
    fifo_error: bool,
    /// Transmitter shift register and FIFO both empty.
    #[bit(6, r)]
    transmitter_empty: bool,
    /// There is space in the holding register / TX FIFO.
    #[bit(5, r)]
    thr_empty: bool,
    #[bit(4, r)]
    break_interrupt: bool,
    #[bit(3, r)]
    framing_error: bool,
    #[bit(2, r)]
    parity_error: bool,
    #[bit(1, r)]
    overrun_error: bool,
    /// A received byte is waiting.
    #[bit(0, r)]
    data_ready: bool,
}

#[bitbybit::bitfield(u8, default = 0x0, debug)]
pub struct FifoControl {
    #[bits(6..=7, rw)]
    rx_trigger: arbitrary_int::u2,
    #[bit(2, rw)]
    clear_tx: bool,
    #[bit(1, rw)]
    clear_rx: bool,
    #[bit(0, rw)]
    enable: bool,
}

#[bitbybit::bitfield(u8, default = 0x0, debug)]
pub struct ModemControl {
    #[bit(3, rw)]
    aux_out2: bool,
    #[bit(1, rw)]
    request_to_send: bool,
    #[bit(0, rw)]
    data_terminal_ready: bool,
}
