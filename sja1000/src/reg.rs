//! Register window layout and bit assignments.
//!
//! The guest sees a 32-byte window whose meaning depends on the operating
//! bank selected by the clock-divider register and, within the PeliCAN bank,
//! on the reset/operation sub-state. The decode tables here map a window
//! offset to a tagged register; the side effects live in
//! [`controller`](crate::controller).

/// Size of the register window in bytes.
///
/// The bounds check against this value is `>`, not `>=`, so offset 32 still
/// reaches the decode tables (where it lands on the invalid tag).
pub const REG_WINDOW_LEN: u64 = 32;

/// Clock-divider bit selecting the PeliCAN bank.
pub const CDR_PELICAN: u8 = 1 << 7;

/// PeliCAN mode register: reset request.
pub const MOD_RESET: u8 = 1 << 0;
/// PeliCAN mode register: single acceptance filter.
pub const MOD_SINGLE_FILTER: u8 = 1 << 3;

/// BasicCAN control register: reset request.
pub const CTR_RESET: u8 = 1 << 0;
/// BasicCAN control register: receive interrupt enable.
pub const CTR_RX_IRQ_EN: u8 = 1 << 1;
/// BasicCAN control register: transmit interrupt enable.
pub const CTR_TX_IRQ_EN: u8 = 1 << 2;
/// BasicCAN control register: overrun interrupt enable.
pub const CTR_OVERRUN_IRQ_EN: u8 = 1 << 4;

/// Command register: transmission request.
pub const CMD_TRANSMIT_REQUEST: u8 = 1 << 0;
/// Command register: release receive buffer.
pub const CMD_RELEASE_RX_BUFFER: u8 = 1 << 2;
/// Command register: clear data overrun.
pub const CMD_CLEAR_OVERRUN: u8 = 1 << 3;

/// Status register: receive buffer holds at least one message.
pub const SR_RX_AVAILABLE: u8 = 1 << 0;
/// Status register: data overrun occurred.
pub const SR_OVERRUN: u8 = 1 << 1;
/// Status register: transmit buffer released.
pub const SR_TX_RELEASED: u8 = 1 << 2;
/// Status register: transmission complete.
pub const SR_TX_COMPLETE: u8 = 1 << 3;
/// Status register: reception in progress.
pub const SR_RX_IN_PROGRESS: u8 = 1 << 4;
/// Status register: transmission in progress.
pub const SR_TX_IN_PROGRESS: u8 = 1 << 5;

/// Operating bank selected by bit 7 of the clock-divider register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bank {
    /// PeliCAN bank (`clock & 0x80 != 0`).
    Pelican,
    /// BasicCAN bank.
    Basic,
}

impl Bank {
    /// The bank a given clock-divider value selects.
    pub fn from_clock(clock: u8) -> Self {
        if clock & CDR_PELICAN != 0 {
            Bank::Pelican
        } else {
            Bank::Basic
        }
    }
}

/// Registers of the PeliCAN bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PelicanReg {
    /// Offset 0.
    Mode,
    /// Offset 1; write-only, reads as 0x00.
    Command,
    /// Offset 2.
    Status,
    /// Offset 3; reading clears the pending bits.
    Interrupt,
    /// Offset 4.
    InterruptEnable,
    /// Offsets 5–15: bus timing, output control, test. Not modeled; reads
    /// return 0x00, writes are dropped.
    Reserved,
    /// Offsets 16–28, as index 0–12 into the window. Acceptance code/mask
    /// bytes in reset mode, TX staging (write) or RX window (read) in
    /// operation mode.
    Window(u8),
    /// Offset 31.
    ClockDivider,
    /// Offsets 29, 30 and 32: reads return 0xff, writes are dropped.
    Invalid,
}

impl PelicanReg {
    /// Decode a window offset.
    pub fn decode(offset: u64) -> Self {
        match offset {
            0 => PelicanReg::Mode,
            1 => PelicanReg::Command,
            2 => PelicanReg::Status,
            3 => PelicanReg::Interrupt,
            4 => PelicanReg::InterruptEnable,
            5..=15 => PelicanReg::Reserved,
            16..=28 => PelicanReg::Window((offset - 16) as u8),
            31 => PelicanReg::ClockDivider,
            _ => PelicanReg::Invalid,
        }
    }
}

/// Registers of the BasicCAN bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BasicReg {
    /// Offset 0.
    Control,
    /// Offset 1; write-only, reads as 0xff.
    Command,
    /// Offset 2.
    Status,
    /// Offset 3; reading clears the pending bits.
    Interrupt,
    /// Offset 4.
    AcceptanceCode,
    /// Offset 5.
    AcceptanceMask,
    /// Offsets 10–19, as index 0–9 into the TX staging buffer. Write side
    /// only; reads return 0xff.
    TxBuffer(u8),
    /// Offsets 20–29, as index 0–9 past the FIFO read cursor. Read side
    /// only; writes are dropped.
    RxWindow(u8),
    /// Offset 31.
    ClockDivider,
    /// Offsets 6–9, 30 and 32: reads return 0xff, writes are dropped.
    Invalid,
}

impl BasicReg {
    /// Decode a window offset.
    pub fn decode(offset: u64) -> Self {
        match offset {
            0 => BasicReg::Control,
            1 => BasicReg::Command,
            2 => BasicReg::Status,
            3 => BasicReg::Interrupt,
            4 => BasicReg::AcceptanceCode,
            5 => BasicReg::AcceptanceMask,
            10..=19 => BasicReg::TxBuffer((offset - 10) as u8),
            20..=29 => BasicReg::RxWindow((offset - 20) as u8),
            31 => BasicReg::ClockDivider,
            _ => BasicReg::Invalid,
        }
    }
}
