#![warn(missing_docs)]

//! `sja1000-core` provides a set of essential abstractions that serves as a
//! thin integration layer between the machine-independent [`sja1000`] device
//! model and the emulator it is embedded in.
//!
//! Traits from this crate are not supposed to be implemented by the device
//! model itself; implementations should be provided by the embedding
//! emulator, which owns the character endpoint carrying CAN traffic and the
//! interrupt controller the device's IRQ pin is wired to.
//!
//! The crate also defines the frame and filter types that cross that
//! boundary: [`CanFrame`] is the fixed-size on-the-wire representation
//! exchanged with the character endpoint, and [`CanFilter`] entries are
//! announced to it so the remote side can pre-filter traffic.
//!
//! [`sja1000`]: <https://docs.rs/crate/sja1000/>

pub use embedded_can;

use core::fmt;
use embedded_can::{ExtendedId, Frame, Id, StandardId};

/// Identifier flag marking an extended (29-bit) frame.
pub const CAN_EFF_FLAG: u32 = 1 << 31;
/// Identifier flag marking a remote transmission request.
pub const CAN_RTR_FLAG: u32 = 1 << 30;
/// Identifier flag marking an error frame.
pub const CAN_ERR_FLAG: u32 = 1 << 29;

/// Mask selecting the 29 identifier bits of an extended frame.
pub const CAN_EFF_MASK: u32 = 0x1fff_ffff;
/// Mask selecting the 11 identifier bits of a standard frame.
pub const CAN_SFF_MASK: u32 = 0x0000_07ff;

/// Size of one encoded [`CanFrame`] on the byte stream.
pub const WIRE_FRAME_LEN: usize = 16;

/// CAN frame in the representation carried over the character endpoint.
///
/// The identifier word packs the [`CAN_EFF_FLAG`], [`CAN_RTR_FLAG`] and
/// [`CAN_ERR_FLAG`] bits above the 29 identifier bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CanFrame {
    /// Identifier plus flag bits.
    pub can_id: u32,
    /// Data length code.
    pub can_dlc: u8,
    /// Payload; bytes past `can_dlc` are zero.
    pub data: [u8; 8],
}

impl CanFrame {
    /// Serializes into the 16-byte stream layout: little-endian identifier
    /// word, dlc, three bytes of padding, eight data bytes.
    pub fn to_bytes(&self) -> [u8; WIRE_FRAME_LEN] {
        let mut buf = [0; WIRE_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.can_id.to_le_bytes());
        buf[4] = self.can_dlc;
        buf[8..16].copy_from_slice(&self.data);
        buf
    }

    /// Deserializes one frame from the head of `buf`.
    ///
    /// Returns `None` for chunks shorter than [`WIRE_FRAME_LEN`]. The data
    /// length code is clamped to 8, so the accounting of downstream buffers
    /// stays sound for arbitrary input.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < WIRE_FRAME_LEN {
            return None;
        }
        let can_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let can_dlc = buf[4].min(8);
        let mut data = [0; 8];
        data.copy_from_slice(&buf[8..16]);
        Some(Self {
            can_id,
            can_dlc,
            data,
        })
    }

    fn payload_len(&self) -> usize {
        usize::from(self.can_dlc.min(8))
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut frame = Self {
            can_id: id_word(id.into()),
            can_dlc: data.len() as u8,
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(Self {
            can_id: id_word(id.into()) | CAN_RTR_FLAG,
            can_dlc: dlc as u8,
            data: [0; 8],
        })
    }

    fn is_extended(&self) -> bool {
        self.can_id & CAN_EFF_FLAG != 0
    }

    fn is_remote_frame(&self) -> bool {
        self.can_id & CAN_RTR_FLAG != 0
    }

    fn id(&self) -> Id {
        if self.is_extended() {
            // The mask ensures the ID is in range for a 29-bit integer
            Id::Extended(unsafe { ExtendedId::new_unchecked(self.can_id & CAN_EFF_MASK) })
        } else {
            // The mask ensures the ID is in range for a 11-bit integer
            Id::Standard(unsafe {
                StandardId::new_unchecked((self.can_id & CAN_SFF_MASK) as u16)
            })
        }
    }

    fn dlc(&self) -> usize {
        self.can_dlc.into()
    }

    fn data(&self) -> &[u8] {
        if self.is_remote_frame() {
            &[]
        } else {
            &self.data[..self.payload_len()]
        }
    }
}

fn id_word(id: Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw().into(),
        Id::Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03X} [{}] {} {}",
            self.can_id & CAN_EFF_MASK,
            self.can_dlc,
            if self.is_extended() { "EFF" } else { "SFF" },
            if self.is_remote_frame() { "RTR" } else { "DAT" },
        )?;
        for byte in &self.data[..self.payload_len()] {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

/// Traditional identifier/mask filter entry announced to the endpoint.
///
/// A frame passes when the identifier bits selected by `can_mask` equal the
/// corresponding bits of `can_id`; the flag bits participate like identifier
/// bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CanFilter {
    /// Expected identifier bits.
    pub can_id: u32,
    /// Identifier bits that must match.
    pub can_mask: u32,
}

impl CanFilter {
    /// Whether an identifier word passes this filter.
    pub fn matches(&self, can_id: u32) -> bool {
        (can_id ^ self.can_id) & self.can_mask == 0
    }
}

/// Which filter bank layout an announced set uses.
///
/// The discriminants are the values carried on the control channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterBankKind {
    /// One BasicCAN code/mask pair.
    Basic = 1,
    /// The PeliCAN single-filter bank: one extended and one standard entry.
    Single = 2,
    /// The PeliCAN dual-filter bank: two extended and two standard entries.
    Dual = 4,
}

/// Trait representing the character endpoint the controller is bridged to.
///
/// The endpoint is a bidirectional byte stream carrying [`WIRE_FRAME_LEN`]
/// sized frames, with an out-of-band control message announcing the active
/// acceptance filters. Inbound traffic does not flow through this trait; the
/// endpoint's poll loop feeds it to the controller's `can_accept`/`deliver`
/// entry points instead.
pub trait CanChannel {
    /// Push one encoded frame to the byte stream.
    fn write(&mut self, frame: &[u8; WIRE_FRAME_LEN]);

    /// Announce the active filter set so the remote side can pre-filter.
    ///
    /// `filters` holds as many entries as `kind` implies, at most four.
    /// Filtering on the remote side is advisory; the controller still runs
    /// its own acceptance filter.
    fn set_filters(&mut self, kind: FilterBankKind, filters: &[CanFilter]);
}

/// Trait representing the interrupt line the controller's IRQ pin drives.
///
/// The controller guarantees edge discipline: `raise` and `lower` alternate,
/// starting with the line low.
pub trait IrqLine {
    /// Assert the line.
    fn raise(&mut self);
    /// Deassert the line.
    fn lower(&mut self);
}
