//! BasicCAN frame layout.
//!
//! Two header bytes: `buff[0]` holds identifier bits 10..3, `buff[1]` packs
//! identifier bits 2..0 in the top three bits, the remote flag in bit 4 and
//! the dlc in the low nibble. Only standard frames exist in this bank.

use crate::core::{CanFrame, CAN_EFF_FLAG, CAN_ERR_FLAG, CAN_RTR_FLAG};
use crate::message::{UnsupportedFrame, MAX_ENCODED_LEN};

/// Decodes the frame staged in a TX buffer.
///
/// A set remote bit replaces the decoded identifier instead of ORing into
/// it, so remote frames lose their identifier. Kept verbatim; guest drivers
/// written against this controller depend on its exact behavior.
pub fn decode(buff: &[u8; MAX_ENCODED_LEN]) -> CanFrame {
    let mut can_id = u32::from(buff[0]) << 3 | u32::from(buff[1] >> 5);
    if buff[1] & 0x10 != 0 {
        can_id = CAN_RTR_FLAG;
    }
    let can_dlc = buff[1] & 0x0f;
    let len = usize::from(can_dlc).min(8);
    let mut data = [0; 8];
    data[..len].copy_from_slice(&buff[2..2 + len]);
    CanFrame {
        can_id,
        can_dlc,
        data,
    }
}

/// Encodes a frame for the receive FIFO and returns the encoded length,
/// 2 + dlc. Extended and error frames are refused.
pub fn encode(can: &CanFrame, buff: &mut [u8; MAX_ENCODED_LEN]) -> Result<usize, UnsupportedFrame> {
    if can.can_id & (CAN_EFF_FLAG | CAN_ERR_FLAG) != 0 {
        return Err(UnsupportedFrame);
    }

    buff[0] = (can.can_id >> 3) as u8;
    buff[1] = (can.can_id << 5) as u8 & 0xe0;
    if can.can_id & CAN_RTR_FLAG != 0 {
        buff[1] |= 1 << 4;
    }
    buff[1] |= can.can_dlc & 0x0f;
    let len = usize::from(can.can_dlc & 0x0f).min(8);
    buff[2..2 + len].copy_from_slice(&can.data[..len]);
    Ok(2 + len)
}
