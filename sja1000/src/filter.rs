//! Acceptance filtering.
//!
//! Two layers cooperate: the in-controller software filter ([`accepts`])
//! decides frame by frame on the receive path, and the identifier/mask sets
//! built here from the acceptance registers are announced to the character
//! endpoint so the remote side can pre-filter. The software filter is the
//! authority; the announced set is advisory.

use crate::core::{CanFilter, CanFrame, CAN_EFF_FLAG, CAN_RTR_FLAG};
use crate::reg::MOD_SINGLE_FILTER;

/// Runs the acceptance filter over a received frame.
///
/// Only the PeliCAN bank filters in the controller; the BasicCAN bank relies
/// on the announced host-side filter and accepts everything here. `mode` is
/// the PeliCAN mode register, of which only the single-filter bit matters.
///
/// Single mode matches standard data frames on their first one or two data
/// bytes against `code_mask[2..4]` under `code_mask[6..8]`; remote and empty
/// frames always pass, and extended frames fall through to accept. Dual mode
/// matches the standard identifier against `code_mask[0..2]` under
/// `code_mask[4..6]` and, for data frames, the first byte against nibbles
/// recombined from both halves; a standard frame whose identifier does not
/// match falls through to accept, as do extended frames. The fall-throughs
/// look inverted but are authoritative; guest drivers program around them.
pub fn accepts(pelican: bool, mode: u8, code_mask: &[u8; 8], can: &CanFrame) -> bool {
    if !pelican {
        return true;
    }

    if mode & MOD_SINGLE_FILTER != 0 {
        if can.can_id & CAN_EFF_FLAG == 0 {
            if can.can_id & CAN_RTR_FLAG != 0 {
                return true;
            }
            if can.can_dlc == 0 {
                return true;
            }
            let match0 =
                (can.data[0] & !code_mask[6]) == (code_mask[2] & !code_mask[6]);
            if can.can_dlc == 1 && match0 {
                return true;
            }
            if can.can_dlc >= 2
                && match0
                && (can.data[1] & !code_mask[7]) == (code_mask[3] & !code_mask[7])
            {
                return true;
            }
            return false;
        }
    } else if can.can_id & CAN_EFF_FLAG == 0 {
        let id_high = (can.can_id >> 3) as u8;
        let id_low = (can.can_id << 5) as u8;
        if (code_mask[0] & !code_mask[4]) == (id_high & !code_mask[4])
            && (code_mask[1] & !code_mask[5]) & 0xe0 == (id_low & !code_mask[5]) & 0xe0
        {
            if can.can_dlc == 0 {
                return true;
            }
            let tmp1 = (code_mask[1] << 4) & 0xf0 | code_mask[2] & 0x0f;
            let tmp2 = !((code_mask[5] << 4) & 0xf0 | code_mask[6] & 0x0f);
            return tmp1 & tmp2 == can.data[0] & tmp2;
        }
    }

    true
}

/// Builds the two-entry set announced when leaving reset with the single
/// filter selected: one extended entry from the whole code/mask bank, one
/// standard entry from its upper bytes. Bits 2 (extended) respectively 4
/// (standard) of the low code/mask bytes carry the remote flag.
pub fn single_filter_set(code_mask: &[u8; 8]) -> [CanFilter; 2] {
    let mut eff = CanFilter {
        can_id: u32::from(code_mask[0]) << 21
            | u32::from(code_mask[1]) << 13
            | u32::from(code_mask[2]) << 5
            | u32::from(code_mask[3]) >> 3
            | CAN_EFF_FLAG,
        can_mask: 0,
    };
    let tmp = u32::from(code_mask[4]) << 21
        | u32::from(code_mask[5]) << 13
        | u32::from(code_mask[6]) << 5
        | u32::from(code_mask[7]) >> 3
        | 7 << 29;
    eff.can_mask = !tmp | CAN_EFF_FLAG;
    if code_mask[3] & 1 << 2 != 0 {
        eff.can_id |= CAN_RTR_FLAG;
    }
    if code_mask[7] & 1 << 2 == 0 {
        eff.can_mask |= CAN_RTR_FLAG;
    }

    let mut sff = CanFilter {
        can_id: u32::from(code_mask[0]) << 3 | u32::from(code_mask[1]) >> 5,
        can_mask: 0,
    };
    let tmp = u32::from(code_mask[4]) << 3
        | u32::from(code_mask[5]) >> 5
        | 0xff << 11
        | 0xff << 19
        | 0x0f << 27;
    sff.can_mask = !tmp | CAN_EFF_FLAG;
    if code_mask[1] & 1 << 4 != 0 {
        sff.can_id |= CAN_RTR_FLAG;
    }
    if code_mask[5] & 1 << 4 == 0 {
        sff.can_mask |= CAN_RTR_FLAG;
    }

    [eff, sff]
}

/// Builds the four-entry set announced when leaving reset with dual filters
/// selected: each half of the code/mask bank yields an extended entry, and
/// the same halves reinterpreted as standard code/mask pairs yield two
/// standard entries carrying the remote flag bits.
pub fn dual_filter_set(code_mask: &[u8; 8]) -> [CanFilter; 4] {
    let eff = |code: &[u8], mask: &[u8]| {
        let tmp = u32::from(mask[0]) << 21
            | u32::from(mask[1]) << 13
            | 0xff << 5
            | 0xff >> 3
            | 7 << 29;
        CanFilter {
            can_id: u32::from(code[0]) << 21 | u32::from(code[1]) << 13 | CAN_EFF_FLAG,
            can_mask: !tmp | CAN_EFF_FLAG,
        }
    };
    let sff = |code: &[u8], mask: &[u8]| {
        let tmp = u32::from(mask[0]) << 3
            | u32::from(mask[1]) >> 5
            | 0xff << 11
            | 0xff << 19
            | 0x0f << 27;
        let mut filter = CanFilter {
            can_id: u32::from(code[0]) << 3 | u32::from(code[1]) >> 5,
            can_mask: !tmp | CAN_EFF_FLAG,
        };
        if code[1] & 1 << 4 != 0 {
            filter.can_id |= CAN_RTR_FLAG;
        }
        if mask[1] & 1 << 4 == 0 {
            filter.can_mask |= CAN_RTR_FLAG;
        }
        filter
    };

    [
        eff(&code_mask[0..2], &code_mask[4..6]),
        eff(&code_mask[2..4], &code_mask[6..8]),
        sff(&code_mask[0..2], &code_mask[4..6]),
        sff(&code_mask[2..4], &code_mask[6..8]),
    ]
}

/// Builds the single BasicCAN entry from the code and mask registers. Only
/// standard frames pass; the extended flag is forced into the match.
pub fn basic_filter(code: u8, mask: u8) -> CanFilter {
    CanFilter {
        can_id: u32::from(code) << 3 & 0xff << 3,
        can_mask: !(u32::from(mask) << 3) & 0xff << 3 | CAN_EFF_FLAG,
    }
}
