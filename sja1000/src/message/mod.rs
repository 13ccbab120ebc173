//! Frame codecs for the two register-bank layouts.
//!
//! Each bank stores frames in its own byte layout; the codecs here map
//! between those layouts and the wire representation exchanged with the
//! character endpoint. Decoders are total (any bit pattern is a frame);
//! encoders refuse the formats a bank cannot carry.

pub mod basic;
pub mod pelican;

/// Longest encoded frame: extended header (5 bytes) plus 8 data bytes.
///
/// This is also the size of the TX staging buffer the guest fills before
/// issuing a transmission request.
pub const MAX_ENCODED_LEN: usize = 13;

/// The frame format cannot be carried by the selected bank.
#[derive(Debug, PartialEq, Eq)]
pub struct UnsupportedFrame;
