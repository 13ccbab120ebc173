#![warn(missing_docs)]
//! # SJA1000
//!
//! ## Overview
//! This crate provides a register-level device model of the SJA1000 CAN
//! controller for machine emulators.
//!
//! It provides the following features:
//!
//! - the full 32-byte register window with byte-exact guest semantics,
//!   including the side effects drivers rely on (interrupt clear-on-read,
//!   reset-mode register banking, command-register choreography)
//! - both operating banks, PeliCAN and BasicCAN, selected at runtime by the
//!   clock-divider register
//! - the PeliCAN acceptance filter in single and dual configuration, plus
//!   construction of the identifier/mask sets announced to the remote side
//! - a 64-byte receive FIFO with overrun signaling
//! - an interrupt line driven in exact agreement with the status and
//!   interrupt registers
//!
//! The model sits between two parties the embedding emulator provides: a
//! guest CPU issuing single-byte reads and writes on a memory-mapped window,
//! and a character endpoint carrying 16-byte wire frames to and from the
//! outside world. Both are integration seams expressed as traits in
//! [`sja1000_core`]: the endpoint implements [`core::CanChannel`], the
//! interrupt wiring implements [`core::IrqLine`]. The guest and endpoint
//! sides may run on different threads; the controller serializes them
//! internally, so all entry points take `&self`.
//!
//! Bit timing, error counters, error frames, self reception, and sleep or
//! listen-only modes are not modeled. Registers touching those read and
//! write as documented but have no further effect.
//!
//! ## Usage example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use sja1000::controller::{Sja1000, MODEL};
//! use sja1000::core::{CanChannel, CanFilter, CanFrame, FilterBankKind, IrqLine, WIRE_FRAME_LEN};
//!
//! // Stand-ins for the emulator's character endpoint and interrupt wiring.
//! #[derive(Clone, Default)]
//! struct Endpoint {
//!     sent: Arc<Mutex<Vec<[u8; WIRE_FRAME_LEN]>>>,
//! }
//!
//! impl CanChannel for Endpoint {
//!     fn write(&mut self, frame: &[u8; WIRE_FRAME_LEN]) {
//!         self.sent.lock().unwrap().push(*frame);
//!     }
//!     fn set_filters(&mut self, _kind: FilterBankKind, _filters: &[CanFilter]) {}
//! }
//!
//! struct Pin;
//! impl IrqLine for Pin {
//!     fn raise(&mut self) {}
//!     fn lower(&mut self) {}
//! }
//!
//! let endpoint = Endpoint::default();
//! let can = Sja1000::new(MODEL, endpoint.clone(), Pin).unwrap();
//!
//! // Select the PeliCAN bank and leave reset mode.
//! can.write(31, 0x80);
//! can.write(0, 0x00);
//!
//! // Stage a standard frame (id 0x115, two data bytes) and request
//! // transmission.
//! for (offset, byte) in (16..).zip([0x02, 0x22, 0xa0, 0xde, 0xad]) {
//!     can.write(offset, byte);
//! }
//! can.write(1, 0x01);
//!
//! let sent = endpoint.sent.lock().unwrap();
//! let frame = CanFrame::from_bytes(&sent[0]).unwrap();
//! assert_eq!(frame.can_id, 0x115);
//! assert_eq!(&frame.data[..2], &[0xde, 0xad]);
//! ```
//!
//! Inbound traffic goes the other way: the endpoint's poll loop asks
//! [`controller::Sja1000::can_accept`] whether the controller has left reset
//! mode and then hands frame-sized chunks to
//! [`controller::Sja1000::deliver`].

pub mod controller;
pub mod filter;
pub mod interrupt;
pub mod message;
pub mod reg;
pub mod rx_fifo;

pub use embedded_can;
pub use sja1000_core as core;
