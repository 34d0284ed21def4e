//! CSMA/CA MAC core for half-duplex radio links.
//!
//! Implements carrier-sense multiple access with collision avoidance,
//! optional RTS/CTS channel reservation, positive acknowledgement with
//! binary exponential backoff, NAV bookkeeping and per-peer duplicate
//! suppression.
//!
//! The MAC sits between a network-layer sender/receiver and a physical
//! transmission device. The physical side is the [`phy::Phy`] trait
//! (channel idle query, transmit admission, airtime computation) plus
//! three notifications delivered into the state machine (receive start,
//! frame received, transmission complete). The upper side is the
//! [`mac::Upper`] delivery trait.
//!
//! All waiting is modelled as scheduled deadlines: the owning runtime
//! polls [`mac::Mac::next_deadline`] and calls [`mac::Mac::tick`] when it
//! elapses. No internal threads, no locking.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod frame;

pub mod timer;

pub mod phy;

pub mod error;

pub mod mac;

pub mod prelude;

/// Timestamps are 64-bit in microseconds
pub type Ts = u64;

/// Maximum DATA payload carried in a single frame
pub const MAX_PAYLOAD_LEN: usize = 128;

/// Maximum on-air frame size (DATA header plus payload)
pub const MAX_FRAME_LEN: usize = frame::DATA_HEADER_LEN + MAX_PAYLOAD_LEN;
