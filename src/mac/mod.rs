//! Medium Access Control (MAC) layer module.
//! Contains MAC traits and the CSMA/CA implementation.

pub mod config;

pub mod dedup;

pub mod csma;

use crate::error::MacError;
use crate::frame::Address;
use crate::Ts;

/// Device state. Exactly one state is authoritative at any instant;
/// transitions are driven by timer expiry or delivered channel events.
#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::Display)]
pub enum State {
    Idle,
    Backoff,
    WaitTx,
    Tx,
    WaitRx,
    Rx,
    Collision,
}

/// Generic MAC trait, implemented by all MACs
pub trait Mac {
    /// Queue a packet for transmission
    fn enqueue(&mut self, destination: Address, protocol: u16, payload: &[u8])
        -> Result<(), MacError>;

    /// Fire any timer events that are due
    fn tick(&mut self);

    /// Earliest pending timer deadline, for the owning runtime to sleep on
    fn next_deadline(&self) -> Option<Ts>;
}

/// Upward delivery seam. Invoked with the payload and parsed addresses of
/// every newly accepted, non-duplicate received packet.
pub trait Upper {
    fn forward_up(&mut self, payload: &[u8], source: Address, destination: Address);
}

impl<F> Upper for F
where
    F: FnMut(&[u8], Address, Address),
{
    fn forward_up(&mut self, payload: &[u8], source: Address, destination: Address) {
        self(payload, source, destination)
    }
}
