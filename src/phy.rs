//! Physical-layer interface.
//!
//! The MAC holds a narrow handle to the transmission device: a channel
//! idle query, a transmit admission call, and airtime computation for a
//! frame at the configured rates. Completion of transmissions and
//! receptions is signalled back into the MAC by the surrounding runtime
//! through its notification entry points.

use crate::Ts;

/// Physical transmission device as seen by the MAC
pub trait Phy {
    /// Returns true while no carrier is sensed on the medium
    fn is_idle(&mut self) -> bool;

    /// Start transmitting a frame.
    ///
    /// Returns the admission result: true means the transmission was
    /// started and a completion notification will follow.
    fn transmit(&mut self, frame: &[u8]) -> bool;

    /// Time on air for a frame with `ctrl_len` bytes sent at the basic
    /// rate and `data_len` bytes sent at the data rate, in microseconds
    fn tx_duration_us(
        &self,
        ctrl_len: usize,
        data_len: usize,
        basic_rate_bps: u32,
        data_rate_bps: u32,
    ) -> Ts;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::Phy;
    use crate::Ts;

    #[derive(Debug)]
    struct Inner {
        idle: bool,
        admit: bool,
        sent: Vec<Vec<u8>>,
    }

    /// Mock physical device recording transmitted frames
    #[derive(Clone, Debug)]
    pub struct MockPhy(Arc<Mutex<Inner>>);

    impl MockPhy {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner {
                idle: true,
                admit: true,
                sent: Vec::new(),
            })))
        }

        /// Set the carrier-sense result returned to the MAC
        pub fn set_idle(&mut self, idle: bool) {
            self.0.lock().unwrap().idle = idle;
        }

        /// Set the admission result for subsequent transmit calls
        pub fn set_admit(&mut self, admit: bool) {
            self.0.lock().unwrap().admit = admit;
        }

        /// Number of frames admitted so far
        pub fn sent_count(&self) -> usize {
            self.0.lock().unwrap().sent.len()
        }

        /// Copy of the n-th admitted frame
        pub fn sent(&self, n: usize) -> Vec<u8> {
            self.0.lock().unwrap().sent[n].clone()
        }

        /// Copy of the most recently admitted frame
        pub fn last_sent(&self) -> Option<Vec<u8>> {
            self.0.lock().unwrap().sent.last().cloned()
        }
    }

    impl Phy for MockPhy {
        fn is_idle(&mut self) -> bool {
            self.0.lock().unwrap().idle
        }

        fn transmit(&mut self, frame: &[u8]) -> bool {
            let mut inner = self.0.lock().unwrap();
            if inner.admit {
                inner.sent.push(frame.to_vec());
            }
            inner.admit
        }

        fn tx_duration_us(
            &self,
            ctrl_len: usize,
            data_len: usize,
            basic_rate_bps: u32,
            data_rate_bps: u32,
        ) -> Ts {
            let ctrl = (ctrl_len as u64 * 8).saturating_mul(1_000_000) / basic_rate_bps as u64;
            let data = (data_len as u64 * 8).saturating_mul(1_000_000) / data_rate_bps as u64;
            ctrl + data
        }
    }
}
