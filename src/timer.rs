//! MAC timer API

/// Timer trait provides mechanisms for accessing monotonic times
/// to assist with protocol implementations.
///
/// All methods are monotonic and relative to the same unknown epoch
pub trait Timer {
    /// Returns the number of microsecond ticks since some unknown epoch
    fn ticks_us(&self) -> u64;

    /// Returns the number of millisecond ticks since some unknown epoch
    fn ticks_ms(&self) -> u64 {
        self.ticks_us() / 1000
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    /// Mock timer implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockTimer(Arc<Mutex<u64>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(0)))
        }

        pub fn set_us(&mut self, val: u64) {
            *self.0.lock().unwrap() = val;
        }

        pub fn advance_us(&mut self, delta: u64) {
            let mut v = self.0.lock().unwrap();
            *v += delta;
        }

        pub fn val(&self) -> u64 {
            *self.0.lock().unwrap()
        }
    }

    impl super::Timer for MockTimer {
        fn ticks_us(&self) -> u64 {
            *self.0.lock().unwrap()
        }
    }
}
