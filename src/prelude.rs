//! Crate prelude, re-exports the types needed to instantiate and drive
//! the MAC

pub use crate::error::MacError;
pub use crate::frame::{Address, Frame, FrameKind};
pub use crate::mac::config::Config;
pub use crate::mac::csma::Csma;
pub use crate::mac::{Mac, State, Upper};
pub use crate::phy::Phy;
pub use crate::timer::Timer;
pub use crate::Ts;
