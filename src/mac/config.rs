//! CSMA/CA MAC configuration

use crate::Ts;

/// Static configuration for a CSMA/CA MAC instance.
///
/// Interframe spacings and the slot time are in microseconds; rates are
/// in bits per second. Control frames go out at the basic rate, data
/// frames at the data rate.
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    /// Contention slot time in microseconds
    pub slot_time_us: Ts,

    /// Short interframe space in microseconds
    pub sifs_us: Ts,

    /// Distributed interframe space in microseconds
    pub difs_us: Ts,

    /// Minimum contention window in slots. A value of zero is treated
    /// as one slot when drawing a backoff
    pub cw_min: u16,

    /// Maximum contention window in slots
    pub cw_max: u16,

    /// Retries before an un-CTS'd RTS drops the packet
    pub rts_retry_limit: u16,

    /// Retries before an un-ACK'd DATA drops the packet
    pub data_retry_limit: u16,

    /// Maximum number of queued outbound packets
    pub queue_limit: usize,

    /// Reserve the channel with RTS/CTS before unicast data
    pub rts_enabled: bool,

    /// Rate for control frames in bits per second
    pub basic_rate_bps: u32,

    /// Rate for data frames in bits per second
    pub data_rate_bps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slot_time_us: 20,
            sifs_us: 10,
            // DIFS = SIFS + 2 slots
            difs_us: 50,
            cw_min: 16,
            cw_max: 1024,
            rts_retry_limit: 7,
            data_retry_limit: 7,
            queue_limit: 16,
            rts_enabled: true,
            basic_rate_bps: 125_000,
            data_rate_bps: 250_000,
        }
    }
}
