//! MAC error types

/// Basic MAC errors
#[derive(Debug, Clone, PartialEq)]
pub enum MacError {
    /// Egress queue at configured capacity, packet not enqueued
    QueueFull,

    /// Payload longer than a single frame can carry
    PayloadTooLarge,
}
