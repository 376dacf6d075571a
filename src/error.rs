//! Common error type for the session engine.

/// Errors produced by the engine, codec and producer-side operations.
///
/// Every failure on the engine side (`Transport`, `Protocol`, `Timeout`,
/// `ConnectionRefused`, `SubscriptionRejected`, and `Overflow` during a send)
/// routes the session through the reconnect path; none of them terminate the
/// engine. `NotConnected` and `Overflow` on the producer path are returned
/// synchronously to the caller and have no effect on engine state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// Transport connect, send, receive or name-resolution failure.
    Transport,
    /// Malformed or oversized remaining length, unexpected packet type, or a
    /// deserialize failure.
    Protocol,
    /// A bounded wait for CONNACK, SUBACK or PINGRESP elapsed.
    Timeout,
    /// The broker refused the CONNECT request.
    ConnectionRefused,
    /// The broker rejected a subscription (SUBACK granted QoS 0x80).
    SubscriptionRejected,
    /// A publish or command was submitted while the session is offline.
    NotConnected,
    /// Data does not fit the fixed buffer capacity.
    Overflow,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Transport => defmt::write!(f, "Transport"),
            Error::Protocol => defmt::write!(f, "Protocol"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::SubscriptionRejected => defmt::write!(f, "SubscriptionRejected"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Overflow => defmt::write!(f, "Overflow"),
        }
    }
}
