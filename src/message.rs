//! Message types shared between the codec, dispatch table and bridge.

use crate::error::Error;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Converts a wire-level QoS value, rejecting the reserved value 3.
    pub fn from_wire(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::Protocol),
        }
    }
}

/// An inbound PUBLISH delivered to message handlers.
///
/// The payload is a borrowed view into the engine's read buffer and is only
/// valid for the duration of one dispatch call. A handler that needs the data
/// afterwards must copy it out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InboundMessage<'a> {
    /// Delivery guarantee the broker used for this message.
    pub qos: QoS,
    /// Whether this is a retained message replayed on subscription.
    pub retained: bool,
    /// Whether the broker marked this delivery as a duplicate.
    pub dup: bool,
    /// Packet identifier; 0 for QoS 0 messages, which carry none.
    pub packet_id: u16,
    /// The message payload, borrowed from the read buffer.
    pub payload: &'a [u8],
}
