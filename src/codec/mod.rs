//! MQTT 3.1.1 wire format seam.
//!
//! The engine talks to the wire through the [`Codec`] trait so the bit-level
//! packet format stays replaceable; [`v311::V311Codec`] is the built-in
//! implementation. The remaining-length helpers live here because the frame
//! reader needs them independently of any codec implementation.

use crate::error::Error;
use crate::message::{InboundMessage, QoS};

pub mod v311;

pub use v311::V311Codec;

/// Largest value representable by the remaining-length encoding (2^28 - 1).
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

/// Maximum number of remaining-length bytes in a fixed header.
pub const MAX_LENGTH_BYTES: usize = 4;

/// MQTT 3.1.1 control packet types, as carried in the fixed header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[allow(missing_docs)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Extracts the packet type from a fixed-header byte.
    pub fn from_header(byte: u8) -> Result<Self, Error> {
        match byte >> 4 {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(Error::Protocol),
        }
    }
}

/// Fields of a decoded CONNACK packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Connack {
    /// Whether the broker resumed a previous session.
    pub session_present: bool,
}

/// Fields of a decoded SUBACK packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Suback {
    /// Packet identifier echoed from the SUBSCRIBE.
    pub packet_id: u16,
    /// QoS level the broker granted.
    pub granted_qos: QoS,
}

/// Connection parameters serialized into a CONNECT packet.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    /// The client identifier, unique within the broker.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds.
    pub keep_alive_seconds: u16,
    /// Whether to discard previous session state.
    pub clean_session: bool,
}

/// Serializer/deserializer for MQTT 3.1.1 control packets.
///
/// Encoders write one complete packet (fixed header included) into `buf` and
/// return the encoded length, or [`Error::Overflow`] when it does not fit.
/// Decoders receive the complete wire frame as read off the socket: fixed
/// header byte, re-encoded remaining length, then the body.
pub trait Codec {
    /// Encodes a CONNECT packet.
    fn encode_connect(&self, options: &ConnectOptions<'_>, buf: &mut [u8]) -> Result<usize, Error>;

    /// Encodes a SUBSCRIBE packet with a single topic filter.
    fn encode_subscribe(
        &self,
        packet_id: u16,
        filter: &str,
        qos: QoS,
        buf: &mut [u8],
    ) -> Result<usize, Error>;

    /// Encodes a PUBLISH packet.
    #[allow(clippy::too_many_arguments)]
    fn encode_publish(
        &self,
        dup: bool,
        qos: QoS,
        retained: bool,
        packet_id: u16,
        topic: &str,
        payload: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, Error>;

    /// Encodes a PUBACK, PUBREC, PUBREL or PUBCOMP packet.
    fn encode_ack(
        &self,
        packet_type: PacketType,
        packet_id: u16,
        buf: &mut [u8],
    ) -> Result<usize, Error>;

    /// Encodes a PINGREQ packet.
    fn encode_pingreq(&self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Encodes a DISCONNECT packet.
    fn encode_disconnect(&self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Decodes a CONNACK frame. Broker refusal maps to
    /// [`Error::ConnectionRefused`].
    fn decode_connack(&self, frame: &[u8]) -> Result<Connack, Error>;

    /// Decodes a SUBACK frame. A granted QoS of `0x80` maps to
    /// [`Error::SubscriptionRejected`].
    fn decode_suback(&self, frame: &[u8]) -> Result<Suback, Error>;

    /// Decodes a PUBLISH frame into the topic name and a borrowed message.
    fn decode_publish<'a>(&self, frame: &'a [u8])
    -> Result<(&'a str, InboundMessage<'a>), Error>;

    /// Decodes a PUBACK/PUBREC/PUBREL/PUBCOMP frame into its type and id.
    fn decode_ack(&self, frame: &[u8]) -> Result<(PacketType, u16), Error>;
}

/// Encodes `value` with the MQTT variable-length scheme into `buf`,
/// returning the number of bytes written.
///
/// Each output byte carries 7 data bits; the MSB flags a continuation.
pub fn encode_remaining_length(mut value: u32, buf: &mut [u8]) -> Result<usize, Error> {
    if value > MAX_REMAINING_LENGTH {
        return Err(Error::Protocol);
    }
    let mut written = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        *buf.get_mut(written).ok_or(Error::Overflow)? = byte;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Decodes a remaining-length field from the start of `bytes`, returning the
/// value and the number of bytes consumed.
///
/// A continuation flag on the fourth byte is malformed and rejected.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(u32, usize), Error> {
    let mut value: u32 = 0;
    let mut multiplier: u32 = 1;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_LENGTH_BYTES {
            return Err(Error::Protocol);
        }
        value += u32::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        multiplier *= 128;
    }
    Err(Error::Protocol)
}
