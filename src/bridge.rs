//! Cross-context publish bridge.
//!
//! Only the engine context may touch the socket. Producer contexts marshal
//! outbound publishes (and control commands) into self-contained envelopes
//! and push them across a bounded channel (a loopback datagram socket, a
//! pipe, or an in-memory queue) abstracted by [`PublishBridge`]. The engine
//! multiplexes the bridge endpoint alongside the broker socket and drains
//! one envelope per readiness event.
//!
//! # Envelope layout
//!
//! ```text
//! [ fixed header                                        ]
//! [ qos | retained | dup | pad | packet id | payload len | topic len ]
//! [  1  |    1     |  1  |  1  |   2 (BE)  |    4 (BE)   |   2 (BE)  ]
//! [ payload bytes ][ topic bytes ][ NUL ]
//! ```
//!
//! An envelope shorter than the fixed header is a control command and is
//! compared as a NUL-terminated string; `"DISCONNECT"` is the only command
//! the engine recognizes.

use crate::error::Error;
use crate::message::QoS;
use crate::transport::Transport;

/// Size of the fixed envelope header.
pub const ENVELOPE_HEADER_LEN: usize = 12;

/// The control command requesting a clean terminal shutdown.
pub const DISCONNECT_COMMAND: &str = "DISCONNECT";

/// A decoded publish envelope, borrowing payload and topic from the
/// envelope bytes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Envelope<'a> {
    /// Requested delivery guarantee.
    pub qos: QoS,
    /// Whether the broker should retain the message.
    pub retained: bool,
    /// Duplicate-delivery flag, normally clear for fresh publishes.
    pub dup: bool,
    /// Packet identifier; 0 lets the engine assign one for QoS > 0.
    pub packet_id: u16,
    /// Message payload.
    pub payload: &'a [u8],
    /// Topic name to publish to.
    pub topic: &'a str,
}

/// Producer-side envelope channel endpoint.
///
/// `send_local` must transfer the envelope atomically: envelopes from
/// concurrent producers may interleave with each other, but never within one
/// envelope. Datagram and pipe primitives give this by construction.
pub trait BridgeSender {
    /// Submits one opaque envelope to the engine context.
    fn send_local(&self, envelope: &[u8]) -> Result<(), Error>;
}

/// Engine-side bridge endpoint, multiplexable with the broker socket.
///
/// Both a loopback datagram socket and a pipe fit this trait: the engine
/// waits on [`handle`], then reads
/// exactly one envelope from it through the transport.
///
/// [`handle`]: PublishBridge::handle
pub trait PublishBridge<T: Transport> {
    /// The producer endpoint type handed out to other contexts.
    type Sender: BridgeSender;

    /// The transport handle the engine includes in its multiplexed wait.
    fn handle(&self) -> T::Handle;

    /// Creates a producer endpoint. May be called any number of times.
    fn sender(&self) -> Self::Sender;
}

/// Encodes a publish envelope into `buf`, returning its length.
pub fn encode_envelope(
    qos: QoS,
    retained: bool,
    dup: bool,
    packet_id: u16,
    topic: &str,
    payload: &[u8],
    buf: &mut [u8],
) -> Result<usize, Error> {
    let topic_len = u16::try_from(topic.len()).map_err(|_| Error::Overflow)?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| Error::Overflow)?;
    let total = ENVELOPE_HEADER_LEN + payload.len() + topic.len() + 1;
    if buf.len() < total {
        return Err(Error::Overflow);
    }

    buf[0] = qos as u8;
    buf[1] = u8::from(retained);
    buf[2] = u8::from(dup);
    buf[3] = 0;
    buf[4..6].copy_from_slice(&packet_id.to_be_bytes());
    buf[6..10].copy_from_slice(&payload_len.to_be_bytes());
    buf[10..12].copy_from_slice(&topic_len.to_be_bytes());

    let payload_end = ENVELOPE_HEADER_LEN + payload.len();
    buf[ENVELOPE_HEADER_LEN..payload_end].copy_from_slice(payload);
    buf[payload_end..payload_end + topic.len()].copy_from_slice(topic.as_bytes());
    buf[total - 1] = 0;
    Ok(total)
}

/// Decodes a publish envelope previously produced by [`encode_envelope`].
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope<'_>, Error> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return Err(Error::Protocol);
    }
    let qos = QoS::from_wire(bytes[0])?;
    let retained = bytes[1] != 0;
    let dup = bytes[2] != 0;
    let packet_id = u16::from_be_bytes([bytes[4], bytes[5]]);
    let payload_len =
        u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let topic_len = u16::from_be_bytes([bytes[10], bytes[11]]) as usize;

    let expected = ENVELOPE_HEADER_LEN + payload_len + topic_len + 1;
    if bytes.len() != expected || bytes[expected - 1] != 0 {
        return Err(Error::Protocol);
    }

    let payload_end = ENVELOPE_HEADER_LEN + payload_len;
    let payload = &bytes[ENVELOPE_HEADER_LEN..payload_end];
    let topic = core::str::from_utf8(&bytes[payload_end..payload_end + topic_len])
        .map_err(|_| Error::Protocol)?;

    Ok(Envelope {
        qos,
        retained,
        dup,
        packet_id,
        payload,
        topic,
    })
}

/// Whether `bytes` is a control command rather than a publish envelope.
pub fn is_command(bytes: &[u8]) -> bool {
    bytes.len() < ENVELOPE_HEADER_LEN
}

/// Extracts the command string from a NUL-terminated control envelope.
pub fn command(bytes: &[u8]) -> Option<&str> {
    let (terminator, body) = bytes.split_last()?;
    if *terminator != 0 {
        return None;
    }
    core::str::from_utf8(body).ok()
}
