//! Built-in MQTT 3.1.1 packet serializer/deserializer.

use super::{Codec, Connack, ConnectOptions, PacketType, Suback};
use super::{decode_remaining_length, encode_remaining_length};
use crate::error::Error;
use crate::message::{InboundMessage, QoS};

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

const CLEAN_SESSION_FLAG: u8 = 0x02;
const SUBACK_FAILURE: u8 = 0x80;

/// The default [`Codec`] implementation for MQTT 3.1.1.
#[derive(Debug, Default, Clone, Copy)]
pub struct V311Codec;

/// Bounds-checked sequential writer over a packet buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self, value: u8) -> Result<(), Error> {
        *self.buf.get_mut(self.pos).ok_or(Error::Overflow)? = value;
        self.pos += 1;
        Ok(())
    }

    fn u16(&mut self, value: u16) -> Result<(), Error> {
        self.bytes(&value.to_be_bytes())
    }

    fn bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        let end = self.pos + data.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(Error::Overflow)?
            .copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    /// Writes a UTF-8 string with its 2-byte length prefix.
    fn utf8(&mut self, value: &str) -> Result<(), Error> {
        let bytes = value.as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| Error::Protocol)?;
        self.u16(len)?;
        self.bytes(bytes)
    }
}

/// Writes the fixed header and returns the offset where the body starts.
fn fixed_header(header_byte: u8, remaining: usize, buf: &mut [u8]) -> Result<usize, Error> {
    let remaining = u32::try_from(remaining).map_err(|_| Error::Protocol)?;
    *buf.first_mut().ok_or(Error::Overflow)? = header_byte;
    let len_bytes = encode_remaining_length(remaining, buf.get_mut(1..).ok_or(Error::Overflow)?)?;
    Ok(1 + len_bytes)
}

/// Splits a wire frame into its packet type and body (past the re-encoded
/// remaining length), validating that the body length matches.
fn split_frame(frame: &[u8]) -> Result<(PacketType, &[u8]), Error> {
    let header = *frame.first().ok_or(Error::Protocol)?;
    let packet_type = PacketType::from_header(header)?;
    let (remaining, consumed) = decode_remaining_length(frame.get(1..).ok_or(Error::Protocol)?)?;
    let body = frame.get(1 + consumed..).ok_or(Error::Protocol)?;
    if body.len() != remaining as usize {
        return Err(Error::Protocol);
    }
    Ok((packet_type, body))
}

fn read_u16(body: &[u8], at: usize) -> Result<u16, Error> {
    let bytes = body.get(at..at + 2).ok_or(Error::Protocol)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

impl Codec for V311Codec {
    fn encode_connect(&self, options: &ConnectOptions<'_>, buf: &mut [u8]) -> Result<usize, Error> {
        let mut connect_flags = 0;
        if options.clean_session {
            connect_flags |= CLEAN_SESSION_FLAG;
        }

        // Variable header: protocol name, level, flags, keep-alive.
        let remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + options.client_id.len();
        let offset = fixed_header((PacketType::Connect as u8) << 4, remaining, buf)?;

        let mut w = Writer::new(buf.get_mut(offset..).ok_or(Error::Overflow)?);
        w.u16(PROTOCOL_NAME.len() as u16)?;
        w.bytes(PROTOCOL_NAME)?;
        w.u8(PROTOCOL_LEVEL)?;
        w.u8(connect_flags)?;
        w.u16(options.keep_alive_seconds)?;
        w.utf8(options.client_id)?;
        Ok(offset + w.pos)
    }

    fn encode_subscribe(
        &self,
        packet_id: u16,
        filter: &str,
        qos: QoS,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let remaining = 2 + 2 + filter.len() + 1;
        // SUBSCRIBE requires the reserved flag bits 0b0010.
        let offset = fixed_header((PacketType::Subscribe as u8) << 4 | 0x02, remaining, buf)?;

        let mut w = Writer::new(buf.get_mut(offset..).ok_or(Error::Overflow)?);
        w.u16(packet_id)?;
        w.utf8(filter)?;
        w.u8(qos as u8)?;
        Ok(offset + w.pos)
    }

    fn encode_publish(
        &self,
        dup: bool,
        qos: QoS,
        retained: bool,
        packet_id: u16,
        topic: &str,
        payload: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let mut header_byte = (PacketType::Publish as u8) << 4 | (qos as u8) << 1;
        if dup {
            header_byte |= 0x08;
        }
        if retained {
            header_byte |= 0x01;
        }

        let id_len = if qos == QoS::AtMostOnce { 0 } else { 2 };
        let remaining = 2 + topic.len() + id_len + payload.len();
        let offset = fixed_header(header_byte, remaining, buf)?;

        let mut w = Writer::new(buf.get_mut(offset..).ok_or(Error::Overflow)?);
        w.utf8(topic)?;
        if qos != QoS::AtMostOnce {
            w.u16(packet_id)?;
        }
        w.bytes(payload)?;
        Ok(offset + w.pos)
    }

    fn encode_ack(
        &self,
        packet_type: PacketType,
        packet_id: u16,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        // PUBREL carries the reserved flag bits 0b0010, the others none.
        let flags = if packet_type == PacketType::Pubrel { 0x02 } else { 0 };
        let offset = fixed_header((packet_type as u8) << 4 | flags, 2, buf)?;
        let mut w = Writer::new(buf.get_mut(offset..).ok_or(Error::Overflow)?);
        w.u16(packet_id)?;
        Ok(offset + w.pos)
    }

    fn encode_pingreq(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let offset = fixed_header((PacketType::Pingreq as u8) << 4, 0, buf)?;
        Ok(offset)
    }

    fn encode_disconnect(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let offset = fixed_header((PacketType::Disconnect as u8) << 4, 0, buf)?;
        Ok(offset)
    }

    fn decode_connack(&self, frame: &[u8]) -> Result<Connack, Error> {
        let (packet_type, body) = split_frame(frame)?;
        if packet_type != PacketType::Connack || body.len() != 2 {
            return Err(Error::Protocol);
        }
        match body[1] {
            0 => Ok(Connack {
                session_present: body[0] & 0x01 != 0,
            }),
            1..=5 => Err(Error::ConnectionRefused),
            _ => Err(Error::Protocol),
        }
    }

    fn decode_suback(&self, frame: &[u8]) -> Result<Suback, Error> {
        let (packet_type, body) = split_frame(frame)?;
        if packet_type != PacketType::Suback || body.len() < 3 {
            return Err(Error::Protocol);
        }
        let packet_id = read_u16(body, 0)?;
        let granted = body[2];
        if granted == SUBACK_FAILURE {
            return Err(Error::SubscriptionRejected);
        }
        Ok(Suback {
            packet_id,
            granted_qos: QoS::from_wire(granted)?,
        })
    }

    fn decode_publish<'a>(
        &self,
        frame: &'a [u8],
    ) -> Result<(&'a str, InboundMessage<'a>), Error> {
        let header = *frame.first().ok_or(Error::Protocol)?;
        let (packet_type, body) = split_frame(frame)?;
        if packet_type != PacketType::Publish {
            return Err(Error::Protocol);
        }

        let dup = header & 0x08 != 0;
        let qos = QoS::from_wire((header >> 1) & 0x03)?;
        let retained = header & 0x01 != 0;

        let topic_len = read_u16(body, 0)? as usize;
        let topic_bytes = body.get(2..2 + topic_len).ok_or(Error::Protocol)?;
        let topic = core::str::from_utf8(topic_bytes).map_err(|_| Error::Protocol)?;

        let mut at = 2 + topic_len;
        let packet_id = if qos == QoS::AtMostOnce {
            0
        } else {
            let id = read_u16(body, at)?;
            at += 2;
            id
        };
        let payload = body.get(at..).ok_or(Error::Protocol)?;

        Ok((
            topic,
            InboundMessage {
                qos,
                retained,
                dup,
                packet_id,
                payload,
            },
        ))
    }

    fn decode_ack(&self, frame: &[u8]) -> Result<(PacketType, u16), Error> {
        let (packet_type, body) = split_frame(frame)?;
        let packet_id = read_u16(body, 0)?;
        Ok((packet_type, packet_id))
    }
}
