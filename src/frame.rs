//! Single-frame reader.
//!
//! Assembles exactly one MQTT control packet from the transport into the
//! read buffer. Only called after the transport reported the socket
//! readable; once started, the frame either completes or fails. No
//! partial-frame state is carried across calls.

use crate::codec::{self, MAX_LENGTH_BYTES, PacketType};
use crate::error::Error;
use crate::transport::Transport;

/// Wait budget, in transport ticks, for each remaining-length byte.
pub const LENGTH_BYTE_WAIT: u32 = 50;

/// Wait budget, in transport ticks, for the frame body.
pub const BODY_WAIT: u32 = 300;

/// Reads exactly `buf.len()` bytes: drain what is already queued, then
/// alternate bounded waits and reads until the buffer fills. The data may
/// arrive in any number of bursts; a wait that expires with the buffer still
/// short fails with [`Error::Timeout`], and a readable handle that yields no
/// bytes means the peer closed the connection.
fn read_exact<T: Transport>(
    transport: &mut T,
    handle: T::Handle,
    buf: &mut [u8],
    wait: u32,
) -> Result<(), Error> {
    let mut filled = transport
        .receive(handle, buf, 0)
        .map_err(|_| Error::Transport)?;
    while filled < buf.len() {
        let ready = transport
            .wait_readable(&[handle], wait)
            .map_err(|_| Error::Transport)?;
        if ready.is_empty() {
            return Err(Error::Timeout);
        }
        let n = transport
            .receive(handle, &mut buf[filled..], 0)
            .map_err(|_| Error::Transport)?;
        if n == 0 {
            // Readable with nothing to read: the peer closed the connection.
            return Err(Error::Transport);
        }
        filled += n;
    }
    Ok(())
}

/// Reads one complete frame into `readbuf` and returns its packet type and
/// total wire length.
///
/// The fixed-header byte is read in a single attempt. The remaining length
/// is decoded byte-by-byte under [`LENGTH_BYTE_WAIT`] and then re-encoded
/// into `readbuf` right after the header byte, so codec decoders see the
/// original wire layout. A body longer than `readbuf` fails with
/// [`Error::Overflow`] rather than leaving a partial frame queued.
pub fn read_one_frame<T: Transport>(
    transport: &mut T,
    handle: T::Handle,
    readbuf: &mut [u8],
) -> Result<(PacketType, usize), Error> {
    let mut header = [0u8; 1];
    let n = transport
        .receive(handle, &mut header, 0)
        .map_err(|_| Error::Transport)?;
    if n != 1 {
        return Err(Error::Transport);
    }
    let packet_type = PacketType::from_header(header[0])?;
    *readbuf.first_mut().ok_or(Error::Overflow)? = header[0];

    let mut remaining: u32 = 0;
    let mut multiplier: u32 = 1;
    for i in 0.. {
        if i >= MAX_LENGTH_BYTES {
            return Err(Error::Protocol);
        }
        let mut byte = [0u8; 1];
        read_exact(transport, handle, &mut byte, LENGTH_BYTE_WAIT)?;
        remaining += u32::from(byte[0] & 0x7F) * multiplier;
        multiplier *= 128;
        if byte[0] & 0x80 == 0 {
            break;
        }
    }

    let len_bytes = codec::encode_remaining_length(
        remaining,
        readbuf.get_mut(1..).ok_or(Error::Overflow)?,
    )?;
    let offset = 1 + len_bytes;

    let remaining = remaining as usize;
    if remaining > 0 {
        let body = readbuf
            .get_mut(offset..offset + remaining)
            .ok_or(Error::Overflow)?;
        read_exact(transport, handle, body, BODY_WAIT)?;
    }

    Ok((packet_type, offset + remaining))
}
