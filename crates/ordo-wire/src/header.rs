//! The 16-byte frame header and blocking frame I/O.
//!
//! On-wire layout (all big-endian, packed):
//!
//! ```text
//! [sender_id:u64][message_type:u32][payload_size:u32][payload...]
//! ```
//!
//! `payload_size` bytes of opaque record encoding follow. A header whose
//! `message_type` is zero or out of range fails with `InvalidOpcode`; a
//! declared size above [`MAX_PAYLOAD_BYTES`] fails with `OversizedPayload`.

use std::io::{Read, Write};

use ordo_error::{OrdoError, Result};
use ordo_types::encoding::{read_u32_be, read_u64_be};
use ordo_types::{MAX_PAYLOAD_BYTES, OpCode};

/// Header size on the wire.
pub const HEADER_BYTES: usize = 16;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub sender_id: u64,
    pub opcode: OpCode,
    pub payload_size: u32,
}

impl MessageHeader {
    /// Encode this header to its 16-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_BYTES] {
        let mut buf = [0u8; HEADER_BYTES];
        buf[..8].copy_from_slice(&self.sender_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.opcode.to_u32().to_be_bytes());
        buf[12..16].copy_from_slice(&self.payload_size.to_be_bytes());
        buf
    }

    /// Decode a header from its 16-byte wire form.
    ///
    /// # Errors
    /// `InvalidOpcode` for a reserved or out-of-range `message_type`,
    /// `OversizedPayload` for a declared size above the cap.
    pub fn decode(buf: &[u8; HEADER_BYTES]) -> Result<Self> {
        let sender_id = read_u64_be(&buf[..8]).expect("header slice is 16 bytes");
        let raw_opcode = read_u32_be(&buf[8..12]).expect("header slice is 16 bytes");
        let payload_size = read_u32_be(&buf[12..16]).expect("header slice is 16 bytes");

        let opcode =
            OpCode::from_u32(raw_opcode).ok_or(OrdoError::InvalidOpcode { raw: raw_opcode })?;
        if payload_size > MAX_PAYLOAD_BYTES {
            return Err(OrdoError::OversizedPayload {
                size: payload_size,
                max: MAX_PAYLOAD_BYTES,
            });
        }
        Ok(Self {
            sender_id,
            opcode,
            payload_size,
        })
    }
}

/// Read exactly `buf.len()` bytes, reporting how many arrived before EOF.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one complete frame: header, then payload.
///
/// # Errors
/// `ConnectionClosed` on a clean EOF at a frame boundary, `ShortRead` when
/// the peer disappears mid-header or mid-payload, plus header validation
/// errors from [`MessageHeader::decode`].
pub fn read_frame(r: &mut impl Read) -> Result<(MessageHeader, Vec<u8>)> {
    let mut header_buf = [0u8; HEADER_BYTES];
    let got = read_full(r, &mut header_buf)?;
    if got == 0 {
        return Err(OrdoError::ConnectionClosed);
    }
    if got < HEADER_BYTES {
        return Err(OrdoError::ShortRead {
            expected: HEADER_BYTES,
            actual: got,
        });
    }
    let header = MessageHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    let got = read_full(r, &mut payload)?;
    if got < payload.len() {
        return Err(OrdoError::ShortRead {
            expected: payload.len(),
            actual: got,
        });
    }
    Ok((header, payload))
}

/// Write one complete frame as a single buffered write.
///
/// # Errors
/// Propagates socket write failures.
pub fn write_frame(
    w: &mut impl Write,
    sender_id: u64,
    opcode: OpCode,
    payload: &[u8],
) -> Result<()> {
    let payload_size = u32::try_from(payload.len())
        .ok()
        .filter(|&size| size <= MAX_PAYLOAD_BYTES)
        .ok_or(OrdoError::OversizedPayload {
            size: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            max: MAX_PAYLOAD_BYTES,
        })?;
    let header = MessageHeader {
        sender_id,
        opcode,
        payload_size,
    };
    let mut buf = Vec::with_capacity(HEADER_BYTES + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}
