//! Fixed-width integer append/read helpers for wire encoding.
//!
//! Frame headers are big-endian (network order); payload records are
//! little-endian. Readers return `None` on short input instead of panicking
//! so callers can surface a structured decode error.

/// Append a `u16` in big-endian order.
pub fn append_u16_be(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append a `u32` in big-endian order.
pub fn append_u32_be(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append a `u64` in big-endian order.
pub fn append_u64_be(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append a `u32` in little-endian order.
pub fn append_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a `u64` in little-endian order.
pub fn append_u64_le(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Read a big-endian `u16` from the front of `src`.
#[must_use]
pub fn read_u16_be(src: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = src.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Read a big-endian `u32` from the front of `src`.
#[must_use]
pub fn read_u32_be(src: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = src.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Read a big-endian `u64` from the front of `src`.
#[must_use]
pub fn read_u64_be(src: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = src.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Read a little-endian `u32` from the front of `src`.
#[must_use]
pub fn read_u32_le(src: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = src.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read a little-endian `u64` from the front of `src`.
#[must_use]
pub fn read_u64_le(src: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = src.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_be() {
        let mut buf = Vec::new();
        append_u16_be(&mut buf, 0xBEEF);
        append_u32_be(&mut buf, 0xDEAD_BEEF);
        append_u64_be(&mut buf, 0x0123_4567_89AB_CDEF);
        assert_eq!(read_u16_be(&buf), Some(0xBEEF));
        assert_eq!(read_u32_be(&buf[2..]), Some(0xDEAD_BEEF));
        assert_eq!(read_u64_be(&buf[6..]), Some(0x0123_4567_89AB_CDEF));
    }

    #[test]
    fn round_trip_le() {
        let mut buf = Vec::new();
        append_u32_le(&mut buf, 7);
        append_u64_le(&mut buf, u64::MAX);
        assert_eq!(read_u32_le(&buf), Some(7));
        assert_eq!(read_u64_le(&buf[4..]), Some(u64::MAX));
    }

    #[test]
    fn short_input_reads_none() {
        assert_eq!(read_u16_be(&[1]), None);
        assert_eq!(read_u32_be(&[1, 2, 3]), None);
        assert_eq!(read_u64_be(&[0; 7]), None);
        assert_eq!(read_u32_le(&[]), None);
        assert_eq!(read_u64_le(&[0; 7]), None);
    }

    #[test]
    fn network_order_on_the_wire() {
        let mut buf = Vec::new();
        append_u32_be(&mut buf, 1);
        assert_eq!(buf, [0, 0, 0, 1]);
        buf.clear();
        append_u32_le(&mut buf, 1);
        assert_eq!(buf, [1, 0, 0, 0]);
    }
}
