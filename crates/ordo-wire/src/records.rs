//! RPC payload records, one request/response pair per opcode.
//!
//! All integers are little-endian. Byte strings are `u32` length followed by
//! raw bytes. `bool` is one byte (zero = false, nonzero = true). The optional
//! READ value carries an explicit has-bit byte before the byte string.
//! Signed transaction ids travel as two's-complement `u64`.
//!
//! Decoding an **empty** buffer yields the defaulted record (all fields
//! zero/false/empty); a decoding peer that received an empty error response
//! therefore observes `found = false` / `success = false`. A non-empty buffer
//! must parse exactly: short fields and trailing bytes are errors.

use std::fmt;

use ordo_types::encoding::{append_u32_le, append_u64_le, read_u32_le, read_u64_le};

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Errors from payload record decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended inside the named field.
    Truncated { field: &'static str },
    /// Bytes left over after the last field.
    TrailingBytes { extra: usize },
    /// A declared byte-string length exceeds the remaining buffer.
    LengthOverrun { field: &'static str, declared: u32 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { field } => write!(f, "payload truncated in field '{field}'"),
            Self::TrailingBytes { extra } => {
                write!(f, "{extra} trailing bytes after last field")
            }
            Self::LengthOverrun { field, declared } => {
                write!(f, "field '{field}' declares {declared} bytes past end of payload")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// Cursor helpers
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    fn take_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        let b = *self
            .src
            .get(self.pos)
            .ok_or(DecodeError::Truncated { field })?;
        self.pos += 1;
        Ok(b)
    }

    fn take_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        Ok(self.take_u8(field)? != 0)
    }

    fn take_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let v = read_u32_le(&self.src[self.pos..]).ok_or(DecodeError::Truncated { field })?;
        self.pos += 4;
        Ok(v)
    }

    fn take_i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        let v = read_u64_le(&self.src[self.pos..]).ok_or(DecodeError::Truncated { field })?;
        self.pos += 8;
        Ok(v as i64)
    }

    fn take_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.take_u32(field)?;
        let end = self
            .pos
            .checked_add(len as usize)
            .filter(|&e| e <= self.src.len())
            .ok_or(DecodeError::LengthOverrun {
                field,
                declared: len,
            })?;
        let bytes = self.src[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn finish(self) -> Result<(), DecodeError> {
        let extra = self.src.len() - self.pos;
        if extra != 0 {
            return Err(DecodeError::TrailingBytes { extra });
        }
        Ok(())
    }
}

fn append_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

fn append_i64(buf: &mut Vec<u8>, v: i64) {
    append_u64_le(buf, v as u64);
}

fn append_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    append_u32_le(buf, b.len() as u32);
    buf.extend_from_slice(b);
}

/// Recover the leading `transaction_id` from a transactional request payload
/// without a full decode. `None` when the payload is shorter than the field.
#[must_use]
pub fn peek_transaction_id(payload: &[u8]) -> Option<i64> {
    read_u64_le(payload).map(|v| v as i64)
}

// ---------------------------------------------------------------------------
// BEGIN (opcode 1)
// ---------------------------------------------------------------------------

/// BEGIN request: no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginRequest;

impl BeginRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        Cursor::new(src).finish()?;
        Ok(Self)
    }
}

/// BEGIN response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginResponse {
    pub transaction_id: i64,
}

impl BeginResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        append_i64(&mut buf, self.transaction_id);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        cur.finish()?;
        Ok(Self { transaction_id })
    }
}

// ---------------------------------------------------------------------------
// ABORT (opcode 2)
// ---------------------------------------------------------------------------

/// ABORT request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortRequest {
    pub transaction_id: i64,
}

impl AbortRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        append_i64(&mut buf, self.transaction_id);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        cur.finish()?;
        Ok(Self { transaction_id })
    }
}

/// ABORT response: no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortResponse;

impl AbortResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        Cursor::new(src).finish()?;
        Ok(Self)
    }
}

// ---------------------------------------------------------------------------
// READ (opcode 3)
// ---------------------------------------------------------------------------

/// READ request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadRequest {
    pub transaction_id: i64,
    pub key: Vec<u8>,
}

impl ReadRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.key.len());
        append_i64(&mut buf, self.transaction_id);
        append_bytes(&mut buf, &self.key);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        let key = cur.take_bytes("key")?;
        cur.finish()?;
        Ok(Self {
            transaction_id,
            key,
        })
    }
}

/// READ response. `value` presence rides an explicit has-bit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResponse {
    pub found: bool,
    pub value: Option<Vec<u8>>,
    pub is_aborted: bool,
}

impl ReadResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(7 + self.value.as_ref().map_or(0, Vec::len));
        append_bool(&mut buf, self.found);
        match &self.value {
            Some(v) => {
                append_bool(&mut buf, true);
                append_bytes(&mut buf, v);
            }
            None => append_bool(&mut buf, false),
        }
        append_bool(&mut buf, self.is_aborted);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let found = cur.take_bool("found")?;
        let has_value = cur.take_bool("has_value")?;
        let value = if has_value {
            Some(cur.take_bytes("value")?)
        } else {
            None
        };
        let is_aborted = cur.take_bool("is_aborted")?;
        cur.finish()?;
        Ok(Self {
            found,
            value,
            is_aborted,
        })
    }
}

// ---------------------------------------------------------------------------
// WRITE (opcode 4)
// ---------------------------------------------------------------------------

/// WRITE request. An empty `value` is a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteRequest {
    pub transaction_id: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl WriteRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.key.len() + self.value.len());
        append_i64(&mut buf, self.transaction_id);
        append_bytes(&mut buf, &self.key);
        append_bytes(&mut buf, &self.value);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        let key = cur.take_bytes("key")?;
        let value = cur.take_bytes("value")?;
        cur.finish()?;
        Ok(Self {
            transaction_id,
            key,
            value,
        })
    }
}

/// WRITE response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResponse {
    pub success: bool,
    pub is_aborted: bool,
}

impl WriteResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2);
        append_bool(&mut buf, self.success);
        append_bool(&mut buf, self.is_aborted);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let success = cur.take_bool("success")?;
        let is_aborted = cur.take_bool("is_aborted")?;
        cur.finish()?;
        Ok(Self {
            success,
            is_aborted,
        })
    }
}

// ---------------------------------------------------------------------------
// SCAN (opcode 5)
// ---------------------------------------------------------------------------

/// SCAN request. The server composes `db_table_key ++ first_key_part` into
/// the scan start bound and strips `db_table_key` from every returned key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub transaction_id: i64,
    pub db_table_key: Vec<u8>,
    pub first_key_part: Vec<u8>,
}

impl ScanRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(16 + self.db_table_key.len() + self.first_key_part.len());
        append_i64(&mut buf, self.transaction_id);
        append_bytes(&mut buf, &self.db_table_key);
        append_bytes(&mut buf, &self.first_key_part);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        let db_table_key = cur.take_bytes("db_table_key")?;
        let first_key_part = cur.take_bytes("first_key_part")?;
        cur.finish()?;
        Ok(Self {
            transaction_id,
            db_table_key,
            first_key_part,
        })
    }
}

/// One key/value pair in a SCAN response. Keys are table-prefix-stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// SCAN response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResponse {
    pub key_values: Vec<KeyValue>,
    pub is_aborted: bool,
}

impl ScanResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        append_u32_le(&mut buf, self.key_values.len() as u32);
        for kv in &self.key_values {
            append_bytes(&mut buf, &kv.key);
            append_bytes(&mut buf, &kv.value);
        }
        append_bool(&mut buf, self.is_aborted);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let count = cur.take_u32("key_values.count")?;
        let mut key_values = Vec::new();
        for _ in 0..count {
            let key = cur.take_bytes("key_values.key")?;
            let value = cur.take_bytes("key_values.value")?;
            key_values.push(KeyValue { key, value });
        }
        let is_aborted = cur.take_bool("is_aborted")?;
        cur.finish()?;
        Ok(Self {
            key_values,
            is_aborted,
        })
    }
}

// ---------------------------------------------------------------------------
// FENCE (opcode 6)
// ---------------------------------------------------------------------------

/// FENCE request: no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceRequest;

impl FenceRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        Cursor::new(src).finish()?;
        Ok(Self)
    }
}

/// FENCE response: no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceResponse;

impl FenceResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        Cursor::new(src).finish()?;
        Ok(Self)
    }
}

// ---------------------------------------------------------------------------
// END (opcode 7)
// ---------------------------------------------------------------------------

/// END request. `fence` asks the server to run a global barrier after the
/// commit decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndRequest {
    pub transaction_id: i64,
    pub fence: bool,
}

impl EndRequest {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        append_i64(&mut buf, self.transaction_id);
        append_bool(&mut buf, self.fence);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let transaction_id = cur.take_i64("transaction_id")?;
        let fence = cur.take_bool("fence")?;
        cur.finish()?;
        Ok(Self {
            transaction_id,
            fence,
        })
    }
}

/// END response. `is_aborted` is the inverse of "committed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndResponse {
    pub is_aborted: bool,
}

impl EndResponse {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1);
        append_bool(&mut buf, self.is_aborted);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        if src.is_empty() {
            return Ok(Self::default());
        }
        let mut cur = Cursor::new(src);
        let is_aborted = cur.take_bool("is_aborted")?;
        cur.finish()?;
        Ok(Self { is_aborted })
    }
}
