//! Wire protocol for the Ordo transaction gateway.
//!
//! Framing is a fixed 16-byte big-endian header followed by an opaque
//! payload; payload records are little-endian with length-delimited byte
//! strings. No magic number, no version byte, no checksum.

pub mod header;
pub mod records;

pub use header::{HEADER_BYTES, MessageHeader, read_frame, write_frame};
pub use records::{
    AbortRequest, AbortResponse, BeginRequest, BeginResponse, DecodeError, EndRequest, EndResponse,
    FenceRequest, FenceResponse, KeyValue, ReadRequest, ReadResponse, ScanRequest, ScanResponse,
    WriteRequest, WriteResponse, peek_transaction_id,
};
