pub mod encoding;

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Maximum payload size accepted on the wire: 16 MiB.
///
/// The header declares `payload_size` as a `u32`, so without a cap a single
/// malformed frame could demand a 4 GiB allocation before the first payload
/// byte arrives.
pub const MAX_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

/// Sentinel raw id meaning "transaction not started" on the client side.
pub const TX_ID_NOT_STARTED: i64 = -1;

/// A transaction identifier issued by the gateway.
///
/// Ids are strictly positive, allocated from a process-wide monotone counter
/// starting at 1, and never reused. The raw value travels on the wire as a
/// signed 64-bit integer; the client-side "not started" sentinel (`-1`) is
/// *not* representable as a `TransactionId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Construct a `TransactionId` if `raw` is in-domain (strictly positive).
    #[inline]
    pub const fn new(raw: i64) -> Option<Self> {
        if raw > 0 { Some(Self(raw)) } else { None }
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide allocator for transaction ids.
///
/// `allocate` is an atomic fetch-add; ids come out dense and strictly
/// increasing. One instance exists per gateway process and is shared by
/// every connection.
#[derive(Debug)]
pub struct TransactionIdAllocator {
    next: AtomicI64,
}

impl TransactionIdAllocator {
    /// Create an allocator whose first issued id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Issue the next id.
    pub fn allocate(&self) -> TransactionId {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        TransactionId(raw)
    }
}

impl Default for TransactionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// RPC opcode carried in the frame header's `message_type` field.
///
/// The numbering is frozen; 0 is reserved and never valid on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Start a new transaction on a fresh worker.
    Begin,
    /// Mark a transaction aborted. Idempotent.
    Abort,
    /// Point read under a transaction.
    Read,
    /// Write (or delete, with an empty value) under a transaction.
    Write,
    /// Prefix scan under a transaction.
    Scan,
    /// Global engine barrier, not bound to any transaction.
    Fence,
    /// Commit-or-abort a transaction and retire its worker.
    End,
}

impl OpCode {
    /// Wire discriminant value.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Begin => 1,
            Self::Abort => 2,
            Self::Read => 3,
            Self::Write => 4,
            Self::Scan => 5,
            Self::Fence => 6,
            Self::End => 7,
        }
    }

    /// Parse a wire discriminant; `None` for 0 (reserved) and out-of-range.
    #[must_use]
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Begin),
            2 => Some(Self::Abort),
            3 => Some(Self::Read),
            4 => Some(Self::Write),
            5 => Some(Self::Scan),
            6 => Some(Self::Fence),
            7 => Some(Self::End),
            _ => None,
        }
    }

    /// Whether requests of this opcode carry a leading `transaction_id`.
    #[must_use]
    pub const fn is_transactional(self) -> bool {
        !matches!(self, Self::Begin | Self::Fence)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Begin => "BEGIN",
            Self::Abort => "ABORT",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Scan => "SCAN",
            Self::Fence => "FENCE",
            Self::End => "END",
        };
        f.write_str(label)
    }
}
