use thiserror::Error;

/// Primary error type for gateway operations.
///
/// Structured variants for the cases callers branch on; framing errors
/// terminate a connection's message loop, everything else is surfaced to the
/// peer inside a response payload.
#[derive(Error, Debug)]
pub enum OrdoError {
    // === Framing errors ===
    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the socket mid-header or mid-payload.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Header `message_type` is zero or outside the enumerated range.
    #[error("invalid opcode {raw}")]
    InvalidOpcode { raw: u32 },

    /// Header declares a payload larger than the accepted bound.
    #[error("payload of {size} bytes exceeds cap of {max}")]
    OversizedPayload { size: u32, max: u32 },

    // === Connection state ===
    /// A request was issued on a client whose socket is dead.
    #[error("not connected to the gateway")]
    NotConnected,

    /// The peer closed the connection cleanly.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A response payload failed to decode. The client treats this as
    /// "assume aborted" rather than trusting defaulted fields.
    #[error("response payload did not decode: {detail}")]
    DecodeResponse { detail: String },

    // === Server-side state ===
    /// The socket address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// No live transaction is registered under the given id.
    #[error("no transaction registered for id {tx_id}")]
    TransactionNotFound { tx_id: i64 },

    /// A wire id failed the strictly-positive domain check.
    #[error("transaction id {raw} out of domain")]
    InvalidTransactionId { raw: i64 },

    // === Client-side proxy state ===
    /// A data operation was issued before a table was chosen.
    #[error("no table chosen for this transaction")]
    TableNotChosen,

    /// `begin` was called on a proxy that already holds a transaction.
    #[error("transaction already started (id {tx_id})")]
    AlreadyStarted { tx_id: i64 },
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, OrdoError>;

#[cfg(test)]
mod tests {
    use super::OrdoError;

    #[test]
    fn display_formats() {
        let e = OrdoError::ShortRead {
            expected: 16,
            actual: 3,
        };
        assert_eq!(e.to_string(), "short read: expected 16 bytes, got 3");

        let e = OrdoError::InvalidOpcode { raw: 0 };
        assert_eq!(e.to_string(), "invalid opcode 0");

        let e = OrdoError::OversizedPayload {
            size: 20_000_000,
            max: 16_777_216,
        };
        assert_eq!(
            e.to_string(),
            "payload of 20000000 bytes exceeds cap of 16777216"
        );
    }

    #[test]
    fn io_error_converts() {
        fn short_circuit() -> super::Result<()> {
            let broken: std::io::Result<()> =
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
            broken?;
            Ok(())
        }
        assert!(matches!(short_circuit(), Err(OrdoError::Io(_))));
    }
}
