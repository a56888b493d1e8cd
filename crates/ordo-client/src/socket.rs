//! Blocking RPC socket to the gateway.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};

use ordo_error::{OrdoError, Result};
use ordo_types::{OpCode, TransactionId};
use ordo_wire::records::{
    AbortRequest, AbortResponse, BeginRequest, BeginResponse, EndRequest, EndResponse,
    FenceRequest, FenceResponse, ReadRequest, ReadResponse, ScanRequest, ScanResponse,
    WriteRequest, WriteResponse,
};
use ordo_wire::{read_frame, write_frame};
use tracing::{debug, warn};

/// Sender id stamped on every request frame.
const SENDER_ID: u64 = 1;

/// Reject a zero-byte body for opcodes whose success responses always carry
/// at least one field.
///
/// The gateway answers an unknown transaction id or a malformed request
/// with empty bytes. Letting that decode as a defaulted message would read
/// as `is_aborted: false`, and the proxy would keep driving a transaction
/// the gateway has already discarded; surfacing it as a decode failure puts
/// it on the assume-aborted path instead.
fn require_body(opcode: OpCode, response: Vec<u8>) -> Result<Vec<u8>> {
    if response.is_empty() {
        return Err(OrdoError::DecodeResponse {
            detail: format!("empty {opcode} response body"),
        });
    }
    Ok(response)
}

/// One synchronous connection to the gateway.
///
/// Every RPC is a lockstep exchange: header + payload out in one write,
/// then block for the response header and payload. Any I/O failure latches
/// the connection dead; later calls fail fast with `NotConnected` until an
/// explicit [`GatewayClient::reconnect`].
#[derive(Debug)]
pub struct GatewayClient {
    host: Ipv4Addr,
    port: u16,
    stream: Option<TcpStream>,
}

impl GatewayClient {
    /// Connect to `host:port` over IPv4 TCP.
    pub fn connect(host: Ipv4Addr, port: u16) -> Result<Self> {
        let mut client = Self {
            host,
            port,
            stream: None,
        };
        client.reconnect()?;
        Ok(client)
    }

    /// Re-establish the connection. The only reconnect path; RPCs never
    /// retry on their own.
    pub fn reconnect(&mut self) -> Result<()> {
        let addr = SocketAddr::from((self.host, self.port));
        self.stream = Some(TcpStream::connect(addr)?);
        debug!(%addr, "connected to gateway");
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one request and block for its response payload.
    fn send_request(&mut self, opcode: OpCode, payload: &[u8]) -> Result<Vec<u8>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(OrdoError::NotConnected);
        };
        let exchange = write_frame(stream, SENDER_ID, opcode, payload)
            .and_then(|()| read_frame(stream));
        match exchange {
            Ok((_header, response)) => Ok(response),
            Err(e) => {
                // Half a frame may be on the wire; the stream is unusable.
                warn!(%opcode, error = %e, "rpc failed; marking connection dead");
                self.stream = None;
                Err(e)
            }
        }
    }

    /// BEGIN: start a transaction, returning its id.
    pub fn tx_begin(&mut self) -> Result<TransactionId> {
        let response = self.send_request(OpCode::Begin, &BeginRequest.encode())?;
        let begin = BeginResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })?;
        TransactionId::new(begin.transaction_id).ok_or(OrdoError::InvalidTransactionId {
            raw: begin.transaction_id,
        })
    }

    /// ABORT: idempotent server-side abort mark.
    pub fn tx_abort(&mut self, tx_id: TransactionId) -> Result<()> {
        let response = self.send_request(
            OpCode::Abort,
            &AbortRequest {
                transaction_id: tx_id.get(),
            }
            .encode(),
        )?;
        AbortResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })?;
        Ok(())
    }

    /// READ one key.
    pub fn tx_read(&mut self, tx_id: TransactionId, key: &[u8]) -> Result<ReadResponse> {
        let response = self.send_request(
            OpCode::Read,
            &ReadRequest {
                transaction_id: tx_id.get(),
                key: key.to_vec(),
            }
            .encode(),
        )?;
        let response = require_body(OpCode::Read, response)?;
        ReadResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })
    }

    /// WRITE one key (empty value deletes).
    pub fn tx_write(
        &mut self,
        tx_id: TransactionId,
        key: &[u8],
        value: &[u8],
    ) -> Result<WriteResponse> {
        let response = self.send_request(
            OpCode::Write,
            &WriteRequest {
                transaction_id: tx_id.get(),
                key: key.to_vec(),
                value: value.to_vec(),
            }
            .encode(),
        )?;
        let response = require_body(OpCode::Write, response)?;
        WriteResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })
    }

    /// SCAN keys under `db_table_key ++ first_key_part`.
    pub fn tx_scan(
        &mut self,
        tx_id: TransactionId,
        db_table_key: &[u8],
        first_key_part: &[u8],
    ) -> Result<ScanResponse> {
        let response = self.send_request(
            OpCode::Scan,
            &ScanRequest {
                transaction_id: tx_id.get(),
                db_table_key: db_table_key.to_vec(),
                first_key_part: first_key_part.to_vec(),
            }
            .encode(),
        )?;
        let response = require_body(OpCode::Scan, response)?;
        ScanResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })
    }

    /// END: commit-or-abort; `is_aborted` is the inverse of "committed".
    pub fn db_end(&mut self, tx_id: TransactionId, fence: bool) -> Result<EndResponse> {
        let response = self.send_request(
            OpCode::End,
            &EndRequest {
                transaction_id: tx_id.get(),
                fence,
            }
            .encode(),
        )?;
        let response = require_body(OpCode::End, response)?;
        EndResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })
    }

    /// FENCE: global engine barrier.
    pub fn db_fence(&mut self) -> Result<()> {
        let response = self.send_request(OpCode::Fence, &FenceRequest.encode())?;
        FenceResponse::decode(&response).map_err(|e| OrdoError::DecodeResponse {
            detail: e.to_string(),
        })?;
        Ok(())
    }
}
