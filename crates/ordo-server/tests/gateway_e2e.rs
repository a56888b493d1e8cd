//! End-to-end gateway tests over real TCP, speaking raw frames.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use ordo_server::{DatabaseHolder, GatewayServer, ServerConfig};
use ordo_types::OpCode;
use ordo_wire::records::{
    AbortRequest, BeginResponse, EndRequest, EndResponse, ReadRequest, ReadResponse, ScanRequest,
    ScanResponse, WriteRequest, WriteResponse,
};
use ordo_wire::{read_frame, write_frame};

/// Bind an ephemeral port, run the accept loop on a detached thread, and
/// hand back the address to dial.
fn start_server() -> SocketAddr {
    let config = ServerConfig {
        host: Ipv4Addr::LOCALHOST,
        port: 0,
    };
    let holder = DatabaseHolder::new();
    let server = GatewayServer::bind(&config, &holder, None).expect("bind ephemeral port");
    let addr = server.local_addr().expect("local addr");
    std::thread::spawn(move || server.run());
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).expect("connect to gateway")
}

/// One lockstep RPC: request frame out, response frame in.
fn send_rpc(stream: &mut TcpStream, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    write_frame(stream, 1, opcode, payload).expect("write request");
    let (header, response) = read_frame(stream).expect("read response");
    assert_eq!(header.opcode, opcode, "response echoes the request opcode");
    response
}

fn begin(stream: &mut TcpStream) -> i64 {
    let resp = send_rpc(stream, OpCode::Begin, &[]);
    let tx = BeginResponse::decode(&resp).expect("begin response").transaction_id;
    assert!(tx >= 1);
    tx
}

fn write(stream: &mut TcpStream, tx: i64, key: &[u8], value: &[u8]) -> WriteResponse {
    let resp = send_rpc(
        stream,
        OpCode::Write,
        &WriteRequest {
            transaction_id: tx,
            key: key.to_vec(),
            value: value.to_vec(),
        }
        .encode(),
    );
    WriteResponse::decode(&resp).expect("write response")
}

fn read(stream: &mut TcpStream, tx: i64, key: &[u8]) -> ReadResponse {
    let resp = send_rpc(
        stream,
        OpCode::Read,
        &ReadRequest {
            transaction_id: tx,
            key: key.to_vec(),
        }
        .encode(),
    );
    ReadResponse::decode(&resp).expect("read response")
}

fn end(stream: &mut TcpStream, tx: i64, fence: bool) -> EndResponse {
    let resp = send_rpc(
        stream,
        OpCode::End,
        &EndRequest {
            transaction_id: tx,
            fence,
        }
        .encode(),
    );
    EndResponse::decode(&resp).expect("end response")
}

#[test]
fn read_your_write() {
    let addr = start_server();
    let mut conn = connect(addr);

    let tx = begin(&mut conn);
    assert_eq!(tx, 1);

    let w = write(&mut conn, tx, b"t/a", b"1");
    assert!(w.success);
    assert!(!w.is_aborted);

    let r = read(&mut conn, tx, b"t/a");
    assert!(r.found);
    assert_eq!(r.value.as_deref(), Some(&b"1"[..]));
    assert!(!r.is_aborted);

    let e = end(&mut conn, tx, false);
    assert!(!e.is_aborted);
}

#[test]
fn prefix_scan() {
    let addr = start_server();
    let mut conn = connect(addr);

    let tx = begin(&mut conn);
    for (k, v) in [(&b"t/a1"[..], &b"x"[..]), (b"t/a2", b"y"), (b"t/b1", b"z")] {
        assert!(write(&mut conn, tx, k, v).success);
    }

    let resp = send_rpc(
        &mut conn,
        OpCode::Scan,
        &ScanRequest {
            transaction_id: tx,
            db_table_key: b"t/".to_vec(),
            first_key_part: b"a".to_vec(),
        }
        .encode(),
    );
    let scan = ScanResponse::decode(&resp).expect("scan response");
    let got: Vec<(&[u8], &[u8])> = scan
        .key_values
        .iter()
        .map(|kv| (kv.key.as_slice(), kv.value.as_slice()))
        .collect();
    assert_eq!(got, vec![(&b"a1"[..], &b"x"[..]), (&b"a2"[..], &b"y"[..])]);

    assert!(!end(&mut conn, tx, false).is_aborted);
}

#[test]
fn abort_surfaces_on_the_losing_connection() {
    let addr = start_server();
    let mut winner_conn = connect(addr);
    let mut loser_conn = connect(addr);

    // Seed the contested key.
    let setup = begin(&mut winner_conn);
    assert!(write(&mut winner_conn, setup, b"t/k", b"0").success);
    assert!(!end(&mut winner_conn, setup, false).is_aborted);

    // The loser reads the key, then the winner commits over it.
    let loser = begin(&mut loser_conn);
    let r = read(&mut loser_conn, loser, b"t/k");
    assert!(r.found);
    assert!(!r.is_aborted);

    let winner = begin(&mut winner_conn);
    assert!(write(&mut winner_conn, winner, b"t/k", b"1").success);
    assert!(!end(&mut winner_conn, winner, false).is_aborted);

    // The loser's next data-plane response reports the abort, and END
    // confirms it.
    let w = write(&mut loser_conn, loser, b"t/k", b"2");
    assert!(w.is_aborted);
    assert!(end(&mut loser_conn, loser, false).is_aborted);
}

#[test]
fn delete_via_empty_write() {
    let addr = start_server();
    let mut conn = connect(addr);

    let tx = begin(&mut conn);
    assert!(write(&mut conn, tx, b"k", b"v").success);
    assert!(write(&mut conn, tx, b"k", b"").success);
    let r = read(&mut conn, tx, b"k");
    assert!(!r.found);
    assert!(r.value.is_none());
    assert!(!end(&mut conn, tx, false).is_aborted);
}

#[test]
fn fence_on_end_publishes_to_later_transactions() {
    let addr = start_server();
    let mut conn = connect(addr);

    let tx1 = begin(&mut conn);
    assert!(write(&mut conn, tx1, b"t/f", b"1").success);
    assert!(!end(&mut conn, tx1, true).is_aborted);

    let tx2 = begin(&mut conn);
    let r = read(&mut conn, tx2, b"t/f");
    assert_eq!(r.value.as_deref(), Some(&b"1"[..]));
    assert!(!end(&mut conn, tx2, false).is_aborted);
}

#[test]
fn standalone_fence_and_abort_are_accepted() {
    let addr = start_server();
    let mut conn = connect(addr);

    // FENCE has no transaction and an empty response.
    let resp = send_rpc(&mut conn, OpCode::Fence, &[]);
    assert!(resp.is_empty());

    // Repeated ABORT of a live transaction stays idempotent over the wire.
    let tx = begin(&mut conn);
    for _ in 0..2 {
        let resp = send_rpc(
            &mut conn,
            OpCode::Abort,
            &AbortRequest { transaction_id: tx }.encode(),
        );
        assert!(resp.is_empty());
    }
    assert!(end(&mut conn, tx, false).is_aborted);
}

#[test]
fn invalid_opcode_terminates_the_connection() {
    let addr = start_server();
    let mut conn = connect(addr);

    // Hand-build a header with reserved message_type 0.
    let mut frame = Vec::new();
    frame.extend_from_slice(&1u64.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    use std::io::Write as _;
    conn.write_all(&frame).expect("write bogus frame");

    // The server drops the connection instead of answering.
    assert!(read_frame(&mut conn).is_err());
}

#[test]
fn disconnect_mid_transaction_leaves_the_server_healthy() {
    let addr = start_server();

    {
        let mut doomed = connect(addr);
        let tx = begin(&mut doomed);
        assert!(write(&mut doomed, tx, b"t/zombie", b"v").success);
        // Drop the connection mid-transaction; teardown aborts the worker.
    }

    // A fresh connection still works and the abandoned write never
    // became visible.
    std::thread::sleep(Duration::from_millis(50));
    let mut conn = connect(addr);
    let tx = begin(&mut conn);
    let r = read(&mut conn, tx, b"t/zombie");
    assert!(!r.found);
    assert!(write(&mut conn, tx, b"t/alive", b"1").success);
    assert!(!end(&mut conn, tx, false).is_aborted);
}

#[test]
fn connections_make_progress_concurrently() {
    let addr = start_server();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));

    let mut handles = Vec::new();
    for side in 0..2u8 {
        let barrier = std::sync::Arc::clone(&barrier);
        handles.push(std::thread::spawn(move || {
            let mut conn = connect(addr);
            barrier.wait();
            let mut ids = Vec::new();
            for i in 0..100u32 {
                let tx = begin(&mut conn);
                ids.push(tx);
                let key = format!("t/{side}/{i}");
                assert!(write(&mut conn, tx, key.as_bytes(), b"1").success);
                assert!(!end(&mut conn, tx, false).is_aborted);
            }
            ids
        }));
    }

    let mut all_ids = Vec::new();
    for h in handles {
        all_ids.extend(h.join().expect("connection thread"));
    }
    all_ids.sort_unstable();
    let before = all_ids.len();
    all_ids.dedup();
    assert_eq!(before, all_ids.len(), "transaction ids must be unique");
    assert_eq!(before, 200);
}
