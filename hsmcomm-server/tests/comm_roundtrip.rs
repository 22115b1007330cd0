//! Client and server state machines talking over the memory transport.

use hsmcomm_client::{ClientConfig, ClientState, CommClient};
use hsmcomm_protocol::{
    native_magic, translate32, CommError, DATA_LEN, MAGIC_NATIVE, MAGIC_SWAP, NOTIFY_SEQ,
};
use hsmcomm_server::{CommServer, ServerConfig, ServerState};
use hsmcomm_transport::{channel, MemConfig, MemTransport};
use proptest::prelude::*;

fn pair(client_id: u16) -> (CommClient<MemTransport>, CommServer<MemTransport>) {
    let (client_end, server_end) = channel();
    let mut server = CommServer::new(server_end);
    server
        .init(&ServerConfig::new(MemConfig::default(), 20))
        .unwrap();
    let mut client = CommClient::new(client_end);
    client
        .init(&ClientConfig::new(MemConfig::default(), client_id))
        .unwrap();
    (client, server)
}

#[test]
fn test_ping_pong() {
    let (mut client, mut server) = pair(1);

    let seq = client.send_request(MAGIC_NATIVE, 0x10, b"PING").unwrap();
    assert_eq!(seq, 1);
    assert_eq!(client.state(), ClientState::AwaitingResponse { seq: 1 });

    let request = server.recv_request().unwrap();
    assert_eq!(request.magic(), MAGIC_NATIVE);
    assert_eq!(request.kind(), 0x10);
    assert_eq!(request.seq(), 1);
    assert_eq!(request.aux(), 1);
    assert_eq!(request.size(), 4);
    assert_eq!(request.payload, b"PING");

    server
        .send_response(MAGIC_NATIVE, 0x10, 1, 0, b"PONG")
        .unwrap();
    assert_eq!(server.state(), ServerState::Idle);

    let response = client.recv_response().unwrap();
    assert_eq!(response.magic(), MAGIC_NATIVE);
    assert_eq!(response.kind(), 0x10);
    assert_eq!(response.seq(), 1);
    assert_eq!(response.aux(), 0);
    assert_eq!(response.payload, b"PONG");
    assert_eq!(client.state(), ClientState::Idle);
}

#[test]
fn test_foreign_order_payload() {
    let (mut client, mut server) = pair(1);

    // A peer of the opposite byte order writes its native value, which
    // arrives here reversed; the magic tells the receiver to swap it back.
    let value: u32 = 0x1234_5678;
    let wire = value.swap_bytes().to_ne_bytes();
    client.send_request(MAGIC_SWAP, 0x0A01, &wire).unwrap();

    let request = server.recv_request().unwrap();
    assert_eq!(request.magic(), MAGIC_SWAP);
    let p = request.payload;
    let raw = u32::from_ne_bytes([p[0], p[1], p[2], p[3]]);
    assert_eq!(translate32(request.magic(), raw), value);
}

#[test]
fn test_foreign_order_response() {
    let (mut client, mut server) = pair(1);

    let seq = client.send_request(MAGIC_NATIVE, 0x10, b"PING").unwrap();
    let request = server.recv_request().unwrap();
    let (kind, request_seq) = (request.kind(), request.seq());

    let value: u32 = 0xCAFE_F00D;
    server
        .send_response(MAGIC_SWAP, kind, request_seq, 0, &value.swap_bytes().to_ne_bytes())
        .unwrap();

    // Header fields are compared raw, so the swapped magic does not affect
    // matching the response to its request.
    let response = client.recv_response().unwrap();
    assert_eq!(response.magic(), MAGIC_SWAP);
    assert_eq!(response.kind(), 0x10);
    assert_eq!(response.seq(), seq);
    let p = response.payload;
    let raw = u32::from_ne_bytes([p[0], p[1], p[2], p[3]]);
    assert_eq!(translate32(response.magic(), raw), value);
    assert_eq!(client.state(), ClientState::Idle);
}

#[test]
fn test_sequence_numbers_advance() {
    let (mut client, mut server) = pair(2);

    for expected in 1..=5u16 {
        let seq = client.send_request(MAGIC_NATIVE, 0x0104, &[]).unwrap();
        assert_eq!(seq, expected);

        let seq = server.recv_request().unwrap().seq();
        server.send_response(MAGIC_NATIVE, 0x0104, seq, 0, &[]).unwrap();
        assert_eq!(client.recv_response().unwrap().seq(), expected);
    }
    assert_eq!(client.last_request_id(), 5);
    assert_eq!(server.last_request_id(), 5);
}

#[test]
fn test_no_data_on_either_side() {
    let (mut client, mut server) = pair(1);
    assert!(matches!(server.recv_request(), Err(CommError::NoData)));
    assert!(matches!(client.recv_response(), Err(CommError::NoData)));
    assert_eq!(client.state(), ClientState::Idle);
    assert_eq!(server.state(), ServerState::Idle);
}

#[test]
fn test_one_request_outstanding() {
    let (mut client, mut server) = pair(1);

    client.send_request(MAGIC_NATIVE, 0x10, b"first").unwrap();
    assert!(matches!(
        client.send_request(MAGIC_NATIVE, 0x10, b"second"),
        Err(CommError::ProtocolViolation(_))
    ));

    let request = server.recv_request().unwrap();
    assert_eq!(request.payload, b"first");
}

#[test]
fn test_notification_does_not_complete_request() {
    let (mut client, mut server) = pair(1);

    let seq = client.send_request(MAGIC_NATIVE, 0x10, &[]).unwrap();
    server.recv_request().unwrap();
    server
        .send_response(MAGIC_NATIVE, 0x0102, NOTIFY_SEQ, 0, &[])
        .unwrap();

    assert_eq!(client.recv_response().unwrap().seq(), NOTIFY_SEQ);
    assert_eq!(client.state(), ClientState::AwaitingResponse { seq });

    server.send_response(MAGIC_NATIVE, 0x10, seq, 0, &[]).unwrap();
    assert_eq!(client.recv_response().unwrap().seq(), seq);
    assert_eq!(client.state(), ClientState::Idle);
}

#[test]
fn test_version_mismatch_rejected_on_send() {
    let (mut client, _server) = pair(1);
    let result = client.send_request(native_magic(0x02), 0x10, &[]);
    assert!(matches!(result, Err(CommError::ProtocolMismatch { .. })));
    assert_eq!(client.state(), ClientState::Idle);
}

#[test]
fn test_client_cleanup_seen_by_server() {
    let (mut client, mut server) = pair(1);
    client.cleanup().unwrap();

    let err = server.recv_request().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(server.state(), ServerState::Disconnected);

    server.cleanup().unwrap();
    server
        .init(&ServerConfig::new(MemConfig::default(), 20))
        .unwrap();
    client
        .init(&ClientConfig::new(MemConfig::default(), 1))
        .unwrap();

    client.send_request(MAGIC_NATIVE, 0x10, b"again").unwrap();
    assert_eq!(server.recv_request().unwrap().payload, b"again");
}

proptest! {
    #[test]
    fn prop_payload_survives_round_trip(data in prop::collection::vec(any::<u8>(), 0..=DATA_LEN)) {
        let (mut client, mut server) = pair(3);

        let seq = client.send_request(MAGIC_NATIVE, 0x0A02, &data).unwrap();
        let request = server.recv_request().unwrap();
        prop_assert_eq!(request.payload, &data[..]);
        let echoed = request.payload.to_vec();

        server.send_response(MAGIC_NATIVE, 0x0A02, seq, 0, &echoed).unwrap();
        let response = client.recv_response().unwrap();
        prop_assert_eq!(response.size(), data.len());
        prop_assert_eq!(response.payload, &data[..]);
    }
}
