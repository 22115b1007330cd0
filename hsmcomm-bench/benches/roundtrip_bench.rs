//! Request/response round trips over the memory transport.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hsmcomm_client::{ClientConfig, CommClient};
use hsmcomm_protocol::{CommAction, DATA_LEN, MAGIC_NATIVE};
use hsmcomm_server::{CommServer, Server, ServerConfig, Unsupported};
use hsmcomm_transport::{channel, MemConfig, MemTransport};

fn state_machines() -> (CommClient<MemTransport>, CommServer<MemTransport>) {
    let (client_end, server_end) = channel();
    let mut server = CommServer::new(server_end);
    server
        .init(&ServerConfig::new(MemConfig::default(), 1))
        .unwrap();
    let mut client = CommClient::new(client_end);
    client
        .init(&ClientConfig::new(MemConfig::default(), 1))
        .unwrap();
    (client, server)
}

fn bench_comm_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("comm_roundtrip");

    for size in [0, 256, DATA_LEN] {
        let payload = vec![0xA5u8; size];
        let (mut client, mut server) = state_machines();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let seq = client.send_request(MAGIC_NATIVE, 0x0A01, payload).unwrap();
                let kind = server.recv_request().unwrap().kind();
                server
                    .send_response(MAGIC_NATIVE, kind, seq, 0, payload)
                    .unwrap();
                black_box(client.recv_response().unwrap().size());
            });
        });
    }

    group.finish();
}

fn bench_dispatch_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_echo");

    for size in [0, 256, DATA_LEN] {
        let payload = vec![0x5Au8; size];
        let (client_end, server_end) = channel();
        let mut server = Server::new(server_end, Unsupported);
        server
            .init(&ServerConfig::new(MemConfig::default(), 1))
            .unwrap();
        let mut client = CommClient::new(client_end);
        client
            .init(&ClientConfig::new(MemConfig::default(), 1))
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                client
                    .send_request(MAGIC_NATIVE, CommAction::Echo.kind(), payload)
                    .unwrap();
                server.handle_request_message().unwrap();
                black_box(client.recv_response().unwrap().size());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_comm_roundtrip, bench_dispatch_echo);
criterion_main!(benches);
