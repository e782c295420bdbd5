//! Dispatcher Tests
//!
//! Poll-cycle behavior over real loopback sockets: accepting, framed
//! reassembly, datagram receipt, failure surfacing and teardown.

use std::io::Write;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use netmux::{Config, NetError, Network, Protocol};

const SERVER: &str = "svc";

/// Start a TCP server on an ephemeral port, returning its bound port
fn start_server(network: &mut Network, protocol: Protocol) -> u16 {
    network.create_server(SERVER, 0, protocol).unwrap();
    network.server_named(SERVER).unwrap().port
}

/// Poll until the predicate holds or a two-second deadline passes
fn poll_until(network: &mut Network, mut done: impl FnMut(&mut Network) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        network.poll();
        if done(network) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

// =============================================================================
// Accept and Framed Receive Tests
// =============================================================================

#[test]
fn test_accept_and_receive_hello_frame() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(&[0, 0, 0, 5]).unwrap();
    client.write_all(b"hello").unwrap();

    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1 && n.server_has_messages(SERVER).unwrap()
    }));

    assert!(network.server_has_new_connection(SERVER).unwrap());
    // Counter resets on read
    assert!(!network.server_has_new_connection(SERVER).unwrap());

    let accepted = network.last_connection(SERVER).unwrap();
    assert_eq!(network.message_count(accepted.as_str()).unwrap(), 1);

    let message = network.read_message(accepted.as_str()).unwrap().unwrap();
    assert_eq!(message.payload(), b"hello");
    assert_eq!(message.connection_name(), Some(accepted.as_str()));
    assert_eq!(message.protocol(), Protocol::Tcp);
    assert!(network.read_message(accepted.as_str()).unwrap().is_none());
}

#[test]
fn test_two_frames_in_one_chunk_arrive_in_order() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    // [0,0,0,1]"a"[0,0,0,1]"b" in a single write
    client.write_all(&[0, 0, 0, 1, b'a', 0, 0, 0, 1, b'b']).unwrap();

    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
            && n.message_count((SERVER, 0)).unwrap_or(0) == 2
    }));

    let first = network.read_message((SERVER, 0)).unwrap().unwrap();
    let second = network.read_message((SERVER, 0)).unwrap().unwrap();
    assert_eq!(first.payload(), b"a");
    assert_eq!(second.payload(), b"b");
}

#[test]
fn test_partial_frame_completes_across_cycles() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(&[0, 0, 0, 5, b'h', b'e']).unwrap();

    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
    }));

    // A few cycles on the partial frame produce nothing
    for _ in 0..5 {
        network.poll();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!network.server_has_messages(SERVER).unwrap());

    client.write_all(b"llo").unwrap();
    assert!(poll_until(&mut network, |n| n.server_has_messages(SERVER).unwrap()));

    let message = network.read_server_message(SERVER).unwrap().unwrap();
    assert_eq!(message.payload(), b"hello");
}

#[test]
fn test_burst_larger_than_one_cycle_arrives_completely() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    // 64 frames of 4 KB: several cycles' worth under the per-cycle read cap
    let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let writer = std::thread::spawn(move || {
        let mut client = client;
        let payload = vec![0x5Au8; 4000];
        for _ in 0..64 {
            client.write_all(&(payload.len() as u32).to_be_bytes()).unwrap();
            client.write_all(&payload).unwrap();
        }
        client
    });

    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
            && n.message_count((SERVER, 0)).unwrap_or(0) == 64
    }));
    let _client = writer.join().unwrap();

    let message = network.read_message((SERVER, 0)).unwrap().unwrap();
    assert_eq!(message.payload().len(), 4000);
}

// =============================================================================
// Failure Surfacing Tests
// =============================================================================

#[test]
fn test_orderly_close_marks_connection_closed() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
    }));
    let accepted = network.last_connection(SERVER).unwrap();

    drop(client);
    assert!(poll_until(&mut network, |n| {
        !n.is_connection_open(accepted.as_str()).unwrap()
    }));

    // Orderly EOF is not a fault; the record stays queryable
    assert_eq!(network.connection_fault(accepted.as_str()).unwrap(), None);
    assert!(network.connection_named(accepted.as_str()).is_ok());
}

#[test]
fn test_oversized_frame_closes_only_that_connection() {
    let config = Config::builder().max_message_size(16).build();
    let mut network = Network::with_config(config);
    let port = start_server(&mut network, Protocol::Tcp);

    let mut bad = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let good = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 2
    }));

    // Find which accepted record belongs to the offending client
    let bad_port = bad.local_addr().unwrap().port();
    let bad_name = format!("127.0.0.1:{bad_port}");

    // Declared length 1000 against a 16-byte cap
    bad.write_all(&1000u32.to_be_bytes()).unwrap();

    assert!(poll_until(&mut network, |n| {
        !n.is_connection_open(bad_name.as_str()).unwrap()
    }));

    let fault = network.connection_fault(bad_name.as_str()).unwrap();
    assert!(fault.unwrap().contains("exceeds maximum"));
    assert!(!network.server_has_messages(SERVER).unwrap());

    // The well-behaved peer is unaffected
    let good_port = good.local_addr().unwrap().port();
    let good_name = format!("127.0.0.1:{good_port}");
    assert!(network.is_connection_open(good_name.as_str()).unwrap());
}

#[test]
fn test_send_to_unread_peer_times_out_and_closes() {
    // A peer that accepts but never reads: flow control keeps the socket
    // unwritable without ever raising a hard error
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = Config::builder().send_timeout_ms(100).build();
    let mut network = Network::with_config(config);
    network
        .open_connection(Some("peer"), "127.0.0.1", port, Protocol::Tcp)
        .unwrap();
    let (_held_open, _) = listener.accept().unwrap();

    // Fill both socket buffers until the deadline trips
    let payload = vec![0u8; 1 << 20];
    let mut outcome = Ok(());
    for _ in 0..16 {
        outcome = network.send_message("peer", payload.as_slice());
        if outcome.is_err() {
            break;
        }
    }

    assert!(matches!(outcome, Err(NetError::Io(_))));
    assert!(!network.is_connection_open("peer").unwrap());
    assert!(network.connection_fault("peer").unwrap().is_some());
}

#[test]
fn test_send_on_closed_connection_is_not_connected() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
    }));
    let accepted = network.last_connection(SERVER).unwrap();

    network.close_server(SERVER).unwrap();

    let result = network.send_message(accepted.as_str(), b"too late");
    assert!(matches!(result, Err(NetError::NotConnected(_))));
}

// =============================================================================
// Teardown Tests
// =============================================================================

#[test]
fn test_close_server_closes_accepted_connections() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let _a = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let _b = TcpStream::connect(("127.0.0.1", port)).unwrap();
    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 2
    }));

    let first = network.connection_name_at(SERVER, 0).unwrap();
    let second = network.connection_name_at(SERVER, 1).unwrap();

    network.close_server(SERVER).unwrap();

    assert!(!network.is_connection_open(first.as_str()).unwrap());
    assert!(!network.is_connection_open(second.as_str()).unwrap());
    assert!(matches!(
        network.server_named(SERVER),
        Err(NetError::NotFound(_))
    ));
}

// =============================================================================
// Round-Trip and Reconnect Tests
// =============================================================================

#[test]
fn test_client_send_and_receive_round_trip() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Tcp);

    let conn = network
        .open_connection(Some("up"), "127.0.0.1", port, Protocol::Tcp)
        .unwrap();
    assert!(poll_until(&mut network, |n| {
        n.connection_count(SERVER).unwrap() == 1
    }));

    network.send_message(conn.as_str(), b"ping").unwrap();
    assert!(poll_until(&mut network, |n| n.server_has_messages(SERVER).unwrap()));

    let request = network.read_server_message(SERVER).unwrap().unwrap();
    assert_eq!(request.payload(), b"ping");

    // Echo back through the accepted record to the client connection
    let accepted = request.connection_name().unwrap().to_string();
    network.send_message(accepted.as_str(), b"pong").unwrap();
    assert!(poll_until(&mut network, |n| n.has_messages("up").unwrap()));

    let reply = network.read_message("up").unwrap().unwrap();
    assert_eq!(reply.payload(), b"pong");
}

#[test]
fn test_reconnect_discards_buffered_state() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut network = Network::new();
    network
        .open_connection(Some("peer"), "127.0.0.1", port, Protocol::Tcp)
        .unwrap();
    let (mut server_side, _) = listener.accept().unwrap();

    // Strand a partial frame in the connection's buffer
    server_side.write_all(&[0, 0, 0, 10, 1, 2, 3]).unwrap();
    for _ in 0..5 {
        network.poll();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!network.has_messages("peer").unwrap());

    network.reconnect("peer").unwrap();
    let (mut server_side, _) = listener.accept().unwrap();

    assert!(network.is_connection_open("peer").unwrap());
    assert!(!network.has_messages("peer").unwrap());

    // A fresh frame parses cleanly: the stale partial bytes are gone
    server_side.write_all(&[0, 0, 0, 2, b'o', b'k']).unwrap();
    assert!(poll_until(&mut network, |n| n.has_messages("peer").unwrap()));
    let message = network.read_message("peer").unwrap().unwrap();
    assert_eq!(message.payload(), b"ok");
}

// =============================================================================
// UDP Tests
// =============================================================================

#[test]
fn test_udp_server_receives_datagram_with_sender_address() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Udp);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let sender_port = sender.local_addr().unwrap().port();
    sender.send_to(b"datagram", ("127.0.0.1", port)).unwrap();

    assert!(poll_until(&mut network, |n| n.server_has_messages(SERVER).unwrap()));

    let message = network.read_server_message(SERVER).unwrap().unwrap();
    assert_eq!(message.payload(), b"datagram");
    assert_eq!(message.protocol(), Protocol::Udp);
    assert_eq!(message.connection_name(), None);
    assert_eq!(message.sender_ip(), Some(2130706433));
    assert_eq!(message.sender_port(), Some(sender_port));
}

#[test]
fn test_udp_datagram_above_advisory_size_arrives_intact() {
    let mut network = Network::new();
    let port = start_server(&mut network, Protocol::Udp);

    // Twice the advisory send size; receive buffers are sized for the
    // transport maximum, so nothing is truncated
    let payload = vec![0xA5u8; 2000];
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&payload, ("127.0.0.1", port)).unwrap();

    assert!(poll_until(&mut network, |n| n.server_has_messages(SERVER).unwrap()));

    let message = network.read_server_message(SERVER).unwrap().unwrap();
    assert_eq!(message.payload().len(), 2000);
    assert_eq!(message.payload(), payload.as_slice());
}

#[test]
fn test_udp_connection_round_trip() {
    let remote = UdpSocket::bind("127.0.0.1:0").unwrap();
    remote.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let remote_port = remote.local_addr().unwrap().port();

    let mut network = Network::new();
    let conn = network
        .open_connection(Some("udp-peer"), "127.0.0.1", remote_port, Protocol::Udp)
        .unwrap();

    // One datagram out, whole payload, no framing
    network.send_message(conn.as_str(), b"ping").unwrap();
    let mut buf = [0u8; 64];
    let (n, peer) = remote.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");

    remote.send_to(b"pong", peer).unwrap();
    assert!(poll_until(&mut network, |n| n.has_messages(conn.as_str()).unwrap()));

    let reply = network.read_message(conn.as_str()).unwrap().unwrap();
    assert_eq!(reply.payload(), b"pong");
    assert_eq!(reply.sender_ip(), Some(2130706433));
    assert_eq!(reply.sender_port(), Some(remote_port));
}
