//! Tests for close reasons:
//! * Heartbeat timeout
//! * Transport close
//! * Packet parsing and handshake errors
//! * Outbound queue overflow
//! * Local close, peer disconnect and server shutdown
mod utils;

use std::time::Duration;

use fixture::{connect, raw_peer, recv, test_config};
use sockwire::{
    Channel, ChannelState, Client, CloseReason, DisconnectReason, ON_DISCONNECTION,
    ProtocolVersion, SendError, Server, packet::PacketData,
};
use tokio::sync::mpsc;

fn attach_handler(server: &Server) -> mpsc::Receiver<CloseReason> {
    let (tx, rx) = mpsc::channel(4);
    assert_ok!(server.on(ON_DISCONNECTION, move |_: Channel, reason: CloseReason| {
        tx.try_send(reason).unwrap();
    }));
    rx
}

#[tokio::test]
pub async fn heartbeat_timeout() {
    let server = Server::new(
        test_config()
            .ping_interval(Duration::from_millis(50))
            .ping_timeout(Duration::from_millis(50))
            .build(),
    );
    let mut rx = attach_handler(&server);
    let (channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    assert!(matches!(peer.recv_packet().await, PacketData::Ping));

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::HeartbeatTimeout));
    assert_eq!(reason.code, 108);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
pub async fn answered_pings_keep_the_channel_open() {
    let server = Server::new(
        test_config()
            .ping_interval(Duration::from_millis(30))
            .ping_timeout(Duration::from_millis(50))
            .build(),
    );
    let (channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    for _ in 0..5 {
        assert!(matches!(peer.recv_packet().await, PacketData::Ping));
        peer.send("3").await;
    }
    assert!(channel.is_alive());
}

#[tokio::test]
pub async fn transport_close() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (_channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    drop(peer);

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::TransportClose));
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
pub async fn engine_close_packet() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (_channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    peer.send("1").await;

    assert!(recv(&mut rx).await.is(DisconnectReason::TransportClose));
}

#[tokio::test]
pub async fn packet_parsing() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    peer.send("42[\"foo\"").await;

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::PacketParsingError));
    assert_eq!(reason.code, 102);
    assert_eq!(assert_some!(channel.close_reason()), reason);
    peer.until_closed().await;
}

#[tokio::test]
pub async fn unknown_frame_class() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (_channel, mut peer) = raw_peer(&server, ProtocolVersion::V3, 64);
    peer.handshake().await;
    peer.send("9").await;

    assert!(recv(&mut rx).await.is(DisconnectReason::PacketParsingError));
}

#[tokio::test]
pub async fn handshake_from_client_is_rejected() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (_channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    peer.send("0{\"sid\":\"x\",\"upgrades\":[],\"pingInterval\":1,\"pingTimeout\":1}")
        .await;

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::HandshakeError));
    assert_eq!(reason.code, 103);
}

#[tokio::test]
pub async fn queue_overflow() {
    let server = Server::new(test_config().max_buffer_size(4).build());
    let mut rx = attach_handler(&server);
    // The peer never reads, so at most one frame leaves the queue
    let (channel, _peer) = raw_peer(&server, ProtocolVersion::V4, 1);

    let mut res = Ok(());
    for i in 0..100 {
        res = channel.emit("flood", &(i,));
        if res.is_err() {
            break;
        }
    }
    assert!(matches!(res, Err(SendError::QueueOverflow)));

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::QueueOverflow));
    assert_eq!(reason.code, 104);
    assert!(matches!(channel.emit("flood", &()), Err(SendError::Closed)));
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
pub async fn high_watermark_degrades_then_recovers() {
    let server = Server::new(test_config().max_buffer_size(10).high_watermark(3).build());
    let (channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    // open and connect packets are queued
    assert!(!channel.is_degraded());
    assert_ok!(channel.emit("a", &()));
    assert!(channel.is_degraded());
    assert!(channel.is_alive());

    peer.handshake().await;
    assert!(matches!(peer.recv_packet().await, PacketData::Event(..)));
    assert!(!channel.is_degraded());
}

#[tokio::test]
pub async fn local_close() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (channel, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    peer.handshake().await;
    channel.close();
    channel.close();

    let reason = recv(&mut rx).await;
    assert!(reason.is(DisconnectReason::ClosedLocally));
    assert_eq!(reason.code, 100);
    peer.until_closed().await;
    // A second close does not fire the handler again
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
pub async fn graceful_disconnect() {
    let server = Server::new(test_config().build());
    let mut server_rx = attach_handler(&server);
    let client = Client::new(test_config().build());
    let (client_tx, mut client_rx) = mpsc::channel(1);
    assert_ok!(client.on(ON_DISCONNECTION, move |_: Channel, reason: CloseReason| {
        client_tx.try_send(reason).unwrap();
    }));
    let (server_side, client_side) = connect(&server, &client, ProtocolVersion::V4).await;
    assert_ok!(server_side.emit("last", &()));
    assert_ok!(server_side.disconnect());

    assert!(recv(&mut server_rx).await.is(DisconnectReason::ClosedLocally));
    let reason = recv(&mut client_rx).await;
    assert!(reason.is(DisconnectReason::NamespaceDisconnect));
    assert_eq!(reason.code, 110);
    client_side.closed().await;
    assert!(!client_side.is_alive());
}

#[tokio::test]
pub async fn server_shutdown() {
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (_a, mut peer_a) = raw_peer(&server, ProtocolVersion::V4, 64);
    let (_b, mut peer_b) = raw_peer(&server, ProtocolVersion::V3, 64);
    assert_eq!(server.session_count(), 2);
    server.close();

    for _ in 0..2 {
        let reason = recv(&mut rx).await;
        assert!(reason.is(DisconnectReason::ClosingServer));
        assert_eq!(reason.code, 109);
    }
    assert_eq!(server.session_count(), 0);
    peer_a.until_closed().await;
    peer_b.until_closed().await;
}

#[test]
pub fn close_outside_of_a_runtime() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let server = Server::new(test_config().build());
    let mut rx = attach_handler(&server);
    let (conn, _peer) = sockwire::transport::mem::pair(8);
    let first = rt.block_on(async { server.accept(conn, ProtocolVersion::V4) });
    let (conn, _peer2) = sockwire::transport::mem::pair(8);
    let second = rt.block_on(async { server.accept(conn, ProtocolVersion::V4) });

    // No runtime context here, sync handlers still run inline
    first.close();
    let reason = assert_ok!(rx.try_recv());
    assert!(reason.is(DisconnectReason::ClosedLocally));
    assert!(!first.is_alive());

    server.close();
    let reason = assert_ok!(rx.try_recv());
    assert!(reason.is(DisconnectReason::ClosingServer));
    assert!(!second.is_alive());
    assert_eq!(server.session_count(), 0);
}
