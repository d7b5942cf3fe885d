//! Tests for rooms and broadcasts
mod utils;

use fixture::{connect, raw_peer, recv, test_config};
use sockwire::{
    BroadcastError, Channel, Client, ProtocolVersion, RoomError, Server, packet::PacketData,
};
use tokio::sync::mpsc;

async fn client_with_inbox(server: &Server) -> (Channel, Client, mpsc::Receiver<String>) {
    let client = Client::new(test_config().build());
    let (tx, rx) = mpsc::channel(16);
    assert_ok!(client.on("news", move |_: Channel, text: String| {
        tx.try_send(text).unwrap();
    }));
    let (server_side, _) = connect(server, &client, ProtocolVersion::V4).await;
    (server_side, client, rx)
}

#[tokio::test]
pub async fn closed_channel_leaves_every_room() {
    let server = Server::new(test_config().build());
    let (a, _ca, _) = client_with_inbox(&server).await;
    let (b, _cb, _) = client_with_inbox(&server).await;
    for room in ["r1", "r2", "r3"] {
        assert_ok!(a.join(room));
    }
    assert_ok!(b.join("r1"));

    a.close();
    assert_eq!(server.room_count(), 1);
    assert_eq!(server.room_members("r1"), [b.id()]);
    assert!(server.rooms_of(&a.id()).is_empty());
    assert_none!(server.channel(&a.id()));

    // A closed channel cannot join again
    server.join(&a, "r1");
    assert_eq!(server.room_size("r1"), 1);
}

#[tokio::test]
pub async fn broadcast_skips_the_sender() {
    let server = Server::new(test_config().build());
    let (a, _ca, mut rx_a) = client_with_inbox(&server).await;
    let (b, _cb, mut rx_b) = client_with_inbox(&server).await;
    let (c, _cc, mut rx_c) = client_with_inbox(&server).await;
    for channel in [&a, &b, &c] {
        assert_ok!(channel.join("lobby"));
    }

    let sent = assert_ok!(a.broadcast_to("lobby", "news", "hello"));
    assert_eq!(sent, 2);
    assert_eq!(recv(&mut rx_b).await, "hello");
    assert_eq!(recv(&mut rx_c).await, "hello");

    let sent = assert_ok!(server.broadcast_to_room("lobby", "news", "all"));
    assert_eq!(sent, 3);
    assert_eq!(recv(&mut rx_a).await, "all");
    assert_eq!(recv(&mut rx_b).await, "all");
    assert_eq!(recv(&mut rx_c).await, "all");
    assert!(rx_a.try_recv().is_err());

    let sent = assert_ok!(server.broadcast_to_all("news", "everyone"));
    assert_eq!(sent, 3);
    assert_eq!(assert_ok!(server.broadcast_to_room("empty", "news", "x")), 0);
}

#[tokio::test]
pub async fn broadcast_reaches_mixed_protocols() {
    let server = Server::new(test_config().build());
    let (v4, mut peer_v4) = raw_peer(&server, ProtocolVersion::V4, 64);
    let (v3, mut peer_v3) = raw_peer(&server, ProtocolVersion::V3, 64);
    peer_v4.handshake().await;
    peer_v3.handshake().await;
    assert_ok!(v4.join("mixed"));
    assert_ok!(v3.join("mixed"));

    assert_eq!(assert_ok!(server.broadcast_to_room("mixed", "news", &(1, "a"))), 2);
    for peer in [&mut peer_v4, &mut peer_v3] {
        match peer.recv_packet().await {
            PacketData::Event(event, args, None) => {
                assert_eq!(event, "news");
                assert_eq!(args.len(), 2);
            }
            packet => panic!("unexpected packet {packet:?}"),
        }
    }
}

#[tokio::test]
pub async fn overflowing_member_is_reported() {
    let server = Server::new(test_config().max_buffer_size(4).build());
    let (ok, mut peer) = raw_peer(&server, ProtocolVersion::V4, 64);
    let (full, _stalled) = raw_peer(&server, ProtocolVersion::V4, 1);
    peer.handshake().await;
    assert_ok!(ok.join("room"));
    assert_ok!(full.join("room"));

    // Drained by its peer, `ok` never fills up while `full` does
    let mut errors = Vec::new();
    for _ in 0..10 {
        match server.broadcast_to_room("room", "news", "x") {
            Ok(_) => {}
            Err(BroadcastError::Send(e)) => errors.extend(e),
            Err(e) => panic!("unexpected error {e}"),
        }
        assert!(matches!(peer.recv_packet().await, PacketData::Event(..)));
    }
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|(sid, _)| *sid == full.id()));
    assert!(ok.is_alive());
    assert!(!full.is_alive());
    assert_eq!(server.room_members("room"), [ok.id()]);
}

#[tokio::test]
pub async fn client_channels_have_no_rooms() {
    let server = Server::new(test_config().build());
    let client = Client::new(test_config().build());
    let (_, channel) = connect(&server, &client, ProtocolVersion::V4).await;
    assert_eq!(assert_err!(channel.join("room")), RoomError::NoServer);
    assert_eq!(assert_err!(channel.rooms()), RoomError::NoServer);
    assert!(matches!(
        channel.broadcast_to("room", "news", &()),
        Err(BroadcastError::Room(RoomError::NoServer))
    ));
}
