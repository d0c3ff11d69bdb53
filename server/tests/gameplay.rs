//! End-to-end scenarios driven over real TCP sockets against a server
//! bound to an ephemeral port, using the wire protocol directly instead of
//! reaching into server internals.

use bytes::Bytes;
use jeux_server::client_registry::ClientRegistry;
use jeux_server::player_registry::PlayerRegistry;
use protocol::{Header, Packet, PacketType, Role, HEADER_SIZE};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client_registry = Arc::new(ClientRegistry::new());
    let player_registry = Arc::new(PlayerRegistry::new());
    tokio::spawn(jeux_server::accept_loop(listener, client_registry, player_registry));
    addr
}

async fn send(stream: &mut TcpStream, packet_type: PacketType, id: u8, role: Role, payload: &[u8]) {
    let mut packet = Packet::with_payload(packet_type, id, role, Bytes::copy_from_slice(payload));
    let wire = packet.encode();
    stream.write_all(&wire).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> (Header, Vec<u8>) {
    let mut header_buf = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_buf).await.unwrap();
    let header = Header::decode(&header_buf).unwrap();
    let mut payload = vec![0u8; header.size as usize];
    if header.size > 0 {
        stream.read_exact(&mut payload).await.unwrap();
    }
    (header, payload)
}

async fn login(stream: &mut TcpStream, name: &str) {
    send(stream, PacketType::Login, 0, Role::Null, name.as_bytes()).await;
    let (header, _) = recv(stream).await;
    assert_eq!(header.packet_type, PacketType::Ack);
}

#[tokio::test]
async fn happy_game_with_source_playing_first() {
    let addr = spawn_server().await;
    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;

    // Alice invites Bob to play SECOND, so Alice plays FIRST.
    send(&mut alice, PacketType::Invite, 0, Role::Second, b"bob").await;
    let (ack, _) = recv(&mut alice).await;
    assert_eq!(ack.packet_type, PacketType::Ack);
    assert_eq!(ack.id, 0);

    let (invited, payload) = recv(&mut bob).await;
    assert_eq!(invited.packet_type, PacketType::Invited);
    assert_eq!(invited.role, Role::Second);
    assert_eq!(payload, b"alice");

    send(&mut bob, PacketType::Accept, 0, Role::Null, b"").await;
    let (accepted, board) = recv(&mut alice).await;
    assert_eq!(accepted.packet_type, PacketType::Accepted);
    assert!(!board.is_empty());
    let (bob_ack, bob_payload) = recv(&mut bob).await;
    assert_eq!(bob_ack.packet_type, PacketType::Ack);
    assert!(bob_payload.is_empty());

    // X at 1,2,3 (top row); O at 4,5 in between.
    send(&mut alice, PacketType::Move, 0, Role::Null, b"1").await;
    recv(&mut alice).await; // ack
    recv(&mut bob).await; // moved

    send(&mut bob, PacketType::Move, 0, Role::Null, b"4").await;
    recv(&mut bob).await; // ack
    recv(&mut alice).await; // moved

    send(&mut alice, PacketType::Move, 0, Role::Null, b"2").await;
    recv(&mut alice).await; // ack
    recv(&mut bob).await; // moved

    send(&mut bob, PacketType::Move, 0, Role::Null, b"5").await;
    recv(&mut bob).await; // ack
    recv(&mut alice).await; // moved

    send(&mut alice, PacketType::Move, 0, Role::Null, b"3").await;
    let (ack, _) = recv(&mut alice).await;
    assert_eq!(ack.packet_type, PacketType::Ack);
    let (moved, _) = recv(&mut bob).await;
    assert_eq!(moved.packet_type, PacketType::Moved);

    let (ended_alice, _) = recv(&mut alice).await;
    let (ended_bob, _) = recv(&mut bob).await;
    assert_eq!(ended_alice.packet_type, PacketType::Ended);
    assert_eq!(ended_alice.role, Role::First);
    assert_eq!(ended_bob.packet_type, PacketType::Ended);
    assert_eq!(ended_bob.role, Role::First);
}

#[tokio::test]
async fn revoke_notifies_the_target_and_drops_the_invitation() {
    let addr = spawn_server().await;
    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;

    send(&mut alice, PacketType::Invite, 0, Role::Second, b"bob").await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    send(&mut alice, PacketType::Revoke, 0, Role::Null, b"").await;
    let (ack, _) = recv(&mut alice).await;
    assert_eq!(ack.packet_type, PacketType::Ack);
    let (revoked, _) = recv(&mut bob).await;
    assert_eq!(revoked.packet_type, PacketType::Revoked);

    // Bob can no longer decline the now-closed invitation.
    send(&mut bob, PacketType::Decline, 0, Role::Null, b"").await;
    let (nack, _) = recv(&mut bob).await;
    assert_eq!(nack.packet_type, PacketType::Nack);
}

#[tokio::test]
async fn decline_notifies_the_source() {
    let addr = spawn_server().await;
    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;

    send(&mut alice, PacketType::Invite, 0, Role::Second, b"bob").await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    send(&mut bob, PacketType::Decline, 0, Role::Null, b"").await;
    let (ack, _) = recv(&mut bob).await;
    assert_eq!(ack.packet_type, PacketType::Ack);
    let (declined, _) = recv(&mut alice).await;
    assert_eq!(declined.packet_type, PacketType::Declined);
}

#[tokio::test]
async fn resign_hands_the_win_to_the_peer() {
    let addr = spawn_server().await;
    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;

    send(&mut alice, PacketType::Invite, 0, Role::Second, b"bob").await;
    recv(&mut alice).await;
    recv(&mut bob).await;
    send(&mut bob, PacketType::Accept, 0, Role::Null, b"").await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    send(&mut bob, PacketType::Resign, 0, Role::Null, b"").await;
    let (ack, _) = recv(&mut bob).await;
    assert_eq!(ack.packet_type, PacketType::Ack);
    let (resigned, _) = recv(&mut alice).await;
    assert_eq!(resigned.packet_type, PacketType::Resigned);
}

#[tokio::test]
async fn logout_revokes_every_outstanding_invitation() {
    let addr = spawn_server().await;
    let mut alice = TcpStream::connect(addr).await.unwrap();
    let mut bob = TcpStream::connect(addr).await.unwrap();
    let mut carol = TcpStream::connect(addr).await.unwrap();
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;
    login(&mut carol, "carol").await;

    send(&mut alice, PacketType::Invite, 0, Role::Second, b"bob").await;
    recv(&mut alice).await;
    recv(&mut bob).await;
    send(&mut alice, PacketType::Invite, 0, Role::Second, b"carol").await;
    recv(&mut alice).await;
    recv(&mut carol).await;

    drop(alice);

    let (revoked_bob, _) = recv(&mut bob).await;
    assert_eq!(revoked_bob.packet_type, PacketType::Revoked);
    let (revoked_carol, _) = recv(&mut carol).await;
    assert_eq!(revoked_carol.packet_type, PacketType::Revoked);
}
