//! The per-connection loop: register, read one request, dispatch it to the
//! matching [`Client`] operation, reply, repeat until EOF or a forced
//! shutdown. One of these runs as its own task per accepted connection.

use crate::client::Client;
use crate::client_registry::ClientRegistry;
use crate::player_registry::PlayerRegistry;
use bytes::Bytes;
use protocol::{Header, Packet, PacketType, ProtocolError, Role, HEADER_SIZE};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Reads one packet, or a synthetic [`PacketType::NoPacket`] header on a
/// clean EOF seen before any header bytes arrive. A partial header or body
/// is a [`SessionError`] — that can only mean a misbehaving peer or a
/// severed connection mid-message, not a normal close.
async fn read_packet(stream: &mut (impl AsyncReadExt + Unpin)) -> Result<Packet, SessionError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < header_buf.len() {
        let read = stream.read(&mut header_buf[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(Packet::empty(PacketType::NoPacket, 0, Role::Null));
            }
            return Err(SessionError::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        filled += read;
    }
    let header = Header::decode(&header_buf)?;
    let mut payload = vec![0u8; header.size as usize];
    stream.read_exact(&mut payload).await?;
    Ok(Packet {
        header,
        payload: Bytes::from(payload),
    })
}

/// Drives one accepted connection to completion.
pub async fn run(
    socket: TcpStream,
    client_registry: Arc<ClientRegistry>,
    player_registry: Arc<PlayerRegistry>,
) {
    let (mut read_half, write_half) = socket.into_split();
    let client = Client::new(write_half);
    let Some(client) = client_registry.register(client) else {
        warn!("refused connection: registry at capacity");
        return;
    };

    loop {
        let packet = tokio::select! {
            biased;
            _ = client.shutdown_requested() => break,
            result = read_packet(&mut read_half) => match result {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(client = client.id, error = %err, "session ended abnormally");
                    break;
                }
            },
        };

        if packet.header.packet_type == PacketType::NoPacket {
            break;
        }

        if let Err(err) = dispatch(&client, &packet, &client_registry, &player_registry).await {
            warn!(client = client.id, error = %err, "failed to write reply");
            break;
        }
    }

    client.logout().await;
    client_registry.unregister(&client);
    info!(client = client.id, "connection closed");
}

async fn dispatch(
    client: &Arc<Client>,
    packet: &Packet,
    client_registry: &ClientRegistry,
    player_registry: &PlayerRegistry,
) -> std::io::Result<()> {
    let text = || String::from_utf8_lossy(&packet.payload).into_owned();
    let id = packet.header.id;

    match packet.header.packet_type {
        PacketType::Login => ack_or_nack(client, client.login(&text(), player_registry)).await,
        PacketType::Users => {
            let listing = list_players(client_registry);
            client
                .send(Packet::with_payload(
                    PacketType::Ack,
                    0,
                    Role::Null,
                    listing.into_bytes().into(),
                ))
                .await
        }
        PacketType::Invite => {
            let name = text();
            match client_registry.lookup(&name) {
                Some(target) => {
                    let result = client.make_invitation(&target, packet.header.role).await;
                    // make_invitation sends its own ACK/INVITED on success.
                    if result.is_err() {
                        client.send(Packet::empty(PacketType::Nack, 0, Role::Null)).await
                    } else {
                        Ok(())
                    }
                }
                None => client.send(Packet::empty(PacketType::Nack, 0, Role::Null)).await,
            }
        }
        PacketType::Revoke => ack_or_nack(client, client.revoke(id).await).await,
        PacketType::Decline => ack_or_nack(client, client.decline(id).await).await,
        PacketType::Resign => ack_or_nack(client, client.resign(id).await).await,
        PacketType::Move => ack_or_nack(client, client.make_move(id, &text()).await).await,
        PacketType::Accept => match client.accept(id).await {
            Ok(Some(board)) => {
                client
                    .send(Packet::with_payload(PacketType::Ack, 0, Role::Null, board.into_bytes().into()))
                    .await
            }
            Ok(None) => client.send(Packet::empty(PacketType::Ack, 0, Role::Null)).await,
            Err(_) => client.send(Packet::empty(PacketType::Nack, 0, Role::Null)).await,
        },
        PacketType::Ack
        | PacketType::Nack
        | PacketType::Invited
        | PacketType::Revoked
        | PacketType::Accepted
        | PacketType::Declined
        | PacketType::Moved
        | PacketType::Resigned
        | PacketType::Ended
        | PacketType::NoPacket => {
            // These only ever travel server -> client; a client sending one
            // is a protocol violation answered with a NACK, same as any
            // other request we refuse.
            client.send(Packet::empty(PacketType::Nack, 0, Role::Null)).await
        }
    }
}

async fn ack_or_nack(client: &Client, result: Result<(), crate::error::OperationError>) -> std::io::Result<()> {
    match result {
        Ok(()) => client.send(Packet::empty(PacketType::Ack, 0, Role::Null)).await,
        Err(_) => client.send(Packet::empty(PacketType::Nack, 0, Role::Null)).await,
    }
}

/// "name<TAB>rating<NL>" for every currently registered player, sorted by
/// name — the `USERS` response payload.
fn list_players(registry: &ClientRegistry) -> String {
    let mut lines: Vec<String> = registry
        .all_players()
        .into_iter()
        .map(|p| format!("{}\t{:.1}\n", p.username(), p.rating()))
        .collect();
    lines.sort();
    lines.concat()
}
