//! The wire format shared between the session loop and every connected
//! client: a fixed 16-byte header, optionally followed by a payload of
//! `size` raw bytes. Pure encode/decode lives here; the actual socket I/O
//! is a server-crate concern.
//!
//! Header layout, in order, all multi-byte fields network byte order:
//!
//! | field          | bytes | meaning                              |
//! |----------------|-------|---------------------------------------|
//! | type           | 1     | [`PacketType`]                        |
//! | id             | 1     | invitation id                         |
//! | role           | 1     | [`Role`]                              |
//! | (pad)          | 1     | reserved, always zero                 |
//! | size           | 2     | payload length                        |
//! | timestamp_sec  | 4     | wall-clock seconds                    |
//! | timestamp_nsec | 4     | wall-clock nanoseconds                |

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size in bytes of the fixed packet header.
pub const HEADER_SIZE: usize = 16;

/// The kind of a packet flowing over a connection.
///
/// Client -> server requests, server -> client synchronous responses, and
/// server -> client asynchronous notifications all share this one set; the
/// direction a given value travels in is documented per-variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Client -> server: claim a username for this connection.
    Login = 0,
    /// Client -> server: request the current player list.
    Users = 1,
    /// Client -> server: invite a logged-in peer to a game.
    Invite = 2,
    /// Client -> server: withdraw an invitation this client sent.
    Revoke = 3,
    /// Client -> server: accept an invitation addressed to this client.
    Accept = 4,
    /// Client -> server: decline an invitation addressed to this client.
    Decline = 5,
    /// Client -> server: play a move in an in-progress game.
    Move = 6,
    /// Client -> server: resign an in-progress game.
    Resign = 7,
    /// Server -> client: the preceding request succeeded.
    Ack = 8,
    /// Server -> client: the preceding request failed.
    Nack = 9,
    /// Server -> client (async): a peer invited this client.
    Invited = 10,
    /// Server -> client (async): an invitation this client held was revoked.
    Revoked = 11,
    /// Server -> client (async): an invitation this client sent was accepted.
    Accepted = 12,
    /// Server -> client (async): an invitation this client sent was declined.
    Declined = 13,
    /// Server -> client (async): the peer made a move.
    Moved = 14,
    /// Server -> client (async): the peer resigned.
    Resigned = 15,
    /// Server -> client (async): the game this client was playing ended.
    Ended = 16,
    /// Synthetic sentinel produced on a clean EOF in place of a decoded
    /// header, never sent on the wire. Lets the session loop route "no more
    /// packets" through the same dispatch switch as every other type.
    NoPacket = 255,
}

impl PacketType {
    fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        use PacketType::*;
        Ok(match value {
            0 => Login,
            1 => Users,
            2 => Invite,
            3 => Revoke,
            4 => Accept,
            5 => Decline,
            6 => Move,
            7 => Resign,
            8 => Ack,
            9 => Nack,
            10 => Invited,
            11 => Revoked,
            12 => Accepted,
            13 => Declined,
            14 => Moved,
            15 => Resigned,
            16 => Ended,
            255 => NoPacket,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

/// The role a player occupies in a game: who moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Role {
    /// No role — used when a field is not applicable (e.g. most ACKs).
    #[default]
    Null = 0,
    /// Plays X, moves first.
    First = 1,
    /// Plays O, moves second.
    Second = 2,
}

impl Role {
    fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Role::Null,
            1 => Role::First,
            2 => Role::Second,
            other => return Err(ProtocolError::UnknownRole(other)),
        })
    }

    /// The other role. Panics on [`Role::Null`], which has no opponent.
    pub fn opposite(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
            Role::Null => panic!("Role::Null has no opposite"),
        }
    }
}

/// Errors that terminate a session: the header could not be parsed at all.
/// A clean EOF before any bytes are read is not an error — see
/// [`PacketType::NoPacket`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("unknown packet type byte {0}")]
    UnknownPacketType(u8),
    #[error("unknown role byte {0}")]
    UnknownRole(u8),
}

/// The fixed-size packet header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub packet_type: PacketType,
    pub id: u8,
    pub role: Role,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl Header {
    /// Builds a header with the current wall-clock time and no payload.
    pub fn new(packet_type: PacketType, id: u8, role: Role) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Header {
            packet_type,
            id,
            role,
            size: 0,
            timestamp_sec: now.as_secs() as u32,
            timestamp_nsec: now.subsec_nanos(),
        }
    }

    /// Stamps the timestamp fields with the current wall-clock time.
    ///
    /// `send` always calls this right before writing the header bytes, so
    /// that the timestamp reflects the moment the packet actually leaves —
    /// not the moment it was constructed, which could be stale if queued
    /// behind another packet on a busy connection.
    pub fn stamp_now(&mut self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        self.timestamp_sec = now.as_secs() as u32;
        self.timestamp_nsec = now.subsec_nanos();
    }

    /// Encodes this header into exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_u8(self.packet_type as u8);
        buf.put_u8(self.id);
        buf.put_u8(self.role as u8);
        buf.put_u8(0); // pad
        buf.put_u16(self.size);
        buf.put_u32(self.timestamp_sec);
        buf.put_u32(self.timestamp_nsec);
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decodes a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() != HEADER_SIZE {
            return Err(ProtocolError::ShortRead {
                expected: HEADER_SIZE,
                got: raw.len(),
            });
        }
        let mut buf = raw;
        let packet_type = PacketType::from_u8(buf.get_u8())?;
        let id = buf.get_u8();
        let role = Role::from_u8(buf.get_u8())?;
        buf.get_u8(); // pad
        let size = buf.get_u16();
        let timestamp_sec = buf.get_u32();
        let timestamp_nsec = buf.get_u32();
        Ok(Header {
            packet_type,
            id,
            role,
            size,
            timestamp_sec,
            timestamp_nsec,
        })
    }

    /// A header describing a clean end-of-stream. Never sent on the wire.
    pub fn no_packet() -> Self {
        Header::new(PacketType::NoPacket, 0, Role::Null)
    }
}

/// A complete packet: header plus optional payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl Packet {
    /// A packet with no payload.
    pub fn empty(packet_type: PacketType, id: u8, role: Role) -> Self {
        Packet {
            header: Header::new(packet_type, id, role),
            payload: Bytes::new(),
        }
    }

    /// A packet carrying `payload`, with `size` filled in to match.
    pub fn with_payload(packet_type: PacketType, id: u8, role: Role, payload: Bytes) -> Self {
        let mut header = Header::new(packet_type, id, role);
        header.size = payload.len() as u16;
        Packet { header, payload }
    }

    /// Serializes header followed by payload into one contiguous buffer,
    /// stamping the timestamp immediately before encoding.
    pub fn encode(&mut self) -> Bytes {
        self.header.stamp_now();
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}
