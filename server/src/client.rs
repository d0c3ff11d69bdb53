//! A logged-in (or not-yet-logged-in) connection: the player it is bound
//! to, the invitations it owns or has been offered, and the serialized
//! write side of its socket. Every operation here is the implementation
//! behind one client request; the session loop only decodes the request
//! and turns the `Result` into an `ACK`/`NACK`.

use crate::error::OperationError;
use crate::invitation::Invitation;
use crate::player::{self, Outcome, Player};
use crate::player_registry::PlayerRegistry;
use protocol::{Packet, PacketType, Role};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::debug;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(0);

struct State {
    player: Option<Arc<Player>>,
    /// Slot table: index is the invitation id this client knows it by.
    /// Removal clears a slot to `None` but never reuses it, so an id a
    /// client once saw always means the same invitation for the rest of
    /// the session.
    invitations: Vec<Option<Arc<Invitation>>>,
}

/// One connection's state, from accept to close.
pub struct Client {
    /// Monotonic, process-wide, assigned at construction. Used only to
    /// pick a lock order when an operation must hold two clients' state
    /// locks at once — never sent on the wire.
    pub id: u64,
    write_half: tokio::sync::Mutex<OwnedWriteHalf>,
    state: Mutex<State>,
    /// Signalled by [`ClientRegistry::shutdown_all`] to unblock a session
    /// loop that is parked reading from its socket.
    shutdown: tokio::sync::Notify,
}

impl Client {
    pub fn new(write_half: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Client {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            write_half: tokio::sync::Mutex::new(write_half),
            state: Mutex::new(State {
                player: None,
                invitations: Vec::new(),
            }),
            shutdown: tokio::sync::Notify::new(),
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().unwrap().player.is_some()
    }

    pub fn player(&self) -> Option<Arc<Player>> {
        self.state.lock().unwrap().player.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.player().map(|p| p.username().to_string())
    }

    /// Requests that the session loop reading this client's socket wake up
    /// and observe the connection as finished, as if it had read EOF.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once [`Client::request_shutdown`] has been called. The
    /// session loop races this against its next socket read.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }

    /// Writes one packet to this connection, stamping its timestamp right
    /// before the bytes leave. Errors (a peer that has already gone away)
    /// are for the caller to decide whether to ignore.
    pub async fn send(&self, mut packet: Packet) -> std::io::Result<()> {
        let wire = packet.encode();
        let mut half = self.write_half.lock().await;
        half.write_all(&wire).await
    }

    /// Same as [`Client::send`], but logs and swallows a failure instead of
    /// propagating it. Used for asynchronous notifications to a peer,
    /// where a send failure just means the peer is already gone and will
    /// be cleaned up by its own session loop.
    async fn notify(&self, packet: Packet) {
        if let Err(err) = self.send(packet).await {
            debug!(client = self.id, error = %err, "dropped notification to a disconnected client");
        }
    }

    fn invitation_at(&self, id: u8) -> Option<Arc<Invitation>> {
        self.state
            .lock()
            .unwrap()
            .invitations
            .get(id as usize)
            .and_then(|slot| slot.clone())
    }

    fn local_id_of(&self, invitation: &Arc<Invitation>) -> Option<u8> {
        self.state
            .lock()
            .unwrap()
            .invitations
            .iter()
            .position(|slot| matches!(slot, Some(existing) if Arc::ptr_eq(existing, invitation)))
            .map(|index| index as u8)
    }

    fn append_invitation(&self, invitation: Arc<Invitation>) -> u8 {
        let mut state = self.state.lock().unwrap();
        state.invitations.push(Some(invitation));
        (state.invitations.len() - 1) as u8
    }

    fn clear_invitation_slot(&self, invitation: &Arc<Invitation>) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state
            .invitations
            .iter_mut()
            .find(|slot| matches!(slot, Some(existing) if Arc::ptr_eq(existing, invitation)))
        {
            *slot = None;
        }
    }

    /// Locks `a` and `b`'s invitation lists in a global order keyed by
    /// [`Client::id`], so that two operations racing over the same pair of
    /// clients (in either order) can never deadlock.
    fn append_to_both(a: &Client, inv_a: Arc<Invitation>, b: &Client, inv_b: Arc<Invitation>) -> (u8, u8) {
        if a.id < b.id {
            let id_a = a.append_invitation(inv_a);
            let id_b = b.append_invitation(inv_b);
            (id_a, id_b)
        } else {
            let id_b = b.append_invitation(inv_b);
            let id_a = a.append_invitation(inv_a);
            (id_a, id_b)
        }
    }

    fn remove_from_both(a: &Client, inv: &Arc<Invitation>, b: &Client) {
        if a.id < b.id {
            a.clear_invitation_slot(inv);
            b.clear_invitation_slot(inv);
        } else {
            b.clear_invitation_slot(inv);
            a.clear_invitation_slot(inv);
        }
    }

    /// Binds this connection to `username`'s player, creating it on first
    /// use. Fails if this connection is already bound.
    pub fn login(&self, username: &str, players: &PlayerRegistry) -> Result<(), OperationError> {
        let mut state = self.state.lock().unwrap();
        if state.player.is_some() {
            return Err(OperationError::AlreadyLoggedIn);
        }
        state.player = Some(players.get_or_create(username));
        Ok(())
    }

    /// Proposes a game to `target`. Sends the source's own `ACK` (carrying
    /// the newly assigned source-local id) and the target's `INVITED`
    /// notification itself, rather than leaving the synchronous `ACK` to
    /// the caller — the source-local id isn't known until the invitation
    /// has actually been appended to both lists.
    pub async fn make_invitation(
        self: &Arc<Self>,
        target: &Arc<Client>,
        requested_role: Role,
    ) -> Result<(), OperationError> {
        if !self.is_logged_in() || !target.is_logged_in() {
            return Err(OperationError::NotLoggedIn);
        }
        if self.id == target.id {
            return Err(OperationError::SelfInvite);
        }
        if requested_role == Role::Null {
            return Err(OperationError::SameRole);
        }
        let target_role = requested_role;
        let source_role = target_role.opposite();

        let invitation = Invitation::new(self.clone(), target.clone(), source_role, target_role);
        let (source_local_id, target_local_id) =
            Self::append_to_both(self, invitation.clone(), target, invitation.clone());

        self.notify(Packet::empty(PacketType::Ack, source_local_id, Role::Null))
            .await;
        let source_name = self.username().unwrap_or_default();
        target
            .notify(Packet::with_payload(
                PacketType::Invited,
                target_local_id,
                target_role,
                source_name.into_bytes().into(),
            ))
            .await;
        Ok(())
    }

    /// Withdraws an invitation this client sent. Requires the invitation
    /// to exist, belong to this client as source, and have no game in
    /// progress.
    pub async fn revoke(&self, id: u8) -> Result<(), OperationError> {
        let invitation = self.invitation_at(id).ok_or(OperationError::UnknownInvitation)?;
        if invitation.source.id != self.id {
            return Err(OperationError::NotSource);
        }
        self.revoke_invitation(&invitation).await
    }

    async fn revoke_invitation(&self, invitation: &Arc<Invitation>) -> Result<(), OperationError> {
        invitation.close(Role::Null)?;
        Self::remove_from_both(&invitation.source, invitation, &invitation.target);
        if let Some(target_local_id) = invitation.target.local_id_of(invitation) {
            invitation
                .target
                .notify(Packet::empty(PacketType::Revoked, target_local_id, Role::Null))
                .await;
        }
        Ok(())
    }

    /// Declines an invitation addressed to this client. Mirrors
    /// [`Client::revoke`] from the target's side.
    pub async fn decline(&self, id: u8) -> Result<(), OperationError> {
        let invitation = self.invitation_at(id).ok_or(OperationError::UnknownInvitation)?;
        if invitation.target.id != self.id {
            return Err(OperationError::NotTarget);
        }
        self.decline_invitation(&invitation).await
    }

    async fn decline_invitation(&self, invitation: &Arc<Invitation>) -> Result<(), OperationError> {
        invitation.close(Role::Null)?;
        Self::remove_from_both(&invitation.source, invitation, &invitation.target);
        if let Some(source_local_id) = invitation.source.local_id_of(invitation) {
            invitation
                .source
                .notify(Packet::empty(PacketType::Declined, source_local_id, Role::Null))
                .await;
        }
        Ok(())
    }

    /// Accepts an invitation addressed to this client, starting the game.
    /// The initial board goes to whichever side plays `First`: if the
    /// source plays `First`, its `ACCEPTED` carries the board and this
    /// client's own `ACK` is empty (`None`); if this client (the target)
    /// plays `First` instead, the source's `ACCEPTED` is empty and the
    /// board comes back as this method's return value for the caller's
    /// `ACK`.
    pub async fn accept(&self, id: u8) -> Result<Option<String>, OperationError> {
        let invitation = self.invitation_at(id).ok_or(OperationError::UnknownInvitation)?;
        if invitation.target.id != self.id {
            return Err(OperationError::NotTarget);
        }
        let game = invitation.accept()?;
        let board = game.unparse_state();

        let Some(source_local_id) = invitation.source.local_id_of(&invitation) else {
            return Ok(if invitation.source_role == Role::First {
                None
            } else {
                Some(board)
            });
        };

        if invitation.source_role == Role::First {
            invitation
                .source
                .notify(Packet::with_payload(
                    PacketType::Accepted,
                    source_local_id,
                    Role::Null,
                    board.into_bytes().into(),
                ))
                .await;
            Ok(None)
        } else {
            invitation
                .source
                .notify(Packet::empty(PacketType::Accepted, source_local_id, Role::Null))
                .await;
            Ok(Some(board))
        }
    }

    /// Plays a move in the game attached to invitation `id`. On success,
    /// sends the new board to the peer and, if the move ended the game,
    /// posts the rating update and sends both sides `ENDED`.
    pub async fn make_move(&self, id: u8, text: &str) -> Result<(), OperationError> {
        let invitation = self.invitation_at(id).ok_or(OperationError::UnknownInvitation)?;
        let game = invitation.game().ok_or(OperationError::NoGame)?;
        let role = invitation.role_of(self.id);
        let mv = game.parse_move(role, text)?;
        game.apply_move(mv)?;

        let board = game.unparse_state();
        let peer = invitation.peer_of(self.id);
        if let Some(peer_local_id) = peer.local_id_of(&invitation) {
            peer.notify(Packet::with_payload(
                PacketType::Moved,
                peer_local_id,
                Role::Null,
                board.into_bytes().into(),
            ))
            .await;
        }

        if game.is_over() {
            let winner = game.winner();
            let outcome = match winner {
                None => Outcome::Draw,
                Some(r) if r == invitation.source_role => Outcome::FirstWins,
                Some(_) => Outcome::SecondWins,
            };
            if let (Some(source_player), Some(target_player)) =
                (invitation.source.player(), invitation.target.player())
            {
                player::post_result(&source_player, &target_player, outcome);
            }

            let source_local_id = invitation.source.local_id_of(&invitation);
            let target_local_id = invitation.target.local_id_of(&invitation);
            Self::remove_from_both(&invitation.source, &invitation, &invitation.target);
            if let Some(id) = source_local_id {
                invitation
                    .source
                    .notify(Packet::empty(PacketType::Ended, id, winner.unwrap_or_default()))
                    .await;
            }
            if let Some(id) = target_local_id {
                invitation
                    .target
                    .notify(Packet::empty(PacketType::Ended, id, winner.unwrap_or_default()))
                    .await;
            }
        }
        Ok(())
    }

    /// Resigns the game attached to invitation `id` on this client's
    /// behalf; the peer wins and the invitation closes.
    pub async fn resign(&self, id: u8) -> Result<(), OperationError> {
        let invitation = self.invitation_at(id).ok_or(OperationError::UnknownInvitation)?;
        self.resign_invitation(&invitation).await
    }

    async fn resign_invitation(&self, invitation: &Arc<Invitation>) -> Result<(), OperationError> {
        let game = invitation.game().ok_or(OperationError::NoGame)?;
        if game.is_over() {
            return Err(OperationError::GameOver);
        }
        let role = invitation.role_of(self.id);
        invitation.close(role)?;

        if let (Some(source_player), Some(target_player)) =
            (invitation.source.player(), invitation.target.player())
        {
            let outcome = if role == invitation.source_role {
                Outcome::SecondWins
            } else {
                Outcome::FirstWins
            };
            player::post_result(&source_player, &target_player, outcome);
        }

        let peer = invitation.peer_of(self.id);
        let peer_local_id = peer.local_id_of(invitation);
        Self::remove_from_both(&invitation.source, invitation, &invitation.target);
        if let Some(id) = peer_local_id {
            peer.notify(Packet::empty(PacketType::Resigned, id, Role::Null)).await;
        }
        Ok(())
    }

    /// Tears down every invitation this client still holds, as either
    /// side, on disconnect: resigns any in-progress game, revokes what it
    /// sent, and declines what it was offered. Invitations already closed
    /// by a concurrent peer action are silently skipped.
    pub async fn logout(&self) {
        let snapshot: Vec<Arc<Invitation>> = self
            .state
            .lock()
            .unwrap()
            .invitations
            .iter()
            .flatten()
            .cloned()
            .collect();

        for invitation in snapshot {
            let result = if invitation.has_game() {
                self.resign_invitation(&invitation).await
            } else if invitation.source.id == self.id {
                self.revoke_invitation(&invitation).await
            } else {
                self.decline_invitation(&invitation).await
            };
            if let Err(err) = result {
                debug!(client = self.id, error = %err, "invitation already closed during logout");
            }
        }

        self.state.lock().unwrap().player = None;
    }
}
