//! The OPEN -> ACCEPTED -> CLOSED state machine binding a pair of clients
//! to a (possibly not-yet-existing) game. Closing with `Role::Null` while
//! a game is in progress is rejected rather than silently abandoning the
//! game — callers resign on a specific role's behalf instead.

use crate::client::Client;
use crate::error::OperationError;
use crate::game::Game;
use protocol::Role;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Accepted,
    Closed,
}

struct Inner {
    state: State,
    game: Option<Arc<Game>>,
}

/// A proposal from `source` to `target` to play a game, each under their
/// own role. Lives in both participants' invitation lists from creation
/// until it closes. Identity checks (`role_of`, `peer_of`) compare
/// [`Client::id`] rather than `Arc` pointers, so these can be called
/// without the caller needing to hold its own `Arc<Client>`.
pub struct Invitation {
    pub source: Arc<Client>,
    pub target: Arc<Client>,
    pub source_role: Role,
    pub target_role: Role,
    inner: Mutex<Inner>,
}

impl Invitation {
    /// Creates a fresh OPEN invitation. Callers (`Client::make_invitation`)
    /// are responsible for turning `source == target` and `source_role ==
    /// target_role` into client-visible `NACK`s *before* calling this —
    /// by the time we get here those are programming invariants, not
    /// operation errors, so we only assert them.
    pub fn new(source: Arc<Client>, target: Arc<Client>, source_role: Role, target_role: Role) -> Arc<Self> {
        debug_assert_ne!(source.id, target.id, "source must not equal target");
        debug_assert_ne!(source_role, target_role, "roles must differ");
        debug_assert_ne!(source_role, Role::Null);
        debug_assert_ne!(target_role, Role::Null);
        Arc::new(Invitation {
            source,
            target,
            source_role,
            target_role,
            inner: Mutex::new(Inner {
                state: State::Open,
                game: None,
            }),
        })
    }

    /// The role the client identified by `client_id` plays in this
    /// invitation. Panics if `client_id` names neither participant —
    /// callers always resolve the invitation through one of the two
    /// participants' own lists first.
    pub fn role_of(&self, client_id: u64) -> Role {
        if client_id == self.source.id {
            self.source_role
        } else if client_id == self.target.id {
            self.target_role
        } else {
            unreachable!("client is not a participant in this invitation")
        }
    }

    /// The other participant, from `client_id`'s point of view.
    pub fn peer_of(&self, client_id: u64) -> Arc<Client> {
        if client_id == self.source.id {
            self.target.clone()
        } else if client_id == self.target.id {
            self.source.clone()
        } else {
            unreachable!("client is not a participant in this invitation")
        }
    }

    pub fn has_game(&self) -> bool {
        self.inner.lock().unwrap().game.is_some()
    }

    pub fn game(&self) -> Option<Arc<Game>> {
        self.inner.lock().unwrap().game.clone()
    }

    /// OPEN -> ACCEPTED: creates and attaches a fresh game.
    pub fn accept(&self) -> Result<Arc<Game>, OperationError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != State::Open {
            return Err(OperationError::AlreadyClosed);
        }
        let game = Arc::new(Game::new());
        inner.game = Some(game.clone());
        inner.state = State::Accepted;
        Ok(game)
    }

    /// Closes the invitation. `role == Role::Null` revokes/declines an OPEN
    /// invitation (or is rejected if a game is in progress); any other role
    /// resigns the in-progress game on that role's behalf before closing.
    pub fn close(&self, role: Role) -> Result<(), OperationError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Closed {
            return Err(OperationError::AlreadyClosed);
        }
        match role {
            Role::Null => {
                if inner.game.is_some() {
                    return Err(OperationError::GameInProgress);
                }
            }
            resigning_role => {
                let game = inner.game.as_ref().ok_or(OperationError::NoGame)?;
                game.resign(resigning_role)?;
            }
        }
        inner.state = State::Closed;
        Ok(())
    }
}
