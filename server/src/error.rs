//! Operation errors: every one of these is reported to the requesting
//! client as a `NACK` and never propagates beyond the session loop that
//! produced it.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("client is already logged in")]
    AlreadyLoggedIn,
    #[error("no invitation with that id")]
    UnknownInvitation,
    #[error("client is not the source of this invitation")]
    NotSource,
    #[error("client is not the target of this invitation")]
    NotTarget,
    #[error("source and target roles must differ")]
    SameRole,
    #[error("a client cannot invite itself")]
    SelfInvite,
    #[error("target player is not logged in")]
    UnknownTarget,
    #[error("invitation already has a game in progress")]
    GameInProgress,
    #[error("invitation has no game in progress")]
    NoGame,
    #[error("game is already over")]
    GameOver,
    #[error("illegal move")]
    IllegalMove,
    #[error("invitation is already closed")]
    AlreadyClosed,
    #[error("client registry is at capacity")]
    RegistryFull,
}
