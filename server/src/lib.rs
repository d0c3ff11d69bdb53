pub mod client;
pub mod client_registry;
pub mod error;
pub mod game;
pub mod invitation;
pub mod player;
pub mod player_registry;
pub mod session;

use client_registry::ClientRegistry;
use player_registry::PlayerRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts connections from `listener` forever, spawning one session task
/// per connection against the given registries. Returns only if `accept`
/// itself errors unrecoverably; callers that want graceful shutdown race
/// this against their own cancellation signal and then call
/// [`ClientRegistry::shutdown_all`] / [`ClientRegistry::wait_for_empty`].
pub async fn accept_loop(
    listener: TcpListener,
    client_registry: Arc<ClientRegistry>,
    player_registry: Arc<PlayerRegistry>,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                let client_registry = client_registry.clone();
                let player_registry = player_registry.clone();
                tokio::spawn(async move {
                    session::run(socket, client_registry, player_registry).await;
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
            }
        }
    }
}
