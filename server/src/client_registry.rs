//! The set of currently connected clients: bounded admission, lookup by
//! bound username, a player snapshot for `USERS`, and the two operations
//! the shutdown sequence needs (signal every session loop to stop, then
//! wait for them all to actually finish).

use crate::client::Client;
use crate::player::Player;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const MAX_CLIENTS: usize = 64;

/// Registers every live connection for the lifetime of the process. One
/// instance is shared (via `Arc`) across every accepted connection's task.
pub struct ClientRegistry {
    clients: Mutex<Vec<Arc<Client>>>,
    empty: Notify,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        ClientRegistry {
            clients: Mutex::new(Vec::new()),
            empty: Notify::new(),
        }
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        ClientRegistry::default()
    }

    /// Admits a newly accepted connection, or refuses it once `MAX_CLIENTS`
    /// are already registered.
    pub fn register(&self, client: Arc<Client>) -> Option<Arc<Client>> {
        let mut clients = self.clients.lock().unwrap();
        if clients.len() >= MAX_CLIENTS {
            return None;
        }
        clients.push(client.clone());
        Some(client)
    }

    /// Removes a connection once its session loop has exited. Wakes any
    /// task parked in [`ClientRegistry::wait_for_empty`] once the last
    /// client leaves.
    pub fn unregister(&self, client: &Arc<Client>) {
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|existing| !Arc::ptr_eq(existing, client));
        if clients.is_empty() {
            self.empty.notify_waiters();
        }
    }

    /// Finds the connection currently bound to `username`, if any.
    pub fn lookup(&self, username: &str) -> Option<Arc<Client>> {
        let clients = self.clients.lock().unwrap();
        clients
            .iter()
            .find(|client| client.username().as_deref() == Some(username))
            .cloned()
    }

    /// Every logged-in client's player, for the `USERS` listing.
    pub fn all_players(&self) -> Vec<Arc<Player>> {
        let clients = self.clients.lock().unwrap();
        clients.iter().filter_map(|client| client.player()).collect()
    }

    /// Asks every registered connection's session loop to stop, as if its
    /// socket had reached EOF. Does not wait for them to actually exit —
    /// pair with [`ClientRegistry::wait_for_empty`].
    pub fn shutdown_all(&self) {
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            client.request_shutdown();
        }
    }

    /// Resolves once no connections remain registered. Unlike the
    /// registry this was modeled on, which polls its length in a tight
    /// loop, this parks on a `Notify` woken by the last
    /// [`ClientRegistry::unregister`] call.
    pub async fn wait_for_empty(&self) {
        loop {
            let notified = self.empty.notified();
            tokio::pin!(notified);
            // Register interest before re-checking emptiness, so an
            // `unregister` that runs between the check and the await below
            // can't be missed.
            notified.as_mut().enable();

            if self.clients.lock().unwrap().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_client() -> Arc<Client> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let (accepted, _connected) = tokio::join!(listener.accept(), connect);
        let (_, write_half) = accepted.unwrap().0.into_split();
        Client::new(write_half)
    }

    #[tokio::test]
    async fn registers_and_unregisters() {
        let registry = ClientRegistry::new();
        let client = fake_client().await;
        assert!(registry.register(client.clone()).is_some());
        assert_eq!(registry.all_players().len(), 0);
        registry.unregister(&client);
    }

    #[tokio::test]
    async fn refuses_registration_past_capacity() {
        let registry = ClientRegistry::new();
        for _ in 0..MAX_CLIENTS {
            let client = fake_client().await;
            assert!(registry.register(client).is_some());
        }
        let overflow = fake_client().await;
        assert!(registry.register(overflow).is_none());
    }

    #[tokio::test]
    async fn wait_for_empty_resolves_after_last_unregister() {
        let registry = Arc::new(ClientRegistry::new());
        let client = fake_client().await;
        registry.register(client.clone()).unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_empty().await })
        };
        tokio::task::yield_now().await;
        registry.unregister(&client);
        waiter.await.unwrap();
    }
}
