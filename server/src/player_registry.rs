//! Process-lifetime name -> player mapping: admits new names and returns
//! the existing entry for known ones. Passed around as an explicit
//! dependency rather than reached through a process-wide global.

use crate::player::Player;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Default)]
pub struct PlayerRegistry {
    players: Mutex<HashMap<String, Arc<Player>>>,
    next_order_key: AtomicU64,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        PlayerRegistry::default()
    }

    /// Returns the existing player for `username` if this registry has
    /// seen it before, otherwise creates one at the initial rating.
    pub fn get_or_create(&self, username: &str) -> Arc<Player> {
        let mut players = self.players.lock().unwrap();
        if let Some(existing) = players.get(username) {
            return existing.clone();
        }
        let order_key = self.next_order_key.fetch_add(1, Ordering::Relaxed);
        let player = Arc::new(Player::new(username.to_string(), order_key));
        players.insert(username.to_string(), player.clone());
        player
    }
}
