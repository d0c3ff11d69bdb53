//! A named, rated identity that outlives any single connection. Rated with
//! a standard Elo update (K=32) after every finished game.

use std::sync::Mutex;

const INITIAL_RATING: f64 = 1500.0;
const K_FACTOR: f64 = 32.0;

/// The outcome of a finished game, from the perspective of two named
/// players rather than game roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Draw,
    FirstWins,
    SecondWins,
}

pub struct Player {
    username: String,
    /// A process-wide, monotonically assigned id used only to pick a
    /// stable lock order for [`post_result`] — never sent on the wire.
    order_key: u64,
    rating: Mutex<f64>,
}

impl Player {
    pub(crate) fn new(username: String, order_key: u64) -> Self {
        Player {
            username,
            order_key,
            rating: Mutex::new(INITIAL_RATING),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn rating(&self) -> f64 {
        *self.rating.lock().unwrap()
    }
}

fn expected_score(own_rating: f64, opponent_rating: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - own_rating) / 400.0))
}

/// Updates both players' ratings for one finished game between them.
/// Locks both players' rating mutexes in a global order keyed by
/// `order_key` (never by address, since a `Mutex` has no stable address
/// once moved) so that two games ending concurrently with an overlapping
/// player can never deadlock.
pub fn post_result(player1: &Player, player2: &Player, outcome: Outcome) {
    let (s1, s2) = match outcome {
        Outcome::Draw => (0.5, 0.5),
        Outcome::FirstWins => (1.0, 0.0),
        Outcome::SecondWins => (0.0, 1.0),
    };

    if player1.order_key < player2.order_key {
        let mut r1 = player1.rating.lock().unwrap();
        let mut r2 = player2.rating.lock().unwrap();
        let e1 = expected_score(*r1, *r2);
        let e2 = expected_score(*r2, *r1);
        *r1 += K_FACTOR * (s1 - e1);
        *r2 += K_FACTOR * (s2 - e2);
    } else {
        let mut r2 = player2.rating.lock().unwrap();
        let mut r1 = player1.rating.lock().unwrap();
        let e1 = expected_score(*r1, *r2);
        let e2 = expected_score(*r2, *r1);
        *r1 += K_FACTOR * (s1 - e1);
        *r2 += K_FACTOR * (s2 - e2);
    }
}
