//! Fan-out of round events to subscribed connections.
//!
//! The hub decouples round logic from delivery: `publish` never blocks
//! and never waits for a subscriber. Delivery is at-most-once per
//! connection; a slow subscriber that lags simply drops events and can
//! resynchronize through the `current-game` snapshot.

use crate::round::{Bet, CurrentGame, Multiplier, RoundSnapshot};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Event stream shared by every connection watching the table.
///
/// The broadcast variants fan out through the hub; the ack variants
/// (`bet-placed`, `bet-error`, `cashout-success`, `cashout-error`,
/// `current-game`) are delivered only on the originating connection but
/// share this type so one outbound queue carries both kinds in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GameEvent {
    NewGame {
        round_id: u64,
        countdown_seconds: u64,
        server_seed_hash: String,
        client_seed: String,
        nonce: u64,
    },
    GameStarted {
        round_id: u64,
    },
    MultiplierUpdate {
        multiplier: Multiplier,
    },
    GameCrashed {
        crash_point: Multiplier,
        server_seed: String,
        server_seed_hash: String,
        client_seed: String,
        nonce: u64,
    },
    BetsUpdate {
        bets: Vec<Bet>,
    },
    BetPlaced {
        bet: Bet,
    },
    BetError {
        reason: String,
    },
    CashoutSuccess {
        bet: Bet,
    },
    CashoutError {
        reason: String,
    },
    CurrentGame {
        round: RoundSnapshot,
        bets: Vec<Bet>,
    },
}

impl From<CurrentGame> for GameEvent {
    fn from(current: CurrentGame) -> Self {
        GameEvent::CurrentGame {
            round: current.round,
            bets: current.bets,
        }
    }
}

pub struct BroadcastHub {
    tx: broadcast::Sender<GameEvent>,
    members: DashMap<Uuid, ()>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            tx,
            members: DashMap::new(),
        }
    }

    /// Fire-and-forget fan-out to every subscriber.
    pub fn publish(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            trace!("no subscribers for broadcast event");
        }
    }

    /// Register a connection and hand it its ordered event stream.
    pub fn subscribe(&self, connection_id: Uuid) -> broadcast::Receiver<GameEvent> {
        self.members.insert(connection_id, ());
        self.tx.subscribe()
    }

    pub fn unsubscribe(&self, connection_id: Uuid) {
        self.members.remove(&connection_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.members.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
