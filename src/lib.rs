//! Crashwave - server-authoritative crash wagering engine
//!
//! A continuously running round loop grows a multiplier in real time,
//! crashes at a provably-fair point, and settles concurrent bets and
//! cash-outs against player balances with no double-spend and no race
//! between a cash-out and a crash. Clients talk to it over a WebSocket
//! event protocol; history and stats are served over REST.

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fairness;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod round;
pub mod storage;

pub use broadcast::{BroadcastHub, GameEvent};
pub use config::CrashwaveConfig;
pub use engine::{EngineHandle, RoundEngine};
pub use history::{HistoryStore, PlayerStats, RoundHistoryEntry};
pub use ledger::LedgerGateway;
pub use metrics::EngineMetrics;
pub use round::{Bet, BetStatus, CurrentGame, Multiplier, PlayerId, Round, RoundStatus};
pub use storage::Storage;
