//! Round and bet data model.
//!
//! All money is integer coins and all multipliers are fixed-point
//! hundredths; floats only appear at the JSON boundary for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Stable player identifier resolved by the surrounding app's auth layer.
pub type PlayerId = u64;

/// Fixed-point multiplier with two decimals (198 = 1.98x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the floor of every crash point and displayed value.
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u64) -> Self {
        Multiplier(hundredths)
    }

    pub const fn hundredths(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Winnings for a stake at this multiplier, rounded down.
    pub fn payout(self, amount: u64) -> u64 {
        amount * self.0 / 100
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

// Serialized as a plain decimal (1.98) for client display.
impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() || value < 0.0 {
            return Err(serde::de::Error::custom("multiplier must be a finite non-negative number"));
        }
        Ok(Multiplier((value * 100.0).round() as u64))
    }
}

/// Round lifecycle. Exactly one round is not `Crashed` at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Waiting,
    Running,
    Crashed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Waiting => write!(f, "waiting"),
            RoundStatus::Running => write!(f, "running"),
            RoundStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// One complete WAITING -> RUNNING -> CRASHED cycle.
///
/// `server_seed` stays secret until the round crashes; only its hash is
/// published up front. `crash_point` is fixed when the round starts
/// running and is never serialized before the crash.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: u64,
    pub status: RoundStatus,
    pub server_seed: [u8; 32],
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub crash_point: Option<Multiplier>,
    pub started_at: Option<DateTime<Utc>>,
    pub crashed_at: Option<DateTime<Utc>>,
}

/// Bet lifecycle, fully nested inside one round's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Active,
    CashedOut,
    Lost,
}

/// A single wager. Created only while the owning round is WAITING,
/// mutated only by the round engine, immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: u64,
    pub round_id: u64,
    pub player_id: PlayerId,
    pub amount: u64,
    pub status: BetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashout_multiplier: Option<Multiplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<u64>,
}

/// Public view of the current round, safe to show any client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: u64,
    pub status: RoundStatus,
    /// Displayed multiplier: 1.00 while waiting, live while running,
    /// the crash point once crashed.
    pub multiplier: Multiplier,
    /// Remaining betting window, present only while waiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_ms: Option<u64>,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    /// Revealed only once the round has crashed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<Multiplier>,
}

/// Full resync payload for late joiners and reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentGame {
    pub round: RoundSnapshot,
    pub bets: Vec<Bet>,
}
