//! Append-only round history and rolling per-player statistics.
//!
//! Entries carry the fairness reveal (seeds and nonce) so the public
//! history doubles as the audit log for the provably-fair scheme. A
//! finished round and all of its stats deltas are committed in a single
//! atomic batch; retrying a failed commit can never double-count.

use crate::round::{Bet, BetStatus, Multiplier, PlayerId};
use crate::storage::{Storage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ROUND_PREFIX: &[u8] = b"round:";
const STATS_PREFIX: &[u8] = b"stats:";

/// Immutable snapshot of a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundHistoryEntry {
    pub round_id: u64,
    pub crash_point: Multiplier,
    /// Hex-encoded revealed server seed.
    pub server_seed: String,
    /// Commitment that was published before the round started.
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub total_bets: u64,
    pub total_wagered: u64,
    pub total_payout: u64,
    pub started_at: DateTime<Utc>,
    pub crashed_at: DateTime<Utc>,
}

/// Monotone per-player aggregates, updated once per resolved bet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_games: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_wagered: u64,
    pub total_won: u64,
    pub best_multiplier: Multiplier,
}

impl PlayerStats {
    /// Fold one resolved bet into the aggregates. Additive and
    /// commutative across bets, applied exactly once each.
    fn record(&mut self, bet: &Bet) {
        self.total_games += 1;
        self.total_wagered += bet.amount;
        match bet.status {
            BetStatus::CashedOut => {
                self.wins += 1;
                self.total_won += bet.payout.unwrap_or(0);
                if let Some(multiplier) = bet.cashout_multiplier {
                    self.best_multiplier = self.best_multiplier.max(multiplier);
                }
            }
            BetStatus::Lost => self.losses += 1,
            BetStatus::Active => {}
        }
    }
}

pub struct HistoryStore {
    storage: Storage,
}

impl HistoryStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn round_key(round_id: u64) -> Vec<u8> {
        let mut key = ROUND_PREFIX.to_vec();
        key.extend_from_slice(format!("{:020}", round_id).as_bytes());
        key
    }

    fn stats_key(player_id: PlayerId) -> Vec<u8> {
        let mut key = STATS_PREFIX.to_vec();
        key.extend_from_slice(format!("{:020}", player_id).as_bytes());
        key
    }

    /// Commit a finished round: the history entry plus every bet's
    /// stats delta, as one atomic write. Safe to retry on failure.
    pub fn commit_round(
        &self,
        entry: &RoundHistoryEntry,
        bets: &[Bet],
    ) -> Result<(), StorageError> {
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(bets.len() + 1);
        items.push((Self::round_key(entry.round_id), bincode::serialize(entry)?));

        // One bet per player per round, so a per-bet read-modify-write
        // never touches the same stats record twice within a round.
        // Unresolved bets carry no stats delta.
        for bet in bets.iter().filter(|b| b.status != BetStatus::Active) {
            let mut stats = self.stats(bet.player_id)?;
            stats.record(bet);
            items.push((Self::stats_key(bet.player_id), bincode::serialize(&stats)?));
        }

        self.storage.batch_write(&items)
    }

    /// Finished rounds, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RoundHistoryEntry>, StorageError> {
        self.storage
            .scan_prefix_rev(ROUND_PREFIX, limit)?
            .iter()
            .map(|bytes| Ok(bincode::deserialize(bytes)?))
            .collect()
    }

    /// Lifetime aggregates for one player; zeroed for unknown players.
    pub fn stats(&self, player_id: PlayerId) -> Result<PlayerStats, StorageError> {
        match self.storage.get(&Self::stats_key(player_id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(PlayerStats::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, HistoryStore::new(storage))
    }

    fn entry(round_id: u64) -> RoundHistoryEntry {
        RoundHistoryEntry {
            round_id,
            crash_point: Multiplier::from_hundredths(198),
            server_seed: "aa".repeat(32),
            server_seed_hash: "bb".repeat(32),
            client_seed: "seed".to_string(),
            nonce: round_id,
            total_bets: 2,
            total_wagered: 300,
            total_payout: 197,
            started_at: Utc::now(),
            crashed_at: Utc::now(),
        }
    }

    fn cashed_out_bet(id: u64, player_id: PlayerId) -> Bet {
        Bet {
            id,
            round_id: 1,
            player_id,
            amount: 100,
            status: BetStatus::CashedOut,
            cashout_multiplier: Some(Multiplier::from_hundredths(197)),
            payout: Some(197),
        }
    }

    fn lost_bet(id: u64, player_id: PlayerId) -> Bet {
        Bet {
            id,
            round_id: 1,
            player_id,
            amount: 200,
            status: BetStatus::Lost,
            cashout_multiplier: None,
            payout: None,
        }
    }

    #[test]
    fn commit_round_appends_and_updates_stats() {
        let (_dir, history) = store();
        let committed = entry(1);
        let bets = vec![cashed_out_bet(1, 10), lost_bet(2, 20)];
        history.commit_round(&committed, &bets).unwrap();

        let recent = history.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0], committed);

        let winner = history.stats(10).unwrap();
        assert_eq!(winner.total_games, 1);
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.total_won, 197);
        assert_eq!(winner.best_multiplier, Multiplier::from_hundredths(197));

        let loser = history.stats(20).unwrap();
        assert_eq!(loser.losses, 1);
        assert_eq!(loser.total_won, 0);
        assert_eq!(loser.total_wagered, 200);
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let (_dir, history) = store();
        for id in 1..=5 {
            history.commit_round(&entry(id), &[]).unwrap();
        }

        let recent = history.recent(3).unwrap();
        let ids: Vec<u64> = recent.iter().map(|e| e.round_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn stats_accumulate_across_rounds() {
        let (_dir, history) = store();
        history.commit_round(&entry(1), &[cashed_out_bet(1, 10)]).unwrap();
        history.commit_round(&entry(2), &[lost_bet(2, 10)]).unwrap();

        let stats = history.stats(10).unwrap();
        assert_eq!(stats.total_games, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total_wagered, 300);
    }

    #[test]
    fn unknown_player_has_zeroed_stats() {
        let (_dir, history) = store();
        assert_eq!(history.stats(999).unwrap(), PlayerStats::default());
    }
}
