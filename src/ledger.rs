//! Balance ledger with idempotent, per-player-serialized operations.
//!
//! Every mutation is keyed by `(bet_id, operation)`; replaying a key
//! with the same parameters returns the original outcome without
//! touching the balance again, so a retry after a partial failure can
//! never double-debit or double-credit. Same-player operations are
//! serialized through the map shard lock; different players proceed
//! concurrently.

use crate::config::LedgerConfig;
use crate::errors::LedgerError;
use crate::round::PlayerId;
use dashmap::DashMap;
use tracing::debug;

/// Operation half of an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    /// Stake taken when a bet is placed.
    Debit,
    /// Payout granted when a bet cashes out.
    Credit,
}

/// Unique key for one balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub bet_id: u64,
    pub op: LedgerOp,
}

impl OpKey {
    pub fn debit(bet_id: u64) -> Self {
        Self {
            bet_id,
            op: LedgerOp::Debit,
        }
    }

    pub fn credit(bet_id: u64) -> Self {
        Self {
            bet_id,
            op: LedgerOp::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AppliedOp {
    player_id: PlayerId,
    amount: u64,
    outcome: Result<u64, LedgerError>,
}

/// The only writer of player balances in the system. Other subsystems
/// (and tests) go through this API; nothing writes balances directly.
pub struct LedgerGateway {
    accounts: DashMap<PlayerId, u64>,
    applied: DashMap<OpKey, AppliedOp>,
    starting_balance: u64,
}

impl LedgerGateway {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            applied: DashMap::new(),
            starting_balance: config.starting_balance,
        }
    }

    /// Create the account on first sight, seeded with the configured
    /// starting balance. Returns the current balance either way.
    pub fn ensure_account(&self, player_id: PlayerId) -> u64 {
        *self
            .accounts
            .entry(player_id)
            .or_insert(self.starting_balance)
    }

    pub fn balance(&self, player_id: PlayerId) -> Option<u64> {
        self.accounts.get(&player_id).map(|b| *b)
    }

    /// Unkeyed top-up used by the surrounding app (and tests) to fund
    /// accounts outside of wagering.
    pub fn deposit(&self, player_id: PlayerId, amount: u64) -> u64 {
        let mut balance = self.accounts.entry(player_id).or_insert(0);
        *balance += amount;
        *balance
    }

    /// Atomically take `amount` from the player. Returns the new
    /// balance, or `InsufficientFunds` without mutating anything.
    pub fn debit(
        &self,
        player_id: PlayerId,
        amount: u64,
        key: OpKey,
    ) -> Result<u64, LedgerError> {
        self.apply(player_id, amount, key, |balance| {
            if *balance < amount {
                return Err(LedgerError::InsufficientFunds);
            }
            *balance -= amount;
            Ok(*balance)
        })
    }

    /// Atomically grant `amount` to the player. Returns the new balance.
    pub fn credit(
        &self,
        player_id: PlayerId,
        amount: u64,
        key: OpKey,
    ) -> Result<u64, LedgerError> {
        self.apply(player_id, amount, key, |balance| {
            *balance += amount;
            Ok(*balance)
        })
    }

    /// Run one keyed mutation exactly once. The `applied` entry guard is
    /// held across the balance update, so two racing calls with the same
    /// key resolve to a single application; the loser sees the recorded
    /// outcome. A replay with different parameters is a `Conflict`.
    fn apply<F>(
        &self,
        player_id: PlayerId,
        amount: u64,
        key: OpKey,
        mutate: F,
    ) -> Result<u64, LedgerError>
    where
        F: FnOnce(&mut u64) -> Result<u64, LedgerError>,
    {
        let entry = self.applied.entry(key).or_insert_with(|| {
            let mut balance = self.accounts.entry(player_id).or_insert(0);
            let outcome = mutate(&mut balance);
            AppliedOp {
                player_id,
                amount,
                outcome,
            }
        });

        if entry.player_id != player_id || entry.amount != amount {
            debug!(?key, "ledger operation replayed with mismatched parameters");
            return Err(LedgerError::Conflict);
        }
        entry.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn gateway(starting_balance: u64) -> LedgerGateway {
        LedgerGateway::new(LedgerConfig { starting_balance })
    }

    #[test]
    fn debit_and_credit_move_the_balance() {
        let ledger = gateway(1_000);
        ledger.ensure_account(1);

        assert_eq!(ledger.debit(1, 100, OpKey::debit(1)), Ok(900));
        assert_eq!(ledger.credit(1, 197, OpKey::credit(1)), Ok(1_097));
        assert_eq!(ledger.balance(1), Some(1_097));
    }

    #[test]
    fn debit_rejects_insufficient_funds_without_mutating() {
        let ledger = gateway(50);
        ledger.ensure_account(1);

        assert_eq!(
            ledger.debit(1, 100, OpKey::debit(1)),
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(ledger.balance(1), Some(50));
    }

    #[test]
    fn replaying_a_key_is_a_no_op() {
        let ledger = gateway(1_000);
        ledger.ensure_account(1);

        let first = ledger.debit(1, 100, OpKey::debit(7));
        let replay = ledger.debit(1, 100, OpKey::debit(7));
        assert_eq!(first, Ok(900));
        assert_eq!(replay, Ok(900));
        assert_eq!(ledger.balance(1), Some(900));

        // Failed outcomes replay too.
        let fail = ledger.debit(1, 5_000, OpKey::debit(8));
        let fail_replay = ledger.debit(1, 5_000, OpKey::debit(8));
        assert_eq!(fail, Err(LedgerError::InsufficientFunds));
        assert_eq!(fail_replay, Err(LedgerError::InsufficientFunds));
    }

    #[test]
    fn mismatched_replay_is_a_conflict() {
        let ledger = gateway(1_000);
        ledger.ensure_account(1);

        assert_eq!(ledger.debit(1, 100, OpKey::debit(7)), Ok(900));
        assert_eq!(
            ledger.debit(1, 200, OpKey::debit(7)),
            Err(LedgerError::Conflict)
        );
        assert_eq!(ledger.balance(1), Some(900));
    }

    #[test]
    fn deposit_tops_up_outside_of_wagering() {
        let ledger = gateway(1_000);
        assert_eq!(ledger.deposit(1, 500), 500);
        assert_eq!(ledger.deposit(1, 250), 750);
        // An account created by deposit is not re-seeded later.
        assert_eq!(ledger.ensure_account(1), 750);
    }

    #[test]
    fn ensure_account_seeds_once() {
        let ledger = gateway(1_000);
        assert_eq!(ledger.ensure_account(1), 1_000);
        assert_eq!(ledger.debit(1, 400, OpKey::debit(1)), Ok(600));
        assert_eq!(ledger.ensure_account(1), 600);
    }

    #[test]
    fn concurrent_same_player_debits_never_overspend() {
        let ledger = Arc::new(gateway(50));
        ledger.ensure_account(1);

        let mut handles = Vec::new();
        for bet_id in 0..100u64 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || {
                ledger.debit(1, 1, OpKey::debit(bet_id)).is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().expect("debit thread panicked"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 50);
        assert_eq!(ledger.balance(1), Some(0));
    }
}
