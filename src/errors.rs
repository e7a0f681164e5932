//! Error taxonomy for the round engine.
//!
//! Every variant here is recoverable by the caller: bet and cash-out
//! rejections are reported back to the originating connection and never
//! abort the round loop. Storage failures during settlement are retried
//! by the engine itself with the same idempotency keys.

use thiserror::Error;

/// Rejection reasons for `place-bet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BetError {
    /// Bets are only accepted during the betting window.
    #[error("bets are not accepted in the current phase")]
    WrongPhase,

    /// One bet per player per round.
    #[error("player already has a bet in this round")]
    Duplicate,

    /// Amount outside the configured [min_bet, max_bet] range.
    #[error("bet amount is outside the allowed range")]
    OutOfRange,

    /// The ledger refused the stake debit.
    #[error("insufficient balance")]
    InsufficientFunds,
}

/// Rejection reasons for `cash-out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CashoutError {
    /// Cash-outs are only accepted while the multiplier is running.
    #[error("the round is not running")]
    WrongPhase,

    /// No active bet with that id belonging to the caller.
    #[error("bet not found or already resolved")]
    NotFound,

    /// The multiplier had already reached the crash point when the
    /// command was processed; the bet settles as lost.
    #[error("too late, the round already crashed")]
    TooLate,
}

/// Failures surfaced by the balance ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,

    /// An operation key was replayed with different parameters.
    #[error("operation conflicts with a previously applied operation")]
    Conflict,
}

/// The engine task is gone; only happens during process teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("round engine unavailable")]
    Unavailable,
}
