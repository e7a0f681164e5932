//! The authoritative round state machine.
//!
//! One spawned task owns all round and bet state. Every external
//! command (place-bet, cash-out, snapshot) is delivered through a
//! single mpsc queue and processed serially between timer wake-ups, so
//! phase checks and settlement act atomically on the state they read.
//! The task is the sole writer; no locks guard round state itself.

use crate::broadcast::{BroadcastHub, GameEvent};
use crate::clock;
use crate::config::CrashwaveConfig;
use crate::errors::{BetError, CashoutError, EngineError, LedgerError};
use crate::fairness;
use crate::history::{HistoryStore, RoundHistoryEntry};
use crate::ledger::{LedgerGateway, OpKey};
use crate::metrics::EngineMetrics;
use crate::round::{
    Bet, BetStatus, CurrentGame, Multiplier, PlayerId, Round, RoundSnapshot, RoundStatus,
};
use chrono::Utc;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, sleep_until, MissedTickBehavior};
use tracing::{debug, error, info};

/// Commands delivered into the engine's serialized queue.
#[derive(Debug)]
pub enum Command {
    PlaceBet {
        player_id: PlayerId,
        amount: u64,
        reply: oneshot::Sender<Result<Bet, BetError>>,
    },
    CashOut {
        player_id: PlayerId,
        bet_id: u64,
        reply: oneshot::Sender<Result<Bet, CashoutError>>,
    },
    Snapshot {
        reply: oneshot::Sender<CurrentGame>,
    },
}

/// Cheap cloneable handle for submitting commands to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub async fn place_bet(
        &self,
        player_id: PlayerId,
        amount: u64,
    ) -> Result<Result<Bet, BetError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::PlaceBet {
                player_id,
                amount,
                reply,
            })
            .await
            .map_err(|_| EngineError::Unavailable)?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }

    pub async fn cash_out(
        &self,
        player_id: PlayerId,
        bet_id: u64,
    ) -> Result<Result<Bet, CashoutError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::CashOut {
                player_id,
                bet_id,
                reply,
            })
            .await
            .map_err(|_| EngineError::Unavailable)?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }

    /// Full public state for late joiners and the `/current` endpoint.
    pub async fn snapshot(&self) -> Result<CurrentGame, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| EngineError::Unavailable)?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }
}

pub struct RoundEngine {
    config: CrashwaveConfig,
    ledger: Arc<LedgerGateway>,
    history: Arc<HistoryStore>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<EngineMetrics>,
    rx: mpsc::Receiver<Command>,
    round: Round,
    bets: HashMap<u64, Bet>,
    bet_by_player: HashMap<PlayerId, u64>,
    next_round_id: u64,
    next_bet_id: u64,
    /// Monotonic anchor for the growth curve while RUNNING.
    run_started: Option<Instant>,
    betting_ends_at: Option<tokio::time::Instant>,
}

impl RoundEngine {
    /// Spawn the engine task and return the command handle.
    pub fn spawn(
        config: CrashwaveConfig,
        ledger: Arc<LedgerGateway>,
        history: Arc<HistoryStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<EngineMetrics>,
    ) -> EngineHandle {
        let (tx, rx) = mpsc::channel(1024);
        let engine = Self::new(config, ledger, history, hub, metrics, rx);
        tokio::spawn(engine.run());
        EngineHandle { tx }
    }

    fn new(
        config: CrashwaveConfig,
        ledger: Arc<LedgerGateway>,
        history: Arc<HistoryStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<EngineMetrics>,
        rx: mpsc::Receiver<Command>,
    ) -> Self {
        // Pre-genesis placeholder; the run loop immediately opens round 1.
        let round = Round {
            id: 0,
            status: RoundStatus::Crashed,
            server_seed: [0u8; 32],
            server_seed_hash: String::new(),
            client_seed: config.fairness.client_seed.clone(),
            nonce: 0,
            crash_point: None,
            started_at: None,
            crashed_at: None,
        };
        Self {
            config,
            ledger,
            history,
            hub,
            metrics,
            rx,
            round,
            bets: HashMap::new(),
            bet_by_player: HashMap::new(),
            next_round_id: 1,
            next_bet_id: 1,
            run_started: None,
            betting_ends_at: None,
        }
    }

    async fn run(mut self) {
        info!("round engine started");
        loop {
            self.open_betting();
            if !self.waiting_phase().await {
                break;
            }
            let crash_point = self.begin_running();
            if !self.running_phase(crash_point).await {
                break;
            }
            self.settle_round(crash_point).await;
            if !self.cooldown_phase().await {
                break;
            }
        }
        info!("command channel closed, round engine stopping");
    }

    // --- phase transitions -------------------------------------------------

    fn open_betting(&mut self) {
        self.round = self.make_round();
        self.bets.clear();
        self.bet_by_player.clear();
        self.run_started = None;
        self.betting_ends_at =
            Some(tokio::time::Instant::now() + self.config.game.betting_window());

        self.hub.publish(GameEvent::NewGame {
            round_id: self.round.id,
            countdown_seconds: self.config.game.betting_window_ms / 1_000,
            server_seed_hash: self.round.server_seed_hash.clone(),
            client_seed: self.round.client_seed.clone(),
            nonce: self.round.nonce,
        });
        info!(round_id = self.round.id, "betting open");
    }

    fn make_round(&mut self) -> Round {
        let id = self.next_round_id;
        self.next_round_id += 1;

        let mut server_seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut server_seed);

        Round {
            id,
            status: RoundStatus::Waiting,
            server_seed,
            server_seed_hash: fairness::hash_server_seed(&server_seed),
            client_seed: self.config.fairness.client_seed.clone(),
            nonce: id,
            crash_point: None,
            started_at: None,
            crashed_at: None,
        }
    }

    /// Fix the crash point, freeze the bet set, start the clock.
    fn begin_running(&mut self) -> Multiplier {
        let crash_point = fairness::compute_crash_point(
            &self.round.server_seed,
            &self.round.client_seed,
            self.round.nonce,
            &self.config.fairness,
        );
        self.round.crash_point = Some(crash_point);
        self.round.status = RoundStatus::Running;
        self.round.started_at = Some(Utc::now());
        self.run_started = Some(Instant::now());
        self.betting_ends_at = None;

        self.hub.publish(GameEvent::GameStarted {
            round_id: self.round.id,
        });
        debug!(round_id = self.round.id, %crash_point, bets = self.bets.len(), "round running");
        crash_point
    }

    async fn settle_round(&mut self, crash_point: Multiplier) {
        self.round.status = RoundStatus::Crashed;
        self.round.crashed_at = Some(Utc::now());

        let mut lost = 0u64;
        for bet in self.bets.values_mut() {
            if bet.status == BetStatus::Active {
                bet.status = BetStatus::Lost;
                lost += 1;
            }
        }
        self.metrics.bets_lost_total.inc_by(lost);

        let entry = self.history_entry(crash_point);
        self.persist_settlement(&entry).await;

        self.hub.publish(GameEvent::GameCrashed {
            crash_point,
            server_seed: hex::encode(self.round.server_seed),
            server_seed_hash: self.round.server_seed_hash.clone(),
            client_seed: self.round.client_seed.clone(),
            nonce: self.round.nonce,
        });
        self.metrics.rounds_total.inc();
        info!(
            round_id = self.round.id,
            %crash_point,
            bets = self.bets.len(),
            "round crashed"
        );
    }

    fn history_entry(&self, crash_point: Multiplier) -> RoundHistoryEntry {
        let total_wagered = self.bets.values().map(|b| b.amount).sum();
        let total_payout = self.bets.values().filter_map(|b| b.payout).sum();
        RoundHistoryEntry {
            round_id: self.round.id,
            crash_point,
            server_seed: hex::encode(self.round.server_seed),
            server_seed_hash: self.round.server_seed_hash.clone(),
            client_seed: self.round.client_seed.clone(),
            nonce: self.round.nonce,
            total_bets: self.bets.len() as u64,
            total_wagered,
            total_payout,
            started_at: self.round.started_at.unwrap_or_else(Utc::now),
            crashed_at: self.round.crashed_at.unwrap_or_else(Utc::now),
        }
    }

    /// The round may not advance with unsettled bets: retry the atomic
    /// history/stats commit until it lands. An outage here stalls the
    /// table, which is the accepted trade-off for never losing a
    /// settlement.
    async fn persist_settlement(&self, entry: &RoundHistoryEntry) {
        let bets = self.roster();
        let mut backoff = Duration::from_millis(50);
        let mut attempt = 0u32;
        loop {
            match self.history.commit_round(entry, &bets) {
                Ok(()) => {
                    if attempt > 0 {
                        info!(round_id = entry.round_id, attempt, "settlement persisted after retries");
                    }
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    error!(
                        round_id = entry.round_id,
                        attempt,
                        error = %e,
                        "settlement persistence failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
            }
        }
    }

    // --- phase loops -------------------------------------------------------

    /// Returns false once the command channel closes.
    async fn waiting_phase(&mut self) -> bool {
        let deadline = self
            .betting_ends_at
            .unwrap_or_else(tokio::time::Instant::now);
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => return false,
                },
            }
        }
    }

    async fn running_phase(&mut self, crash_point: Multiplier) -> bool {
        let mut ticker = interval(self.config.game.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = self.current_multiplier();
                    if current >= crash_point {
                        // Never show a value at or past the crash point;
                        // the reveal happens in game-crashed.
                        return true;
                    }
                    self.hub.publish(GameEvent::MultiplierUpdate { multiplier: current });
                }
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => return false,
                },
            }
        }
    }

    async fn cooldown_phase(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.game.cooldown();
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => return false,
                },
            }
        }
    }

    // --- command processing ------------------------------------------------

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::PlaceBet {
                player_id,
                amount,
                reply,
            } => {
                let result = self.place_bet(player_id, amount);
                if result.is_ok() {
                    self.hub.publish(GameEvent::BetsUpdate { bets: self.roster() });
                }
                let _ = reply.send(result);
            }
            Command::CashOut {
                player_id,
                bet_id,
                reply,
            } => {
                let result = self.cash_out(player_id, bet_id);
                if result.is_ok() {
                    self.hub.publish(GameEvent::BetsUpdate { bets: self.roster() });
                }
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn place_bet(&mut self, player_id: PlayerId, amount: u64) -> Result<Bet, BetError> {
        if self.round.status != RoundStatus::Waiting {
            return Err(BetError::WrongPhase);
        }
        if self.bet_by_player.contains_key(&player_id) {
            return Err(BetError::Duplicate);
        }
        let game = &self.config.game;
        if amount < game.min_bet || amount > game.max_bet {
            return Err(BetError::OutOfRange);
        }

        self.ledger.ensure_account(player_id);
        let bet_id = self.next_bet_id;
        self.next_bet_id += 1;
        match self.ledger.debit(player_id, amount, OpKey::debit(bet_id)) {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds) => return Err(BetError::InsufficientFunds),
            Err(e) => {
                // Fresh debit keys cannot conflict; nothing was taken.
                error!(bet_id, error = %e, "stake debit rejected by ledger");
                return Err(BetError::InsufficientFunds);
            }
        }

        let bet = Bet {
            id: bet_id,
            round_id: self.round.id,
            player_id,
            amount,
            status: BetStatus::Active,
            cashout_multiplier: None,
            payout: None,
        };
        self.bets.insert(bet_id, bet.clone());
        self.bet_by_player.insert(player_id, bet_id);
        self.metrics.bets_placed_total.inc();
        self.metrics.coins_wagered_total.inc_by(amount);
        debug!(player_id, bet_id, amount, "bet placed");
        Ok(bet)
    }

    fn cash_out(&mut self, player_id: PlayerId, bet_id: u64) -> Result<Bet, CashoutError> {
        if self.round.status != RoundStatus::Running {
            return Err(CashoutError::WrongPhase);
        }
        let (Some(run_started), Some(crash_point)) = (self.run_started, self.round.crash_point)
        else {
            return Err(CashoutError::WrongPhase);
        };
        let current = clock::multiplier_at(run_started.elapsed(), self.config.game.growth_tau());

        let Some(bet) = self.bets.get_mut(&bet_id) else {
            return Err(CashoutError::NotFound);
        };
        if bet.player_id != player_id || bet.status != BetStatus::Active {
            return Err(CashoutError::NotFound);
        }
        // The crash may be logically decided before its tick lands; a
        // cash-out processed past the point settles as lost.
        if current >= crash_point {
            return Err(CashoutError::TooLate);
        }

        let payout = current.payout(bet.amount);
        if let Err(e) = self.ledger.credit(player_id, payout, OpKey::credit(bet_id)) {
            error!(bet_id, error = %e, "payout credit rejected by ledger");
            return Err(CashoutError::NotFound);
        }
        bet.status = BetStatus::CashedOut;
        bet.cashout_multiplier = Some(current);
        bet.payout = Some(payout);
        self.metrics.cashouts_total.inc();
        self.metrics.coins_paid_out_total.inc_by(payout);
        debug!(player_id, bet_id, %current, payout, "bet cashed out");
        Ok(bet.clone())
    }

    // --- views -------------------------------------------------------------

    fn current_multiplier(&self) -> Multiplier {
        match self.run_started {
            Some(started) => {
                clock::multiplier_at(started.elapsed(), self.config.game.growth_tau())
            }
            None => Multiplier::ONE,
        }
    }

    fn snapshot(&self) -> CurrentGame {
        CurrentGame {
            round: self.round_snapshot(),
            bets: self.roster(),
        }
    }

    fn round_snapshot(&self) -> RoundSnapshot {
        let multiplier = match self.round.status {
            RoundStatus::Waiting => Multiplier::ONE,
            RoundStatus::Running => {
                let current = self.current_multiplier();
                // Cap at the crash point so a snapshot taken between the
                // logical crash and its tick never overshoots it.
                match self.round.crash_point {
                    Some(crash_point) => current.min(crash_point),
                    None => current,
                }
            }
            RoundStatus::Crashed => self.round.crash_point.unwrap_or(Multiplier::ONE),
        };
        let countdown_ms = match self.round.status {
            RoundStatus::Waiting => self.betting_ends_at.map(|deadline| {
                deadline
                    .saturating_duration_since(tokio::time::Instant::now())
                    .as_millis() as u64
            }),
            _ => None,
        };
        RoundSnapshot {
            round_id: self.round.id,
            status: self.round.status,
            multiplier,
            countdown_ms,
            server_seed_hash: self.round.server_seed_hash.clone(),
            client_seed: self.round.client_seed.clone(),
            nonce: self.round.nonce,
            crash_point: match self.round.status {
                RoundStatus::Crashed => self.round.crash_point,
                _ => None,
            },
        }
    }

    fn roster(&self) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self.bets.values().cloned().collect();
        bets.sort_by_key(|b| b.id);
        bets
    }
}
