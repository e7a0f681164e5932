//! End-to-end round lifecycle through the real engine task: betting,
//! phase enforcement, cash-out, settlement, history, stats, and balance
//! conservation, all observed over the broadcast hub.

use crashwave::broadcast::GameEvent;
use crashwave::errors::{BetError, CashoutError};
use crashwave::{
    fairness, BroadcastHub, CrashwaveConfig, EngineHandle, EngineMetrics, HistoryStore,
    LedgerGateway, Multiplier, RoundEngine, RoundStatus, Storage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;
use uuid::Uuid;

struct Harness {
    config: CrashwaveConfig,
    engine: EngineHandle,
    ledger: Arc<LedgerGateway>,
    history: Arc<HistoryStore>,
    events: Receiver<GameEvent>,
    _dir: tempfile::TempDir,
}

fn start_engine() -> Harness {
    let config = CrashwaveConfig::fast_rounds();
    let dir = tempfile::tempdir().expect("temp dir");
    let storage = Storage::open(dir.path()).expect("open storage");
    let history = Arc::new(HistoryStore::new(storage));
    let ledger = Arc::new(LedgerGateway::new(config.ledger.clone()));
    let hub = Arc::new(BroadcastHub::new());
    let metrics = Arc::new(EngineMetrics::new());

    // Subscribe before spawning so round 1's new-game is not missed.
    let events = hub.subscribe(Uuid::new_v4());
    let engine = RoundEngine::spawn(
        config.clone(),
        ledger.clone(),
        history.clone(),
        hub,
        metrics,
    );

    Harness {
        config,
        engine,
        ledger,
        history,
        events,
        _dir: dir,
    }
}

async fn next_event(rx: &mut Receiver<GameEvent>) -> GameEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("broadcast hub closed")
}

async fn wait_for<F>(rx: &mut Receiver<GameEvent>, mut pred: F) -> GameEvent
where
    F: FnMut(&GameEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn full_round_settles_bets_history_and_stats() {
    let mut harness = start_engine();
    let starting_balance = harness.config.ledger.starting_balance;

    let new_game = wait_for(&mut harness.events, |e| {
        matches!(e, GameEvent::NewGame { .. })
    })
    .await;
    let GameEvent::NewGame {
        round_id,
        server_seed_hash: committed_hash,
        ..
    } = new_game
    else {
        unreachable!()
    };

    // Cash-outs are rejected while the round is still waiting.
    assert_eq!(
        harness.engine.cash_out(1, 1).await.unwrap(),
        Err(CashoutError::WrongPhase)
    );

    let bet_a = harness.engine.place_bet(1, 100).await.unwrap().unwrap();
    assert_eq!(
        harness.engine.place_bet(1, 50).await.unwrap(),
        Err(BetError::Duplicate)
    );
    assert_eq!(
        harness.engine.place_bet(2, 5).await.unwrap(),
        Err(BetError::OutOfRange)
    );
    let _bet_b = harness.engine.place_bet(3, 250).await.unwrap().unwrap();

    let current = harness.engine.snapshot().await.unwrap();
    assert_eq!(current.round.status, RoundStatus::Waiting);
    assert_eq!(current.round.round_id, round_id);
    assert_eq!(current.bets.len(), 2);

    wait_for(&mut harness.events, |e| {
        matches!(e, GameEvent::GameStarted { .. })
    })
    .await;

    // Bets freeze once the multiplier is running.
    assert_eq!(
        harness.engine.place_bet(4, 100).await.unwrap(),
        Err(BetError::WrongPhase)
    );

    // Cash out right after the start. Depending on the drawn crash
    // point this either succeeds or the round is already (logically)
    // over; both paths must settle consistently.
    let cashout = harness.engine.cash_out(1, bet_a.id).await.unwrap();

    let mut updates: Vec<Multiplier> = Vec::new();
    let crashed = loop {
        match next_event(&mut harness.events).await {
            GameEvent::MultiplierUpdate { multiplier } => updates.push(multiplier),
            crashed @ GameEvent::GameCrashed { .. } => break crashed,
            _ => {}
        }
    };
    let GameEvent::GameCrashed {
        crash_point,
        server_seed_hash: revealed_hash,
        ..
    } = crashed
    else {
        unreachable!()
    };

    // The reveal matches the pre-round commitment, ticks are monotone,
    // and no broadcast value ever reached the crash point.
    assert_eq!(revealed_hash, committed_hash);
    for pair in updates.windows(2) {
        assert!(pair[0] <= pair[1], "multiplier went backwards");
    }
    for update in &updates {
        assert!(*update < crash_point);
    }

    let recent = harness.history.recent(5).unwrap();
    assert_eq!(recent.len(), 1);
    let entry = &recent[0];
    assert_eq!(entry.round_id, round_id);
    assert_eq!(entry.crash_point, crash_point);
    assert_eq!(entry.total_bets, 2);
    assert_eq!(entry.total_wagered, 350);
    assert!(fairness::verify(entry, &harness.config.fairness));

    match cashout {
        Ok(bet) => {
            let payout = bet.payout.expect("cashed-out bet has a payout");
            let multiplier = bet.cashout_multiplier.expect("cashed-out bet has a multiplier");
            assert!(multiplier < crash_point);
            assert_eq!(payout, multiplier.payout(100));
            assert_eq!(
                harness.ledger.balance(1),
                Some(starting_balance - 100 + payout)
            );
            assert_eq!(entry.total_payout, payout);
            let stats = harness.history.stats(1).unwrap();
            assert_eq!(stats.wins, 1);
            assert_eq!(stats.best_multiplier, multiplier);
        }
        Err(CashoutError::TooLate) | Err(CashoutError::WrongPhase) => {
            // The round crashed before the command was processed.
            assert_eq!(harness.ledger.balance(1), Some(starting_balance - 100));
            assert_eq!(entry.total_payout, 0);
            assert_eq!(harness.history.stats(1).unwrap().losses, 1);
        }
        Err(other) => panic!("unexpected cash-out rejection: {other:?}"),
    }

    // The uncashed bet always settles as lost, the out-of-range bet
    // never touched the ledger, and the frozen-phase bet never created
    // an account.
    assert_eq!(harness.ledger.balance(3), Some(starting_balance - 250));
    assert_eq!(harness.history.stats(3).unwrap().losses, 1);
    assert_eq!(harness.ledger.balance(2), None);
    assert_eq!(harness.ledger.balance(4), None);
}

#[tokio::test]
async fn rounds_alternate_without_overlap() {
    let mut harness = start_engine();

    // Observe three full cycles: round ids increase by one and every
    // new-game is separated from the previous one by a crash.
    let mut last_round_id = None;
    for _ in 0..3 {
        let new_game = wait_for(&mut harness.events, |e| {
            matches!(e, GameEvent::NewGame { .. })
        })
        .await;
        let GameEvent::NewGame { round_id, .. } = new_game else {
            unreachable!()
        };
        if let Some(previous) = last_round_id {
            assert_eq!(round_id, previous + 1);
        }
        last_round_id = Some(round_id);

        let crashed = wait_for(&mut harness.events, |e| {
            matches!(e, GameEvent::GameCrashed { .. })
        })
        .await;
        let GameEvent::GameCrashed { crash_point, .. } = crashed else {
            unreachable!()
        };
        assert!(crash_point >= Multiplier::ONE);
    }
}

#[tokio::test]
async fn replayed_cashout_never_pays_twice() {
    let mut harness = start_engine();

    wait_for(&mut harness.events, |e| {
        matches!(e, GameEvent::NewGame { .. })
    })
    .await;
    let bet = harness.engine.place_bet(1, 100).await.unwrap().unwrap();
    wait_for(&mut harness.events, |e| {
        matches!(e, GameEvent::GameStarted { .. })
    })
    .await;

    let first = harness.engine.cash_out(1, bet.id).await.unwrap();
    let second = harness.engine.cash_out(1, bet.id).await.unwrap();

    if let Ok(cashed) = first {
        // The duplicate command is rejected and the balance reflects
        // exactly one credit.
        assert!(matches!(
            second,
            Err(CashoutError::NotFound) | Err(CashoutError::WrongPhase)
        ));
        let expected =
            harness.config.ledger.starting_balance - 100 + cashed.payout.unwrap_or(0);
        assert_eq!(harness.ledger.balance(1), Some(expected));
    }
}
