mod stubs;

use std::sync::Arc;

use parking_lot::Mutex;
use stubs::{commenced_pair, init_tracing, play_turn, ChainState, StubConfig, StubLedger,
    StubSigner, NOW};
use turnpike::{
    Address, ChannelError, GameStore, LocalRelay, MemoryStore, Ply, ReconcileOutcome,
    SessionBuilder, SessionEvent, SessionPhase,
};

#[test]
fn test_resume_without_a_stored_game_is_refused() {
    init_tracing();
    let chain = Arc::new(Mutex::new(ChainState::default()));
    let err = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(StubLedger::new(chain, NOW))
        .with_store(MemoryStore::new())
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .unwrap_err();
    assert_eq!(err, ChannelError::NoStoredSession);
}

#[test]
fn test_restart_repairs_a_posted_gap() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    play_turn(&mut pair.challenger, &mut pair.host, 1, 1);
    drop(pair.host);

    // the chain advanced to three posted turns while this client was away
    pair.chain.lock().posted_turn = Ply::new(3);

    let mut resumed = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(StubLedger::new(Arc::clone(&pair.chain), NOW))
        .with_store(pair.host_store.clone())
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .expect("resume from the stored snapshot");

    assert!(!resumed.reconcile_pending());
    let events: Vec<_> = resumed.events().collect();
    assert_eq!(
        events,
        vec![SessionEvent::Reconciled {
            outcome: ReconcileOutcome::Repaired
        }]
    );

    let game = resumed.game();
    assert_eq!(game.last_posted(), Ply::new(3));
    assert_eq!(game.turn_index(), Ply::new(3));
    let channel = game.channel().expect("channel survives hydration");
    assert!(channel.is_continued());
    assert_eq!(channel.start(), Ply::new(3));
    // the two locally known turns remain; the third lives only on-chain
    assert_eq!(game.turns().len(), 2);
    assert_eq!(resumed.phase(), SessionPhase::Playing);
}

#[test]
fn test_restart_with_a_matching_ledger_is_clean() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    let before = pair.host_store.clone();
    drop(pair.host);

    let mut resumed = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(StubLedger::new(Arc::clone(&pair.chain), NOW))
        .with_store(before)
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .expect("resume");

    let events: Vec<_> = resumed.events().collect();
    assert_eq!(
        events,
        vec![SessionEvent::Reconciled {
            outcome: ReconcileOutcome::Clean
        }]
    );
    assert_eq!(resumed.game().turn_index(), Ply::new(1));
    assert_eq!(resumed.game().last_posted(), Ply::ZERO);
}

#[test]
fn test_resume_learns_the_peer_settled_while_offline() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    drop(pair.host);

    {
        let mut chain = pair.chain.lock();
        chain.over = true;
        chain.posted_turn = Ply::new(1);
    }

    let resumed = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(StubLedger::new(Arc::clone(&pair.chain), NOW))
        .with_store(pair.host_store.clone())
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .expect("resume");

    assert!(resumed.game().is_over());
    assert_eq!(resumed.phase(), SessionPhase::Over);
}

#[test]
fn test_failed_startup_reconcile_leaves_the_session_read_only() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    play_turn(&mut pair.challenger, &mut pair.host, 1, 1);
    drop(pair.host);

    let ledger = StubLedger::new(Arc::clone(&pair.chain), NOW);
    *ledger.fail_reads.lock() = true;

    let mut resumed = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(ledger.clone())
        .with_store(pair.host_store.clone())
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .expect("an unreachable ledger still yields a session");

    assert!(resumed.reconcile_pending());
    assert_eq!(resumed.phase(), SessionPhase::Reconciling);
    assert_eq!(
        resumed.propose_move(2, 2).unwrap_err(),
        ChannelError::ReconcilePending
    );

    // once the ledger recovers, an explicit reconcile reopens writes
    *ledger.fail_reads.lock() = false;
    let outcome = resumed.reconcile().expect("reconcile after recovery");
    assert_eq!(outcome, ReconcileOutcome::Clean);
    assert!(!resumed.reconcile_pending());
    resumed.propose_move(2, 2).expect("writes resume");
}

#[test]
fn test_resume_rejects_a_tampered_snapshot() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    drop(pair.host);

    let host = Address::new("host");
    let mut snapshot = pair
        .host_store
        .load(&host)
        .expect("load")
        .expect("snapshot exists");
    snapshot.last_posted = Ply::new(9);
    pair.host_store.store(&host, &snapshot).expect("store");

    let err = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(StubLedger::new(Arc::clone(&pair.chain), NOW))
        .with_store(pair.host_store.clone())
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .unwrap_err();
    assert!(matches!(err, ChannelError::CorruptSnapshot { .. }));
}

#[test]
fn test_resume_rejects_a_snapshot_for_someone_else() {
    let mut pair = commenced_pair();
    play_turn(&mut pair.host, &mut pair.challenger, 0, 0);
    drop(pair.host);

    // mallory's store somehow holds the host's game under mallory's key
    let snapshot = pair
        .host_store
        .load(&Address::new("host"))
        .expect("load")
        .expect("snapshot exists");
    let mut mallory_store = MemoryStore::new();
    mallory_store
        .store(&Address::new("mallory"), &snapshot)
        .expect("store");

    let err = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("mallory"))
        .with_ledger(StubLedger::new(Arc::clone(&pair.chain), NOW))
        .with_store(mallory_store)
        .with_relay(Box::new(LocalRelay::pair().0))
        .resume()
        .unwrap_err();
    assert!(matches!(err, ChannelError::CorruptSnapshot { .. }));
}
