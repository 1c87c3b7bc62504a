//! Benchmarks for session operations
//!
//! Run with: cargo bench --bench session
//!
//! The bilateral game benchmark drives two full sessions over an in-process
//! relay with no-op collaborators, so it measures the state machine itself
//! rather than any transport or chain.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use turnpike::{
    Address, Board, ChannelResult, ChannelSession, ChannelSubmission, Config, FraudProof,
    LocalRelay, MemoryStore, Placement, Ply, PostedState, Receipt, SessionBuilder, SessionId,
    Signature, Signer, Turn, TurnLog,
};

struct BenchSigner {
    identity: Address,
}

impl Signer for BenchSigner {
    fn identity(&self) -> &Address {
        &self.identity
    }

    fn sign(&mut self, message: &[u8]) -> ChannelResult<Signature> {
        Ok(Signature::from_bytes(message))
    }
}

/// A ledger that accepts everything and reports an empty chain.
#[derive(Default)]
struct BenchLedger;

impl turnpike::LedgerClient for BenchLedger {
    fn posted_state(&mut self, _session: SessionId) -> ChannelResult<PostedState> {
        Ok(PostedState {
            posted_turn: Ply::ZERO,
            over: false,
        })
    }

    fn timeout_deadline(&mut self, _session: SessionId) -> ChannelResult<u64> {
        Ok(0)
    }

    fn trigger_manual_timeout(&mut self, _session: SessionId) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }

    fn answer_timeout(&mut self, _session: SessionId, _row: u8, _col: u8) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }

    fn claim_timeout_win(&mut self, _session: SessionId) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }

    fn claim_fraud_win(&mut self, _proof: &FraudProof) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }

    fn dispute_timeout(
        &mut self,
        _session: SessionId,
        _placement: &Placement,
        _signature: &Signature,
    ) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }

    fn submit_channel(
        &mut self,
        _session: SessionId,
        _submission: &ChannelSubmission,
    ) -> ChannelResult<Receipt> {
        Ok(Receipt { tx: String::new() })
    }
}

struct BenchConfig;

impl Config for BenchConfig {
    type Signer = BenchSigner;
    type Ledger = BenchLedger;
    type Store = MemoryStore;
}

fn commenced_pair() -> (ChannelSession<BenchConfig>, ChannelSession<BenchConfig>) {
    let (host_relay, challenger_relay) = LocalRelay::pair();

    let mut host = SessionBuilder::<BenchConfig>::new()
        .with_signer(BenchSigner {
            identity: Address::new("host"),
        })
        .with_ledger(BenchLedger)
        .with_store(MemoryStore::new())
        .with_relay(Box::new(host_relay))
        .start_hosting()
        .expect("hosting");

    let mut challenger = SessionBuilder::<BenchConfig>::new()
        .with_signer(BenchSigner {
            identity: Address::new("challenger"),
        })
        .with_ledger(BenchLedger)
        .with_store(MemoryStore::new())
        .with_relay(Box::new(challenger_relay))
        .start_joining(Address::new("host"), 1_700_000_000)
        .expect("joining");

    host.poll_events();
    host.commence().expect("commence");
    challenger.poll_events();
    (host, challenger)
}

fn play_turn(
    mover: &mut ChannelSession<BenchConfig>,
    other: &mut ChannelSession<BenchConfig>,
    row: u8,
    col: u8,
) {
    mover.propose_move(row, col).expect("propose");
    other.poll_events();
    other.countersign_pending().expect("countersign");
    mover.poll_events();
    mover.finalize_pending().expect("finalize");
    other.poll_events();
}

fn bench_bilateral_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("bilateral game");

    group.bench_function("commence", |b| {
        b.iter(|| black_box(commenced_pair()));
    });

    // top row for the host, middle row for the challenger: a five-ply win
    group.bench_function("five plies to a win", |b| {
        b.iter(|| {
            let (mut host, mut challenger) = commenced_pair();
            play_turn(&mut host, &mut challenger, 0, 0);
            play_turn(&mut challenger, &mut host, 1, 0);
            play_turn(&mut host, &mut challenger, 0, 1);
            play_turn(&mut challenger, &mut host, 1, 1);
            play_turn(&mut host, &mut challenger, 0, 2);
            black_box((host, challenger))
        });
    });

    group.finish();
}

fn full_log() -> TurnLog {
    let session = SessionId::new(0xBE6C);
    let cells = [
        (0u8, 0u8),
        (1, 1),
        (2, 2),
        (0, 1),
        (2, 1),
        (2, 0),
        (0, 2),
        (1, 2),
        (1, 0),
    ];
    let mut log = TurnLog::new();
    for (i, &(row, col)) in cells.iter().enumerate() {
        let ply = Ply::new(i as u32);
        let sender = if i % 2 == 0 {
            Address::new("host")
        } else {
            Address::new("challenger")
        };
        let placement = Placement::new(sender, row, col, ply, session).expect("in range");
        log.append(Turn::new(placement, Signature::from_bytes(&[i as u8])))
            .expect("sequential");
    }
    log
}

fn bench_board_derivation(c: &mut Criterion) {
    let log = full_log();
    c.bench_function("derive board from a full log", |b| {
        b.iter(|| Board::derive(black_box(&log), log.len()));
    });
}

fn bench_codec(c: &mut Criterion) {
    let (mut host, mut challenger) = commenced_pair();
    play_turn(&mut host, &mut challenger, 0, 0);
    play_turn(&mut challenger, &mut host, 1, 1);
    let snapshot = turnpike::SerializedGame::from_game(host.game());

    let mut group = c.benchmark_group("codec");
    group.bench_function("encode snapshot", |b| {
        b.iter(|| turnpike::codec::encode(black_box(&snapshot)).expect("encodes"));
    });
    let bytes = turnpike::codec::encode(&snapshot).expect("encodes");
    group.bench_function("decode snapshot", |b| {
        b.iter(|| {
            turnpike::codec::decode_value::<turnpike::SerializedGame>(black_box(&bytes))
                .expect("decodes")
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_bilateral_game,
    bench_board_derivation,
    bench_codec
);
criterion_main!(benches);
