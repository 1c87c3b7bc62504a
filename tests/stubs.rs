use std::sync::Arc;

use parking_lot::Mutex;
use turnpike::{
    Address, ChannelError, ChannelResult, ChannelSession, ChannelSubmission, Config, EventRelay,
    FraudProof, GameStore, LedgerClient, LocalRelay, MemoryStore, PeerEvent, Placement, Ply,
    PostedState, Receipt, SerializedGame, SessionBuilder, Signature, Signer,
};

/// A deterministic signer: the signature is the identity followed by the
/// message bytes. Nothing verifies signatures, so determinism is all that
/// matters.
pub struct StubSigner {
    identity: Address,
}

impl StubSigner {
    #[allow(dead_code)]
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            identity: Address::new(name),
        }
    }
}

impl Signer for StubSigner {
    fn identity(&self) -> &Address {
        &self.identity
    }

    fn sign(&mut self, message: &[u8]) -> ChannelResult<Signature> {
        let mut bytes = self.identity.as_str().as_bytes().to_vec();
        bytes.push(b':');
        bytes.extend_from_slice(message);
        Ok(Signature::from_bytes(&bytes))
    }
}

/// What the scripted chain currently holds. Shared between both parties'
/// ledger clients and inspected by tests.
#[derive(Debug, Default)]
pub struct ChainState {
    pub posted_turn: Ply,
    pub over: bool,
    pub raw_deadline: u64,
    pub submissions: Vec<ChannelSubmission>,
    pub fraud_claims: Vec<FraudProof>,
    pub disputes: u32,
    pub manual_timeouts: u32,
    pub timeout_claims: u32,
    pub answers: Vec<(u8, u8)>,
}

/// A scriptable [`LedgerClient`] over a shared [`ChainState`].
#[derive(Clone)]
pub struct StubLedger {
    pub chain: Arc<Mutex<ChainState>>,
    /// The raw deadline the chain sets when a timeout clock starts.
    pub deadline_on_trigger: u64,
    /// Fail this many fraud claims before accepting one.
    pub fail_fraud_claims: Arc<Mutex<u32>>,
    /// When set, reads fail. Used to force a pending reconcile.
    pub fail_reads: Arc<Mutex<bool>>,
}

impl StubLedger {
    #[allow(dead_code)]
    #[must_use]
    pub fn new(chain: Arc<Mutex<ChainState>>, deadline_on_trigger: u64) -> Self {
        Self {
            chain,
            deadline_on_trigger,
            fail_fraud_claims: Arc::new(Mutex::new(0)),
            fail_reads: Arc::new(Mutex::new(false)),
        }
    }

    fn receipt(op: &str) -> Receipt {
        Receipt { tx: op.to_owned() }
    }
}

impl LedgerClient for StubLedger {
    fn posted_state(&mut self, _session: turnpike::SessionId) -> ChannelResult<PostedState> {
        if *self.fail_reads.lock() {
            return Err(ChannelError::Ledger {
                context: "scripted read failure".to_owned(),
            });
        }
        let chain = self.chain.lock();
        Ok(PostedState {
            posted_turn: chain.posted_turn,
            over: chain.over,
        })
    }

    fn timeout_deadline(&mut self, _session: turnpike::SessionId) -> ChannelResult<u64> {
        if *self.fail_reads.lock() {
            return Err(ChannelError::Ledger {
                context: "scripted read failure".to_owned(),
            });
        }
        Ok(self.chain.lock().raw_deadline)
    }

    fn trigger_manual_timeout(&mut self, _session: turnpike::SessionId) -> ChannelResult<Receipt> {
        let mut chain = self.chain.lock();
        chain.manual_timeouts += 1;
        chain.raw_deadline = self.deadline_on_trigger;
        Ok(Self::receipt("manual-timeout"))
    }

    fn answer_timeout(
        &mut self,
        _session: turnpike::SessionId,
        row: u8,
        col: u8,
    ) -> ChannelResult<Receipt> {
        let mut chain = self.chain.lock();
        chain.answers.push((row, col));
        chain.posted_turn = chain.posted_turn.next();
        chain.raw_deadline = 0;
        Ok(Self::receipt("answer"))
    }

    fn claim_timeout_win(&mut self, _session: turnpike::SessionId) -> ChannelResult<Receipt> {
        let mut chain = self.chain.lock();
        chain.timeout_claims += 1;
        chain.over = true;
        chain.raw_deadline = 0;
        Ok(Self::receipt("timeout-win"))
    }

    fn claim_fraud_win(&mut self, proof: &FraudProof) -> ChannelResult<Receipt> {
        let mut remaining = self.fail_fraud_claims.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ChannelError::Ledger {
                context: "scripted fraud claim failure".to_owned(),
            });
        }
        drop(remaining);
        let mut chain = self.chain.lock();
        chain.fraud_claims.push(proof.clone());
        chain.over = true;
        chain.raw_deadline = 0;
        Ok(Self::receipt("fraud-win"))
    }

    fn dispute_timeout(
        &mut self,
        _session: turnpike::SessionId,
        _placement: &Placement,
        _signature: &Signature,
    ) -> ChannelResult<Receipt> {
        let mut chain = self.chain.lock();
        chain.disputes += 1;
        chain.raw_deadline = 0;
        Ok(Self::receipt("dispute"))
    }

    fn submit_channel(
        &mut self,
        _session: turnpike::SessionId,
        submission: &ChannelSubmission,
    ) -> ChannelResult<Receipt> {
        let mut chain = self.chain.lock();
        chain.posted_turn = submission.resumes_from + submission.artifacts.len() as u32;
        if submission
            .artifacts
            .last()
            .is_some_and(|artifact| artifact.timeout)
        {
            // a timeout-flagged tail starts the clock
            chain.raw_deadline = self.deadline_on_trigger;
        }
        chain.submissions.push(submission.clone());
        Ok(Self::receipt("submit"))
    }
}

pub struct StubConfig;

impl Config for StubConfig {
    type Signer = StubSigner;
    type Ledger = StubLedger;
    type Store = MemoryStore;
}

/// A relay that never acknowledges. Operations gated on the ack must leave
/// the aggregate untouched.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct NackRelay;

impl EventRelay for NackRelay {
    fn send(&mut self, _event: &PeerEvent) -> bool {
        false
    }

    fn poll(&mut self) -> Vec<PeerEvent> {
        Vec::new()
    }
}

/// A relay whose acknowledgements can be switched off mid-test.
#[allow(dead_code)]
pub struct FlakyRelay {
    inner: LocalRelay,
    pub ack: Arc<Mutex<bool>>,
}

impl FlakyRelay {
    #[allow(dead_code)]
    #[must_use]
    pub fn new(inner: LocalRelay) -> (Self, Arc<Mutex<bool>>) {
        let ack = Arc::new(Mutex::new(true));
        (
            Self {
                inner,
                ack: Arc::clone(&ack),
            },
            ack,
        )
    }
}

impl EventRelay for FlakyRelay {
    fn send(&mut self, event: &PeerEvent) -> bool {
        if *self.ack.lock() {
            self.inner.send(event)
        } else {
            false
        }
    }

    fn poll(&mut self) -> Vec<PeerEvent> {
        self.inner.poll()
    }
}

/// A store whose writes always fail. Commits must warn and continue.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

impl GameStore for FailingStore {
    fn load(&mut self, _identity: &Address) -> ChannelResult<Option<SerializedGame>> {
        Ok(None)
    }

    fn store(&mut self, _identity: &Address, _game: &SerializedGame) -> ChannelResult<()> {
        Err(ChannelError::CorruptSnapshot {
            context: "scripted store failure".to_owned(),
        })
    }
}

#[allow(dead_code)]
pub struct FailingStoreConfig;

impl Config for FailingStoreConfig {
    type Signer = StubSigner;
    type Ledger = StubLedger;
    type Store = FailingStore;
}

/// Everything a scripted two-party game needs, with outside handles on the
/// shared chain, both stores and both relay endpoints.
#[allow(dead_code)]
pub struct TestPair {
    pub host: ChannelSession<StubConfig>,
    pub challenger: ChannelSession<StubConfig>,
    pub chain: Arc<Mutex<ChainState>>,
    pub host_store: MemoryStore,
    pub challenger_store: MemoryStore,
    /// Clone of the host's ledger; shares its scripted failure flags.
    pub host_ledger: StubLedger,
    /// Clone of the challenger's ledger; shares its scripted failure flags.
    pub challenger_ledger: StubLedger,
    /// Extra endpoint sharing the host-bound queue; whatever this sends,
    /// the host polls. Used to inject crafted events.
    pub to_host: LocalRelay,
    /// Extra endpoint sharing the challenger-bound queue.
    pub to_challenger: LocalRelay,
}

#[allow(dead_code)]
pub const NOW: u64 = 1_700_000_000;

/// Builds a joined, commenced pair of sessions ready to play.
#[allow(dead_code)]
pub fn commenced_pair() -> TestPair {
    init_tracing();
    let chain = Arc::new(Mutex::new(ChainState::default()));
    let host_store = MemoryStore::new();
    let challenger_store = MemoryStore::new();
    let (host_relay, challenger_relay) = LocalRelay::pair();
    let to_host = challenger_relay.clone();
    let to_challenger = host_relay.clone();
    let host_ledger = StubLedger::new(Arc::clone(&chain), NOW);
    let challenger_ledger = StubLedger::new(Arc::clone(&chain), NOW);

    let mut host = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("host"))
        .with_ledger(host_ledger.clone())
        .with_store(host_store.clone())
        .with_relay(Box::new(host_relay))
        .start_hosting()
        .expect("hosting never fails with complete collaborators");

    let mut challenger = SessionBuilder::<StubConfig>::new()
        .with_signer(StubSigner::new("challenger"))
        .with_ledger(challenger_ledger.clone())
        .with_store(challenger_store.clone())
        .with_relay(Box::new(challenger_relay))
        .start_joining(Address::new("host"), NOW)
        .expect("joining over a local relay never nacks");

    host.poll_events();
    host.commence().expect("commence after a valid join");
    challenger.poll_events();

    TestPair {
        host,
        challenger,
        chain,
        host_store,
        challenger_store,
        host_ledger,
        challenger_ledger,
        to_host,
        to_challenger,
    }
}

/// Drives one full bilateral turn: propose, countersign, finalize, with the
/// event polls in between.
#[allow(dead_code)]
pub fn play_turn(
    mover: &mut ChannelSession<StubConfig>,
    other: &mut ChannelSession<StubConfig>,
    row: u8,
    col: u8,
) {
    mover
        .propose_move(row, col)
        .unwrap_or_else(|err| panic!("propose ({row}, {col}): {err}"));
    other.poll_events();
    other
        .countersign_pending()
        .unwrap_or_else(|err| panic!("countersign ({row}, {col}): {err}"));
    mover.poll_events();
    mover
        .finalize_pending()
        .unwrap_or_else(|err| panic!("finalize ({row}, {col}): {err}"));
    other.poll_events();
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
