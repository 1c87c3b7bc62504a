//! Merging a local snapshot with ledger truth after a gap.
//!
//! A client can miss state while offline: the peer may have answered a
//! timeout, claimed a win or settled the session, all of which move the
//! chain without a peer event reaching us. The reconciler reads the ledger's
//! posted-turn count, settled flag and timeout deadline, and repairs the
//! local aggregate to agree — the ledger is always preferred over the local
//! view. Mutating session operations are refused while a reconcile is
//! pending, so no move is ever computed against a stale turn index.

use tracing::{debug, warn};
use web_time::Duration;

use crate::{
    channel::ChannelState,
    game::Game,
    ledger::{graced_deadline, LedgerClient},
    ChannelResult,
};

/// Retry pacing for failed reconciles.
///
/// The library never sleeps; callers read the schedule and apply the delay
/// between attempts themselves.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound the exponential backoff saturates at.
    pub max_delay: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconcileConfig {
    /// Fast retries for interactive clients on a responsive backend.
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Slow retries for congested chains or metered RPC endpoints.
    pub fn patient() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }

    /// The delay to apply before retry `attempt` (0-based), doubling each
    /// time and saturating at [`max_delay`](Self::max_delay).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// What a completed reconcile found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
    /// The game has no session id yet; nothing on-chain to compare against.
    NoSession,
    /// Local state already agreed with the ledger.
    Clean,
    /// The ledger had advanced past the local view; the aggregate was
    /// repaired.
    Repaired,
}

/// Runs the snapshot-vs-ledger merge and tracks whether one is outstanding.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
    pending: bool,
}

impl Reconciler {
    /// A reconciler with nothing outstanding.
    #[must_use]
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            pending: false,
        }
    }

    /// The retry pacing configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Whether a reconcile is outstanding. While true, the session refuses
    /// every mutating operation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Marks a reconcile as required before the next write.
    pub(crate) fn begin(&mut self) {
        self.pending = true;
    }

    /// Cross-checks the aggregate against the ledger and repairs divergence.
    ///
    /// On success the pending flag clears. On failure it stays set and the
    /// error is returned; retry after [`ReconcileConfig::backoff_for`].
    pub fn run<L: LedgerClient>(
        &mut self,
        game: &mut Game,
        ledger: &mut L,
    ) -> ChannelResult<ReconcileOutcome> {
        let Some(session) = game.id() else {
            self.pending = false;
            return Ok(ReconcileOutcome::NoSession);
        };

        let posted = ledger.posted_state(session)?;
        let raw_deadline = ledger.timeout_deadline(session)?;

        let outcome = if posted.posted_turn > game.last_posted {
            debug!(
                session = %session,
                local = %game.last_posted,
                posted = %posted.posted_turn,
                "ledger advanced while offline, repairing"
            );
            let repaired = match game.channel.as_ref() {
                Some(channel) => channel.continue_after(posted.posted_turn),
                None => ChannelState::continued(posted.posted_turn),
            };
            // a pending proposal below the checkpoint was superseded by
            // whatever the chain accepted; its content cannot be trusted
            if let Some(pending) = game.turns.pending(game.turn_index) {
                if pending.placement().ply() < posted.posted_turn {
                    game.turns.pop_last();
                }
            }
            game.channel = Some(repaired);
            game.last_posted = posted.posted_turn;
            if game.turn_index < posted.posted_turn {
                game.turn_index = posted.posted_turn;
            }
            ReconcileOutcome::Repaired
        } else {
            if posted.posted_turn < game.last_posted {
                // a read raced our own submission; never rewind
                warn!(
                    session = %session,
                    local = %game.last_posted,
                    posted = %posted.posted_turn,
                    "ledger reports fewer posted turns than recorded, keeping local state"
                );
            }
            ReconcileOutcome::Clean
        };

        // the ledger always wins on the settled flag and the deadline
        game.over = game.over || posted.over;
        game.timeout_deadline = graced_deadline(raw_deadline);

        self.pending = false;
        Ok(outcome)
    }
}
