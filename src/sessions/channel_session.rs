//! The session coordinator.
//!
//! A [`ChannelSession`] owns one [`Game`] aggregate and every collaborator
//! needed to move it: the signer, the ledger client, the peer relay, the
//! store and the reconciler. Local operations and inbound peer events both
//! funnel through it, so the aggregate only ever mutates in one ordered
//! sequence; after every committed transition the session persists the game
//! and publishes a fresh snapshot.
//!
//! Two rules shape every operation:
//!
//! - **Guard first.** Every precondition is checked before any network or
//!   ledger call, so a refused action leaves no side effects anywhere.
//! - **Ack-gated commits.** An operation that notifies the peer commits
//!   local state only once the relay acknowledged the send; a nack returns
//!   [`ChannelError::Relay`] with the aggregate untouched. Operations that
//!   hit the ledger first commit regardless of the relay afterwards — the
//!   chain is authoritative and the reconciler heals a lost broadcast.

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::{
    board::Outcome,
    channel::{ChannelOpenProof, ChannelState, OpenArtifact, TurnArtifact},
    events::PeerEvent,
    game::{Game, GameStatus, SessionPhase},
    ledger::{graced_deadline, FraudProof, LedgerClient},
    persist::{GameStore, SerializedGame},
    reconcile::{ReconcileOutcome, Reconciler},
    snapshot::SnapshotCell,
    turns::{Placement, SignedPlacement, Turn},
    Address, ChannelError, ChannelResult, Config, EventRelay, Mark, Ply, SessionId, Signature,
    Signer,
};

/// Maximum number of session events to queue before the oldest are dropped.
///
/// Prevents unbounded growth when the application does not drain
/// [`ChannelSession::events`]. A full game produces well under this many.
const MAX_EVENT_QUEUE_SIZE: usize = 100;

/// Notifications surfaced to the application after transitions commit.
/// Handling them is up to the user; state is already consistent when they
/// appear.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A challenger joined the hosted session.
    ChallengerJoined {
        /// The joining party.
        challenger: Address,
    },
    /// The channel open commitment is assembled; play can begin.
    ChannelOpened,
    /// A turn was proposed, locally or by the peer.
    TurnProposed {
        /// The proposed ply.
        ply: Ply,
        /// The proposing party.
        by: Mark,
    },
    /// A pending turn received its countersignature.
    TurnCountersigned {
        /// The countersigned ply.
        ply: Ply,
    },
    /// A turn was finalized into the channel.
    TurnFinalized {
        /// The finalized ply.
        ply: Ply,
    },
    /// A timeout clock started running.
    TimeoutTriggered {
        /// The graced deadline, unix seconds.
        deadline: u64,
    },
    /// An active timeout was answered on-chain.
    TimeoutAnswered {
        /// The answered ply.
        ply: Ply,
    },
    /// Double-signing evidence was found in the inbound stream.
    FraudDetected {
        /// The doubly signed ply.
        ply: Ply,
    },
    /// The session was settled on the ledger.
    Submitted,
    /// A reconcile against the ledger completed.
    Reconciled {
        /// What the reconcile found.
        outcome: ReconcileOutcome,
    },
}

/// A [`ChannelSession`] drives one game over a bilateral state channel:
/// propose, countersign and finalize turns off-chain, fall back to the
/// ledger for timeouts, fraud and settlement, and keep the local aggregate
/// consistent through all of it.
///
/// Construct one through the [`SessionBuilder`](crate::SessionBuilder).
pub struct ChannelSession<T>
where
    T: Config,
{
    /// The aggregate this session owns exclusively.
    game: Game,
    /// Which side of the board the local identity plays.
    local_mark: Mark,
    signer: T::Signer,
    ledger: T::Ledger,
    store: T::Store,
    /// The session uses this relay to exchange all peer events.
    relay: Box<dyn EventRelay>,
    reconciler: Reconciler,
    /// Notifications to be forwarded to the user.
    event_queue: VecDeque<SessionEvent>,
    /// Read-only snapshots published after every commit.
    snapshot: SnapshotCell,
    /// Fraud evidence retained after a failed claim, retried on poll.
    fraud_evidence: Option<FraudProof>,
}

impl<T: Config> ChannelSession<T> {
    pub(crate) fn new(
        game: Game,
        local_mark: Mark,
        signer: T::Signer,
        ledger: T::Ledger,
        store: T::Store,
        relay: Box<dyn EventRelay>,
        reconciler: Reconciler,
    ) -> Self {
        let snapshot = SnapshotCell::new(game.clone());
        Self {
            game,
            local_mark,
            signer,
            ledger,
            store,
            relay,
            reconciler,
            event_queue: VecDeque::new(),
            snapshot,
            fraud_evidence: None,
        }
    }

    // ==========================================
    // READ SURFACE
    // ==========================================

    /// The current aggregate.
    #[must_use]
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Which side the local identity plays.
    #[must_use]
    pub fn local_mark(&self) -> Mark {
        self.local_mark
    }

    /// A shareable cell observers can load snapshots from.
    #[must_use]
    pub fn snapshot_cell(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    /// Where the session stands, including the reconcile overlay.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.reconciler.is_pending() {
            SessionPhase::Reconciling
        } else {
            self.game.phase()
        }
    }

    /// What the local participant should do next.
    #[must_use]
    pub fn status(&self, now_unix: u64) -> GameStatus {
        self.game.status(self.local_mark, now_unix)
    }

    /// Returns all notifications produced since the last call.
    pub fn events(&mut self) -> Drain<'_, SessionEvent> {
        self.event_queue.drain(..)
    }

    /// Whether a reconcile is outstanding and writes are refused.
    #[must_use]
    pub fn reconcile_pending(&self) -> bool {
        self.reconciler.is_pending()
    }

    // ==========================================
    // LOCAL OPERATIONS
    // ==========================================

    /// Host side: assembles the bilateral open commitment from the
    /// challenger's proof and the host's own signature, opens the channel
    /// and notifies the peer.
    pub fn commence(&mut self) -> ChannelResult<()> {
        self.ensure_writable()?;
        if self.local_mark != Mark::Host {
            return Err(ChannelError::NotHost);
        }
        let session = self.session_id()?;
        let challenger_proof = self
            .game
            .challenger_open_proof()
            .cloned()
            .ok_or(ChannelError::MissingChallenger)?;
        if self.channel()?.is_open() {
            return Err(ChannelError::AlreadyOpen);
        }

        let message = crate::channel::open_message(session)?;
        let signature = self.signer.sign(&message)?;
        let artifact = OpenArtifact {
            host: ChannelOpenProof {
                from: self.signer.identity().clone(),
                signature,
            },
            challenger: challenger_proof,
        };

        self.send_gated(&PeerEvent::ChannelOpened {
            session,
            artifact: artifact.clone(),
        })?;
        self.channel_mut()?.open(artifact)?;
        debug!(session = %session, "channel opened");
        self.push_event(SessionEvent::ChannelOpened);
        self.commit();
        Ok(())
    }

    /// Proposes the local player's move at the current ply: builds the
    /// placement, signs it, notifies the peer and appends it to the log.
    /// The turn index does not advance until finalization.
    pub fn propose_move(&mut self, row: u8, col: u8) -> ChannelResult<()> {
        self.ensure_writable()?;
        self.ensure_no_timeout()?;
        let session = self.session_id()?;
        if !self.channel()?.is_open() {
            return Err(ChannelError::ChannelNotOpen);
        }
        let ply = self.game.turn_index();
        if ply.mark() != self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }
        if self.game.turns().pending(ply).is_some() {
            // the previous proposal must finalize before the next one
            return Err(ChannelError::OutOfOrder {
                expected: ply.next(),
                actual: ply,
            });
        }
        if self.game.board().is_occupied(row, col) {
            return Err(ChannelError::CellOccupied { row, col });
        }

        let placement =
            Placement::new(self.signer.identity().clone(), row, col, ply, session)?;
        let signature = self.signer.sign(&placement.signing_bytes()?)?;
        let turn = Turn::new(placement, signature);

        self.send_gated(&PeerEvent::TurnProposed {
            session,
            turn: turn.signed_placement(),
        })?;
        self.game.turns.append(turn)?;
        trace!(ply = %ply, "move proposed");
        self.push_event(SessionEvent::TurnProposed {
            ply,
            by: self.local_mark,
        });
        self.commit();
        Ok(())
    }

    /// Countersigns the opponent's pending proposal after re-validating it
    /// against the board as it stood before the proposal.
    pub fn countersign_pending(&mut self) -> ChannelResult<()> {
        self.ensure_writable()?;
        self.ensure_no_timeout()?;
        let session = self.session_id()?;
        let ply = self.game.turn_index();
        let pending = self
            .game
            .turns()
            .pending(ply)
            .ok_or(ChannelError::UnknownTurn { ply })?;
        if pending.placement().ply().mark() == self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }
        if pending.is_countersigned() {
            return Err(ChannelError::AlreadyCountersigned { ply });
        }
        let (row, col) = (pending.placement().row(), pending.placement().col());
        // the signature is a commitment, not a legality proof, but signing
        // an illegal move would hand the opponent a free win at settlement
        if self.game.board().is_occupied(row, col) {
            return Err(ChannelError::CellOccupied { row, col });
        }

        let bytes = pending.placement().signing_bytes()?;
        let signature = self.signer.sign(&bytes)?;

        self.send_gated(&PeerEvent::TurnCountersigned {
            session,
            ply,
            signature: signature.clone(),
        })?;
        self.game.turns.countersign(ply, signature)?;
        trace!(ply = %ply, "opponent move countersigned");
        self.push_event(SessionEvent::TurnCountersigned { ply });
        self.commit();
        Ok(())
    }

    /// Finalizes the local player's countersigned proposal into the
    /// channel, advancing the turn index.
    pub fn finalize_pending(&mut self) -> ChannelResult<()> {
        self.ensure_writable()?;
        self.ensure_no_timeout()?;
        let session = self.session_id()?;
        let ply = self.game.turn_index();
        let pending = self
            .game
            .turns()
            .pending(ply)
            .ok_or(ChannelError::UnknownTurn { ply })?;
        if pending.placement().ply().mark() != self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }
        let opponent_signature = pending
            .opponent_signature()
            .cloned()
            .ok_or(ChannelError::NotCountersigned { ply })?;
        let artifact = TurnArtifact::bilateral(
            pending.placement().clone(),
            pending.sender_signature().clone(),
            opponent_signature,
        );

        self.send_gated(&PeerEvent::TurnFinalized {
            session,
            artifact: artifact.clone(),
        })?;
        self.channel_mut()?.finalize_turn(artifact)?;
        self.game.turn_index += 1;
        debug!(ply = %ply, turn_index = %self.game.turn_index, "turn finalized");
        self.push_event(SessionEvent::TurnFinalized { ply });
        self.commit();
        Ok(())
    }

    /// Starts the timeout clock against a stalling opponent.
    ///
    /// Commits whatever leverage the channel holds to the ledger first —
    /// the last bilateral artifact re-finalized under the timeout flag, the
    /// local player's own unanswered proposal finalized unilaterally, or
    /// the ledger's manual trigger when no artifacts exist yet — then reads
    /// the deadline back and notifies the peer best-effort.
    pub fn trigger_timeout(&mut self) -> ChannelResult<()> {
        self.ensure_writable()?;
        self.ensure_no_timeout()?;
        let session = self.session_id()?;
        if !self.channel()?.is_open() {
            return Err(ChannelError::ChannelNotOpen);
        }

        let ply = self.game.turn_index();
        let pending_mine = self
            .game
            .turns()
            .pending(ply)
            .filter(|turn| turn.placement().ply().mark() == self.local_mark)
            .cloned();

        let broadcast_artifact = if let Some(pending) = pending_mine {
            // my proposal went unanswered: finalize it unilaterally and
            // post the whole segment
            let artifact = TurnArtifact::unilateral(
                pending.placement().clone(),
                pending.sender_signature().clone(),
            );
            self.channel_mut()?.finalize_turn(artifact.clone())?;
            self.game.turn_index += 1;
            let submission = self.channel()?.submission();
            self.ledger.submit_channel(session, &submission)?;
            self.game.last_posted = self.game.turn_index;
            Some(artifact)
        } else if self.channel()?.artifacts().is_empty() {
            // nothing signed to hold against the opponent yet
            self.ledger.trigger_manual_timeout(session)?;
            None
        } else {
            // re-finalize the last artifact under the timeout flag so the
            // ledger starts the clock from it
            let last = self
                .channel()?
                .artifacts()
                .last()
                .cloned()
                .ok_or(ChannelError::ChannelNotOpen)?;
            let stamped = TurnArtifact {
                timeout: true,
                ..last
            };
            self.channel_mut()?.replace_last(stamped.clone())?;
            let submission = self.channel()?.submission();
            self.ledger.submit_channel(session, &submission)?;
            self.game.last_posted = self.game.turn_index;
            Some(stamped)
        };

        let deadline = graced_deadline(self.ledger.timeout_deadline(session)?);
        self.game.timeout_deadline = deadline;
        debug!(session = %session, deadline, "timeout triggered");

        // the chain already committed; a lost broadcast heals on reconcile
        self.send_best_effort(&PeerEvent::TimeoutTriggered {
            session,
            artifact: broadcast_artifact,
        });
        self.push_event(SessionEvent::TimeoutTriggered { deadline });
        self.commit();
        Ok(())
    }

    /// Answers the active timeout by posting the obligated move directly
    /// on-chain, then resumes play on a continued channel segment.
    pub fn answer_timeout(&mut self, row: u8, col: u8, now_unix: u64) -> ChannelResult<()> {
        self.ensure_writable()?;
        let session = self.session_id()?;
        let deadline = self.game.timeout_deadline();
        if deadline == 0 {
            return Err(ChannelError::NoActiveTimeout);
        }
        if now_unix > deadline {
            return Err(ChannelError::DeadlineExpired {
                deadline,
                now: now_unix,
            });
        }
        let ply = self.game.turn_index();
        if ply.mark() != self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }
        if self.game.board().is_occupied(row, col) {
            return Err(ChannelError::CellOccupied { row, col });
        }

        let placement =
            Placement::new(self.signer.identity().clone(), row, col, ply, session)?;
        let signature = self.signer.sign(&placement.signing_bytes()?)?;

        self.ledger.answer_timeout(session, row, col)?;
        let posted = self.ledger.posted_state(session)?;

        // the posted count is taken as the absolute truth, not an increment
        self.game.last_posted = posted.posted_turn;
        self.game.over = posted.over;
        let continued = self.channel()?.continue_after(posted.posted_turn);
        self.game.channel = Some(continued);
        self.game.timeout_deadline = 0;

        // mirror the answer into the local log when it is the next slot;
        // after an offline gap the log may lag and the move is only on-chain
        if placement.ply().as_usize() == self.game.turns().len() {
            self.game.turns.append(Turn::new(placement.clone(), signature.clone()))?;
        }
        self.game.turn_index = self.game.turn_index.max(posted.posted_turn);
        debug!(ply = %ply, posted = %posted.posted_turn, "timeout answered");

        self.send_best_effort(&PeerEvent::TimeoutAnswered {
            session,
            turn: SignedPlacement {
                placement,
                signature,
            },
        });
        self.push_event(SessionEvent::TimeoutAnswered { ply });
        self.commit();
        Ok(())
    }

    /// Disputes a prematurely triggered timeout by exhibiting the
    /// countersigned turn at `ply`, proving the triggering party already
    /// held progress at or beyond the claimed stall point. Clears the local
    /// deadline once the ledger accepts the proof.
    pub fn dispute_timeout(&mut self, ply: Ply) -> ChannelResult<()> {
        self.ensure_writable()?;
        let session = self.session_id()?;
        if self.game.timeout_deadline() == 0 {
            return Err(ChannelError::NoActiveTimeout);
        }
        let turn = self
            .game
            .turns()
            .get(ply)
            .ok_or(ChannelError::UnknownTurn { ply })?;
        let countersignature = turn
            .opponent_signature()
            .cloned()
            .ok_or(ChannelError::NotCountersigned { ply })?;
        let placement = turn.placement().clone();

        self.ledger
            .dispute_timeout(session, &placement, &countersignature)?;
        self.game.timeout_deadline = 0;
        debug!(ply = %ply, "premature timeout disputed");
        self.commit();
        Ok(())
    }

    /// Claims the win after the timeout deadline expired unanswered. Only
    /// the party the opponent owes a move may claim.
    pub fn claim_timeout_win(&mut self, now_unix: u64) -> ChannelResult<()> {
        self.ensure_writable()?;
        let session = self.session_id()?;
        let deadline = self.game.timeout_deadline();
        if deadline == 0 {
            return Err(ChannelError::NoActiveTimeout);
        }
        if now_unix <= deadline {
            return Err(ChannelError::DeadlineNotReached {
                deadline,
                now: now_unix,
            });
        }
        let ply = self.game.turn_index();
        if ply.mark() == self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }

        self.ledger.claim_timeout_win(session)?;
        self.game.over = true;
        self.game.timeout_deadline = 0;
        debug!(session = %session, "timeout win claimed");

        self.send_best_effort(&PeerEvent::SessionSubmitted { session });
        self.push_event(SessionEvent::Submitted);
        self.commit();
        Ok(())
    }

    /// Settles the session on the ledger.
    ///
    /// Routes by the situation: an expired timeout in the local player's
    /// favor becomes a win claim; an active timeout on the local player's
    /// own obligation is closed with a dummy answer the ledger treats as
    /// the final move; otherwise the accumulated channel segment is
    /// submitted, which requires a decided board.
    pub fn submit(&mut self, now_unix: u64) -> ChannelResult<()> {
        if self.reconciler.is_pending() {
            return Err(ChannelError::ReconcilePending);
        }
        if self.game.is_over() {
            return Err(ChannelError::AlreadySubmitted);
        }
        let session = self.session_id()?;

        let deadline = self.game.timeout_deadline();
        if deadline > 0 {
            if now_unix > deadline && self.game.turn_index().mark() != self.local_mark {
                return self.claim_timeout_win(now_unix);
            }
            if self.game.turn_index().mark() == self.local_mark {
                // closing move; the ledger ends the game, cell legality is
                // not re-checked on this path
                self.ledger.answer_timeout(session, 0, 0)?;
                self.game.timeout_deadline = 0;
                self.game.over = true;
                self.send_best_effort(&PeerEvent::SessionSubmitted { session });
                self.push_event(SessionEvent::Submitted);
                self.commit();
                return Ok(());
            }
            return Err(ChannelError::TimeoutInEffect { deadline });
        }

        if self.game.board().outcome() == Outcome::InProgress {
            return Err(ChannelError::NotDecided);
        }
        let submission = self.channel()?.submission();
        self.ledger.submit_channel(session, &submission)?;
        self.game.last_posted = self.game.turn_index;
        self.game.over = true;
        debug!(session = %session, "session submitted");

        self.send_best_effort(&PeerEvent::SessionSubmitted { session });
        self.push_event(SessionEvent::Submitted);
        self.commit();
        Ok(())
    }

    /// Submits double-signing evidence to the ledger's fraud adjudication.
    ///
    /// On ledger failure the evidence is retained and the claim retried on
    /// the next [`poll_events`](Self::poll_events).
    pub fn claim_fraud_win(&mut self, proof: FraudProof) -> ChannelResult<()> {
        match self.ledger.claim_fraud_win(&proof) {
            Ok(_) => {
                self.game.over = true;
                self.game.timeout_deadline = 0;
                debug!(ply = %proof.ply, "fraud win claimed");
                self.push_event(SessionEvent::Submitted);
                self.commit();
                Ok(())
            },
            Err(err) => {
                warn!(ply = %proof.ply, error = %err, "fraud claim failed, retaining evidence");
                self.fraud_evidence = Some(proof);
                Err(err)
            },
        }
    }

    /// Runs a reconcile against the ledger immediately.
    pub fn reconcile(&mut self) -> ChannelResult<ReconcileOutcome> {
        self.reconciler.begin();
        let outcome = self.reconciler.run(&mut self.game, &mut self.ledger)?;
        self.push_event(SessionEvent::Reconciled { outcome });
        self.commit();
        Ok(outcome)
    }

    pub(crate) fn reconcile_on_start(&mut self) {
        self.reconciler.begin();
        match self.reconciler.run(&mut self.game, &mut self.ledger) {
            Ok(outcome) => {
                self.push_event(SessionEvent::Reconciled { outcome });
                self.commit();
            },
            Err(err) => {
                // stays pending: the session is read-only until a retry
                // succeeds
                warn!(error = %err, "startup reconcile failed, session is read-only");
            },
        }
    }

    // ==========================================
    // INBOUND EVENT ROUTING
    // ==========================================

    /// Drains the relay and applies every inbound peer event.
    ///
    /// Events are validated at this boundary; invalid ones are logged and
    /// dropped without touching the aggregate, and redelivered ones apply
    /// as no-ops. Every inbound turn is screened for double-signing fraud
    /// before application.
    pub fn poll_events(&mut self) {
        // a fraud claim that failed earlier is retried before new input
        if let Some(proof) = self.fraud_evidence.take() {
            let _ = self.claim_fraud_win(proof);
        }

        for event in self.relay.poll() {
            trace!(kind = event.kind(), "peer event received");
            if let Err(err) = self.apply_peer_event(&event) {
                warn!(kind = event.kind(), error = %err, "dropping invalid peer event");
            }
        }
    }

    fn apply_peer_event(&mut self, event: &PeerEvent) -> ChannelResult<()> {
        // the join event carries the id the challenger generated; every
        // later event must reference the session we are in
        if let Some(local) = self.game.id() {
            if event.session() != local {
                return Err(ChannelError::SessionMismatch {
                    expected: local,
                    actual: event.session(),
                });
            }
        } else if !matches!(event, PeerEvent::SessionJoined { .. }) {
            return Err(ChannelError::ChannelNotOpen);
        }

        match event {
            PeerEvent::SessionJoined {
                session,
                challenger,
                open_proof,
            } => self.on_session_joined(*session, challenger, open_proof),
            PeerEvent::ChannelOpened { artifact, .. } => self.on_channel_opened(artifact),
            PeerEvent::TurnProposed { turn, .. } => self.on_turn_proposed(turn),
            PeerEvent::TurnCountersigned { ply, signature, .. } => {
                self.on_turn_countersigned(*ply, signature)
            },
            PeerEvent::TurnFinalized { artifact, .. } => self.on_turn_finalized(artifact),
            PeerEvent::TimeoutTriggered { artifact, .. } => {
                self.on_timeout_triggered(artifact.as_ref())
            },
            PeerEvent::TimeoutAnswered { turn, .. } => self.on_timeout_answered(turn),
            PeerEvent::SessionSubmitted { .. } => self.on_session_submitted(),
        }
    }

    fn on_session_joined(
        &mut self,
        session: SessionId,
        challenger: &Address,
        open_proof: &ChannelOpenProof,
    ) -> ChannelResult<()> {
        if let Some(existing) = self.game.challenger() {
            if existing == challenger && self.game.id() == Some(session) {
                return Ok(()); // redelivery
            }
            return Err(ChannelError::DuplicateJoin);
        }
        if self.local_mark != Mark::Host {
            return Err(ChannelError::NotHost);
        }
        if open_proof.from != *challenger {
            return Err(ChannelError::Relay {
                context: "open proof not signed by the joining challenger".to_owned(),
            });
        }
        self.game.id = Some(session);
        self.game.challenger = Some(challenger.clone());
        self.game.challenger_open_proof = Some(open_proof.clone());
        self.game.channel = Some(ChannelState::fresh());
        debug!(session = %session, challenger = %challenger, "challenger joined");
        self.push_event(SessionEvent::ChallengerJoined {
            challenger: challenger.clone(),
        });
        self.commit();
        Ok(())
    }

    fn on_channel_opened(&mut self, artifact: &OpenArtifact) -> ChannelResult<()> {
        let channel = self.channel()?;
        if channel.is_open() {
            return Ok(()); // redelivery
        }
        if artifact.host.from != *self.game.host() {
            return Err(ChannelError::Relay {
                context: "open artifact not signed by the host".to_owned(),
            });
        }
        self.channel_mut()?.open(artifact.clone())?;
        debug!("channel opened by host");
        self.push_event(SessionEvent::ChannelOpened);
        self.commit();
        Ok(())
    }

    fn on_turn_proposed(&mut self, turn: &SignedPlacement) -> ChannelResult<()> {
        let ply = turn.placement.ply();
        if let Some(fraud) = self.screen_for_fraud(turn) {
            return self.handle_fraud(fraud);
        }
        if ply.as_usize() < self.game.turns().len() {
            return Ok(()); // redelivery of a known identical turn
        }
        if ply != self.game.turn_index() || ply.as_usize() != self.game.turns().len() {
            return Err(ChannelError::InvalidTurnIndex {
                expected: self.game.turn_index(),
                actual: ply,
            });
        }
        if ply.mark() == self.local_mark {
            return Err(ChannelError::NotYourTurn { ply });
        }
        if self.game.timeout_deadline() > 0 {
            return Err(ChannelError::TimeoutInEffect {
                deadline: self.game.timeout_deadline(),
            });
        }
        let (row, col) = (turn.placement.row(), turn.placement.col());
        if self.game.board().is_occupied(row, col) {
            return Err(ChannelError::CellOccupied { row, col });
        }
        self.game
            .turns
            .append(Turn::new(turn.placement.clone(), turn.signature.clone()))?;
        self.push_event(SessionEvent::TurnProposed {
            ply,
            by: self.local_mark.opponent(),
        });
        self.commit();
        Ok(())
    }

    fn on_turn_countersigned(&mut self, ply: Ply, signature: &Signature) -> ChannelResult<()> {
        match self.game.turns().get(ply) {
            Some(turn) if turn.is_countersigned() => Ok(()), // redelivery
            Some(_) => {
                self.game.turns.countersign(ply, signature.clone())?;
                self.push_event(SessionEvent::TurnCountersigned { ply });
                self.commit();
                Ok(())
            },
            None => Err(ChannelError::UnknownTurn { ply }),
        }
    }

    fn on_turn_finalized(&mut self, artifact: &TurnArtifact) -> ChannelResult<()> {
        let ply = artifact.ply();
        let signed = SignedPlacement {
            placement: artifact.placement.clone(),
            signature: artifact.sender_signature.clone(),
        };
        if let Some(fraud) = self.screen_for_fraud(&signed) {
            return self.handle_fraud(fraud);
        }
        let next = self.channel()?.next_ply();
        if ply < next {
            return Ok(()); // redelivery
        }
        if ply > next {
            return Err(ChannelError::OutOfOrder {
                expected: next,
                actual: ply,
            });
        }
        // mirror the peer's log entry if the proposal broadcast was lost
        if ply.as_usize() == self.game.turns().len() {
            self.game.turns.append(Turn::new(
                artifact.placement.clone(),
                artifact.sender_signature.clone(),
            ))?;
        }
        self.channel_mut()?.finalize_turn(artifact.clone())?;
        if self.game.turn_index() <= ply {
            self.game.turn_index = ply.next();
        }
        self.push_event(SessionEvent::TurnFinalized { ply });
        self.commit();
        Ok(())
    }

    fn on_timeout_triggered(&mut self, artifact: Option<&TurnArtifact>) -> ChannelResult<()> {
        let session = self.session_id()?;
        if let Some(artifact) = artifact {
            let ply = artifact.ply();
            let next = self.channel()?.next_ply();
            if ply == next {
                // the peer finalized its own proposal unilaterally
                if ply.as_usize() == self.game.turns().len() {
                    self.game.turns.append(Turn::new(
                        artifact.placement.clone(),
                        artifact.sender_signature.clone(),
                    ))?;
                }
                self.channel_mut()?.finalize_turn(artifact.clone())?;
                if self.game.turn_index() <= ply {
                    self.game.turn_index = ply.next();
                }
            } else if next > self.channel()?.start() && ply == Ply::new(next.as_u32() - 1) {
                // the peer re-finalized the last artifact under the flag
                self.channel_mut()?.replace_last(artifact.clone())?;
            } else {
                return Err(ChannelError::OutOfOrder {
                    expected: next,
                    actual: ply,
                });
            }
            self.game.last_posted = self.game.turn_index;
        }
        // the deadline is read back from the ledger, never trusted from
        // the peer
        let deadline = graced_deadline(self.ledger.timeout_deadline(session)?);
        self.game.timeout_deadline = deadline;
        debug!(deadline, "peer triggered a timeout");
        self.push_event(SessionEvent::TimeoutTriggered { deadline });
        self.commit();
        Ok(())
    }

    fn on_timeout_answered(&mut self, turn: &SignedPlacement) -> ChannelResult<()> {
        let session = self.session_id()?;
        let ply = turn.placement.ply();
        if ply < self.game.last_posted() {
            return Ok(()); // redelivery of an already reconciled answer
        }
        let posted = self.ledger.posted_state(session)?;
        self.game.last_posted = posted.posted_turn;
        self.game.over = posted.over;
        let continued = self.channel()?.continue_after(posted.posted_turn);
        self.game.channel = Some(continued);
        self.game.timeout_deadline = graced_deadline(self.ledger.timeout_deadline(session)?);

        if ply.as_usize() == self.game.turns().len() {
            self.game
                .turns
                .append(Turn::new(turn.placement.clone(), turn.signature.clone()))?;
        }
        self.game.turn_index = self.game.turn_index.max(ply.next()).max(posted.posted_turn);
        debug!(ply = %ply, posted = %posted.posted_turn, "peer answered the timeout");
        self.push_event(SessionEvent::TimeoutAnswered { ply });
        self.commit();
        Ok(())
    }

    fn on_session_submitted(&mut self) -> ChannelResult<()> {
        if self.game.is_over() {
            return Ok(()); // redelivery
        }
        self.game.over = true;
        self.game.timeout_deadline = 0;
        debug!("peer settled the session");
        self.push_event(SessionEvent::Submitted);
        self.commit();
        Ok(())
    }

    // ==========================================
    // FRAUD SCREENING
    // ==========================================

    /// Compares an inbound signed placement against the stored turn at the
    /// same ply. Two sender-signed placements for one ply targeting
    /// different cells prove double-signing.
    fn screen_for_fraud(&self, incoming: &SignedPlacement) -> Option<FraudProof> {
        let stored = self.game.turns().get(incoming.placement.ply())?;
        if stored.placement().same_cell(&incoming.placement) {
            return None;
        }
        if stored.placement().sender() != incoming.placement.sender() {
            return None;
        }
        let session = self.game.id()?;
        Some(FraudProof::new(
            session,
            stored.signed_placement(),
            incoming.clone(),
        ))
    }

    fn handle_fraud(&mut self, proof: FraudProof) -> ChannelResult<()> {
        warn!(ply = %proof.ply, "double-signed move detected");
        self.push_event(SessionEvent::FraudDetected { ply: proof.ply });
        // claim immediately; failures retain the evidence for the next poll
        let _ = self.claim_fraud_win(proof);
        Ok(())
    }

    // ==========================================
    // INTERNALS
    // ==========================================

    fn ensure_writable(&self) -> ChannelResult<()> {
        if self.reconciler.is_pending() {
            return Err(ChannelError::ReconcilePending);
        }
        if self.game.is_over() {
            return Err(ChannelError::GameOver);
        }
        Ok(())
    }

    fn ensure_no_timeout(&self) -> ChannelResult<()> {
        let deadline = self.game.timeout_deadline();
        if deadline > 0 {
            return Err(ChannelError::TimeoutInEffect { deadline });
        }
        Ok(())
    }

    fn session_id(&self) -> ChannelResult<SessionId> {
        self.game.id().ok_or(ChannelError::MissingChallenger)
    }

    fn channel(&self) -> ChannelResult<&ChannelState> {
        self.game.channel().ok_or(ChannelError::ChannelNotOpen)
    }

    fn channel_mut(&mut self) -> ChannelResult<&mut ChannelState> {
        self.game
            .channel
            .as_mut()
            .ok_or(ChannelError::ChannelNotOpen)
    }

    fn send_gated(&mut self, event: &PeerEvent) -> ChannelResult<()> {
        if self.relay.send(event) {
            Ok(())
        } else {
            Err(ChannelError::Relay {
                context: format!("{} was not acknowledged", event.kind()),
            })
        }
    }

    fn send_best_effort(&mut self, event: &PeerEvent) {
        if !self.relay.send(event) {
            warn!(
                kind = event.kind(),
                "relay did not acknowledge; peer will heal on reconcile"
            );
        }
    }

    fn push_event(&mut self, event: SessionEvent) {
        if self.event_queue.len() >= MAX_EVENT_QUEUE_SIZE {
            self.event_queue.pop_front();
        }
        self.event_queue.push_back(event);
    }

    /// Persists and publishes after a committed transition. A store failure
    /// is logged, never propagated: the in-memory commit stands and the
    /// next successful store catches up.
    fn commit(&mut self) {
        let serialized = SerializedGame::from_game(&self.game);
        if let Err(err) = self.store.store(self.signer.identity(), &serialized) {
            warn!(error = %err, "persisting the game failed, continuing");
        }
        self.snapshot.publish(&self.game);
    }
}

impl<T: Config> std::fmt::Debug for ChannelSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("game", &self.game)
            .field("local_mark", &self.local_mark)
            .field("reconcile_pending", &self.reconciler.is_pending())
            .field("queued_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}
