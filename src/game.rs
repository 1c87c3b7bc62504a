//! The game session aggregate and its read-only projections.
//!
//! A [`Game`] is the authoritative local view of one session: identities,
//! the channel, the turn log, the finalized-turn counter and the on-chain
//! facts the client has observed. The session coordinator mutates it; every
//! other consumer reads projections ([`SessionPhase`], [`GameStatus`],
//! [`GameResult`], the derived [`Board`]) that are pure functions of the
//! aggregate.

use serde::{Deserialize, Serialize};

use crate::{
    board::{Board, Outcome},
    channel::{ChannelOpenProof, ChannelState},
    turns::TurnLog,
    Address, ChannelError, ChannelResult, Mark, Ply, SessionId,
};

/// The aggregate root of one game session.
///
/// Owned exclusively by the local client; the peer maintains its own mirror
/// from the same event stream. All fields are read through accessors; only
/// the session coordinator and the reconciler mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    /// Absent until a challenger joins and generates it.
    pub(crate) id: Option<SessionId>,
    pub(crate) host: Address,
    pub(crate) challenger: Option<Address>,
    /// The challenger's channel open proof, held by both sides.
    pub(crate) challenger_open_proof: Option<ChannelOpenProof>,
    pub(crate) channel: Option<ChannelState>,
    pub(crate) turns: TurnLog,
    /// The finalized turn count, which is also the next ply to play.
    pub(crate) turn_index: Ply,
    /// The highest turn count the ledger has confirmed.
    pub(crate) last_posted: Ply,
    /// Unix seconds; 0 means no timeout is active.
    pub(crate) timeout_deadline: u64,
    pub(crate) over: bool,
}

/// Where a session stands in its lifecycle. A computed projection, never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// The host is waiting for a challenger to join.
    AwaitingChallenger,
    /// A challenger joined; the host has not opened the channel yet.
    AwaitingChannelOpen,
    /// Ordinary turn progression.
    Playing,
    /// A timeout deadline is running; only answer or claim actions apply.
    TimeoutActive,
    /// The board is decided but the result is not settled on the ledger yet.
    Finalizing,
    /// Settled on the ledger; terminal.
    Over,
    /// A ledger reconcile is pending; the session is read-only.
    Reconciling,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AwaitingChallenger => "awaiting-challenger",
            Self::AwaitingChannelOpen => "awaiting-channel-open",
            Self::Playing => "playing",
            Self::TimeoutActive => "timeout-active",
            Self::Finalizing => "finalizing",
            Self::Over => "over",
            Self::Reconciling => "reconciling",
        };
        write!(f, "{name}")
    }
}

/// The outcome of a decided game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    /// The host won, by line, timeout or fraud adjudication.
    HostWin,
    /// The challenger won, by line, timeout or fraud adjudication.
    ChallengerWin,
    /// All nine plies finalized without a winning line.
    Draw,
}

/// What a given participant should do next. Wholly derived; the
/// presentation layer renders it without touching the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    /// Host view before anyone joined.
    WaitingForChallenger,
    /// Host view once the challenger's proof arrived: call commence.
    ReadyToCommence,
    /// Challenger view while the host has not opened the channel.
    WaitingForChannelOpen,
    /// It is the viewer's ply; propose a move.
    YourTurn,
    /// The opponent proposed; the viewer should countersign.
    CountersignRequested,
    /// The viewer's proposal is countersigned; finalize it.
    ReadyToFinalize,
    /// Nothing to do until the opponent acts.
    WaitingForOpponent,
    /// A timeout accuses the viewer; answer on-chain before it expires.
    TimeoutMustAnswer {
        /// Seconds left to answer.
        remaining: u64,
    },
    /// A timeout accuses the opponent; wait for their answer or the expiry.
    TimeoutAwaitingAnswer {
        /// Seconds until the claim opens.
        remaining: u64,
    },
    /// The deadline passed unanswered; the viewer may claim the win.
    ClaimAvailable,
    /// The deadline passed on the viewer's own obligation; the loss will be
    /// claimed against them, submit to settle.
    TimeoutForfeit,
    /// The board is decided; submit the channel.
    ReadyToSubmit,
    /// Settled. Carries the result when one is derivable.
    Settled {
        /// The final outcome, if derivable from local state.
        result: Option<GameResult>,
    },
}

impl Game {
    /// A fresh aggregate for a hosting party, before anyone joined.
    #[must_use]
    pub fn new_hosting(host: Address) -> Self {
        Self {
            id: None,
            host,
            challenger: None,
            challenger_open_proof: None,
            channel: None,
            turns: TurnLog::new(),
            turn_index: Ply::ZERO,
            last_posted: Ply::ZERO,
            timeout_deadline: 0,
            over: false,
        }
    }

    /// The aggregate a challenger builds at join time: the id is generated,
    /// the proof is the challenger's own, and the channel starts fresh.
    #[must_use]
    pub fn new_joined(
        id: SessionId,
        host: Address,
        challenger: Address,
        challenger_open_proof: ChannelOpenProof,
    ) -> Self {
        Self {
            id: Some(id),
            host,
            challenger: Some(challenger),
            challenger_open_proof: Some(challenger_open_proof),
            channel: Some(ChannelState::fresh()),
            turns: TurnLog::new(),
            turn_index: Ply::ZERO,
            last_posted: Ply::ZERO,
            timeout_deadline: 0,
            over: false,
        }
    }

    // ==========================================
    // ACCESSORS
    // ==========================================

    /// The session id, once a challenger generated one.
    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// The hosting party.
    #[must_use]
    pub fn host(&self) -> &Address {
        &self.host
    }

    /// The joined challenger, if any.
    #[must_use]
    pub fn challenger(&self) -> Option<&Address> {
        self.challenger.as_ref()
    }

    /// The challenger's channel open proof, if received.
    #[must_use]
    pub fn challenger_open_proof(&self) -> Option<&ChannelOpenProof> {
        self.challenger_open_proof.as_ref()
    }

    /// The channel, once a challenger joined.
    #[must_use]
    pub fn channel(&self) -> Option<&ChannelState> {
        self.channel.as_ref()
    }

    /// The append-only turn log.
    #[must_use]
    pub fn turns(&self) -> &TurnLog {
        &self.turns
    }

    /// The finalized turn count, which is also the next ply to play.
    #[must_use]
    pub fn turn_index(&self) -> Ply {
        self.turn_index
    }

    /// The highest turn count the ledger has confirmed.
    #[must_use]
    pub fn last_posted(&self) -> Ply {
        self.last_posted
    }

    /// The active timeout deadline in unix seconds; 0 means none.
    #[must_use]
    pub fn timeout_deadline(&self) -> u64 {
        self.timeout_deadline
    }

    /// Whether the session has been settled on the ledger.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.over
    }

    /// The role the given address plays in this session, if any.
    #[must_use]
    pub fn mark_of(&self, address: &Address) -> Option<Mark> {
        if *address == self.host {
            Some(Mark::Host)
        } else if self.challenger.as_ref() == Some(address) {
            Some(Mark::Challenger)
        } else {
            None
        }
    }

    // ==========================================
    // PROJECTIONS
    // ==========================================

    /// The board derived from the finalized prefix of the log.
    ///
    /// The prefix is clamped to the turns locally available, which may lag
    /// the finalized count after a reconcile repair.
    #[must_use]
    pub fn board(&self) -> Board {
        Board::derive(&self.turns, self.turn_index.as_usize())
    }

    /// The board including the pending, not-yet-finalized proposal if one
    /// exists. What a player looks at before countersigning.
    #[must_use]
    pub fn board_with_pending(&self) -> Board {
        Board::derive(&self.turns, self.turns.len())
    }

    /// Where the session stands. [`SessionPhase::Reconciling`] is layered on
    /// by the session coordinator, which knows whether a reconcile is
    /// outstanding.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.over {
            return SessionPhase::Over;
        }
        if self.timeout_deadline > 0 {
            return SessionPhase::TimeoutActive;
        }
        if self.challenger.is_none() {
            return SessionPhase::AwaitingChallenger;
        }
        let opened = self.channel.as_ref().is_some_and(ChannelState::is_open);
        if !opened {
            return SessionPhase::AwaitingChannelOpen;
        }
        match self.board().outcome() {
            Outcome::InProgress => SessionPhase::Playing,
            Outcome::Won(_) | Outcome::Draw => SessionPhase::Finalizing,
        }
    }

    /// Seconds until the active timeout deadline, saturating at zero.
    #[must_use]
    pub fn timeout_remaining(&self, now_unix: u64) -> u64 {
        self.timeout_deadline.saturating_sub(now_unix)
    }

    /// The final outcome, for decided games.
    ///
    /// A game decided without a winning line (timeout or fraud settlement)
    /// awards the win by last-mover parity: the party who made the final
    /// finalized turn. Returns `None` while the game is undecided, or for a
    /// settlement no local turn can attribute.
    #[must_use]
    pub fn result(&self) -> Option<GameResult> {
        match self.board().outcome() {
            Outcome::Won(Mark::Host) => Some(GameResult::HostWin),
            Outcome::Won(Mark::Challenger) => Some(GameResult::ChallengerWin),
            Outcome::Draw => Some(GameResult::Draw),
            Outcome::InProgress => {
                if !self.over || self.turn_index == Ply::ZERO {
                    return None;
                }
                match Ply::new(self.turn_index.as_u32() - 1).mark() {
                    Mark::Host => Some(GameResult::HostWin),
                    Mark::Challenger => Some(GameResult::ChallengerWin),
                }
            },
        }
    }

    /// What the given participant should do next.
    #[must_use]
    pub fn status(&self, viewer: Mark, now_unix: u64) -> GameStatus {
        if self.over {
            return GameStatus::Settled { result: self.result() };
        }
        let to_move = self.turn_index.mark();
        if self.timeout_deadline > 0 {
            let remaining = self.timeout_remaining(now_unix);
            if remaining == 0 {
                return if to_move == viewer {
                    GameStatus::TimeoutForfeit
                } else {
                    GameStatus::ClaimAvailable
                };
            }
            return if to_move == viewer {
                GameStatus::TimeoutMustAnswer { remaining }
            } else {
                GameStatus::TimeoutAwaitingAnswer { remaining }
            };
        }
        if self.challenger.is_none() {
            return GameStatus::WaitingForChallenger;
        }
        if !self.channel.as_ref().is_some_and(ChannelState::is_open) {
            return match viewer {
                Mark::Host if self.challenger_open_proof.is_some() => GameStatus::ReadyToCommence,
                Mark::Host => GameStatus::WaitingForChallenger,
                Mark::Challenger => GameStatus::WaitingForChannelOpen,
            };
        }
        if self.board().outcome() != Outcome::InProgress {
            return GameStatus::ReadyToSubmit;
        }
        match self.turns.pending(self.turn_index) {
            Some(pending) if to_move == viewer => {
                if pending.is_countersigned() {
                    GameStatus::ReadyToFinalize
                } else {
                    GameStatus::WaitingForOpponent
                }
            },
            Some(_) => GameStatus::CountersignRequested,
            None if to_move == viewer => GameStatus::YourTurn,
            None => GameStatus::WaitingForOpponent,
        }
    }

    // ==========================================
    // INVARIANTS
    // ==========================================

    /// Checks the structural invariants the rest of the crate relies on.
    ///
    /// Run on every hydration from a persisted snapshot; a violation means
    /// the snapshot was corrupted or written by a buggy client.
    pub fn validate(&self) -> ChannelResult<()> {
        if self.last_posted > self.turn_index {
            return Err(ChannelError::CorruptSnapshot {
                context: format!(
                    "last_posted {} exceeds turn_index {}",
                    self.last_posted, self.turn_index
                ),
            });
        }
        if self.turns.len() > self.turn_index.as_usize() + 1 {
            return Err(ChannelError::CorruptSnapshot {
                context: format!(
                    "turn log holds {} turns, at most {} may exist at turn_index {}",
                    self.turns.len(),
                    self.turn_index.as_usize() + 1,
                    self.turn_index
                ),
            });
        }
        if self.challenger.is_none() && (self.channel.is_some() || !self.turns.is_empty()) {
            return Err(ChannelError::CorruptSnapshot {
                context: "channel or turns present without a challenger".to_owned(),
            });
        }
        if self.id.is_none() && self.challenger.is_some() {
            return Err(ChannelError::CorruptSnapshot {
                context: "challenger present without a session id".to_owned(),
            });
        }
        Ok(())
    }
}
