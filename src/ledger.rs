//! The on-chain ledger collaborator.
//!
//! The library never talks to a chain directly. Everything it needs from one
//! is behind [`LedgerClient`]; implementations wrap their transport errors in
//! [`ChannelError::Ledger`] so session code can treat every backend the same
//! way.

use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelSubmission, turns::SignedPlacement, ChannelResult, Placement, Ply, SessionId,
    Signature, TIMEOUT_GRACE_SECS,
};

/// What the ledger currently knows about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedState {
    /// How many turns the ledger has posted.
    pub posted_turn: Ply,
    /// Whether the ledger considers the session settled.
    pub over: bool,
}

/// Acknowledgement of an accepted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    /// Backend-specific transaction identifier.
    pub tx: String,
}

/// Evidence that one party signed two different placements for the same ply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudProof {
    /// The session the fraud occurred in.
    pub session: SessionId,
    /// The doubly signed ply.
    pub ply: Ply,
    /// The first signed placement.
    pub first: SignedPlacement,
    /// The conflicting signed placement.
    pub second: SignedPlacement,
}

impl FraudProof {
    /// Builds the proof, ordering the halves as given.
    #[must_use]
    pub fn new(session: SessionId, first: SignedPlacement, second: SignedPlacement) -> Self {
        let ply = first.placement.ply();
        Self {
            session,
            ply,
            first,
            second,
        }
    }
}

/// Applies the client-side grace period to a raw on-chain deadline.
///
/// A zero deadline means no timeout is active and stays zero.
#[must_use]
pub fn graced_deadline(raw: u64) -> u64 {
    if raw == 0 {
        0
    } else {
        raw + TIMEOUT_GRACE_SECS
    }
}

/// The on-chain operations a session needs.
///
/// Methods take `&mut self` so implementations can manage nonces or
/// connection state without interior mutability.
pub trait LedgerClient {
    /// Reads the posted turn count and settled flag for a session.
    fn posted_state(&mut self, session: SessionId) -> ChannelResult<PostedState>;

    /// Reads the raw timeout deadline for a session, unix seconds.
    /// Zero means no timeout is active. Callers apply [`graced_deadline`].
    fn timeout_deadline(&mut self, session: SessionId) -> ChannelResult<u64>;

    /// Starts the timeout clock when the opponent has not produced any
    /// channel state to hold against them.
    fn trigger_manual_timeout(&mut self, session: SessionId) -> ChannelResult<Receipt>;

    /// Answers an active timeout by posting the obligated move on-chain.
    fn answer_timeout(&mut self, session: SessionId, row: u8, col: u8) -> ChannelResult<Receipt>;

    /// Claims the win after a timeout deadline expired unanswered.
    fn claim_timeout_win(&mut self, session: SessionId) -> ChannelResult<Receipt>;

    /// Claims the win with double-signing evidence.
    fn claim_fraud_win(&mut self, proof: &FraudProof) -> ChannelResult<Receipt>;

    /// Disputes a prematurely triggered timeout by exhibiting a
    /// countersigned turn at or beyond the claimed stall point.
    fn dispute_timeout(
        &mut self,
        session: SessionId,
        placement: &Placement,
        signature: &Signature,
    ) -> ChannelResult<Receipt>;

    /// Submits a finalized channel segment for settlement.
    fn submit_channel(
        &mut self,
        session: SessionId,
        submission: &ChannelSubmission,
    ) -> ChannelResult<Receipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graced_deadline_preserves_the_zero_sentinel() {
        assert_eq!(graced_deadline(0), 0);
        assert_eq!(graced_deadline(1_700_000_000), 1_700_000_000 + TIMEOUT_GRACE_SECS);
    }
}
