//! Peer wire events.
//!
//! Every message the two clients exchange is one [`PeerEvent`] variant, a
//! tagged struct carrying exactly the payload that event kind needs. Events
//! are data only; validation happens at the session boundary when they are
//! routed, never at construction.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    channel::{ChannelOpenProof, OpenArtifact, TurnArtifact},
    turns::SignedPlacement,
    Address, EventRelay, Ply, SessionId, Signature,
};

/// A message from the other party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerEvent {
    /// A challenger joined the host's session, naming the session id it
    /// generated and its channel open proof.
    SessionJoined {
        /// The newly generated session id.
        session: SessionId,
        /// The joining party.
        challenger: Address,
        /// The challenger's signature over the open message.
        open_proof: ChannelOpenProof,
    },
    /// The host assembled both proofs and opened the channel.
    ChannelOpened {
        /// The session the channel belongs to.
        session: SessionId,
        /// The bilateral open commitment.
        artifact: OpenArtifact,
    },
    /// The mover proposed a turn and signed it.
    TurnProposed {
        /// The session the turn belongs to.
        session: SessionId,
        /// The proposed move with the mover's signature.
        turn: SignedPlacement,
    },
    /// The opponent countersigned a pending turn.
    TurnCountersigned {
        /// The session the turn belongs to.
        session: SessionId,
        /// The countersigned ply.
        ply: Ply,
        /// The opponent's signature over the same placement bytes.
        signature: Signature,
    },
    /// The mover finalized a countersigned turn into the channel.
    TurnFinalized {
        /// The session the turn belongs to.
        session: SessionId,
        /// The finalized artifact.
        artifact: TurnArtifact,
    },
    /// A party started the timeout clock.
    TimeoutTriggered {
        /// The session the timeout applies to.
        session: SessionId,
        /// The unilaterally finalized artifact, when the trigger committed
        /// the triggering party's own pending proposal.
        artifact: Option<TurnArtifact>,
    },
    /// The obligated party answered an active timeout on-chain.
    TimeoutAnswered {
        /// The session the timeout applied to.
        session: SessionId,
        /// The move posted as the answer.
        turn: SignedPlacement,
    },
    /// A party settled the session on the ledger.
    SessionSubmitted {
        /// The settled session.
        session: SessionId,
    },
}

impl PeerEvent {
    /// The session id this event references.
    #[must_use]
    pub fn session(&self) -> SessionId {
        match self {
            Self::SessionJoined { session, .. }
            | Self::ChannelOpened { session, .. }
            | Self::TurnProposed { session, .. }
            | Self::TurnCountersigned { session, .. }
            | Self::TurnFinalized { session, .. }
            | Self::TimeoutTriggered { session, .. }
            | Self::TimeoutAnswered { session, .. }
            | Self::SessionSubmitted { session } => *session,
        }
    }

    /// A short, stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionJoined { .. } => "session-joined",
            Self::ChannelOpened { .. } => "channel-opened",
            Self::TurnProposed { .. } => "turn-proposed",
            Self::TurnCountersigned { .. } => "turn-countersigned",
            Self::TurnFinalized { .. } => "turn-finalized",
            Self::TimeoutTriggered { .. } => "timeout-triggered",
            Self::TimeoutAnswered { .. } => "timeout-answered",
            Self::SessionSubmitted { .. } => "session-submitted",
        }
    }
}

/// An in-memory [`EventRelay`] for tests and single-process setups.
///
/// [`LocalRelay::pair`] returns two connected endpoints: whatever one sends,
/// the other polls, in order. Sends always acknowledge.
#[derive(Debug, Clone)]
pub struct LocalRelay {
    inbox: Arc<Mutex<VecDeque<PeerEvent>>>,
    peer_inbox: Arc<Mutex<VecDeque<PeerEvent>>>,
}

impl LocalRelay {
    /// Creates two endpoints whose queues are crossed.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Mutex::new(VecDeque::new()));
        let b = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                inbox: Arc::clone(&a),
                peer_inbox: Arc::clone(&b),
            },
            Self {
                inbox: b,
                peer_inbox: a,
            },
        )
    }
}

impl EventRelay for LocalRelay {
    fn send(&mut self, event: &PeerEvent) -> bool {
        self.peer_inbox.lock().push_back(event.clone());
        true
    }

    fn poll(&mut self) -> Vec<PeerEvent> {
        self.inbox.lock().drain(..).collect()
    }
}
