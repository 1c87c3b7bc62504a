//! The bilateral commitment channel.
//!
//! Off-chain play accumulates [`TurnArtifact`]s in a [`ChannelState`]. A
//! channel is either [`Fresh`](ChannelState::Fresh) (covers the game from
//! ply zero and carries the open commitment) or
//! [`Continued`](ChannelState::Continued) (resumed after an on-chain
//! checkpoint; the ledger already anchors everything before `start`). The
//! transition from `Fresh` to `Continued` is one-way.
//!
//! Artifact plies are dense and strictly increasing from the segment start;
//! every sequencing violation is refused rather than reordered.

use serde::{Deserialize, Serialize};

use crate::{codec, Address, ChannelError, ChannelResult, Placement, Ply, SessionId, Signature};

/// The canonical bytes a party signs to commit to opening a channel.
pub fn open_message(session: SessionId) -> ChannelResult<Vec<u8>> {
    codec::encode(&session)
}

/// One party's signature over the channel open message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelOpenProof {
    /// The signing party.
    pub from: Address,
    /// Signature over [`open_message`].
    pub signature: Signature,
}

/// The bilateral open commitment: both parties' proofs.
///
/// Assembled locally by the host once it holds the challenger's proof; the
/// ledger first sees it inside a [`ChannelSubmission`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenArtifact {
    /// The host's proof.
    pub host: ChannelOpenProof,
    /// The challenger's proof.
    pub challenger: ChannelOpenProof,
}

/// One finalized turn as the ledger will see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnArtifact {
    /// The committed move.
    pub placement: Placement,
    /// The mover's signature.
    pub sender_signature: Signature,
    /// The opponent's countersignature; `None` for a unilateral
    /// (timeout-flagged) finalization.
    pub opponent_signature: Option<Signature>,
    /// Whether this artifact was finalized unilaterally under the timeout
    /// rules.
    pub timeout: bool,
}

impl TurnArtifact {
    /// A normally finalized, bilaterally signed turn.
    #[must_use]
    pub fn bilateral(
        placement: Placement,
        sender_signature: Signature,
        opponent_signature: Signature,
    ) -> Self {
        Self {
            placement,
            sender_signature,
            opponent_signature: Some(opponent_signature),
            timeout: false,
        }
    }

    /// A unilaterally finalized turn carrying only the mover's signature.
    #[must_use]
    pub fn unilateral(placement: Placement, sender_signature: Signature) -> Self {
        Self {
            placement,
            sender_signature,
            opponent_signature: None,
            timeout: true,
        }
    }

    /// The ply this artifact commits.
    #[must_use]
    pub fn ply(&self) -> Ply {
        self.placement.ply()
    }
}

/// Everything the ledger needs to settle the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubmission {
    /// The open commitment; absent for a continued segment, which an earlier
    /// checkpoint already anchors.
    pub open: Option<OpenArtifact>,
    /// The ply this submission's artifacts start at.
    pub resumes_from: Ply,
    /// The finalized turns, dense from `resumes_from`.
    pub artifacts: Vec<TurnArtifact>,
}

/// The channel, tagged by provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// A channel live since the start of the game.
    Fresh {
        /// The open commitment, once both proofs are assembled.
        open: Option<OpenArtifact>,
        /// Finalized turns from ply zero.
        artifacts: Vec<TurnArtifact>,
    },
    /// A channel resumed after an on-chain checkpoint.
    Continued {
        /// The first ply this segment covers; everything before it is
        /// already posted.
        start: Ply,
        /// Finalized turns from `start`.
        artifacts: Vec<TurnArtifact>,
    },
}

impl ChannelState {
    /// A new unopened channel covering the game from ply zero.
    #[must_use]
    pub fn fresh() -> Self {
        Self::Fresh {
            open: None,
            artifacts: Vec::new(),
        }
    }

    /// A continued segment starting at the first un-posted ply.
    #[must_use]
    pub fn continued(start: Ply) -> Self {
        Self::Continued {
            start,
            artifacts: Vec::new(),
        }
    }

    /// Whether this channel can accept turn artifacts.
    ///
    /// A continued segment is always open: the checkpoint that created it
    /// anchors it on-chain.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Self::Fresh { open, .. } => open.is_some(),
            Self::Continued { .. } => true,
        }
    }

    /// Whether this channel resumed from a checkpoint.
    #[must_use]
    pub fn is_continued(&self) -> bool {
        matches!(self, Self::Continued { .. })
    }

    /// The first ply this segment covers.
    #[must_use]
    pub fn start(&self) -> Ply {
        match self {
            Self::Fresh { .. } => Ply::ZERO,
            Self::Continued { start, .. } => *start,
        }
    }

    /// The ply the next artifact must commit.
    #[must_use]
    pub fn next_ply(&self) -> Ply {
        self.start() + self.artifacts().len() as u32
    }

    /// The finalized artifacts of this segment.
    #[must_use]
    pub fn artifacts(&self) -> &[TurnArtifact] {
        match self {
            Self::Fresh { artifacts, .. } | Self::Continued { artifacts, .. } => artifacts,
        }
    }

    /// The open commitment, if this is an opened fresh channel.
    #[must_use]
    pub fn open_artifact(&self) -> Option<&OpenArtifact> {
        match self {
            Self::Fresh { open, .. } => open.as_ref(),
            Self::Continued { .. } => None,
        }
    }

    /// Records the bilateral open commitment.
    ///
    /// Valid exactly once, on a fresh channel. A continued segment is
    /// already anchored and refuses.
    pub fn open(&mut self, artifact: OpenArtifact) -> ChannelResult<()> {
        match self {
            Self::Fresh { open: open @ None, .. } => {
                *open = Some(artifact);
                Ok(())
            },
            Self::Fresh { .. } | Self::Continued { .. } => Err(ChannelError::AlreadyOpen),
        }
    }

    /// Appends a finalized turn.
    ///
    /// The artifact's ply must be exactly [`next_ply`](Self::next_ply), and
    /// a fresh channel must be opened first.
    pub fn finalize_turn(&mut self, artifact: TurnArtifact) -> ChannelResult<()> {
        if let Self::Fresh { open: None, .. } = self {
            return Err(ChannelError::ChannelNotOpen);
        }
        let expected = self.next_ply();
        let actual = artifact.ply();
        if actual != expected {
            return Err(ChannelError::OutOfOrder { expected, actual });
        }
        self.artifacts_mut().push(artifact);
        Ok(())
    }

    /// Swaps the final artifact for a re-finalized version of the same ply.
    ///
    /// Used when a bilateral artifact is re-finalized with the timeout flag.
    pub fn replace_last(&mut self, artifact: TurnArtifact) -> ChannelResult<()> {
        let last_ply = match self.artifacts().last() {
            Some(last) => last.ply(),
            None => return Err(ChannelError::UnknownTurn { ply: artifact.ply() }),
        };
        if artifact.ply() != last_ply {
            return Err(ChannelError::OutOfOrder {
                expected: last_ply,
                actual: artifact.ply(),
            });
        }
        let artifacts = self.artifacts_mut();
        artifacts.pop();
        artifacts.push(artifact);
        Ok(())
    }

    /// The continued segment that succeeds this channel once the ledger has
    /// posted `posted` turns.
    ///
    /// Artifacts the chain already holds are dropped; artifacts beyond the
    /// checkpoint carry over.
    #[must_use]
    pub fn continue_after(&self, posted: Ply) -> Self {
        let artifacts = self
            .artifacts()
            .iter()
            .filter(|artifact| artifact.ply() >= posted)
            .cloned()
            .collect();
        Self::Continued {
            start: posted,
            artifacts,
        }
    }

    /// The settlement payload for this segment.
    #[must_use]
    pub fn submission(&self) -> ChannelSubmission {
        match self {
            Self::Fresh { open, artifacts } => ChannelSubmission {
                open: open.clone(),
                resumes_from: Ply::ZERO,
                artifacts: artifacts.clone(),
            },
            Self::Continued { start, artifacts } => ChannelSubmission {
                open: None,
                resumes_from: *start,
                artifacts: artifacts.clone(),
            },
        }
    }

    fn artifacts_mut(&mut self) -> &mut Vec<TurnArtifact> {
        match self {
            Self::Fresh { artifacts, .. } | Self::Continued { artifacts, .. } => artifacts,
        }
    }
}
