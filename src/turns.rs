//! The append-only turn log and its signed entries.
//!
//! A [`Placement`] is the datum both parties sign: who moved, where, at
//! which ply, in which session. A [`Turn`] is a placement plus the
//! signatures collected for it so far. The [`TurnLog`] holds every turn of
//! the game in ply order and never rewrites history; index `i` always holds
//! ply `i`.

use serde::{Deserialize, Serialize};

use crate::{codec, Address, ChannelError, ChannelResult, Ply, SessionId, Signature};

/// A single move, before any signatures.
///
/// Construction validates the coordinates, so a `Placement` in hand is
/// always on the board. Fields stay private to keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    sender: Address,
    row: u8,
    col: u8,
    ply: Ply,
    session: SessionId,
}

impl Placement {
    /// Builds a placement, rejecting coordinates outside the 3x3 board.
    pub fn new(
        sender: Address,
        row: u8,
        col: u8,
        ply: Ply,
        session: SessionId,
    ) -> ChannelResult<Self> {
        if row > 2 || col > 2 {
            return Err(ChannelError::InvalidCoordinate { row, col });
        }
        Ok(Self {
            sender,
            row,
            col,
            ply,
            session,
        })
    }

    /// The party that made this move.
    #[must_use]
    pub fn sender(&self) -> &Address {
        &self.sender
    }

    /// Board row, `0..=2`.
    #[must_use]
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Board column, `0..=2`.
    #[must_use]
    pub fn col(&self) -> u8 {
        self.col
    }

    /// The ply this move occupies in the game.
    #[must_use]
    pub fn ply(&self) -> Ply {
        self.ply
    }

    /// The session this move belongs to.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The canonical bytes both parties sign for this placement.
    pub fn signing_bytes(&self) -> ChannelResult<Vec<u8>> {
        codec::encode(self)
    }

    /// Whether `other` targets the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        self.row == other.row && self.col == other.col
    }
}

/// A placement together with its sender's signature, as carried on the wire
/// and in fraud evidence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedPlacement {
    /// The move.
    pub placement: Placement,
    /// The sender's signature over [`Placement::signing_bytes`].
    pub signature: Signature,
}

/// A turn in the log: the placement plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    placement: Placement,
    sender_signature: Signature,
    opponent_signature: Option<Signature>,
}

impl Turn {
    /// A freshly proposed turn, carrying only the sender's signature.
    #[must_use]
    pub fn new(placement: Placement, sender_signature: Signature) -> Self {
        Self {
            placement,
            sender_signature,
            opponent_signature: None,
        }
    }

    /// The signed move.
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// The mover's signature.
    #[must_use]
    pub fn sender_signature(&self) -> &Signature {
        &self.sender_signature
    }

    /// The opponent's countersignature, once collected.
    #[must_use]
    pub fn opponent_signature(&self) -> Option<&Signature> {
        self.opponent_signature.as_ref()
    }

    /// Whether the opponent has countersigned this turn.
    #[must_use]
    pub fn is_countersigned(&self) -> bool {
        self.opponent_signature.is_some()
    }

    /// The wire form of this turn's proposal.
    #[must_use]
    pub fn signed_placement(&self) -> SignedPlacement {
        SignedPlacement {
            placement: self.placement.clone(),
            signature: self.sender_signature.clone(),
        }
    }

    pub(crate) fn set_opponent_signature(&mut self, signature: Signature) {
        self.opponent_signature = Some(signature);
    }
}

/// The append-only log of turns, in ply order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnLog {
    turns: Vec<Turn>,
}

impl TurnLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a log from persisted turns, validating that index `i` holds
    /// ply `i`.
    pub fn from_turns(turns: Vec<Turn>) -> ChannelResult<Self> {
        for (i, turn) in turns.iter().enumerate() {
            let expected = Ply::new(i as u32);
            if turn.placement().ply() != expected {
                return Err(ChannelError::InvalidTurnIndex {
                    expected,
                    actual: turn.placement().ply(),
                });
            }
        }
        Ok(Self { turns })
    }

    /// Number of turns in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log holds no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The turn at the given ply, if the log holds it.
    #[must_use]
    pub fn get(&self, ply: Ply) -> Option<&Turn> {
        self.turns.get(ply.as_usize())
    }

    /// The most recently appended turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Iterates the turns in ply order.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// The turns as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    /// Appends a turn at the end of the log.
    ///
    /// The turn's ply must equal the current length; anything else is a
    /// sequencing error, never a rewrite.
    pub fn append(&mut self, turn: Turn) -> ChannelResult<()> {
        let expected = Ply::new(self.turns.len() as u32);
        let actual = turn.placement().ply();
        if actual != expected {
            return Err(ChannelError::InvalidTurnIndex { expected, actual });
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Attaches the opponent's countersignature to the turn at `ply`.
    pub fn countersign(&mut self, ply: Ply, signature: Signature) -> ChannelResult<()> {
        let turn = self
            .turns
            .get_mut(ply.as_usize())
            .ok_or(ChannelError::UnknownTurn { ply })?;
        if turn.is_countersigned() {
            return Err(ChannelError::AlreadyCountersigned { ply });
        }
        turn.set_opponent_signature(signature);
        Ok(())
    }

    /// The turn proposed but not yet finalized, given the finalized count.
    #[must_use]
    pub fn pending(&self, finalized: Ply) -> Option<&Turn> {
        (self.turns.len() == finalized.as_usize() + 1)
            .then(|| self.turns.last())
            .flatten()
    }

    /// Drops and returns the final turn. Reconciliation uses this to discard
    /// a pending proposal an on-chain checkpoint superseded.
    pub(crate) fn pop_last(&mut self) -> Option<Turn> {
        self.turns.pop()
    }
}

impl<'a> IntoIterator for &'a TurnLog {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
