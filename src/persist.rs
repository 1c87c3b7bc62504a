//! The persisted form of a game and the store it lives in.
//!
//! Persistence is last-write-wins per identity: one [`SerializedGame`] per
//! local participant, written after every committed transition and read back
//! on hydration. The channel is stored as an explicitly tagged enum so a
//! continued segment round-trips exactly, never inferred from counters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    channel::{ChannelOpenProof, ChannelState, OpenArtifact, TurnArtifact},
    game::Game,
    turns::{Turn, TurnLog},
    Address, ChannelResult, Ply, SessionId,
};

/// The stored form of a [`ChannelState`].
///
/// Tagged explicitly so both self-describing (JSON) and binary (bincode)
/// formats round-trip the variant without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "segment", content = "data")]
pub enum PersistedChannel {
    /// A channel live since the start of the game.
    Fresh {
        /// The open commitment, once assembled.
        open: Option<OpenArtifact>,
        /// Finalized turns from ply zero.
        artifacts: Vec<TurnArtifact>,
    },
    /// A channel resumed after an on-chain checkpoint.
    Continued {
        /// The first ply this segment covers.
        start: Ply,
        /// Finalized turns from `start`.
        artifacts: Vec<TurnArtifact>,
    },
}

impl From<&ChannelState> for PersistedChannel {
    fn from(channel: &ChannelState) -> Self {
        match channel {
            ChannelState::Fresh { open, artifacts } => Self::Fresh {
                open: open.clone(),
                artifacts: artifacts.clone(),
            },
            ChannelState::Continued { start, artifacts } => Self::Continued {
                start: *start,
                artifacts: artifacts.clone(),
            },
        }
    }
}

impl From<PersistedChannel> for ChannelState {
    fn from(persisted: PersistedChannel) -> Self {
        match persisted {
            PersistedChannel::Fresh { open, artifacts } => Self::Fresh { open, artifacts },
            PersistedChannel::Continued { start, artifacts } => Self::Continued { start, artifacts },
        }
    }
}

/// The stored form of a [`Game`].
///
/// Mirrors the aggregate field for field. Hydration re-validates everything
/// a hostile or corrupted store could have changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedGame {
    /// The session id, once generated.
    pub id: Option<SessionId>,
    /// The hosting party.
    pub host: Address,
    /// The joined challenger, if any.
    pub challenger: Option<Address>,
    /// The challenger's channel open proof, if received.
    pub challenger_open_proof: Option<ChannelOpenProof>,
    /// The channel, tagged by segment kind.
    pub channel: Option<PersistedChannel>,
    /// The turn log, dense from ply zero.
    pub turns: Vec<Turn>,
    /// The finalized turn count.
    pub turn_index: Ply,
    /// The highest turn count the ledger has confirmed.
    pub last_posted: Ply,
    /// The active timeout deadline; 0 means none.
    pub timeout_deadline: u64,
    /// Whether the session is settled.
    pub over: bool,
}

impl SerializedGame {
    /// Captures the aggregate into its stored form.
    #[must_use]
    pub fn from_game(game: &Game) -> Self {
        Self {
            id: game.id(),
            host: game.host().clone(),
            challenger: game.challenger().cloned(),
            challenger_open_proof: game.challenger_open_proof().cloned(),
            channel: game.channel().map(PersistedChannel::from),
            turns: game.turns().as_slice().to_vec(),
            turn_index: game.turn_index(),
            last_posted: game.last_posted(),
            timeout_deadline: game.timeout_deadline(),
            over: game.is_over(),
        }
    }

    /// Rebuilds the aggregate, validating log density and the structural
    /// invariants. Fails with [`CorruptSnapshot`](crate::ChannelError::CorruptSnapshot)
    /// or [`InvalidTurnIndex`](crate::ChannelError::InvalidTurnIndex) on a
    /// snapshot no honest client would have written.
    pub fn into_game(self) -> ChannelResult<Game> {
        let game = Game {
            id: self.id,
            host: self.host,
            challenger: self.challenger,
            challenger_open_proof: self.challenger_open_proof,
            channel: self.channel.map(ChannelState::from),
            turns: TurnLog::from_turns(self.turns)?,
            turn_index: self.turn_index,
            last_posted: self.last_posted,
            timeout_deadline: self.timeout_deadline,
            over: self.over,
        };
        game.validate()?;
        Ok(game)
    }
}

/// The persistence collaborator: one stored game per identity,
/// last-write-wins.
pub trait GameStore {
    /// Loads the stored game for the given identity, if any.
    fn load(&mut self, identity: &Address) -> ChannelResult<Option<SerializedGame>>;

    /// Stores the game for the given identity, replacing any previous value.
    fn store(&mut self, identity: &Address, game: &SerializedGame) -> ChannelResult<()>;
}

/// An in-memory [`GameStore`] for tests and ephemeral sessions.
///
/// Clones share the underlying map, so a store handed to a session can be
/// inspected from the outside.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    games: Arc<Mutex<HashMap<Address, SerializedGame>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryStore {
    fn load(&mut self, identity: &Address) -> ChannelResult<Option<SerializedGame>> {
        Ok(self.games.lock().get(identity).cloned())
    }

    fn store(&mut self, identity: &Address, game: &SerializedGame) -> ChannelResult<()> {
        self.games.lock().insert(identity.clone(), game.clone());
        Ok(())
    }
}
