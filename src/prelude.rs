//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used
//! types from Turnpike, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use turnpike::prelude::*;
//! ```
//!
//! # What's Included
//!
//! The prelude includes:
//!
//! - **Session types**: [`ChannelSession`], [`SessionBuilder`], [`SessionEvent`]
//! - **Core traits**: [`Config`], [`Signer`], [`EventRelay`], [`LedgerClient`], [`GameStore`]
//! - **Stock implementations**: [`LocalRelay`], [`MemoryStore`]
//! - **Fundamental types**: [`Ply`], [`Mark`], [`Address`], [`SessionId`], [`Signature`]
//! - **Game state**: [`Game`], [`GameStatus`], [`GameResult`], [`SessionPhase`], [`Board`], [`Outcome`]
//! - **Wire and ledger payloads**: [`PeerEvent`], [`ChannelSubmission`], [`PostedState`], [`FraudProof`]
//! - **Error handling**: [`ChannelError`], [`ChannelResult`]
//! - **Snapshots**: [`SnapshotCell`]
//! - **Reconciliation**: [`ReconcileConfig`], [`ReconcileOutcome`]
//!
//! # Example
//!
//! ```rust
//! use turnpike::prelude::*;
//!
//! // Create the config marker struct naming your collaborators
//! struct LocalConfig;
//!
//! impl Config for LocalConfig {
//!     type Signer = MySigner;
//!     type Ledger = MyLedger;
//!     type Store = MemoryStore;
//! }
//! # struct MySigner(Address);
//! # impl Signer for MySigner {
//! #     fn identity(&self) -> &Address { &self.0 }
//! #     fn sign(&mut self, m: &[u8]) -> ChannelResult<Signature> {
//! #         Ok(Signature::from_bytes(m))
//! #     }
//! # }
//! # struct MyLedger;
//! # impl LedgerClient for MyLedger {
//! #     fn posted_state(&mut self, _: SessionId) -> ChannelResult<PostedState> {
//! #         Ok(PostedState { posted_turn: Ply::ZERO, over: false })
//! #     }
//! #     fn timeout_deadline(&mut self, _: SessionId) -> ChannelResult<u64> { Ok(0) }
//! #     fn trigger_manual_timeout(&mut self, _: SessionId) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! #     fn answer_timeout(&mut self, _: SessionId, _: u8, _: u8) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! #     fn claim_timeout_win(&mut self, _: SessionId) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! #     fn claim_fraud_win(&mut self, _: &FraudProof) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! #     fn dispute_timeout(
//! #         &mut self,
//! #         _: SessionId,
//! #         _: &Placement,
//! #         _: &Signature,
//! #     ) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! #     fn submit_channel(
//! #         &mut self,
//! #         _: SessionId,
//! #         _: &ChannelSubmission,
//! #     ) -> ChannelResult<Receipt> {
//! #         Ok(Receipt { tx: String::new() })
//! #     }
//! # }
//! ```

// Core session types
pub use crate::sessions::builder::SessionBuilder;
pub use crate::sessions::channel_session::{ChannelSession, SessionEvent};

// Core traits
pub use crate::{Config, EventRelay, Signer};
pub use crate::{GameStore, LedgerClient};

// Stock in-memory implementations
pub use crate::{LocalRelay, MemoryStore};

// Fundamental types and constants
pub use crate::{Address, Mark, Ply, SessionId, Signature, TIMEOUT_GRACE_SECS};

// Game state and projections
pub use crate::{Board, Game, GameResult, GameStatus, Outcome, SessionPhase};

// Wire and ledger payloads
pub use crate::{ChannelSubmission, FraudProof, PeerEvent, Placement, PostedState, Receipt};

// Error handling
pub use crate::{ChannelError, ChannelResult};

// Snapshot publication
pub use crate::SnapshotCell;

// Reconciliation tuning
pub use crate::{ReconcileConfig, ReconcileOutcome};
