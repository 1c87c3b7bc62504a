//! # Turnpike
//!
//! Turnpike is a client-side synchronization state machine for two-party,
//! turn-based games played over a bilateral state channel. Moves are
//! exchanged and countersigned off-chain through a peer event relay; an
//! on-chain ledger is touched only to open the channel, settle the result,
//! and arbitrate disputes (timeouts and double-signing fraud).
//!
//! The crate is sans-IO: the signer, the ledger client, the peer relay and
//! the persistent store are all traits supplied through a [`Config`] bundle,
//! and time-sensitive operations take the current unix time explicitly.
//! Drive a [`ChannelSession`] by calling its local operations and polling
//! inbound peer events; the session serializes both into one ordered
//! application against the owned [`Game`] aggregate, persists after every
//! commit and publishes immutable snapshots for observers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use board::{Board, Outcome};
pub use channel::{ChannelOpenProof, ChannelState, ChannelSubmission, OpenArtifact, TurnArtifact};
pub use error::{ChannelError, ChannelResult};
pub use events::{LocalRelay, PeerEvent};
pub use game::{Game, GameResult, GameStatus, SessionPhase};
pub use ledger::{FraudProof, LedgerClient, PostedState, Receipt};
pub use persist::{GameStore, MemoryStore, SerializedGame};
pub use reconcile::{ReconcileConfig, ReconcileOutcome, Reconciler};
pub use sessions::builder::SessionBuilder;
pub use sessions::channel_session::{ChannelSession, SessionEvent};
pub use snapshot::SnapshotCell;
pub use turns::{Placement, SignedPlacement, Turn, TurnLog};

pub mod board;
pub mod channel;
/// Binary codec for canonical payload bytes.
///
/// Centralizes the bincode configuration so both parties always sign
/// identical bytes for identical payloads. See the module documentation.
pub mod codec;
pub mod error;
pub mod events;
pub mod game;
pub mod ledger;
pub mod persist;
pub mod prelude;
pub mod reconcile;
pub mod snapshot;
pub mod turns;
/// Session coordination: the builder and the channel session it produces.
pub mod sessions {
    pub mod builder;
    pub mod channel_session;
}

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// #############
// # CONSTANTS #
// #############

/// Client-side grace added to every nonzero raw timeout deadline read from
/// the ledger.
///
/// Chain clocks lag wall clocks and transactions take time to confirm; the
/// grace keeps a client from claiming (or conceding) a timeout the chain
/// would still consider answerable.
pub const TIMEOUT_GRACE_SECS: u64 = 600;

/// A ply is a single move of the game, counted from 0 across both parties.
///
/// Plies are the fundamental unit of progress in the channel: the turn log,
/// the finalized artifacts and the ledger's posted-turn count all advance in
/// plies. Parity decides ownership — the host plays first and owns even
/// plies.
///
/// # Examples
///
/// ```
/// use turnpike::{Mark, Ply};
///
/// let first = Ply::ZERO;
/// assert_eq!(first.mark(), Mark::Host);
/// assert_eq!(first.next().mark(), Mark::Challenger);
/// assert!(first.next() > first);
/// assert_eq!(first + 2, Ply::new(2));
/// ```
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Ply(u32);

impl Ply {
    /// The first ply of a game.
    pub const ZERO: Ply = Ply(0);

    /// Creates a new `Ply` from a `u32` value.
    #[inline]
    #[must_use]
    pub const fn new(ply: u32) -> Self {
        Ply(ply)
    }

    /// Returns the underlying `u32` value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the ply as a `usize`, for indexing the turn log.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The ply that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Ply(self.0 + 1)
    }

    /// The party that owns this ply: the host on even plies, the challenger
    /// on odd plies.
    #[inline]
    #[must_use]
    pub const fn mark(self) -> Mark {
        if self.0 % 2 == 0 {
            Mark::Host
        } else {
            Mark::Challenger
        }
    }
}

impl std::fmt::Display for Ply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u32> for Ply {
    type Output = Ply;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Ply(self.0 + rhs)
    }
}

impl std::ops::AddAssign<u32> for Ply {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl From<u32> for Ply {
    #[inline]
    fn from(value: u32) -> Self {
        Ply(value)
    }
}

impl From<Ply> for u32 {
    #[inline]
    fn from(ply: Ply) -> Self {
        ply.0
    }
}

// Comparison with u32 for convenience

impl PartialEq<u32> for Ply {
    #[inline]
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<u32> for Ply {
    #[inline]
    fn partial_cmp(&self, other: &u32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// The two sides of the game, by role rather than glyph.
///
/// The host creates the session and always moves first; the challenger joins
/// and moves second. Cell ownership on the derived board is decided by the
/// [ply parity](Ply::mark) of the placing turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// The hosting party, owner of even plies.
    Host,
    /// The joining party, owner of odd plies.
    Challenger,
}

impl Mark {
    /// The other party.
    #[inline]
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Mark::Host => Mark::Challenger,
            Mark::Challenger => Mark::Host,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::Host => write!(f, "host"),
            Mark::Challenger => write!(f, "challenger"),
        }
    }
}

/// Opaque identity of a participant.
///
/// The crate never interprets the contents; equality on the canonical string
/// form is all it needs. Typically a wallet address supplied by the signer
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Creates an address from its canonical string form.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// The canonical string form.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_owned())
    }
}

/// Identifier of one game session and its channel.
///
/// Generated by the challenger at join time and carried by every peer event
/// and ledger call thereafter.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SessionId(u128);

impl SessionId {
    /// Creates a session id from a raw `u128`.
    #[inline]
    #[must_use]
    pub const fn new(id: u128) -> Self {
        SessionId(id)
    }

    /// Returns the underlying `u128` value.
    #[inline]
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Derives a session id from the two participants and the current time.
    ///
    /// Uniqueness across honest clients is all this needs; it carries no
    /// security weight, since every payload referencing it is signed.
    #[must_use]
    pub fn generate(host: &Address, challenger: &Address, now_unix: u64) -> Self {
        use std::hash::{DefaultHasher, Hash, Hasher};
        let mut high = DefaultHasher::new();
        (host, challenger, now_unix).hash(&mut high);
        let mut low = DefaultHasher::new();
        (challenger, now_unix, host).hash(&mut low);
        SessionId((u128::from(high.finish()) << 64) | u128::from(low.finish()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// An opaque signature produced by the [`Signer`] collaborator.
///
/// The crate never verifies signatures cryptographically; it stores, relays
/// and compares them as bytes. Typical signatures fit the inline capacity
/// without a heap allocation.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(SmallVec<[u8; 64]>);

impl Signature {
    /// Wraps raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Signature(SmallVec::from_slice(bytes))
    }

    /// The raw signature bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

// #############
// #  TRAITS   #
// #############

/// The signing capability of the local participant.
///
/// Implementations wrap whatever key management the deployment uses; the
/// session only needs deterministic authority over canonical payload bytes
/// and the identity the signatures speak for.
pub trait Signer {
    /// The address the produced signatures are attributable to.
    fn identity(&self) -> &Address;

    /// Signs the given canonical bytes.
    ///
    /// Takes `&mut self` so implementations can manage nonces or key
    /// handles without interior mutability.
    fn sign(&mut self, message: &[u8]) -> ChannelResult<Signature>;
}

/// The bidirectional peer event channel.
///
/// Delivery is at-least-once and ordering across event kinds is not
/// guaranteed; the session tolerates both by applying events idempotently.
/// Implement this over whatever relay transport the deployment uses;
/// [`LocalRelay`] is the stock in-memory implementation.
pub trait EventRelay {
    /// Sends an event to the peer. Returns `false` when the relay did not
    /// acknowledge; the caller must not commit local state in that case.
    fn send(&mut self, event: &PeerEvent) -> bool;

    /// Returns all events received since the last call, in arrival order.
    fn poll(&mut self) -> Vec<PeerEvent>;
}

/// Compile time parameterization for sessions.
///
/// This trait bundles the collaborator types a deployment chooses. Implement
/// it on a marker struct and hand the instances to the [`SessionBuilder`].
///
/// # Example
///
/// ```ignore
/// struct MainnetConfig;
///
/// impl Config for MainnetConfig {
///     type Signer = WalletSigner;
///     type Ledger = JsonRpcLedger;
///     type Store = DiskStore;
/// }
/// ```
pub trait Config: 'static {
    /// The local signing capability.
    type Signer: Signer;

    /// The on-chain ledger client.
    type Ledger: LedgerClient;

    /// The persistent game store.
    type Store: GameStore;
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==========================================
    // PLY
    // ==========================================

    #[test]
    fn test_ply_parity_decides_the_mark() {
        assert_eq!(Ply::ZERO.mark(), Mark::Host);
        assert_eq!(Ply::new(1).mark(), Mark::Challenger);
        assert_eq!(Ply::new(8).mark(), Mark::Host);
    }

    #[test]
    fn test_ply_arithmetic_and_comparison() {
        let mut ply = Ply::ZERO;
        ply += 2;
        assert_eq!(ply, 2u32);
        assert_eq!(ply + 1, Ply::new(3));
        assert_eq!(ply.next(), Ply::new(3));
        assert!(ply < 3u32);
        assert_eq!(ply.to_string(), "2");
    }

    #[test]
    fn test_ply_conversions() {
        assert_eq!(Ply::from(5u32), Ply::new(5));
        assert_eq!(u32::from(Ply::new(5)), 5);
        assert_eq!(Ply::new(5).as_usize(), 5);
    }

    // ==========================================
    // MARK AND ADDRESS
    // ==========================================

    #[test]
    fn test_mark_opponent_is_an_involution() {
        assert_eq!(Mark::Host.opponent(), Mark::Challenger);
        assert_eq!(Mark::Challenger.opponent().opponent(), Mark::Challenger);
    }

    #[test]
    fn test_address_equality_is_by_canonical_form() {
        assert_eq!(Address::new("0xabc"), Address::from("0xabc"));
        assert_ne!(Address::new("0xabc"), Address::new("0xABC"));
        assert_eq!(Address::new("0xabc").as_str(), "0xabc");
    }

    // ==========================================
    // SESSION ID AND SIGNATURE
    // ==========================================

    #[test]
    fn test_session_id_displays_as_lower_hex() {
        assert_eq!(
            SessionId::new(0xFEED).to_string(),
            "0000000000000000000000000000feed"
        );
    }

    #[test]
    fn test_session_id_generation_is_input_sensitive() {
        let host = Address::new("host");
        let challenger = Address::new("challenger");
        let a = SessionId::generate(&host, &challenger, 1_700_000_000);
        let b = SessionId::generate(&host, &challenger, 1_700_000_001);
        assert_ne!(a, b);
        assert_eq!(a, SessionId::generate(&host, &challenger, 1_700_000_000));
    }

    #[test]
    fn test_signature_debug_is_hex() {
        let sig = Signature::from_bytes(&[0xDE, 0xAD]);
        assert_eq!(format!("{sig:?}"), "Signature(dead)");
        assert_eq!(sig.as_bytes(), &[0xDE, 0xAD]);
    }
}
