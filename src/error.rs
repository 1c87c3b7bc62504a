//! Error types for channel, session and collaborator failures.

use std::{error::Error, fmt, fmt::Display};

use crate::{Ply, SessionId};

/// This enum contains all errors this library can return.
///
/// Guard failures carry the state that made the operation invalid so callers
/// can surface actionable messages without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelError {
    /// The operation belongs to the other party's ply.
    NotYourTurn {
        /// The ply whose parity decides who may act.
        ply: Ply,
    },
    /// The targeted cell already holds a mark.
    CellOccupied {
        /// Board row of the rejected placement.
        row: u8,
        /// Board column of the rejected placement.
        col: u8,
    },
    /// The operation arrived outside the strict turn sequence.
    OutOfOrder {
        /// The ply the sequence requires next.
        expected: Ply,
        /// The ply the operation targeted.
        actual: Ply,
    },
    /// A challenger is already registered for this session.
    DuplicateJoin,
    /// The channel already holds an open commitment.
    AlreadyOpen,
    /// The turn already carries an opponent signature.
    AlreadyCountersigned {
        /// The ply of the already countersigned turn.
        ply: Ply,
    },
    /// The turn cannot be finalized before the opponent countersigns it.
    NotCountersigned {
        /// The ply of the turn awaiting a countersignature.
        ply: Ply,
    },
    /// The session has already been settled on the ledger.
    AlreadySubmitted,
    /// A timeout deadline is active and blocks ordinary turn progression.
    TimeoutInEffect {
        /// The active deadline, unix seconds.
        deadline: u64,
    },
    /// A turn was appended out of position in the append-only log.
    InvalidTurnIndex {
        /// The index the log requires next.
        expected: Ply,
        /// The index the turn claimed.
        actual: Ply,
    },
    /// No turn exists at the referenced ply.
    UnknownTurn {
        /// The referenced ply.
        ply: Ply,
    },
    /// Row or column outside the 3x3 board.
    InvalidCoordinate {
        /// The rejected row.
        row: u8,
        /// The rejected column.
        col: u8,
    },
    /// The channel has not been opened (or not created) yet.
    ChannelNotOpen,
    /// The host cannot act before a challenger has joined.
    MissingChallenger,
    /// Only the hosting party may perform this operation.
    NotHost,
    /// The game is over; no further operations are accepted.
    GameOver,
    /// The game is still undecided and cannot be settled yet.
    NotDecided,
    /// No timeout deadline is currently active.
    NoActiveTimeout,
    /// The timeout deadline has already passed.
    DeadlineExpired {
        /// The deadline that passed, unix seconds.
        deadline: u64,
        /// The clock value the check used, unix seconds.
        now: u64,
    },
    /// The timeout deadline has not passed yet.
    DeadlineNotReached {
        /// The pending deadline, unix seconds.
        deadline: u64,
        /// The clock value the check used, unix seconds.
        now: u64,
    },
    /// The event references a different session than the local game.
    SessionMismatch {
        /// The local session id.
        expected: SessionId,
        /// The session id the event carried.
        actual: SessionId,
    },
    /// A reconcile with the ledger is pending; writes are refused until it
    /// completes.
    ReconcilePending,
    /// The session builder is missing a required collaborator.
    BuilderIncomplete {
        /// Name of the missing collaborator.
        missing: &'static str,
    },
    /// No stored game exists for the signer's identity.
    NoStoredSession,
    /// A persisted snapshot violated the aggregate's structural invariants.
    CorruptSnapshot {
        /// Further information about the violation.
        context: String,
    },
    /// The ledger client reported a failure.
    Ledger {
        /// Further information about the failure.
        context: String,
    },
    /// The peer relay did not accept or acknowledge an event.
    Relay {
        /// Further information about the failure.
        context: String,
    },
    /// Serializing or deserializing payload bytes failed.
    Serialization {
        /// Further information about the failure.
        context: String,
    },
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYourTurn { ply } => {
                write!(f, "ply {ply} belongs to the other party")
            },
            Self::CellOccupied { row, col } => {
                write!(f, "cell ({row}, {col}) already holds a mark")
            },
            Self::OutOfOrder { expected, actual } => {
                write!(
                    f,
                    "operation out of order: the sequence requires ply {expected}, got ply {actual}"
                )
            },
            Self::DuplicateJoin => {
                write!(f, "a challenger has already joined this session")
            },
            Self::AlreadyOpen => {
                write!(f, "the channel already holds an open commitment")
            },
            Self::AlreadyCountersigned { ply } => {
                write!(f, "turn at ply {ply} is already countersigned")
            },
            Self::NotCountersigned { ply } => {
                write!(f, "turn at ply {ply} has no countersignature yet")
            },
            Self::AlreadySubmitted => {
                write!(f, "the session has already been settled on the ledger")
            },
            Self::TimeoutInEffect { deadline } => {
                write!(f, "a timeout deadline is active (expires at {deadline})")
            },
            Self::InvalidTurnIndex { expected, actual } => {
                write!(
                    f,
                    "turn log requires index {expected}, turn claimed index {actual}"
                )
            },
            Self::UnknownTurn { ply } => {
                write!(f, "no turn exists at ply {ply}")
            },
            Self::InvalidCoordinate { row, col } => {
                write!(f, "coordinates ({row}, {col}) are outside the 3x3 board")
            },
            Self::ChannelNotOpen => {
                write!(f, "the channel has not been opened yet")
            },
            Self::MissingChallenger => {
                write!(f, "no challenger has joined this session yet")
            },
            Self::NotHost => {
                write!(f, "only the hosting party may perform this operation")
            },
            Self::GameOver => {
                write!(f, "the game is over; no further operations are accepted")
            },
            Self::NotDecided => {
                write!(f, "the game is still undecided and cannot be settled")
            },
            Self::NoActiveTimeout => {
                write!(f, "no timeout deadline is currently active")
            },
            Self::DeadlineExpired { deadline, now } => {
                write!(f, "the timeout deadline {deadline} has passed (now {now})")
            },
            Self::DeadlineNotReached { deadline, now } => {
                write!(
                    f,
                    "the timeout deadline {deadline} has not passed yet (now {now})"
                )
            },
            Self::SessionMismatch { expected, actual } => {
                write!(
                    f,
                    "event references session {actual}, local session is {expected}"
                )
            },
            Self::ReconcilePending => {
                write!(
                    f,
                    "a ledger reconcile is pending; retry after it completes"
                )
            },
            Self::BuilderIncomplete { missing } => {
                write!(f, "session builder is missing a {missing}")
            },
            Self::NoStoredSession => {
                write!(f, "no stored game exists for this identity")
            },
            Self::CorruptSnapshot { context } => {
                write!(f, "persisted snapshot is inconsistent: {context}")
            },
            Self::Ledger { context } => {
                write!(f, "ledger client failure: {context}")
            },
            Self::Relay { context } => {
                write!(f, "peer relay failure: {context}")
            },
            Self::Serialization { context } => {
                write!(f, "serialization failure: {context}")
            },
        }
    }
}

impl Error for ChannelError {}

/// Convenience alias for results carrying a [`ChannelError`].
pub type ChannelResult<T> = Result<T, ChannelError>;
