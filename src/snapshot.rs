//! Shared read-only snapshots of the aggregate.
//!
//! The session publishes an immutable [`Game`] snapshot after every
//! committed transition. Observers (UI, monitoring, tests) hold a clone of
//! the cell and load at their own pace; they never see a half-applied
//! transition and never block the session beyond the brief swap.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::game::Game;

/// A thread-safe cell holding the latest published [`Game`] snapshot.
///
/// Clones share the underlying cell (see the [`Clone`] implementation);
/// loading is a cheap `Arc` clone of the current snapshot.
pub struct SnapshotCell(Arc<Mutex<Arc<Game>>>);

impl SnapshotCell {
    /// A cell seeded with an initial snapshot.
    #[must_use]
    pub fn new(game: Game) -> Self {
        Self(Arc::new(Mutex::new(Arc::new(game))))
    }

    /// Publishes a new snapshot, replacing the previous one.
    pub fn publish(&self, game: &Game) {
        *self.0.lock() = Arc::new(game.clone());
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<Game> {
        Arc::clone(&self.0.lock())
    }
}

impl Clone for SnapshotCell {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell").finish_non_exhaustive()
    }
}
