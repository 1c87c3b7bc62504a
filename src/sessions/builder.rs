//! Assembles a [`ChannelSession`] from its collaborators.
//!
//! The builder collects the signer, ledger client, store and relay, then
//! starts the session in one of three ways: hosting a new game, joining a
//! hosted one, or resuming a persisted one. Each terminal consumes the
//! builder.

use tracing::{debug, warn};

use crate::{
    channel::{open_message, ChannelOpenProof},
    events::PeerEvent,
    game::Game,
    persist::GameStore,
    reconcile::{ReconcileConfig, Reconciler},
    sessions::channel_session::ChannelSession,
    Address, ChannelError, ChannelResult, Config, EventRelay, Mark, SessionId, Signer,
};

/// Builder for a [`ChannelSession`].
///
/// # Example
///
/// ```ignore
/// let session = SessionBuilder::<MainnetConfig>::new()
///     .with_signer(signer)
///     .with_ledger(ledger)
///     .with_store(store)
///     .with_relay(Box::new(relay))
///     .start_hosting()?;
/// ```
#[must_use]
pub struct SessionBuilder<T>
where
    T: Config,
{
    signer: Option<T::Signer>,
    ledger: Option<T::Ledger>,
    store: Option<T::Store>,
    relay: Option<Box<dyn EventRelay>>,
    reconcile_config: ReconcileConfig,
    session_id: Option<SessionId>,
}

impl<T: Config> Default for SessionBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> SessionBuilder<T> {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            signer: None,
            ledger: None,
            store: None,
            relay: None,
            reconcile_config: ReconcileConfig::default(),
            session_id: None,
        }
    }

    /// The local signing capability.
    pub fn with_signer(mut self, signer: T::Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// The on-chain ledger client.
    pub fn with_ledger(mut self, ledger: T::Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// The persistent game store.
    pub fn with_store(mut self, store: T::Store) -> Self {
        self.store = Some(store);
        self
    }

    /// The peer event relay.
    pub fn with_relay(mut self, relay: Box<dyn EventRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Backoff tuning for ledger reconciles. Defaults to
    /// [`ReconcileConfig::default`].
    pub fn with_reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile_config = config;
        self
    }

    /// Uses the given session id instead of deriving one at join time.
    pub fn with_session_id(mut self, session: SessionId) -> Self {
        self.session_id = Some(session);
        self
    }

    /// Starts a fresh session with the local identity as host, waiting for
    /// a challenger to join.
    pub fn start_hosting(self) -> ChannelResult<ChannelSession<T>> {
        let (signer, ledger, store, relay, reconciler) = self.into_parts()?;
        let game = Game::new_hosting(signer.identity().clone());
        debug!(host = %game.host(), "hosting a new session");
        Ok(ChannelSession::new(
            game,
            Mark::Host,
            signer,
            ledger,
            store,
            relay,
            reconciler,
        ))
    }

    /// Joins the session hosted by `host` as the challenger.
    ///
    /// Generates the session id, signs the channel open message and sends
    /// the join to the host. The join must be acknowledged by the relay; a
    /// nack fails with [`ChannelError::Relay`] and creates nothing.
    pub fn start_joining(
        self,
        host: Address,
        now_unix: u64,
    ) -> ChannelResult<ChannelSession<T>> {
        let session_override = self.session_id;
        let (mut signer, ledger, store, mut relay, reconciler) = self.into_parts()?;
        let challenger = signer.identity().clone();
        let session = session_override
            .unwrap_or_else(|| SessionId::generate(&host, &challenger, now_unix));

        let signature = signer.sign(&open_message(session)?)?;
        let open_proof = ChannelOpenProof {
            from: challenger.clone(),
            signature,
        };
        if !relay.send(&PeerEvent::SessionJoined {
            session,
            challenger: challenger.clone(),
            open_proof: open_proof.clone(),
        }) {
            return Err(ChannelError::Relay {
                context: "session-joined was not acknowledged".to_owned(),
            });
        }

        let game = Game::new_joined(session, host, challenger, open_proof);
        debug!(session = %session, host = %game.host(), "joined a hosted session");
        Ok(ChannelSession::new(
            game,
            Mark::Challenger,
            signer,
            ledger,
            store,
            relay,
            reconciler,
        ))
    }

    /// Resumes the session persisted for the signer's identity.
    ///
    /// Hydration validates the stored snapshot, then reconciles against the
    /// ledger to pick up anything that happened while offline. A failed
    /// reconcile still returns the session; it stays read-only until a
    /// retried [`reconcile`](ChannelSession::reconcile) succeeds.
    pub fn resume(self) -> ChannelResult<ChannelSession<T>> {
        let (signer, ledger, mut store, relay, reconciler) = self.into_parts()?;
        let serialized = store
            .load(signer.identity())?
            .ok_or(ChannelError::NoStoredSession)?;
        let game = serialized.into_game()?;
        let local_mark = game
            .mark_of(signer.identity())
            .ok_or_else(|| ChannelError::CorruptSnapshot {
                context: "stored game does not involve the local identity".to_owned(),
            })?;
        debug!(host = %game.host(), mark = %local_mark, "resuming a persisted session");

        let mut session =
            ChannelSession::new(game, local_mark, signer, ledger, store, relay, reconciler);
        session.reconcile_on_start();
        if session.reconcile_pending() {
            warn!("resumed session could not reconcile; writes refused until it succeeds");
        }
        Ok(session)
    }

    #[allow(clippy::type_complexity)]
    fn into_parts(
        self,
    ) -> ChannelResult<(T::Signer, T::Ledger, T::Store, Box<dyn EventRelay>, Reconciler)> {
        let signer = self
            .signer
            .ok_or(ChannelError::BuilderIncomplete { missing: "signer" })?;
        let ledger = self
            .ledger
            .ok_or(ChannelError::BuilderIncomplete { missing: "ledger" })?;
        let store = self
            .store
            .ok_or(ChannelError::BuilderIncomplete { missing: "store" })?;
        let relay = self
            .relay
            .ok_or(ChannelError::BuilderIncomplete { missing: "relay" })?;
        Ok((
            signer,
            ledger,
            store,
            relay,
            Reconciler::new(self.reconcile_config),
        ))
    }
}

impl<T: Config> std::fmt::Debug for SessionBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("has_signer", &self.signer.is_some())
            .field("has_ledger", &self.ledger.is_some())
            .field("has_store", &self.store.is_some())
            .field("has_relay", &self.relay.is_some())
            .field("reconcile_config", &self.reconcile_config)
            .finish_non_exhaustive()
    }
}
