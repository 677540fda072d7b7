//! The authoritative session state machine and its four operations.
//!
//! A [`Session`] is explicitly constructed with its collaborators and passed down by the
//! application root; there is no ambient global. The in-memory [`SessionState`] is the single
//! source of truth and is mutated only by the four operations ([`Session::bootstrap`],
//! [`Session::login`], [`Session::logout`], [`Session::refresh`]) plus the coordinator-event
//! listener owned by the session itself; the refresh coordinator communicates outcomes via its
//! typed event channel, never by direct mutation.

// crates.io
use tokio::sync::{broadcast, watch};
// self
use crate::{
	_prelude::*,
	api::{AuthApi, Credentials},
	refresh::{RefreshCoordinator, RefreshError, RefreshEvent, RefreshPolicy},
	store::{CachedCredentials, CredentialStore},
	token::{TokenPair, clock},
	user::UserRecord,
};

/// Session lifecycle state; exactly one variant is active at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
	/// Initial state; no user or tokens resolved yet.
	Loading,
	/// A user is signed in with a live token pair.
	Authenticated {
		/// Current user identity.
		user: UserRecord,
		/// Read-only copy of the current token pair.
		tokens: TokenPair,
	},
	/// No user is signed in.
	Unauthenticated {
		/// Why the session ended, when known (surfaced to the login screen).
		reason: Option<String>,
	},
	/// Transient failure report; always followed by [`SessionState::Unauthenticated`].
	Error {
		/// Human-readable failure message.
		message: String,
	},
}

/// Fire-and-observe notifications for UI collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// The session entered the authenticated state.
	Authenticated,
	/// The session entered the unauthenticated state.
	Unauthenticated,
	/// Tokens were silently renewed.
	TokenRefreshed,
	/// A token refresh failed terminally.
	TokenRefreshFailed,
}

struct SessionInner {
	api: Arc<dyn AuthApi>,
	store: Arc<dyn CredentialStore>,
	coordinator: RefreshCoordinator,
	policy: RefreshPolicy,
	state: watch::Sender<SessionState>,
	events: broadcast::Sender<SessionEvent>,
}

/// Cheap-clone handle to the session state machine.
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}
impl Session {
	/// Creates a session with the default [`RefreshPolicy`].
	///
	/// Must be called within a tokio runtime: construction spawns the coordinator-event
	/// listener task.
	pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
		Self::with_policy(api, store, RefreshPolicy::default())
	}

	/// Creates a session with an explicit refresh policy.
	pub fn with_policy(
		api: Arc<dyn AuthApi>,
		store: Arc<dyn CredentialStore>,
		policy: RefreshPolicy,
	) -> Self {
		let coordinator = RefreshCoordinator::new(api.clone(), store.clone(), policy.clone());
		let (state, _) = watch::channel(SessionState::Loading);
		let (events, _) = broadcast::channel(16);
		let inner = Arc::new(SessionInner { api, store, coordinator, policy, state, events });

		Self::spawn_refresh_listener(&inner);

		Self { inner }
	}

	/// Resolves the cached session at application start.
	///
	/// Settles into [`SessionState::Authenticated`] when cached tokens are valid or refreshable,
	/// and [`SessionState::Unauthenticated`] otherwise; the machine never remains
	/// [`SessionState::Loading`] after this returns. Any unexpected failure clears the
	/// credential store.
	pub async fn bootstrap(&self) -> SessionState {
		if !matches!(&*self.inner.state.borrow(), SessionState::Loading) {
			return self.state();
		}

		match self.try_bootstrap().await {
			Ok(state) => state,
			Err(error) => {
				tracing::warn!(error = %error, "bootstrap failed; clearing cached credentials");
				self.inner.coordinator.cancel();
				self.clear_store().await;
				self.transition(SessionState::Unauthenticated {
					reason: Some(error.to_string()),
				});

				self.state()
			},
		}
	}

	/// Exchanges credentials for a session.
	///
	/// On failure the machine reports [`SessionState::Error`] and settles to
	/// [`SessionState::Unauthenticated`]; the returned error carries the server's message for
	/// inline display. No automatic retry.
	pub async fn login(&self, credentials: &Credentials) -> Result<UserRecord> {
		match self.try_login(credentials).await {
			Ok(user) => Ok(user),
			Err(error) => {
				let message = error.to_string();

				self.transition(SessionState::Error { message: message.clone() });
				self.transition(SessionState::Unauthenticated { reason: Some(message) });

				Err(error)
			},
		}
	}

	/// Ends the session: cancels all pending coordinator work, clears the credential store, and
	/// settles to [`SessionState::Unauthenticated`].
	///
	/// The coordinator cancel happens synchronously before any await, so no refresh outcome
	/// issued before logout can be observed afterwards. No server call is made.
	pub async fn logout(&self) {
		self.inner.coordinator.cancel();
		self.clear_store().await;
		self.transition(SessionState::Unauthenticated { reason: None });
	}

	/// Manually refreshes the current token pair, joining any in-flight refresh.
	///
	/// The result is applied only while the session is still authenticated; a concurrent logout
	/// discards it.
	pub async fn refresh(&self) -> Result<TokenPair> {
		let refresh_token = match &*self.inner.state.borrow() {
			SessionState::Authenticated { tokens, .. } =>
				tokens.refresh_token.expose().to_owned(),
			_ => return Err(Error::NotAuthenticated),
		};
		let pair = self.inner.coordinator.refresh_now(&refresh_token).await?;

		self.apply_refreshed(&pair);

		Ok(pair)
	}

	/// Returns a copy of the current state.
	pub fn state(&self) -> SessionState {
		self.inner.state.borrow().clone()
	}

	/// Returns a watch receiver following every state transition.
	pub fn watch(&self) -> watch::Receiver<SessionState> {
		self.inner.state.subscribe()
	}

	/// Subscribes to session lifecycle events.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.inner.events.subscribe()
	}

	/// Current user, when authenticated.
	pub fn user(&self) -> Option<UserRecord> {
		match &*self.inner.state.borrow() {
			SessionState::Authenticated { user, .. } => Some(user.clone()),
			_ => None,
		}
	}

	/// Read-only copy of the current token pair, when authenticated.
	pub fn tokens(&self) -> Option<TokenPair> {
		match &*self.inner.state.borrow() {
			SessionState::Authenticated { tokens, .. } => Some(tokens.clone()),
			_ => None,
		}
	}

	/// Waits for the first settled state.
	///
	/// [`SessionState::Loading`] and [`SessionState::Error`] are unsettled; the latter is
	/// always followed by [`SessionState::Unauthenticated`].
	pub async fn wait_settled(&self) -> SessionState {
		let mut watcher = self.inner.state.subscribe();

		loop {
			let current = watcher.borrow_and_update().clone();

			match current {
				SessionState::Loading | SessionState::Error { .. } => {},
				settled => return settled,
			}

			if watcher.changed().await.is_err() {
				return SessionState::Unauthenticated { reason: None };
			}
		}
	}

	async fn try_bootstrap(&self) -> Result<SessionState> {
		let cached = match self.inner.store.load().await {
			Ok(cached) => cached,
			Err(error) => {
				tracing::warn!(error = %error, "credential store read failed; treating as empty");

				CachedCredentials::default()
			},
		};
		let Some(tokens) = cached.tokens else {
			self.transition(SessionState::Unauthenticated { reason: None });

			return Ok(self.state());
		};
		let now = OffsetDateTime::now_utc();

		if cached.user.is_some() && !clock::is_expired(&tokens, now, self.inner.policy.expiry_skew)
		{
			match self.inner.api.current_user(tokens.access_token.expose()).await {
				Ok(user) => return Ok(self.establish(tokens, user).await),
				Err(error) if error.is_terminal() => {
					tracing::debug!(
						error = %error,
						"cached access token rejected; falling back to refresh"
					);
				},
				Err(error) => return Err(error.into()),
			}
		}

		let pair = self.inner.coordinator.refresh_now(tokens.refresh_token.expose()).await?;
		let user = self.inner.api.current_user(pair.access_token.expose()).await?;

		Ok(self.establish(pair, user).await)
	}

	async fn try_login(&self, credentials: &Credentials) -> Result<UserRecord> {
		let issued_at = OffsetDateTime::now_utc();
		let grant = self.inner.api.login(credentials).await?;
		let tokens = TokenPair::from_grant(grant, issued_at)?;
		let user = self.inner.api.current_user(tokens.access_token.expose()).await?;

		self.establish(tokens, user.clone()).await;

		Ok(user)
	}

	/// Persists credentials, arms the proactive refresh schedule, and enters
	/// [`SessionState::Authenticated`].
	async fn establish(&self, tokens: TokenPair, user: UserRecord) -> SessionState {
		if let Err(error) = self.inner.store.save(&tokens, &user).await {
			tracing::warn!(error = %error, "failed to persist session credentials");
		}

		self.inner.coordinator.track_user(user.clone());
		self.inner.coordinator.schedule_proactive_refresh(&tokens);
		self.transition(SessionState::Authenticated { user, tokens });

		self.state()
	}

	fn transition(&self, next: SessionState) {
		let event = match &next {
			SessionState::Authenticated { .. } => Some(SessionEvent::Authenticated),
			SessionState::Unauthenticated { .. } => Some(SessionEvent::Unauthenticated),
			SessionState::Loading | SessionState::Error { .. } => None,
		};

		self.inner.state.send_replace(next);

		if let Some(event) = event {
			let _ = self.inner.events.send(event);
		}
	}

	/// Replaces the token pair while authenticated; returns whether anything changed.
	fn apply_refreshed(&self, pair: &TokenPair) -> bool {
		let mut applied = false;

		self.inner.state.send_if_modified(|state| {
			if let SessionState::Authenticated { tokens, .. } = state {
				if tokens != pair {
					*tokens = pair.clone();
					applied = true;

					return true;
				}
			}

			false
		});

		if applied {
			let _ = self.inner.events.send(SessionEvent::TokenRefreshed);
		}

		applied
	}

	async fn handle_refresh_failure(&self, error: &RefreshError) {
		if !matches!(&*self.inner.state.borrow(), SessionState::Authenticated { .. }) {
			return;
		}

		tracing::warn!(error = %error, "token refresh failed terminally; signing out");

		let _ = self.inner.events.send(SessionEvent::TokenRefreshFailed);

		self.inner.coordinator.cancel();
		self.clear_store().await;
		self.transition(SessionState::Unauthenticated { reason: Some(error.to_string()) });
	}

	async fn clear_store(&self) {
		if let Err(error) = self.inner.store.clear().await {
			tracing::warn!(error = %error, "failed to clear credential store");
		}
	}

	/// Applies background refresh outcomes; the listener holds only a weak reference so dropped
	/// sessions shut their task down.
	fn spawn_refresh_listener(inner: &Arc<SessionInner>) {
		let weak = Arc::downgrade(inner);
		let mut events = inner.coordinator.subscribe();

		tokio::spawn(async move {
			loop {
				let event = match events.recv().await {
					Ok(event) => event,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "session fell behind on refresh events");

						continue;
					},
					Err(broadcast::error::RecvError::Closed) => break,
				};
				let Some(inner) = weak.upgrade() else { break };
				let session = Session { inner };

				match event {
					RefreshEvent::Refreshed(pair) => {
						session.apply_refreshed(&pair);
					},
					RefreshEvent::RefreshFailed(error) =>
						session.handle_refresh_failure(&error).await,
				}
			}
		});
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = match &*self.inner.state.borrow() {
			SessionState::Loading => "Loading",
			SessionState::Authenticated { .. } => "Authenticated",
			SessionState::Unauthenticated { .. } => "Unauthenticated",
			SessionState::Error { .. } => "Error",
		};

		f.debug_struct("Session").field("state", &state).finish()
	}
}
