//! Token refresh coordination: proactive timers, retry/backoff, and single-flight guards.
//!
//! The coordinator guarantees at most one outstanding refresh network call at any time. The
//! in-flight job is memoized as a shared future installed synchronously before any await point,
//! so N concurrent [`RefreshCoordinator::refresh_now`] calls observe exactly one network request
//! and the same resolved result. Outcomes are published through a typed broadcast channel; the
//! session state machine subscribes instead of being mutated directly.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures_util::{
	FutureExt,
	future::{BoxFuture, Shared},
};
use tokio::{
	sync::{broadcast, oneshot},
	task::JoinHandle,
};
// self
use crate::{
	_prelude::*,
	api::AuthApi,
	store::CredentialStore,
	token::{TokenPair, clock},
	user::UserRecord,
};

/// Cloneable handle to the single in-flight refresh outcome.
pub type RefreshFuture = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

/// Failures reported by the refresh coordinator.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// The server rejected the refresh token. Terminal: no retries until a new login occurs.
	#[error("Server rejected the refresh token: {reason}.")]
	Rejected {
		/// Server- or coordinator-supplied reason string.
		reason: String,
	},
	/// Transient retries were exhausted without a successful exchange.
	#[error("Refresh gave up after {attempts} attempts: {reason}.")]
	Exhausted {
		/// Number of attempts performed.
		attempts: u32,
		/// Description of the last transient failure.
		reason: String,
	},
	/// The refresh job terminated without reporting a result.
	#[error("Refresh job terminated without reporting a result.")]
	Interrupted,
}

/// Lifecycle events emitted by the coordinator.
#[derive(Clone, Debug)]
pub enum RefreshEvent {
	/// A refresh succeeded and the new pair was persisted.
	Refreshed(TokenPair),
	/// A refresh failed terminally; no further attempts are scheduled.
	RefreshFailed(RefreshError),
}

/// Tuning knobs for refresh scheduling, retries, and expiry checks.
#[derive(Clone, Debug)]
pub struct RefreshPolicy {
	/// Safety margin subtracted from the token TTL when arming the proactive timer.
	pub lead_time: Duration,
	/// Skew applied when deciding whether a cached token is still usable.
	pub expiry_skew: Duration,
	/// Attempt ceiling for transient failures.
	pub max_attempts: u32,
	/// First retry delay; doubled after each transient failure.
	pub initial_backoff: Duration,
	/// Upper bound for the retry delay.
	pub max_backoff: Duration,
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self {
			lead_time: Duration::seconds(60),
			expiry_skew: Duration::seconds(30),
			max_attempts: 3,
			initial_backoff: Duration::seconds(1),
			max_backoff: Duration::seconds(60),
		}
	}
}

struct Inflight {
	id: u64,
	future: RefreshFuture,
}

struct CoordinatorInner {
	api: Arc<dyn AuthApi>,
	store: Arc<dyn CredentialStore>,
	policy: RefreshPolicy,
	inflight: Mutex<Option<Inflight>>,
	timer: Mutex<Option<JoinHandle<()>>>,
	epoch: AtomicU64,
	job_seq: AtomicU64,
	user: Mutex<Option<UserRecord>>,
	events: broadcast::Sender<RefreshEvent>,
}
impl Drop for CoordinatorInner {
	fn drop(&mut self) {
		if let Some(timer) = self.timer.get_mut().take() {
			timer.abort();
		}
	}
}

/// Schedules proactive refreshes and de-duplicates concurrent refresh requests.
#[derive(Clone)]
pub struct RefreshCoordinator {
	inner: Arc<CoordinatorInner>,
}
impl RefreshCoordinator {
	/// Creates a coordinator over the provided server collaborator and credential store.
	pub fn new(
		api: Arc<dyn AuthApi>,
		store: Arc<dyn CredentialStore>,
		policy: RefreshPolicy,
	) -> Self {
		let (events, _) = broadcast::channel(16);

		Self {
			inner: Arc::new(CoordinatorInner {
				api,
				store,
				policy,
				inflight: Mutex::new(None),
				timer: Mutex::new(None),
				epoch: AtomicU64::new(0),
				job_seq: AtomicU64::new(0),
				user: Mutex::new(None),
				events,
			}),
		}
	}

	/// Subscribes to refresh lifecycle events.
	pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
		self.inner.events.subscribe()
	}

	/// Records the user persisted alongside refreshed tokens.
	pub fn track_user(&self, user: UserRecord) {
		*self.inner.user.lock() = Some(user);
	}

	/// Requests a refresh, joining the in-flight job when one exists.
	///
	/// The memoized future is installed before any await point, so concurrent callers always
	/// share one network call. The underlying job runs as a detached task and finishes its
	/// request even if every caller drops; results issued before a [`cancel`](Self::cancel) are
	/// discarded via an epoch check.
	pub fn refresh_now(&self, refresh_token: &str) -> RefreshFuture {
		let mut slot = self.inner.inflight.lock();

		if let Some(active) = slot.as_ref() {
			return active.future.clone();
		}

		let id = self.inner.job_seq.fetch_add(1, Ordering::Relaxed);
		let epoch = self.epoch();
		let (done, waiter) = oneshot::channel();
		let job = RefreshJob {
			coordinator: self.clone(),
			refresh_token: refresh_token.to_owned(),
			epoch,
			id,
		};

		tokio::spawn(job.run(done));

		let future: RefreshFuture = (Box::pin(async move {
			waiter.await.unwrap_or_else(|_| Err(RefreshError::Interrupted))
		}) as BoxFuture<'static, Result<TokenPair, RefreshError>>)
			.shared();

		*slot = Some(Inflight { id, future: future.clone() });

		future
	}

	/// Arms (or re-arms) the proactive refresh timer for the provided pair.
	///
	/// Replacing an armed timer aborts the previous one, so repeated calls leave exactly one
	/// timer armed. The timer fires `lead_time` before expiry, floored at zero.
	pub fn schedule_proactive_refresh(&self, tokens: &TokenPair) {
		let now = OffsetDateTime::now_utc();
		let delay = sleep_duration(clock::remaining(tokens, now) - self.inner.policy.lead_time);
		let refresh_token = tokens.refresh_token.expose().to_owned();
		let epoch = self.epoch();
		let weak = Arc::downgrade(&self.inner);
		let handle = tokio::spawn(async move {
			tokio::time::sleep(delay).await;

			let Some(inner) = weak.upgrade() else { return };
			let coordinator = RefreshCoordinator { inner };

			if coordinator.epoch() != epoch {
				return;
			}

			let _ = coordinator.refresh_now(&refresh_token).await;
		});

		if let Some(previous) = self.inner.timer.lock().replace(handle) {
			previous.abort();
		}

		tracing::debug!(delay_secs = delay.as_secs(), "armed proactive refresh timer");
	}

	/// Cancels all coordinator work: disarms the timer, drops the memoized job, forgets the
	/// tracked user, and bumps the logout epoch so a late-resolving job discards its result.
	///
	/// Synchronous: after `cancel` returns, no refresh outcome issued before it can be persisted
	/// or emitted.
	pub fn cancel(&self) {
		self.inner.epoch.fetch_add(1, Ordering::SeqCst);

		if let Some(timer) = self.inner.timer.lock().take() {
			timer.abort();
		}

		self.inner.inflight.lock().take();
		self.inner.user.lock().take();
	}

	fn epoch(&self) -> u64 {
		self.inner.epoch.load(Ordering::SeqCst)
	}

	fn clear_inflight(&self, id: u64) {
		let mut slot = self.inner.inflight.lock();

		if slot.as_ref().is_some_and(|active| active.id == id) {
			*slot = None;
		}
	}

	/// Publishes a successful refresh: persists the pair (when a user is tracked), emits
	/// [`RefreshEvent::Refreshed`], and re-arms the proactive timer.
	///
	/// The epoch is re-checked after the persist await. A logout that lands while the save is
	/// suspended rolls the write back and suppresses the emit and re-arm, so no credentials
	/// survive for a signed-out user.
	async fn commit(&self, pair: &TokenPair, epoch: u64) {
		let user = self.inner.user.lock().clone();
		let mut persisted = false;

		if let Some(user) = user {
			match self.inner.store.save(pair, &user).await {
				Ok(()) => persisted = true,
				Err(error) => {
					tracing::warn!(error = %error, "failed to persist refreshed tokens");
				},
			}
		}

		if self.epoch() != epoch {
			tracing::debug!("logout raced a refresh commit; discarding the result");

			if persisted {
				if let Err(error) = self.inner.store.clear().await {
					tracing::warn!(
						error = %error,
						"failed to roll back tokens persisted across a logout"
					);
				}
			}

			return;
		}

		let _ = self.inner.events.send(RefreshEvent::Refreshed(pair.clone()));

		self.schedule_proactive_refresh(pair);
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("epoch", &self.epoch())
			.field("inflight", &self.inner.inflight.lock().is_some())
			.field("timer_armed", &self.inner.timer.lock().is_some())
			.finish()
	}
}

/// The single in-flight refresh call; owned exclusively by the coordinator.
struct RefreshJob {
	coordinator: RefreshCoordinator,
	refresh_token: String,
	epoch: u64,
	id: u64,
}
impl RefreshJob {
	async fn run(self, done: oneshot::Sender<Result<TokenPair, RefreshError>>) {
		let outcome = self.execute().await;

		self.coordinator.clear_inflight(self.id);

		if self.coordinator.epoch() == self.epoch {
			match &outcome {
				Ok(pair) => self.coordinator.commit(pair, self.epoch).await,
				Err(error) => {
					let _ = self
						.coordinator
						.inner
						.events
						.send(RefreshEvent::RefreshFailed(error.clone()));
				},
			}
		} else {
			tracing::debug!("discarding refresh result issued before logout");
		}

		let _ = done.send(outcome);
	}

	async fn execute(&self) -> Result<TokenPair, RefreshError> {
		let policy = &self.coordinator.inner.policy;
		let mut backoff = policy.initial_backoff;
		let mut attempt = 1_u32;

		loop {
			let issued_at = OffsetDateTime::now_utc();

			match self.coordinator.inner.api.refresh(&self.refresh_token).await {
				Ok(grant) =>
					return TokenPair::from_grant(grant, issued_at)
						.map_err(|e| RefreshError::Rejected { reason: e.to_string() }),
				Err(error) if error.is_terminal() =>
					return Err(RefreshError::Rejected { reason: error.to_string() }),
				Err(error) => {
					if attempt >= policy.max_attempts {
						return Err(RefreshError::Exhausted {
							attempts: attempt,
							reason: error.to_string(),
						});
					}

					tracing::debug!(
						attempt,
						backoff_secs = backoff.whole_seconds(),
						error = %error,
						"transient refresh failure; retrying"
					);
					tokio::time::sleep(sleep_duration(backoff)).await;

					backoff = next_backoff(backoff, policy.max_backoff);
					attempt += 1;
				},
			}
		}
	}
}

fn sleep_duration(duration: Duration) -> std::time::Duration {
	duration.try_into().unwrap_or(std::time::Duration::ZERO)
}

fn next_backoff(current: Duration, cap: Duration) -> Duration {
	current.saturating_mul(2).min(cap)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn policy_defaults_match_documented_values() {
		let policy = RefreshPolicy::default();

		assert_eq!(policy.lead_time, Duration::seconds(60));
		assert_eq!(policy.expiry_skew, Duration::seconds(30));
		assert_eq!(policy.max_attempts, 3);
		assert_eq!(policy.initial_backoff, Duration::seconds(1));
		assert_eq!(policy.max_backoff, Duration::seconds(60));
	}

	#[test]
	fn sleep_duration_floors_negative_values() {
		assert_eq!(sleep_duration(Duration::seconds(-5)), std::time::Duration::ZERO);
		assert_eq!(sleep_duration(Duration::seconds(5)), std::time::Duration::from_secs(5));
	}

	#[test]
	fn backoff_doubles_until_capped() {
		let cap = Duration::seconds(60);

		assert_eq!(next_backoff(Duration::seconds(1), cap), Duration::seconds(2));
		assert_eq!(next_backoff(Duration::seconds(40), cap), cap);
		assert_eq!(next_backoff(cap, cap), cap);
	}
}
