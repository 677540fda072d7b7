//! Shared fixtures for integration tests: a scripted [`AuthApi`] stub with call counters.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use auth_session::{
	api::{ApiError, ApiFuture, AuthApi, Credentials, TokenGrant},
	session::{Session, SessionState},
	token::TokenPair,
	user::UserRecord,
};

/// Scripted authentication server: responses are consumed front-to-back per endpoint.
#[derive(Default)]
pub struct StubAuthApi {
	login_responses: Mutex<VecDeque<Result<TokenGrant, ApiError>>>,
	refresh_responses: Mutex<VecDeque<Result<TokenGrant, ApiError>>>,
	user_responses: Mutex<VecDeque<Result<UserRecord, ApiError>>>,
	refresh_delay: Mutex<Option<StdDuration>>,
	pub login_calls: AtomicUsize,
	pub refresh_calls: AtomicUsize,
	pub user_calls: AtomicUsize,
}
impl StubAuthApi {
	pub fn push_login(&self, response: Result<TokenGrant, ApiError>) {
		self.login_responses.lock().expect("login queue poisoned").push_back(response);
	}

	pub fn push_refresh(&self, response: Result<TokenGrant, ApiError>) {
		self.refresh_responses.lock().expect("refresh queue poisoned").push_back(response);
	}

	pub fn push_user(&self, response: Result<UserRecord, ApiError>) {
		self.user_responses.lock().expect("user queue poisoned").push_back(response);
	}

	/// Makes every subsequent refresh call stall before resolving.
	pub fn set_refresh_delay(&self, delay: StdDuration) {
		*self.refresh_delay.lock().expect("delay slot poisoned") = Some(delay);
	}

	pub fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	pub fn user_calls(&self) -> usize {
		self.user_calls.load(Ordering::SeqCst)
	}

	pub fn login_calls(&self) -> usize {
		self.login_calls.load(Ordering::SeqCst)
	}
}
impl AuthApi for StubAuthApi {
	fn login<'a>(&'a self, _credentials: &'a Credentials) -> ApiFuture<'a, TokenGrant> {
		self.login_calls.fetch_add(1, Ordering::SeqCst);

		let next = self
			.login_responses
			.lock()
			.expect("login queue poisoned")
			.pop_front()
			.expect("no scripted login response left");

		Box::pin(async move { next })
	}

	fn refresh<'a>(&'a self, _refresh_token: &'a str) -> ApiFuture<'a, TokenGrant> {
		self.refresh_calls.fetch_add(1, Ordering::SeqCst);

		let delay = *self.refresh_delay.lock().expect("delay slot poisoned");
		let next = self
			.refresh_responses
			.lock()
			.expect("refresh queue poisoned")
			.pop_front()
			.expect("no scripted refresh response left");

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			next
		})
	}

	fn current_user<'a>(&'a self, _access_token: &'a str) -> ApiFuture<'a, UserRecord> {
		self.user_calls.fetch_add(1, Ordering::SeqCst);

		let next = self
			.user_responses
			.lock()
			.expect("user queue poisoned")
			.pop_front()
			.expect("no scripted current-user response left");

		Box::pin(async move { next })
	}
}

pub fn grant(access: &str, refresh: &str, expires_in: i64) -> TokenGrant {
	TokenGrant {
		access_token: access.to_owned(),
		refresh_token: refresh.to_owned(),
		expires_in: Some(expires_in),
	}
}

pub fn user(id: &str) -> UserRecord {
	UserRecord { id: id.to_owned(), email: format!("{id}@example.com"), display_name: None }
}

/// Token pair issued `age` ago with a one-hour lifetime.
pub fn pair_issued(access: &str, refresh: &str, age: Duration) -> TokenPair {
	TokenPair::from_grant(grant(access, refresh, 3_600), OffsetDateTime::now_utc() - age)
		.expect("fixture token pair should build")
}

pub fn fresh_pair(access: &str, refresh: &str) -> TokenPair {
	pair_issued(access, refresh, Duration::ZERO)
}

pub fn expired_pair(access: &str, refresh: &str) -> TokenPair {
	pair_issued(access, refresh, Duration::hours(2))
}

pub fn network_error() -> ApiError {
	ApiError::Network { endpoint: "stub", message: "connection reset".into() }
}

pub fn rejected(reason: &str) -> ApiError {
	ApiError::Rejected { reason: reason.to_owned(), status: Some(401) }
}

/// Waits until the session leaves its current state and reaches `Unauthenticated`.
pub async fn wait_for_unauthenticated(session: &Session) -> SessionState {
	let mut watcher = session.watch();

	tokio::time::timeout(StdDuration::from_secs(5), async {
		loop {
			if matches!(&*watcher.borrow_and_update(), SessionState::Unauthenticated { .. }) {
				break;
			}

			watcher.changed().await.expect("session state channel closed");
		}
	})
	.await
	.expect("session never settled to unauthenticated");

	session.state()
}
