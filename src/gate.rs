//! Access gating for protected views.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	session::{Session, SessionState},
};

/// Outcome of an access check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
	/// The session is authenticated; enter the view.
	Allow,
	/// The session is signed out; navigate to the login screen.
	Redirect {
		/// Login path with the originally requested location preserved in the `redirect`
		/// query parameter.
		location: String,
	},
}

/// Guard invoked before entering protected views.
#[derive(Clone, Debug)]
pub struct AccessGate {
	login_path: String,
}
impl AccessGate {
	/// Creates a gate redirecting to the provided login path.
	pub fn new(login_path: impl Into<String>) -> Self {
		Self { login_path: login_path.into() }
	}

	/// Checks the session before entering `requested_path`.
	///
	/// A [`SessionState::Loading`] session is waited out rather than guessed at; the gate only
	/// decides once the first settled state arrives.
	pub async fn ensure_authenticated(
		&self,
		session: &Session,
		requested_path: &str,
	) -> GateDecision {
		match session.wait_settled().await {
			SessionState::Authenticated { .. } => GateDecision::Allow,
			_ => GateDecision::Redirect { location: self.redirect_location(requested_path) },
		}
	}

	/// Builds the login redirect target carrying the originally requested path.
	pub fn redirect_location(&self, requested_path: &str) -> String {
		let query = form_urlencoded::Serializer::new(String::new())
			.append_pair("redirect", requested_path)
			.finish();

		format!("{}?{query}", self.login_path)
	}
}
