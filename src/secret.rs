//! Redaction wrapper for credential material.

// self
use crate::_prelude::*;

/// Opaque credential material whose value never appears in logs or debug output.
///
/// Wraps every secret the subsystem handles: the login password on its way to the server and
/// both halves of a [`TokenPair`](crate::token::TokenPair). The raw string is reachable only
/// through [`Secret::expose`], so accidental `{:?}`/`{}` formatting stays safe. Serialization is
/// transparent; the credential store round-trips the raw value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps credential material.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Grants access to the raw value. Callers must not log the returned string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Whether the wrapped value is empty; empty secrets are never usable credentials.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Secret(<redacted>)")
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
