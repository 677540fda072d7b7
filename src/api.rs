//! Contract for the opaque authentication server and its reqwest-backed implementation.
//!
//! The server is an external collaborator exposing exactly three endpoints: `POST /login`,
//! `POST /refresh`, and `GET /users/me`. The [`AuthApi`] trait is the subsystem's only view of
//! it; tests substitute scripted implementations, production wires up [`HttpAuthApi`].

// crates.io
#[cfg(feature = "reqwest")] use reqwest::{Client as ReqwestClient, RequestBuilder};
#[cfg(feature = "reqwest")] use url::Url;
// self
use crate::{_prelude::*, secret::Secret, user::UserRecord};

/// Boxed future returned by [`AuthApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + 'a + Send>>;

/// Authentication server contract consumed by the session subsystem.
pub trait AuthApi
where
	Self: Send + Sync,
{
	/// Exchanges login credentials for a token grant.
	fn login<'a>(&'a self, credentials: &'a Credentials) -> ApiFuture<'a, TokenGrant>;

	/// Exchanges a refresh token for a new token grant.
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ApiFuture<'a, TokenGrant>;

	/// Fetches the identity behind an access token.
	fn current_user<'a>(&'a self, access_token: &'a str) -> ApiFuture<'a, UserRecord>;
}

/// Login form submitted to the server.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// Account email address.
	pub email: String,
	/// Account password; redacted in logs.
	pub password: Secret,
}
impl Credentials {
	/// Builds a credentials value from an email/password pair.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: Secret::new(password) }
	}
}

/// Wire shape returned by the login and refresh endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Issued access token.
	pub access_token: String,
	/// Issued refresh token.
	pub refresh_token: String,
	/// Relative expiry in seconds, when the server provides one.
	#[serde(default)]
	pub expires_in: Option<i64>,
}

/// Failures reported by [`AuthApi`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ApiError {
	/// The server rejected the presented credential (bad password, revoked or expired refresh
	/// token). Terminal: retrying without new input cannot succeed.
	#[error("Server rejected the request: {reason}.")]
	Rejected {
		/// Server-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Request URL could not be derived from the configured base URL.
	#[error("Invalid endpoint URL: {message}.")]
	Endpoint {
		/// Underlying parse failure.
		message: String,
	},
	/// The server answered with an unexpected non-success status. Transient.
	#[error("Server returned an unexpected response (status {status}): {message}.")]
	Unexpected {
		/// HTTP status code.
		status: u16,
		/// Response body excerpt.
		message: String,
	},
	/// Transport-level failure (DNS, TCP, TLS, timeout). Transient.
	#[error("Network error occurred while calling {endpoint}: {message}.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport error description.
		message: String,
	},
	/// The server answered with malformed JSON. Transient.
	#[error("Server returned malformed JSON from {endpoint}: {message}.")]
	Parse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parse failure description.
		message: String,
	},
}
impl ApiError {
	/// Whether the failure is terminal (retrying cannot succeed) as opposed to transient.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Rejected { .. } | Self::Endpoint { .. })
	}
}

/// Reqwest-backed [`AuthApi`] implementation against a base URL.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
	base_url: Url,
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl HttpAuthApi {
	/// Creates a client for the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self::with_client(base_url, ReqwestClient::default())
	}

	/// Creates a client reusing an existing [`ReqwestClient`].
	pub fn with_client(mut base_url: Url, client: ReqwestClient) -> Self {
		// `Url::join` replaces the last path segment unless the base ends with a slash.
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		Self { base_url, client }
	}

	fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
		self.base_url.join(path).map_err(|e| ApiError::Endpoint { message: e.to_string() })
	}

	async fn execute<T>(
		&self,
		request: RequestBuilder,
		endpoint: &'static str,
	) -> Result<T, ApiError>
	where
		T: serde::de::DeserializeOwned,
	{
		let response = request
			.send()
			.await
			.map_err(|e| ApiError::Network { endpoint, message: e.to_string() })?;
		let status = response.status().as_u16();
		let bytes = response
			.bytes()
			.await
			.map_err(|e| ApiError::Network { endpoint, message: e.to_string() })?;

		if matches!(status, 400 | 401 | 403 | 422) {
			return Err(ApiError::Rejected {
				reason: rejection_reason(&bytes, status),
				status: Some(status),
			});
		}
		if !(200..300).contains(&status) {
			return Err(ApiError::Unexpected {
				status,
				message: String::from_utf8_lossy(&bytes).trim().to_owned(),
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| ApiError::Parse { endpoint, message: e.to_string() })
	}
}
#[cfg(feature = "reqwest")]
impl AuthApi for HttpAuthApi {
	fn login<'a>(&'a self, credentials: &'a Credentials) -> ApiFuture<'a, TokenGrant> {
		#[derive(Serialize)]
		struct Body<'b> {
			email: &'b str,
			password: &'b str,
		}

		Box::pin(async move {
			let url = self.endpoint("login")?;
			let request = self.client.post(url).json(&Body {
				email: &credentials.email,
				password: credentials.password.expose(),
			});

			self.execute(request, "login").await
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ApiFuture<'a, TokenGrant> {
		#[derive(Serialize)]
		struct Body<'b> {
			refresh_token: &'b str,
		}

		Box::pin(async move {
			let url = self.endpoint("refresh")?;
			let request = self.client.post(url).json(&Body { refresh_token });

			self.execute(request, "refresh").await
		})
	}

	fn current_user<'a>(&'a self, access_token: &'a str) -> ApiFuture<'a, UserRecord> {
		Box::pin(async move {
			let url = self.endpoint("users/me")?;
			let request = self.client.get(url).bearer_auth(access_token);

			self.execute(request, "users/me").await
		})
	}
}

/// Extracts a human-readable rejection reason from a `{"message": …}` or `{"error": …}` body.
#[cfg(feature = "reqwest")]
fn rejection_reason(bytes: &[u8], status: u16) -> String {
	#[derive(Deserialize)]
	struct ErrorBody {
		#[serde(default)]
		message: Option<String>,
		#[serde(default)]
		error: Option<String>,
	}

	serde_json::from_slice::<ErrorBody>(bytes)
		.ok()
		.and_then(|body| body.message.or(body.error))
		.unwrap_or_else(|| format!("authentication rejected with status {status}"))
}
