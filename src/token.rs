//! Token pair model, lifecycle invariants, and the expiry clock.

pub mod clock;

// self
use crate::{_prelude::*, api::TokenGrant, secret::Secret};

/// Errors raised while turning a server grant into a [`TokenPair`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenPairError {
	/// The grant carried no refresh token; such a session can never be silently renewed and is
	/// therefore never trusted or cached.
	#[error("Token grant is missing a refresh token.")]
	MissingRefreshToken,
	/// Neither `expires_in` nor a decodable JWT `exp` claim was available.
	#[error("Token grant carries no usable expiry.")]
	MissingExpiry,
	/// The grant reported a non-positive `expires_in`.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}

/// Access/refresh token pair with its derived expiry instant.
///
/// `expires_at` is derived once, at the instant the pair is issued, and is never mutated
/// independently of replacing the whole pair. The refresh coordinator and credential store own
/// the canonical copy; the session state machine only ever holds a read-only clone for the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived credential authorizing API calls.
	pub access_token: Secret,
	/// Longer-lived credential used only to obtain a new access token.
	pub refresh_token: Secret,
	/// Instant the pair was issued.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from `expires_in` or the access token's `exp` claim.
	pub expires_at: OffsetDateTime,
}
impl TokenPair {
	/// Builds a pair from a server grant, stamping `issued_at` and deriving `expires_at`.
	///
	/// Expiry preference order: a positive `expires_in` relative to `issued_at`, then the JWT
	/// `exp` claim of the access token.
	pub fn from_grant(grant: TokenGrant, issued_at: OffsetDateTime) -> Result<Self, TokenPairError> {
		let refresh_token = Secret::from(grant.refresh_token);

		if refresh_token.is_empty() {
			return Err(TokenPairError::MissingRefreshToken);
		}

		let expires_at = match grant.expires_in {
			Some(secs) if secs > 0 => issued_at + Duration::seconds(secs),
			Some(_) => return Err(TokenPairError::NonPositiveExpiresIn),
			None =>
				clock::decoded_expiry(&grant.access_token).ok_or(TokenPairError::MissingExpiry)?,
		};

		Ok(Self {
			access_token: Secret::from(grant.access_token),
			refresh_token,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn grant(expires_in: Option<i64>) -> TokenGrant {
		TokenGrant {
			access_token: "access".into(),
			refresh_token: "refresh".into(),
			expires_in,
		}
	}

	#[test]
	fn derives_expiry_from_expires_in() {
		let issued = macros::datetime!(2025-06-01 12:00 UTC);
		let pair = TokenPair::from_grant(grant(Some(1_800)), issued)
			.expect("Grant with expires_in should build a pair.");

		assert_eq!(pair.issued_at, issued);
		assert_eq!(pair.expires_at, macros::datetime!(2025-06-01 12:30 UTC));
	}

	#[test]
	fn falls_back_to_jwt_exp_claim() {
		let grant = TokenGrant {
			access_token: "header.eyJleHAiOjQxMDI0NDQ4MDB9.signature".into(),
			refresh_token: "refresh".into(),
			expires_in: None,
		};
		let pair = TokenPair::from_grant(grant, macros::datetime!(2025-06-01 12:00 UTC))
			.expect("Grant with a JWT access token should build a pair.");

		assert_eq!(pair.expires_at, macros::datetime!(2100-01-01 00:00 UTC));
	}

	#[test]
	fn rejects_grants_without_refresh_token() {
		let grant = TokenGrant {
			access_token: "access".into(),
			refresh_token: String::new(),
			expires_in: Some(3_600),
		};
		let err = TokenPair::from_grant(grant, OffsetDateTime::now_utc())
			.expect_err("Grant without a refresh token should be rejected.");

		assert_eq!(err, TokenPairError::MissingRefreshToken);
	}

	#[test]
	fn rejects_unusable_expiry() {
		let now = OffsetDateTime::now_utc();

		assert_eq!(
			TokenPair::from_grant(grant(Some(0)), now),
			Err(TokenPairError::NonPositiveExpiresIn)
		);
		assert_eq!(TokenPair::from_grant(grant(None), now), Err(TokenPairError::MissingExpiry));
	}
}
