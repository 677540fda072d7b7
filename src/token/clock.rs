//! Pure expiry/TTL helpers for token pairs.
//!
//! Everything here is stateless and takes `now` explicitly so callers (and tests) control the
//! clock. [`decoded_expiry`] additionally understands JWT access tokens and recovers the `exp`
//! claim when the server response omits `expires_in`.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, token::TokenPair};

/// Absolute expiry instant of a token pair.
pub fn expiry_of(tokens: &TokenPair) -> OffsetDateTime {
	tokens.expires_at
}

/// Remaining time-to-live at `now`; negative once the pair has expired.
pub fn remaining(tokens: &TokenPair, now: OffsetDateTime) -> Duration {
	tokens.expires_at - now
}

/// Whether the pair should be treated as expired at `now`.
///
/// `skew` lets callers treat tokens as expired slightly early to avoid races with network
/// latency; pass [`Duration::ZERO`] for an exact check.
pub fn is_expired(tokens: &TokenPair, now: OffsetDateTime, skew: Duration) -> bool {
	remaining(tokens, now) <= skew
}

/// Recovers the expiry instant from a JWT access token's `exp` claim.
///
/// Returns `None` for opaque tokens or any malformed payload; callers fall back to
/// server-provided expiry information.
pub fn decoded_expiry(access_token: &str) -> Option<OffsetDateTime> {
	#[derive(Deserialize)]
	struct Claims {
		exp: i64,
	}

	let payload = access_token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
	let claims: Claims = serde_json::from_slice(&bytes).ok()?;

	OffsetDateTime::from_unix_timestamp(claims.exp).ok()
}
