//! Cached user identity returned by the current-user endpoint.

// self
use crate::_prelude::*;

/// Identity/profile payload cached alongside tokens so the UI can render identity before a
/// network round-trip completes.
///
/// Replaced wholesale on every successful login, bootstrap, or refetch; never partially patched
/// by the session subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
	/// Stable user identifier.
	pub id: String,
	/// Primary email address.
	pub email: String,
	/// Optional display name for UI rendering.
	#[serde(default)]
	pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn deserializes_without_display_name() {
		let record: UserRecord =
			serde_json::from_str(r#"{"id":"user-1","email":"dev@example.com"}"#)
				.expect("User payload without display_name should deserialize.");

		assert_eq!(record.id, "user-1");
		assert!(record.display_name.is_none());
	}

	#[test]
	fn round_trips_through_json() {
		let record = UserRecord {
			id: "user-2".into(),
			email: "two@example.com".into(),
			display_name: Some("Two".into()),
		};
		let payload =
			serde_json::to_string(&record).expect("User record should serialize to JSON.");
		let round_trip: UserRecord =
			serde_json::from_str(&payload).expect("Serialized user record should deserialize.");

		assert_eq!(round_trip, record);
	}
}
