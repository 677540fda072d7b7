//! Client-side authentication session subsystem: cached-credential bootstrap, single-flight
//! token refresh, and login gating for API-backed apps.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod error;
pub mod gate;
pub mod refresh;
pub mod secret;
pub mod session;
pub mod store;
pub mod token;
pub mod user;

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
