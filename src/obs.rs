//! Optional observability helpers for token fetches.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `registry_auth.fetch` with the `kind`
//!   (exchange flavor) and `host` fields, plus debug events for rejected token exchanges.
//! - Enable `metrics` to increment the `registry_auth_fetch_total` counter for every
//!   attempt/success/failure, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Token exchange flavors observed by the authorizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
	/// Anonymous GET against the realm.
	Anonymous,
	/// Credentialed GET with HTTP Basic auth.
	Basic,
	/// Form-encoded POST fallback.
	OAuth,
	/// Token minted through a session-held authority.
	Delegated,
}
impl FetchKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FetchKind::Anonymous => "anonymous",
			FetchKind::Basic => "basic",
			FetchKind::OAuth => "oauth",
			FetchKind::Delegated => "delegated",
		}
	}
}
impl Display for FetchKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each fetch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
	/// Entry to a token exchange.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FetchOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FetchOutcome::Attempt => "attempt",
			FetchOutcome::Success => "success",
			FetchOutcome::Failure => "failure",
		}
	}
}
impl Display for FetchOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
