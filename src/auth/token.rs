//! Challenge answers and cached authorization results.

// self
use crate::{
	_prelude::*,
	auth::challenge::Challenge,
	error::ProtocolError,
};

/// Fallback token lifetime in seconds when the endpoint omits or zeroes `expires_in`.
pub(crate) const DEFAULT_EXPIRATION_SECS: i64 = 60;
/// Share of the advertised lifetime honored before a token is refetched.
const EXPIRY_MARGIN: f64 = 0.9;

/// Challenge answer shared by every scoped token request to one host under one credential.
#[derive(Clone, Default)]
pub struct TokenOptions {
	/// Token endpoint (realm) advertised by the challenge.
	pub realm: String,
	/// Registry service name advertised by the challenge.
	pub service: String,
	/// Normalized union of every scope requested under this credential.
	pub scopes: Vec<String>,
	/// Username presented to the token endpoint; empty for anonymous access.
	pub username: String,
	/// Secret presented to the token endpoint; empty for anonymous access.
	pub secret: String,
}
impl TokenOptions {
	/// Builds the challenge answer for `host` from a parsed Bearer challenge.
	pub fn from_challenge(
		host: &str,
		username: &str,
		secret: &str,
		challenge: &Challenge,
	) -> Result<Self, ProtocolError> {
		let realm = challenge.parameter("realm").unwrap_or_default();

		if realm.is_empty() {
			return Err(ProtocolError::MissingRealm { host: host.to_owned() });
		}

		let service = challenge.parameter("service").unwrap_or_default().to_owned();
		let scopes = challenge
			.parameter("scope")
			.map(|scope| scope.split(' ').map(str::to_owned).collect())
			.unwrap_or_default();

		Ok(Self {
			realm: realm.to_owned(),
			service,
			scopes,
			username: username.to_owned(),
			secret: secret.to_owned(),
		})
	}
}
impl Debug for TokenOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenOptions")
			.field("realm", &self.realm)
			.field("service", &self.service)
			.field("scopes", &self.scopes)
			.field("username", &self.username)
			.field("secret", &"<redacted>")
			.finish()
	}
}

/// Issued-at information carried by a token endpoint response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Issued {
	/// The response omitted `issued_at`; the fetch instant stands in for it.
	Unspecified,
	/// The response carried the zero Unix timestamp, which disables expiry tracking.
	Zero,
	/// The response carried a concrete instant.
	At(OffsetDateTime),
}

/// Cached outcome of one token negotiation.
#[derive(Clone)]
pub struct AuthResult {
	/// Full `Authorization` header value, scheme prefix included.
	pub token: String,
	/// Effective expiry instant; `None` keeps the token for the handler's lifetime.
	pub expires: Option<OffsetDateTime>,
}
impl AuthResult {
	/// Wraps a raw bearer token with the mandatory expiry margin applied.
	///
	/// The effective expiry is `issued_at + 0.9 × expires_in` and is only recorded when that
	/// instant still lies in the future; a stale or zero issue instant leaves the result
	/// non-expiring.
	pub fn bearer(raw: &str, issued: Issued, expires_in: i64) -> Self {
		let token = format!("Bearer {raw}");
		let issued_at = match issued {
			Issued::Unspecified => Some(OffsetDateTime::now_utc()),
			Issued::Zero => None,
			Issued::At(instant) => Some(instant),
		};
		let expires = issued_at
			.filter(|_| expires_in > 0)
			.map(|at| at + Duration::seconds_f64(expires_in as f64 * EXPIRY_MARGIN))
			.filter(|expiry| *expiry > OffsetDateTime::now_utc());

		Self { token, expires }
	}

	/// Returns true while the result may still be served from cache.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		self.expires.is_none_or(|expiry| expiry > instant)
	}
}
impl Debug for AuthResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthResult")
			.field("token", &"<redacted>")
			.field("expires", &self.expires)
			.finish()
	}
}
