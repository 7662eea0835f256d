//! Session-scoped credential lookup contracts consumed by the authorizer core.
//!
//! The build daemon multiplexes one registry endpoint across many attached clients. Each client
//! session can supply plain credentials or hold a delegated token-minting authority; the traits
//! here are the only surface through which the core reaches that subsystem.

// self
use crate::_prelude::*;

/// Identifier of one build client session attached to the daemon.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);
impl SessionId {
	/// Wraps a session identifier handed out by the session subsystem.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for SessionId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Opaque 32-byte public key identifying a delegated token-minting authority.
///
/// The core never interprets the bytes; equality is identity and is what proves that two
/// sessions hold the same delegated credential.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TokenAuthority([u8; 32]);
impl TokenAuthority {
	/// Wraps raw public key bytes.
	pub const fn new(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	/// Returns the raw key bytes.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}
impl Debug for TokenAuthority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"TokenAuthority({:02x}{:02x}{:02x}{:02x}…)",
			self.0[0], self.0[1], self.0[2], self.0[3],
		)
	}
}

/// Finite sequence of the session ids attached to one build operation.
///
/// The iterator is lazy and single-use: consumers must walk it at most once per lookup, and
/// implementations are not required to be restartable.
pub trait SessionGroup: Send + Sync {
	/// Returns the iterator over attached session ids, or `None` when the group cannot
	/// currently enumerate them.
	fn iter_sessions(&self) -> Option<Box<dyn Iterator<Item = SessionId> + Send + '_>>;
}

/// Fixed session group backed by a vector of ids.
#[derive(Clone, Debug, Default)]
pub struct StaticSessionGroup(Vec<SessionId>);
impl StaticSessionGroup {
	/// Builds a group from any collection of session ids.
	pub fn new<I, S>(ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(ids.into_iter().map(SessionId::new).collect())
	}
}
impl SessionGroup for StaticSessionGroup {
	fn iter_sessions(&self) -> Option<Box<dyn Iterator<Item = SessionId> + Send + '_>> {
		Some(Box::new(self.0.iter().cloned()))
	}
}

/// Username/secret material resolved from a session group member.
#[derive(Clone)]
pub struct Credentials {
	/// Session that supplied the material.
	pub session_id: SessionId,
	/// Username; empty for anonymous access.
	pub username: String,
	/// Secret; empty for anonymous access.
	pub secret: String,
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("session_id", &self.session_id)
			.field("username", &self.username)
			.field("secret", &"<redacted>")
			.finish()
	}
}

/// Request for delegated token minting by a session-held authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegatedTokenRequest {
	/// Client identifier presented to the signer.
	pub client_id: String,
	/// Registry host the token is for.
	pub host: String,
	/// Token endpoint realm from the challenge.
	pub realm: String,
	/// Service name from the challenge.
	pub service: String,
	/// Normalized scopes the token must cover.
	pub scopes: Vec<String>,
}

/// Response from delegated token minting.
#[derive(Clone, Serialize, Deserialize)]
pub struct DelegatedTokenResponse {
	/// Raw bearer token.
	pub token: String,
	/// Advertised lifetime in seconds; zero falls back to the 60-second default.
	pub expires_in: i64,
	/// Unix issue instant; zero is distinct from "now" and disables expiry tracking.
	pub issued_at: i64,
}
impl Debug for DelegatedTokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatedTokenResponse")
			.field("token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Error type produced by [`CredentialProvider`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// No session in the group could resolve material for the host.
	#[error("No credentials available for {host}.")]
	NotFound {
		/// Registry host the lookup targeted.
		host: String,
	},
	/// Session subsystem failure.
	#[error("Session backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Boxed future returned by [`CredentialProvider`] operations.
pub type CredentialFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, CredentialError>> + 'a + Send>>;

/// Session-subsystem contract resolving credential material per registry host.
pub trait CredentialProvider: Send + Sync {
	/// Resolves plain credentials for `host` from the first able member of `group`.
	fn credentials<'a>(
		&'a self,
		host: &'a str,
		group: &'a dyn SessionGroup,
	) -> CredentialFuture<'a, Credentials>;

	/// Resolves the delegated token authority for `host`.
	///
	/// A `None` key means no group member holds a delegated authority for this host and the
	/// caller should fall through to [`credentials`](Self::credentials).
	fn token_authority<'a>(
		&'a self,
		host: &'a str,
		group: &'a dyn SessionGroup,
	) -> CredentialFuture<'a, (SessionId, Option<TokenAuthority>)>;

	/// Returns the first group member proving possession of `authority` for `host`.
	fn verify_authority<'a>(
		&'a self,
		host: &'a str,
		authority: &'a TokenAuthority,
		group: &'a dyn SessionGroup,
	) -> CredentialFuture<'a, Option<SessionId>>;

	/// Mints a token through the session-held authority instead of the registry.
	fn fetch_token<'a>(
		&'a self,
		request: DelegatedTokenRequest,
		group: &'a dyn SessionGroup,
	) -> CredentialFuture<'a, DelegatedTokenResponse>;
}
