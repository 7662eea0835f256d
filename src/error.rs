//! Authorizer-level error types shared across handlers, fetchers, and the handler directory.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical authorizer error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session/credential subsystem failure.
	#[error("{0}")]
	Credential(
		#[from]
		#[source]
		crate::session::CredentialError,
	),
	/// Malformed challenge or token endpoint payload.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token endpoint answered with a status the retry policy cannot recover from.
	#[error(transparent)]
	TokenEndpoint(#[from] TokenEndpointError),

	/// Authorization was rejected for scopes the evicted handler already held; a fresh token
	/// cannot widen anything, so the request must not be retried.
	#[error("Authorization failed with insufficient_scope for scopes already held: {reason}.")]
	InsufficientScope {
		/// Server-supplied `error` parameter from the challenge.
		reason: String,
	},
	/// Basic scheme selected while the username or secret is empty.
	#[error("Missing username or secret for basic auth against {host}.")]
	MissingCredentials {
		/// Registry host the credentials were requested for.
		host: String,
	},
	/// Challenge presented a scheme the authorizer cannot answer.
	#[error("Unsupported auth scheme: {scheme}.")]
	UnsupportedScheme {
		/// Scheme token as it appeared in the challenge.
		scheme: String,
	},
	/// No challenge in the response chain could be converted into a handler.
	#[error("Failed to find a supported auth scheme.")]
	NoSupportedScheme,
	/// Failure observed through a duplicate-suppressed fetch shared with other callers.
	#[error(transparent)]
	Shared(#[from] Arc<Error>),
}

/// Malformed-input failures raised while speaking the token protocol.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Bearer challenge without a realm parameter.
	#[error("Challenge from {host} carries no realm for token auth.")]
	MissingRealm {
		/// Host the challenge was received from.
		host: String,
	},
	/// Realm parameter is not a valid URL.
	#[error("Challenge realm is not a valid URL.")]
	InvalidRealm {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Token endpoint response carried no token value.
	#[error("Token endpoint response did not include a token.")]
	MissingToken,
	/// Token endpoint responded with JSON that could not be decoded.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code the payload arrived with.
		status: u16,
	},
	/// Negotiated token cannot be carried in an `Authorization` header.
	#[error("Negotiated token is not a valid header value.")]
	InvalidHeader {
		/// Underlying header validation failure.
		#[source]
		source: reqwest::header::InvalidHeaderValue,
	},
}

/// Unexpected status answered by the token endpoint.
///
/// The body is retained for debug-level logging only and stays out of the rendered message so
/// registry error payloads never reach user-facing output.
#[derive(Debug, ThisError)]
#[error("Token endpoint answered status {status}.")]
pub struct TokenEndpointError {
	/// HTTP status code of the response.
	pub status: u16,
	/// Raw response body, surfaced at debug level by the fetcher.
	pub body: String,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		TransportError::from(e).into()
	}
}
