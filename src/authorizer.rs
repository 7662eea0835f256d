//! Request-facing facade that attaches and renews `Authorization` headers.

// crates.io
use reqwest::{Method, StatusCode, header};
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, Challenge, ScopeSet, TokenOptions, parse_challenges},
	error::ProtocolError,
	fetch::TokenFetcher,
	handler::AuthHandler,
	registry::HandlerRegistry,
	session::SessionGroup,
};

/// Per-client facade over the shared handler directory.
///
/// One authorizer serves one build client (one session group); all authorizers of the process
/// share the [`HandlerRegistry`] so sessions holding the same credential share handler state.
pub struct Authorizer {
	fetcher: TokenFetcher,
	registry: Arc<HandlerRegistry>,
	group: Arc<dyn SessionGroup>,
}
impl Authorizer {
	/// Creates an authorizer for one session group on top of the shared directory.
	pub fn new(
		fetcher: TokenFetcher,
		registry: Arc<HandlerRegistry>,
		group: Arc<dyn SessionGroup>,
	) -> Self {
		Self { fetcher, registry, group }
	}

	/// Attaches an `Authorization` header to `request` when a handler exists for its host.
	///
	/// A host without a negotiated handler is a no-op: the request goes out bare and the
	/// registry's challenge is fed back through [`add_responses`](Self::add_responses).
	/// `extra_scopes` carries the scopes attached to this request by upstream resolver logic.
	pub async fn authorize(
		&self,
		request: &mut reqwest::Request,
		extra_scopes: &[String],
	) -> Result<()> {
		let Some(host) = request_host(request.url()) else {
			return Ok(());
		};
		let Some(handler) = self.registry.get(&host, self.group.as_ref()).await else {
			return Ok(());
		};
		let value = handler
			.authorize(self.registry.provider(), &self.group, extra_scopes)
			.await?;
		let mut value = header::HeaderValue::from_str(&value)
			.map_err(|source| ProtocolError::InvalidHeader { source })?;

		value.set_sensitive(true);
		request.headers_mut().insert(header::AUTHORIZATION, value);

		Ok(())
	}

	/// Digests the response chain of the most recent attempt, installing or evicting handlers
	/// based on its `WWW-Authenticate` challenges.
	///
	/// The last element must be the current 401/407 response; earlier elements are prior
	/// attempts at the same logical request. The challenge path is serialized process-wide.
	pub async fn add_responses(&self, responses: &[AttemptResponse]) -> Result<()> {
		let _serialized = self.registry.lock_challenges().await;

		let Some(last) = responses.last() else {
			return Err(Error::NoSupportedScheme);
		};
		let host = request_host(&last.url).unwrap_or_default();
		let mut handler = self.registry.get(&host, self.group.as_ref()).await;

		for challenge in parse_challenges(last.www_authenticate.iter().map(String::as_str)) {
			match challenge.scheme {
				AuthScheme::Bearer => {
					let mut evicted_scopes = ScopeSet::default();

					if let Some(reason) = invalid_authorization(&challenge, responses) {
						if let Some(evicted) = handler.take() {
							self.registry.remove(&evicted);

							evicted_scopes = ScopeSet::parse(&evicted.common().scopes);
						}

						// insufficient_scope over scopes we already held cannot be fixed by
						// a fresh token
						if reason == "insufficient_scope" {
							let demanded = ScopeSet::parse(
								challenge.parameter("scope").unwrap_or_default().split(' '),
							);

							if evicted_scopes.contains(&demanded) {
								return Err(Error::InsufficientScope { reason });
							}
						}
					}

					// a surviving handler keeps answering: realm and service are stable per
					// registry and the scope is the only per-request part
					if handler.is_some() {
						return Ok(());
					}

					let (session_id, authority, username, secret) = {
						let (id, authority) = self
							.registry
							.provider()
							.token_authority(&host, self.group.as_ref())
							.await?;

						match authority {
							Some(key) => (id, Some(key), String::new(), String::new()),
							None => {
								let credentials = self
									.registry
									.provider()
									.credentials(&host, self.group.as_ref())
									.await?;

								(
									credentials.session_id,
									None,
									credentials.username,
									credentials.secret,
								)
							},
						}
					};
					let mut common =
						TokenOptions::from_challenge(&host, &username, &secret, &challenge)?;
					let mut scopes = ScopeSet::parse(&common.scopes);

					scopes.merge(evicted_scopes);
					common.scopes = scopes.normalize();

					self.registry.set(
						&host,
						&session_id,
						Arc::new(AuthHandler::new(
							host.clone(),
							self.fetcher.clone(),
							AuthScheme::Bearer,
							authority,
							common,
						)),
					);

					return Ok(());
				},
				AuthScheme::Basic => {
					let credentials = self
						.registry
						.provider()
						.credentials(&host, self.group.as_ref())
						.await?;

					if !credentials.username.is_empty() && !credentials.secret.is_empty() {
						self.registry.set(
							&host,
							&credentials.session_id,
							Arc::new(AuthHandler::new(
								host.clone(),
								self.fetcher.clone(),
								AuthScheme::Basic,
								None,
								TokenOptions {
									username: credentials.username,
									secret: credentials.secret,
									..Default::default()
								},
							)),
						);

						return Ok(());
					}
				},
				AuthScheme::Other(_) => {},
			}
		}

		Err(Error::NoSupportedScheme)
	}
}
impl Debug for Authorizer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authorizer").field("registry", &self.registry).finish()
	}
}

/// Owned snapshot of one HTTP response within a retry chain.
///
/// reqwest responses do not retain their request, so the method is captured by the caller.
#[derive(Clone, Debug)]
pub struct AttemptResponse {
	/// Request method the response answered.
	pub method: Method,
	/// Request URL the response answered.
	pub url: Url,
	/// Response status.
	pub status: StatusCode,
	/// Raw `WWW-Authenticate` header values, in wire order.
	pub www_authenticate: Vec<String>,
}
impl AttemptResponse {
	/// Captures the challenge-relevant parts of `response`.
	pub fn from_response(method: Method, response: &reqwest::Response) -> Self {
		let www_authenticate = response
			.headers()
			.get_all(header::WWW_AUTHENTICATE)
			.iter()
			.filter_map(|value| value.to_str().ok().map(str::to_owned))
			.collect();

		Self { method, url: response.url().clone(), status: response.status(), www_authenticate }
	}

	fn same_request(&self, other: &AttemptResponse) -> bool {
		self.method == other.method && self.url == other.url
	}
}

/// Host key for a request URL, carrying the port when one is spelled out.
fn request_host(url: &Url) -> Option<String> {
	let host = url.host_str()?;

	match url.port() {
		Some(port) => Some(format!("{host}:{port}")),
		None => Some(host.to_owned()),
	}
}

/// Decides whether a challenge proves the previously sent authorization was rejected, returning
/// the server's reason when it was.
///
/// That is the case only when the challenge carries an `error` parameter and the previous
/// response in the chain answered the same request: a challenge for a different URL is the
/// normal first contact, not a rejection.
fn invalid_authorization(challenge: &Challenge, responses: &[AttemptResponse]) -> Option<String> {
	let reason = challenge.parameter("error").filter(|reason| !reason.is_empty())?;
	let n = responses.len();

	if n < 2 || !responses[n - 2].same_request(&responses[n - 1]) {
		return None;
	}

	Some(reason.to_owned())
}
