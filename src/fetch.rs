//! Token endpoint exchanges against the registry's authorization service.
//!
//! The fetcher speaks the Docker Registry v2 token protocol: an anonymous or Basic-authenticated
//! GET on the challenge realm, and a form-encoded OAuth POST used as a fallback for endpoints
//! that reject the GET form. Expiry post-processing (margin, defaults, zero issue instants)
//! lives in [`AuthResult::bearer`].

// crates.io
use reqwest::header;
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	auth::{AuthResult, Issued, TokenOptions, token::DEFAULT_EXPIRATION_SECS},
	error::{ProtocolError, TokenEndpointError},
	obs::{self, FetchKind, FetchOutcome},
};

/// Client identifier presented to token endpoints and delegated signers.
pub(crate) const CLIENT_ID: &str = "buildkit-client";
/// User agent presented on every token endpoint request.
const USER_AGENT: &str = concat!("registry-auth-broker/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper around [`ReqwestClient`] performing the registry token exchanges.
///
/// The inner client is shared and safe for concurrent use; one fetcher instance serves every
/// handler of the process.
#[derive(Clone, Default)]
pub struct TokenFetcher(ReqwestClient);
impl TokenFetcher {
	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// GET on the realm without credentials.
	pub async fn fetch_anonymous(&self, options: &TokenOptions) -> Result<AuthResult> {
		self.fetch_get(FetchKind::Anonymous, options, false).await
	}

	/// GET on the realm with HTTP Basic credentials.
	pub async fn fetch_basic(&self, options: &TokenOptions) -> Result<AuthResult> {
		self.fetch_get(FetchKind::Basic, options, true).await
	}

	/// Credentialed bearer fetch with the in-core retry applied.
	///
	/// The GET form goes first because Docker Hub does not accept POST. GCR is known to answer
	/// 404 and JFrog Artifactory 401 to the GET exchange; both fall back to OAuth, as does 405
	/// when a username is present.
	pub async fn fetch_with_credentials(&self, options: &TokenOptions) -> Result<AuthResult> {
		match self.fetch_basic(options).await {
			Err(Error::TokenEndpoint(rejection)) if oauth_fallback(&rejection, options) =>
				self.fetch_oauth(options).await,
			outcome => outcome,
		}
	}

	/// POST `grant_type=password` fallback on the realm.
	pub async fn fetch_oauth(&self, options: &TokenOptions) -> Result<AuthResult> {
		obs::record_fetch_outcome(FetchKind::OAuth, FetchOutcome::Attempt);

		let scope = options.scopes.join(" ");
		let mut form = vec![
			("grant_type", "password"),
			("client_id", CLIENT_ID),
			("service", options.service.as_str()),
		];

		if !scope.is_empty() {
			form.push(("scope", scope.as_str()));
		}

		form.push(("username", options.username.as_str()));
		form.push(("password", options.secret.as_str()));
		form.push(("access_type", "offline"));

		let outcome = async {
			let realm = parse_realm(options)?;
			let response = self
				.0
				.post(realm)
				.header(header::USER_AGENT, USER_AGENT)
				.form(&form)
				.send()
				.await?;

			decode_response(response, true).await
		}
		.await;

		finish(FetchKind::OAuth, outcome)
	}

	async fn fetch_get(
		&self,
		kind: FetchKind,
		options: &TokenOptions,
		with_credentials: bool,
	) -> Result<AuthResult> {
		obs::record_fetch_outcome(kind, FetchOutcome::Attempt);

		let outcome = async {
			let realm = parse_realm(options)?;
			let mut query = Vec::new();

			if !options.service.is_empty() {
				query.push(("service", options.service.as_str()));
			}

			for scope in &options.scopes {
				query.push(("scope", scope.as_str()));
			}

			let mut request =
				self.0.get(realm).header(header::USER_AGENT, USER_AGENT).query(&query);

			if with_credentials {
				request = request.basic_auth(&options.username, Some(&options.secret));
			}

			decode_response(request.send().await?, false).await
		}
		.await;

		finish(kind, outcome)
	}
}
impl Debug for TokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenFetcher(..)")
	}
}

#[derive(Deserialize)]
struct TokenPayload {
	#[serde(default)]
	token: String,
	#[serde(default)]
	access_token: String,
	#[serde(default, alias = "expires_in_seconds")]
	expires_in: i64,
	#[serde(default, with = "time::serde::rfc3339::option")]
	issued_at: Option<OffsetDateTime>,
}

fn parse_realm(options: &TokenOptions) -> Result<Url> {
	Ok(Url::parse(&options.realm).map_err(|source| ProtocolError::InvalidRealm { source })?)
}

async fn decode_response(response: reqwest::Response, prefer_access_token: bool) -> Result<AuthResult> {
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.unwrap_or_default();

		obs::record_endpoint_rejection(status.as_u16(), &body);

		return Err(TokenEndpointError { status: status.as_u16(), body }.into());
	}

	let body = response.bytes().await?;

	decode_payload(&body, status.as_u16(), prefer_access_token)
}

fn decode_payload(body: &[u8], status: u16, prefer_access_token: bool) -> Result<AuthResult> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let payload: TokenPayload = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ProtocolError::ResponseParse { source, status })?;
	let (first, second) = if prefer_access_token {
		(payload.access_token, payload.token)
	} else {
		(payload.token, payload.access_token)
	};
	let raw = [first, second]
		.into_iter()
		.find(|candidate| !candidate.is_empty())
		.ok_or(ProtocolError::MissingToken)?;
	let expires_in =
		if payload.expires_in == 0 { DEFAULT_EXPIRATION_SECS } else { payload.expires_in };
	let issued = match payload.issued_at {
		None => Issued::Unspecified,
		Some(at) if at.unix_timestamp() == 0 => Issued::Zero,
		Some(at) => Issued::At(at),
	};

	Ok(AuthResult::bearer(&raw, issued, expires_in))
}

fn finish(kind: FetchKind, outcome: Result<AuthResult>) -> Result<AuthResult> {
	match &outcome {
		Ok(_) => obs::record_fetch_outcome(kind, FetchOutcome::Success),
		Err(_) => obs::record_fetch_outcome(kind, FetchOutcome::Failure),
	}

	outcome
}

fn oauth_fallback(rejection: &TokenEndpointError, options: &TokenOptions) -> bool {
	matches!(rejection.status, 401 | 404)
		|| (rejection.status == 405 && !options.username.is_empty())
}
