//! Per-host, per-credential authentication state and token fetch orchestration.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{AuthResult, AuthScheme, Issued, ScopeSet, TokenOptions, token::DEFAULT_EXPIRATION_SECS},
	fetch::{CLIENT_ID, TokenFetcher},
	flight::FlightGroup,
	obs::{self, FetchKind, FetchOutcome, FetchSpan},
	session::{CredentialProvider, DelegatedTokenRequest, SessionGroup, TokenAuthority},
};

/// Per-host, per-credential authentication state.
///
/// One handler answers every request to its host made under one proven credential. Bearer
/// results are cached per canonical scope string and refreshed lazily on expiry; concurrent
/// fetches for the same scope collapse into one exchange. The handler never references the
/// directory that owns it, so aliasing the same handler under many session keys cannot form
/// cycles.
pub struct AuthHandler {
	host: String,
	fetcher: TokenFetcher,
	scheme: AuthScheme,
	// the challenge answer shared by all scoped requests; realm and service are host-stable
	common: TokenOptions,
	authority: Option<TokenAuthority>,
	scoped_tokens: Mutex<HashMap<String, AuthResult>>,
	flight: FlightGroup<AuthResult>,
	last_used: Mutex<OffsetDateTime>,
}
impl AuthHandler {
	/// Creates handler state for `host` under one credential.
	pub fn new(
		host: impl Into<String>,
		fetcher: TokenFetcher,
		scheme: AuthScheme,
		authority: Option<TokenAuthority>,
		common: TokenOptions,
	) -> Self {
		Self {
			host: host.into(),
			fetcher,
			scheme,
			common,
			authority,
			scoped_tokens: Mutex::new(HashMap::new()),
			flight: FlightGroup::default(),
			last_used: Mutex::new(OffsetDateTime::now_utc()),
		}
	}

	/// Host this handler answers for.
	pub fn host(&self) -> &str {
		&self.host
	}

	/// Scheme negotiated for this handler.
	pub fn scheme(&self) -> &AuthScheme {
		&self.scheme
	}

	/// Challenge answer shared by every scoped request.
	pub fn common(&self) -> &TokenOptions {
		&self.common
	}

	/// Delegated authority key, when tokens are minted session-side.
	pub fn authority(&self) -> Option<&TokenAuthority> {
		self.authority.as_ref()
	}

	/// Instant of the most recent directory hit.
	pub fn last_used(&self) -> OffsetDateTime {
		*self.last_used.lock()
	}

	pub(crate) fn touch(&self) {
		*self.last_used.lock() = OffsetDateTime::now_utc();
	}

	/// Produces the `Authorization` header value for one outbound request.
	///
	/// `extra_scopes` carries the scopes attached to the current request by upstream resolver
	/// logic; they are merged with the handler's accumulated scopes for this fetch only.
	pub async fn authorize(
		self: &Arc<Self>,
		provider: &Arc<dyn CredentialProvider>,
		group: &Arc<dyn SessionGroup>,
		extra_scopes: &[String],
	) -> Result<String> {
		match &self.scheme {
			AuthScheme::Basic => self.basic_header(),
			AuthScheme::Bearer => self.bearer_header(provider, group, extra_scopes).await,
			AuthScheme::Other(scheme) =>
				Err(Error::UnsupportedScheme { scheme: scheme.clone() }),
		}
	}

	fn basic_header(&self) -> Result<String> {
		let TokenOptions { username, secret, .. } = &self.common;

		if username.is_empty() || secret.is_empty() {
			return Err(Error::MissingCredentials { host: self.host.clone() });
		}

		Ok(format!("Basic {}", STANDARD.encode(format!("{username}:{secret}"))))
	}

	async fn bearer_header(
		self: &Arc<Self>,
		provider: &Arc<dyn CredentialProvider>,
		group: &Arc<dyn SessionGroup>,
		extra_scopes: &[String],
	) -> Result<String> {
		let scopes = ScopeSet::parse(
			self.common.scopes.iter().map(String::as_str).chain(extra_scopes.iter().map(String::as_str)),
		);
		let scoped = scopes.canonical();
		let mut options = self.common.clone();

		options.scopes = scopes.normalize();

		let handler = Arc::clone(self);
		let provider = Arc::clone(provider);
		let group = Arc::clone(group);
		let key = scoped.clone();
		let result = self
			.flight
			.run(&scoped, async move { handler.scoped_token(provider, group, key, options).await })
			.await?;

		Ok(result.token)
	}

	async fn scoped_token(
		self: Arc<Self>,
		provider: Arc<dyn CredentialProvider>,
		group: Arc<dyn SessionGroup>,
		scoped: String,
		options: TokenOptions,
	) -> Result<AuthResult> {
		{
			let tokens = self.scoped_tokens.lock();

			if let Some(cached) = tokens.get(&scoped)
				&& cached.is_valid_at(OffsetDateTime::now_utc())
			{
				return Ok(cached.clone());
			}
		}

		let result = self.fetch_token(&provider, &group, &options).await?;

		self.scoped_tokens.lock().insert(scoped, result.clone());

		Ok(result)
	}

	async fn fetch_token(
		&self,
		provider: &Arc<dyn CredentialProvider>,
		group: &Arc<dyn SessionGroup>,
		options: &TokenOptions,
	) -> Result<AuthResult> {
		if self.authority.is_some() {
			let span = FetchSpan::new(FetchKind::Delegated, &self.host);

			return span.instrument(self.fetch_delegated(provider, group, options)).await;
		}

		let kind =
			if options.secret.is_empty() { FetchKind::Anonymous } else { FetchKind::Basic };
		let span = FetchSpan::new(kind, &self.host);

		if options.secret.is_empty() {
			span.instrument(self.fetcher.fetch_anonymous(options)).await
		} else {
			span.instrument(self.fetcher.fetch_with_credentials(options)).await
		}
	}

	async fn fetch_delegated(
		&self,
		provider: &Arc<dyn CredentialProvider>,
		group: &Arc<dyn SessionGroup>,
		options: &TokenOptions,
	) -> Result<AuthResult> {
		obs::record_fetch_outcome(FetchKind::Delegated, FetchOutcome::Attempt);

		let request = DelegatedTokenRequest {
			client_id: CLIENT_ID.to_owned(),
			host: self.host.clone(),
			realm: options.realm.clone(),
			service: options.service.clone(),
			scopes: options.scopes.clone(),
		};
		let outcome = provider.fetch_token(request, group.as_ref()).await;

		match &outcome {
			Ok(_) => obs::record_fetch_outcome(FetchKind::Delegated, FetchOutcome::Success),
			Err(_) => obs::record_fetch_outcome(FetchKind::Delegated, FetchOutcome::Failure),
		}

		let response = outcome?;
		let expires_in = if response.expires_in == 0 {
			DEFAULT_EXPIRATION_SECS
		} else {
			response.expires_in
		};
		let issued = if response.issued_at == 0 {
			Issued::Zero
		} else {
			OffsetDateTime::from_unix_timestamp(response.issued_at)
				.map_or(Issued::Unspecified, Issued::At)
		};

		Ok(AuthResult::bearer(&response.token, issued, expires_in))
	}
}
impl Debug for AuthHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthHandler")
			.field("host", &self.host)
			.field("scheme", &self.scheme)
			.field("authority", &self.authority)
			.field("common", &self.common)
			.finish()
	}
}
