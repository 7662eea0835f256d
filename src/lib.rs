//! Registry authorization core for container-image builders—Docker Registry v2 token
//! negotiation, scope-keyed token caches, and session-aware credential sharing in one crate.
//!
//! The crate answers one question for a build daemon talking to OCI registries: which
//! `Authorization` header belongs on this outbound request, for this build client, right now?
//! Challenges parsed from `WWW-Authenticate` responses install per-host handlers; handlers
//! cache bearer tokens per canonical scope, collapse concurrent fetches for the same scope into
//! one exchange, and are shared across client sessions that prove they hold the same
//! credential.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authorizer;
pub mod error;
pub mod fetch;
mod flight;
pub mod handler;
pub mod obs;
pub mod registry;
pub mod session;

#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures shared by unit and integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		authorizer::Authorizer,
		fetch::TokenFetcher,
		registry::HandlerRegistry,
		session::{
			CredentialError, CredentialFuture, CredentialProvider, Credentials,
			DelegatedTokenRequest, DelegatedTokenResponse, SessionGroup, SessionId,
			StaticSessionGroup, TokenAuthority,
		},
	};

	/// Constructs an [`Authorizer`] for `sessions` on top of a fresh shared directory.
	pub fn build_test_authorizer(
		provider: Arc<dyn CredentialProvider>,
		sessions: &[&str],
	) -> (Authorizer, Arc<HandlerRegistry>) {
		let registry = Arc::new(HandlerRegistry::new(provider));
		let group: Arc<dyn SessionGroup> =
			Arc::new(StaticSessionGroup::new(sessions.iter().copied()));

		(Authorizer::new(TokenFetcher::default(), registry.clone(), group), registry)
	}

	/// Constructs an authorizer for `sessions` that shares an existing directory.
	pub fn join_test_registry(registry: Arc<HandlerRegistry>, sessions: &[&str]) -> Authorizer {
		let group: Arc<dyn SessionGroup> =
			Arc::new(StaticSessionGroup::new(sessions.iter().copied()));

		Authorizer::new(TokenFetcher::default(), registry, group)
	}

	/// Configurable in-memory credential provider backed by per-`(host, session)` tables.
	#[derive(Default)]
	pub struct TestCredentialProvider {
		credentials: Mutex<HashMap<(String, String), (String, String)>>,
		authorities: Mutex<HashMap<(String, String), TokenAuthority>>,
		delegated: Mutex<Option<DelegatedTokenResponse>>,
		delegated_requests: Mutex<Vec<DelegatedTokenRequest>>,
		delegated_calls: AtomicUsize,
	}
	impl TestCredentialProvider {
		/// Registers plain credentials for a `(host, session)` pair.
		pub fn with_credentials(
			self,
			host: &str,
			session: &str,
			username: &str,
			secret: &str,
		) -> Self {
			self.credentials.lock().insert(
				(host.to_owned(), session.to_owned()),
				(username.to_owned(), secret.to_owned()),
			);

			self
		}

		/// Registers a delegated authority key for a `(host, session)` pair.
		pub fn with_authority(self, host: &str, session: &str, authority: TokenAuthority) -> Self {
			self.authorities.lock().insert((host.to_owned(), session.to_owned()), authority);

			self
		}

		/// Seeds the response returned by delegated token minting.
		pub fn with_delegated_token(self, token: &str, expires_in: i64, issued_at: i64) -> Self {
			*self.delegated.lock() =
				Some(DelegatedTokenResponse { token: token.to_owned(), expires_in, issued_at });

			self
		}

		/// Number of delegated minting calls observed.
		pub fn delegated_calls(&self) -> usize {
			self.delegated_calls.load(Ordering::SeqCst)
		}

		/// Most recent delegated minting request, if any.
		pub fn last_delegated_request(&self) -> Option<DelegatedTokenRequest> {
			self.delegated_requests.lock().last().cloned()
		}
	}
	impl CredentialProvider for TestCredentialProvider {
		fn credentials<'a>(
			&'a self,
			host: &'a str,
			group: &'a dyn SessionGroup,
		) -> CredentialFuture<'a, Credentials> {
			Box::pin(async move {
				for id in group.iter_sessions().into_iter().flatten() {
					let entry = self
						.credentials
						.lock()
						.get(&(host.to_owned(), id.as_str().to_owned()))
						.cloned();

					if let Some((username, secret)) = entry {
						return Ok(Credentials { session_id: id, username, secret });
					}
				}

				Err(CredentialError::NotFound { host: host.to_owned() })
			})
		}

		fn token_authority<'a>(
			&'a self,
			host: &'a str,
			group: &'a dyn SessionGroup,
		) -> CredentialFuture<'a, (SessionId, Option<TokenAuthority>)> {
			Box::pin(async move {
				let ids =
					group.iter_sessions().into_iter().flatten().collect::<Vec<SessionId>>();

				for id in &ids {
					let key = self
						.authorities
						.lock()
						.get(&(host.to_owned(), id.as_str().to_owned()))
						.copied();

					if let Some(key) = key {
						return Ok((id.clone(), Some(key)));
					}
				}

				Ok((ids.into_iter().next().unwrap_or_else(|| SessionId::new("")), None))
			})
		}

		fn verify_authority<'a>(
			&'a self,
			host: &'a str,
			authority: &'a TokenAuthority,
			group: &'a dyn SessionGroup,
		) -> CredentialFuture<'a, Option<SessionId>> {
			Box::pin(async move {
				for id in group.iter_sessions().into_iter().flatten() {
					let key = self
						.authorities
						.lock()
						.get(&(host.to_owned(), id.as_str().to_owned()))
						.copied();

					if key.as_ref() == Some(authority) {
						return Ok(Some(id));
					}
				}

				Ok(None)
			})
		}

		fn fetch_token<'a>(
			&'a self,
			request: DelegatedTokenRequest,
			_group: &'a dyn SessionGroup,
		) -> CredentialFuture<'a, DelegatedTokenResponse> {
			Box::pin(async move {
				self.delegated_calls.fetch_add(1, Ordering::SeqCst);
				self.delegated_requests.lock().push(request);

				self.delegated.lock().clone().ok_or(CredentialError::Backend {
					message: "no delegated token configured".into(),
				})
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, registry_auth_broker as _, tokio as _};
