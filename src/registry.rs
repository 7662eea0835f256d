//! Process-wide directory of authentication handlers keyed by host and session.

// self
use crate::{
	_prelude::*,
	handler::AuthHandler,
	session::{CredentialProvider, SessionGroup, SessionId},
};

/// Directory of [`AuthHandler`]s shared by every authorizer of the process.
///
/// Entries are keyed `"host/session_id"` and many keys may alias one handler: when a session
/// proves it holds the credential a handler was built with (matching authority key, or matching
/// username/secret pair), it is linked to the existing handler instead of negotiating its own.
/// Linking installs an alias, never a clone, so aliased sessions share one token cache.
///
/// The map mutex is held for lookup, insert, and delete only; credential verification and every
/// other suspending call happen outside it.
pub struct HandlerRegistry {
	handlers: Mutex<HashMap<String, Arc<AuthHandler>>>,
	provider: Arc<dyn CredentialProvider>,
	// serializes the challenge path across authorizers
	challenges: AsyncMutex<()>,
}
impl HandlerRegistry {
	/// Creates an empty directory backed by the given credential provider.
	pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
		Self {
			handlers: Mutex::new(HashMap::new()),
			provider,
			challenges: AsyncMutex::new(()),
		}
	}

	fn key(host: &str, session: &str) -> String {
		format!("{host}/{session}")
	}

	/// Looks up the handler for `host` visible to `group`, linking one across sessions when a
	/// group member proves it holds a known handler's credential.
	pub async fn get(&self, host: &str, group: &dyn SessionGroup) -> Option<Arc<AuthHandler>> {
		{
			let handlers = self.handlers.lock();

			if let Some(sessions) = group.iter_sessions() {
				for id in sessions {
					if let Some(handler) = handlers.get(&Self::key(host, id.as_str())) {
						handler.touch();

						return Some(handler.clone());
					}
				}
			}
		}

		self.link(host, group).await
	}

	async fn link(&self, host: &str, group: &dyn SessionGroup) -> Option<Arc<AuthHandler>> {
		let prefix = format!("{host}/");
		let candidates = {
			let handlers = self.handlers.lock();
			let mut distinct: Vec<Arc<AuthHandler>> = Vec::new();

			for (key, handler) in handlers.iter() {
				if key.starts_with(&prefix)
					&& !distinct.iter().any(|seen| Arc::ptr_eq(seen, handler))
				{
					distinct.push(handler.clone());
				}
			}

			distinct
		};

		for handler in candidates {
			let session_id = match handler.authority() {
				Some(authority) => self
					.provider
					.verify_authority(host, authority, group)
					.await
					.ok()
					.flatten(),
				None => match self.provider.credentials(host, group).await {
					Ok(credentials)
						if credentials.username == handler.common().username
							&& credentials.secret == handler.common().secret =>
						Some(credentials.session_id),
					_ => None,
				},
			};

			if let Some(id) = session_id {
				handler.touch();
				self.handlers.lock().insert(Self::key(host, id.as_str()), handler.clone());

				return Some(handler);
			}
		}

		None
	}

	/// Installs `handler` for `(host, session)`.
	pub fn set(&self, host: &str, session: &SessionId, handler: Arc<AuthHandler>) {
		self.handlers.lock().insert(Self::key(host, session.as_str()), handler);
	}

	/// Removes every alias pointing at `handler`.
	pub fn remove(&self, handler: &Arc<AuthHandler>) {
		self.handlers.lock().retain(|_, entry| !Arc::ptr_eq(entry, handler));
	}

	/// Number of installed keys (aliases included).
	pub fn len(&self) -> usize {
		self.handlers.lock().len()
	}

	/// Returns true when no handler is installed.
	pub fn is_empty(&self) -> bool {
		self.handlers.lock().is_empty()
	}

	pub(crate) fn provider(&self) -> &Arc<dyn CredentialProvider> {
		&self.provider
	}

	pub(crate) async fn lock_challenges(&self) -> async_lock::MutexGuard<'_, ()> {
		self.challenges.lock().await
	}
}
impl Debug for HandlerRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HandlerRegistry").field("handlers", &self.len()).finish()
	}
}
