//! Keyed duplicate suppression for concurrent token fetches.

// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared, WeakShared},
};
// self
use crate::_prelude::*;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Arc<Error>>>>;
type WeakFetch<T> = WeakShared<BoxFuture<'static, Result<T, Arc<Error>>>>;

/// Collapses concurrent computations for the same key into one in-flight future.
///
/// Late arrivals join the computation already in flight and every waiter observes the same
/// outcome. The map only holds weak handles: dropping one waiter leaves the fetch running for
/// the rest, while dropping the last one drops the fetch itself, so an abandoned computation is
/// never resurrected for a later caller. Outcomes are not cached here; the entry dies as soon as
/// the computation settles.
pub(crate) struct FlightGroup<T> {
	inflight: Mutex<HashMap<String, WeakFetch<T>>>,
}
impl<T> Default for FlightGroup<T> {
	fn default() -> Self {
		Self { inflight: Mutex::new(HashMap::new()) }
	}
}
impl<T> FlightGroup<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Runs `compute` under `key`, or joins the computation already in flight for it.
	pub(crate) async fn run<F>(&self, key: &str, compute: F) -> Result<T>
	where
		F: 'static + Future<Output = Result<T>> + Send,
	{
		let shared = self.admit(key, compute);
		let outcome = shared.clone().await;

		self.settle(key, &shared);

		outcome.map_err(Error::from)
	}

	fn admit<F>(&self, key: &str, compute: F) -> SharedFetch<T>
	where
		F: 'static + Future<Output = Result<T>> + Send,
	{
		let mut inflight = self.inflight.lock();

		if let Some(existing) = inflight.get(key).and_then(WeakShared::upgrade) {
			return existing;
		}

		let fresh = compute.map(|outcome| outcome.map_err(Arc::new)).boxed().shared();

		if let Some(weak) = fresh.downgrade() {
			inflight.insert(key.to_owned(), weak);
		}

		fresh
	}

	fn settle(&self, key: &str, shared: &SharedFetch<T>) {
		let mut inflight = self.inflight.lock();

		if inflight
			.get(key)
			.and_then(WeakShared::upgrade)
			.is_none_or(|current| current.ptr_eq(shared))
		{
			inflight.remove(key);
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn concurrent_callers_share_one_computation() {
		let group = Arc::new(FlightGroup::<String>::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let spawn = |key: &'static str| {
			let group = group.clone();
			let calls = calls.clone();

			async move {
				group
					.run(key, async move {
						calls.fetch_add(1, Ordering::SeqCst);
						tokio::time::sleep(std::time::Duration::from_millis(20)).await;

						Ok("token".to_owned())
					})
					.await
			}
		};
		let (a, b, c) = tokio::join!(spawn("scope"), spawn("scope"), spawn("scope"));

		assert_eq!(a.expect("First waiter should succeed."), "token");
		assert_eq!(b.expect("Second waiter should succeed."), "token");
		assert_eq!(c.expect("Third waiter should succeed."), "token");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn distinct_keys_compute_independently() {
		let group = Arc::new(FlightGroup::<usize>::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let spawn = |key: &'static str, value: usize| {
			let group = group.clone();
			let calls = calls.clone();

			async move {
				group
					.run(key, async move {
						calls.fetch_add(1, Ordering::SeqCst);

						Ok(value)
					})
					.await
			}
		};
		let (a, b) = tokio::join!(spawn("pull", 1), spawn("push", 2));

		assert_eq!(a.expect("Pull computation should succeed."), 1);
		assert_eq!(b.expect("Push computation should succeed."), 2);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn failures_are_shared_but_never_cached() {
		let group = FlightGroup::<String>::default();
		let err = group
			.run("scope", async { Err(Error::NoSupportedScheme) })
			.await
			.expect_err("The seeded failure should surface.");

		assert!(matches!(err, Error::Shared(_)));

		let recovered = group
			.run("scope", async { Ok("token".to_owned()) })
			.await
			.expect("A fresh computation should run after the failure settled.");

		assert_eq!(recovered, "token");
	}
}
