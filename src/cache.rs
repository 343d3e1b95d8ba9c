//! Retry memoization for idempotent protocol steps.
//!
//! A [`RetryCache`] makes one logical step individually retryable: re-invoking the
//! step with structurally equal arguments inside the TTL window reuses the previous
//! result instead of re-issuing network calls, so a user-visible retry of a late step
//! never re-executes the already-succeeded prefix of the handshake. Concurrent callers
//! racing the original call coalesce onto a single execution through a per-key
//! singleflight guard.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

struct CacheEntry<T> {
	args: JsonValue,
	value: T,
	expires_at: OffsetDateTime,
}

/// Memoization cache for one step family.
///
/// Keys are explicit: the step name supplied at construction combined with a
/// fingerprint of the serialized arguments. Equality over arguments is deep and
/// structural, never reference identity; the fingerprint narrows the lookup and the
/// stored argument value confirms the hit. Failed executions are evicted immediately
/// so a poisoned failure is never served.
pub struct RetryCache<T> {
	step: &'static str,
	entries: Mutex<HashMap<String, CacheEntry<T>>>,
	guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl<T> RetryCache<T>
where
	T: Clone,
{
	/// Creates an empty cache for the named step.
	pub fn new(step: &'static str) -> Self {
		Self { step, entries: Mutex::new(HashMap::new()), guards: Mutex::new(HashMap::new()) }
	}

	/// The step name this cache is keyed under.
	pub fn step(&self) -> &'static str {
		self.step
	}

	/// Returns the cached result for the arguments, or runs the step and caches it.
	///
	/// A hit requires an unexpired entry whose stored arguments are structurally equal
	/// to `args`. On a miss the step runs under the key's singleflight guard and its
	/// result is stored with `expires_at = now + ttl`; an error evicts the entry so the
	/// very next attempt is a guaranteed fresh call.
	pub async fn cache_and_return<F, Fut>(
		&self,
		args: &JsonValue,
		ttl: Duration,
		step_fn: F,
	) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let key = self.fingerprint(args);
		let guard = self.singleflight(&key);
		let result = {
			let _held = guard.lock().await;

			if let Some(value) = self.lookup_at(&key, args, OffsetDateTime::now_utc()) {
				Ok(value)
			} else {
				match step_fn().await {
					Ok(value) => {
						self.store_at(
							&key,
							args.clone(),
							value.clone(),
							OffsetDateTime::now_utc(),
							ttl,
						);

						Ok(value)
					},
					Err(err) => {
						self.entries.lock().remove(&key);

						Err(err)
					},
				}
			}
		};

		self.release_guard(&key, &guard);

		result
	}

	/// Empties the cache, forcing the next call to re-run the step.
	///
	/// Singleflight guards are dropped along with the entries; callers already parked on
	/// a guard keep their own handle and finish normally.
	pub fn clear(&self) {
		self.entries.lock().clear();
		self.guards.lock().clear();
	}

	/// Number of live entries, expired or not.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns true when no entry is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	fn lookup_at(&self, key: &str, args: &JsonValue, now: OffsetDateTime) -> Option<T> {
		let mut entries = self.entries.lock();
		let entry = entries.get(key)?;

		if now >= entry.expires_at {
			entries.remove(key);

			return None;
		}
		if entry.args != *args {
			return None;
		}

		Some(entry.value.clone())
	}

	fn store_at(&self, key: &str, args: JsonValue, value: T, now: OffsetDateTime, ttl: Duration) {
		self.entries
			.lock()
			.insert(key.to_owned(), CacheEntry { args, value, expires_at: now + ttl });
	}

	fn singleflight(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Drops the key's guard once the finishing caller is the only one holding it.
	///
	/// Two strong references mean the map entry plus the caller; a parked waiter holds a
	/// third, and removing the guard then would let a new caller race that waiter. The
	/// map lock prevents new clones while the count is read.
	fn release_guard(&self, key: &str, guard: &Arc<AsyncMutex<()>>) {
		let mut guards = self.guards.lock();

		if let Some(existing) = guards.get(key)
			&& Arc::ptr_eq(existing, guard)
			&& Arc::strong_count(guard) == 2
		{
			guards.remove(key);
		}
	}

	/// Stable fingerprint for the step + argument pair.
	///
	/// Base64 (no padding) SHA-256 over the step name and the canonical JSON form of
	/// the arguments. `serde_json` keeps object keys sorted, so structurally equal
	/// values fingerprint identically.
	fn fingerprint(&self, args: &JsonValue) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.step.as_bytes());
		hasher.update([0]);
		hasher.update(args.to_string().as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}
}
impl<T> Debug for RetryCache<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryCache")
			.field("step", &self.step)
			.field("entries", &self.entries.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn args(tenant: &str) -> JsonValue {
		serde_json::json!({"apiKey": "key-1", "tenantId": tenant})
	}

	#[tokio::test]
	async fn structurally_equal_arguments_hit_the_same_entry() {
		let cache = RetryCache::new("resolve_config");
		let calls = AtomicUsize::new(0);
		let first = serde_json::json!({"a": 1, "b": {"c": [1, 2]}});
		// Same structure, separately constructed.
		let second = serde_json::json!({"b": {"c": [1, 2]}, "a": 1});

		for value in [&first, &second] {
			let got = cache
				.cache_and_return(value, Duration::minutes(5), || {
					calls.fetch_add(1, Ordering::SeqCst);

					async { Ok(42_u32) }
				})
				.await
				.expect("Cached step should succeed.");

			assert_eq!(got, 42);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);

		let different = serde_json::json!({"a": 1, "b": {"c": [1, 3]}});

		cache
			.cache_and_return(&different, Duration::minutes(5), || {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Ok(7_u32) }
			})
			.await
			.expect("Fresh arguments should run the step.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn ttl_boundary_is_exclusive_at_expiry() {
		let cache = RetryCache::new("exchange");
		let ttl = Duration::seconds(30);
		let stored_at = macros::datetime!(2026-01-01 00:00 UTC);
		let arguments = args("tenant-a");
		let key = cache.fingerprint(&arguments);

		cache.store_at(&key, arguments.clone(), "session".to_owned(), stored_at, ttl);

		let just_before = stored_at + ttl - Duration::milliseconds(1);

		assert_eq!(
			cache.lookup_at(&key, &arguments, just_before).as_deref(),
			Some("session"),
			"one millisecond before expiry must still hit"
		);

		let just_after = stored_at + ttl + Duration::milliseconds(1);

		assert!(
			cache.lookup_at(&key, &arguments, just_after).is_none(),
			"one millisecond after expiry must miss"
		);
		assert!(cache.is_empty(), "expired entries are evicted on lookup");
	}

	#[tokio::test]
	async fn failures_are_never_cached() {
		let cache = RetryCache::<u32>::new("exchange");
		let calls = AtomicUsize::new(0);
		let arguments = args("tenant-a");
		let err = cache
			.cache_and_return(&arguments, Duration::minutes(5), || {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(TypedError::new(ErrorCode::Unavailable)) }
			})
			.await
			.expect_err("Failing step should propagate its error.");

		assert_eq!(err.code, ErrorCode::Unavailable);
		assert!(cache.is_empty());

		let got = cache
			.cache_and_return(&arguments, Duration::minutes(5), || {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Ok(9_u32) }
			})
			.await
			.expect("Retry after a failure should run a fresh call.");

		assert_eq!(got, 9);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_callers_coalesce_onto_one_execution() {
		let cache = Arc::new(RetryCache::new("resolve_config"));
		let calls = Arc::new(AtomicUsize::new(0));
		let arguments = args("tenant-a");
		let task = |cache: Arc<RetryCache<u32>>, calls: Arc<AtomicUsize>, arguments: JsonValue| async move {
			cache
				.cache_and_return(&arguments, Duration::minutes(5), move || async move {
					calls.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(std::time::Duration::from_millis(20)).await;

					Ok(5_u32)
				})
				.await
				.expect("Concurrent cached step should succeed.")
		};
		let (a, b) = tokio::join!(
			task(cache.clone(), calls.clone(), arguments.clone()),
			task(cache.clone(), calls.clone(), arguments.clone())
		);

		assert_eq!((a, b), (5, 5));
		assert_eq!(calls.load(Ordering::SeqCst), 1, "second caller must reuse the first result");
		assert!(cache.guards.lock().is_empty(), "guards are released once both callers finish");
	}

	#[tokio::test]
	async fn singleflight_guards_do_not_accumulate() {
		let cache = RetryCache::new("resolve_config");

		for tenant in ["tenant-a", "tenant-b", "tenant-c"] {
			cache
				.cache_and_return(&args(tenant), Duration::minutes(5), || async { Ok(1_u32) })
				.await
				.expect("Cached step should succeed.");
		}

		assert!(
			cache.guards.lock().is_empty(),
			"uncontended guards must be dropped once the call finishes"
		);

		cache
			.cache_and_return(&args("tenant-d"), Duration::minutes(5), || async {
				Err(TypedError::new(ErrorCode::Unavailable))
			})
			.await
			.expect_err("Failing step should propagate its error.");

		assert!(cache.guards.lock().is_empty(), "a failed call must not strand its guard");
	}

	#[tokio::test]
	async fn clear_forces_a_fresh_call() {
		let cache = RetryCache::new("resolve_config");
		let calls = AtomicUsize::new(0);
		let arguments = args("tenant-a");

		for _ in 0..2 {
			cache
				.cache_and_return(&arguments, Duration::minutes(5), || {
					calls.fetch_add(1, Ordering::SeqCst);

					async { Ok(1_u32) }
				})
				.await
				.expect("Cached step should succeed.");
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);

		cache.clear();
		cache
			.cache_and_return(&arguments, Duration::minutes(5), || {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Ok(1_u32) }
			})
			.await
			.expect("Post-clear step should succeed.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
