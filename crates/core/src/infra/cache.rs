//! Time-swept in-memory cache for JSON
//! responses. Expiry is read from the
//! injected clock; there is no size
//! bound.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{
  AtomicU64,
  Ordering
};
use std::sync::{
  Arc,
  Mutex,
  MutexGuard,
  PoisonError
};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::ports::clock::Clock;

#[derive(Debug, Clone)]

struct Entry {
  value:         Value,
  expires_at_ms: i64
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize,
)]

pub struct CacheStats {
  pub entries: usize,
  pub hits:    u64,
  pub misses:  u64
}

pub struct ResponseCache {
  clock:          Arc<dyn Clock>,
  default_ttl_ms: i64,
  entries:        Mutex<HashMap<String, Entry>>,
  hits:           AtomicU64,
  misses:         AtomicU64,
  /// Bumped by every invalidation, under
  /// the entries lock.
  generation:     AtomicU64
}

/// `clinic:{id}:{area}:{name}`
pub fn clinic_key(
  clinic_id: i64,
  area: &str,
  name: &str
) -> String {
  format!("clinic:{clinic_id}:{area}:{name}")
}

/// Prefix covering every key of one
/// area of one clinic.
pub fn clinic_prefix(
  clinic_id: i64,
  area: &str
) -> String {
  format!("clinic:{clinic_id}:{area}:")
}

fn ttl_ms(ttl: Duration) -> i64 {
  i64::try_from(ttl.as_millis())
    .unwrap_or(i64::MAX)
}

impl ResponseCache {
  pub fn new(
    clock: Arc<dyn Clock>,
    default_ttl: Duration
  ) -> Self {
    Self {
      clock,
      default_ttl_ms: ttl_ms(default_ttl),
      entries: Mutex::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      generation: AtomicU64::new(0)
    }
  }

  fn lock(
    &self
  ) -> MutexGuard<'_, HashMap<String, Entry>>
  {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Expired entries count as misses and
  /// are dropped on the way.
  pub fn get(
    &self,
    key: &str
  ) -> Option<Value> {
    let now = self.clock.now_epoch_ms();

    let mut entries = self.lock();

    if let Some(entry) = entries.get(key)
      && entry.expires_at_ms > now
    {
      self.hits.fetch_add(1, Ordering::Relaxed);
      return Some(entry.value.clone());
    }

    entries.remove(key);

    self
      .misses
      .fetch_add(1, Ordering::Relaxed);

    None
  }

  fn entry(
    &self,
    value: Value,
    ttl: Option<Duration>
  ) -> Entry {
    let ttl = ttl
      .map(ttl_ms)
      .unwrap_or(self.default_ttl_ms);

    Entry {
      value,
      expires_at_ms: self
        .clock
        .now_epoch_ms()
        .saturating_add(ttl)
    }
  }

  fn bump(&self) {
    self
      .generation
      .fetch_add(1, Ordering::SeqCst);
  }

  pub fn insert(
    &self,
    key: impl Into<String>,
    value: Value,
    ttl: Option<Duration>
  ) {
    let entry = self.entry(value, ttl);

    self.lock().insert(key.into(), entry);
  }

  /// Returns the cached value or runs
  /// `load`. Only successful loads are
  /// stored, and only when no
  /// invalidation happened while `load`
  /// ran. The lock is not held while
  /// `load` runs, so concurrent misses
  /// may load twice.
  pub async fn get_or_try_insert<F, Fut, E>(
    &self,
    key: &str,
    ttl: Option<Duration>,
    load: F
  ) -> Result<Value, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>
  {
    if let Some(hit) = self.get(key) {
      return Ok(hit);
    }

    let started =
      self.generation.load(Ordering::SeqCst);

    let value = load().await?;

    let entry = self.entry(value.clone(), ttl);

    let mut entries = self.lock();

    if self.generation.load(Ordering::SeqCst)
      == started
    {
      entries.insert(key.to_string(), entry);
    } else {
      debug!(key, "cache load raced an invalidation");
    }

    Ok(value)
  }

  pub fn invalidate(&self, key: &str) -> bool {
    let mut entries = self.lock();

    self.bump();

    entries.remove(key).is_some()
  }

  pub fn invalidate_prefix(
    &self,
    prefix: &str
  ) -> usize {
    let mut entries = self.lock();

    self.bump();

    let before = entries.len();

    entries.retain(|k, _| !k.starts_with(prefix));

    before - entries.len()
  }

  /// Removes expired entries and returns
  /// how many went.
  pub fn sweep(&self) -> usize {
    let now = self.clock.now_epoch_ms();

    let mut entries = self.lock();

    let before = entries.len();

    entries.retain(|_, e| e.expires_at_ms > now);

    before - entries.len()
  }

  pub fn clear(&self) -> usize {
    let mut entries = self.lock();

    self.bump();

    let removed = entries.len();

    entries.clear();

    removed
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      entries: self.lock().len(),
      hits:    self.hits.load(Ordering::Relaxed),
      misses:  self
        .misses
        .load(Ordering::Relaxed)
    }
  }

  /// Sweeps on a fixed interval until the
  /// cache is dropped.
  pub fn spawn_sweeper(
    self: &Arc<Self>,
    every: Duration
  ) -> JoinHandle<()> {
    let cache = Arc::downgrade(self);

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(
        every.max(Duration::from_millis(1))
      );

      // first tick completes immediately
      ticker.tick().await;

      loop {
        ticker.tick().await;

        let Some(cache) = cache.upgrade()
        else {
          break;
        };

        let removed = cache.sweep();

        if removed > 0 {
          debug!(removed, "cache sweep");
        }
      }
    })
  }
}
