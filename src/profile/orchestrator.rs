//! Fetch Orchestrator
//!
//! Caches loader results per principal and coordinates every fetch of the
//! `profileData` key. Each entry moves through
//! `Idle -> Fetching -> {Fresh, Stale, Failed}`:
//!
//! - `Fresh` values are served without touching the loader.
//! - `Stale` values are served immediately while one background refresh
//!   runs (stale-while-revalidate).
//! - Values past the eviction window are dropped and refetched in the
//!   foreground.
//!
//! Concurrent callers share one fetch cycle through a `watch` channel. A
//! cycle retries failed loads with exponential backoff and ends in
//! `Exhausted` once the attempt budget is spent. Manual refetches are
//! debounced on the trailing edge.
//!
//! A background cycle has nobody waiting on it. Its linking warnings and a
//! terminal error are parked on the entry and handed to the next caller
//! served from cache.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{MemberAggregate, Principal};

use super::loader::{Loaded, MemberAggregateLoader};
use super::{FetchError, LinkingWarning, ProfileError};

/// Logical cache key of the profile data
pub const PROFILE_QUERY_KEY: &str = "profileData";

/// Timers and limits of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Age after which a cached value is served stale and refreshed
    pub stale_after: Duration,
    /// Age after which a cached value is discarded
    pub evict_after: Duration,
    /// Loader attempts per fetch cycle, including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Quiet period a manual refetch waits for before it fires
    pub refetch_debounce: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            evict_after: Duration::from_secs(5 * 60),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            refetch_debounce: Duration::from_millis(500),
        }
    }
}

impl FetchPolicy {
    /// Delay before retry `retry` (0-based): `base * 2^retry`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .map_or(self.backoff_cap, |delay| delay.min(self.backoff_cap))
    }

    fn age(&self, cached: &CachedValue, now: Instant) -> Age {
        let age = now.saturating_duration_since(cached.fetched_at);
        if age >= self.evict_after {
            Age::Expired
        } else if cached.invalidated || age >= self.stale_after {
            Age::Stale
        } else {
            Age::Fresh
        }
    }
}

/// Observable state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Idle,
    Fetching,
    Fresh,
    Stale,
    Failed,
}

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Produced by a fetch cycle this call waited for
    Fetched,
    Fresh,
    /// Served from cache while a refresh runs
    Stale,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub aggregate: Option<MemberAggregate>,
    /// Linking warnings raised by the fetch, or parked by an unobserved
    /// background refresh
    pub warnings: Vec<LinkingWarning>,
    pub freshness: Freshness,
    /// Error of the last background refresh, reported once
    pub refresh_error: Option<ProfileError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Age {
    Fresh,
    Stale,
    Expired,
}

type CycleResult = Result<Loaded, ProfileError>;
type CycleReceiver = watch::Receiver<Option<CycleResult>>;

struct CachedValue {
    aggregate: Option<MemberAggregate>,
    fetched_at: Instant,
    invalidated: bool,
}

impl CachedValue {
    fn outcome(&self, freshness: Freshness) -> FetchOutcome {
        FetchOutcome {
            aggregate: self.aggregate.clone(),
            warnings: Vec::new(),
            freshness,
            refresh_error: None,
        }
    }
}

struct CacheEntry {
    /// Identifies this entry; a cycle only writes back to the entry it started from
    epoch: u64,
    value: Option<CachedValue>,
    in_flight: Option<CycleReceiver>,
    last_error: Option<ProfileError>,
    debounce_generation: u64,
    pending_warnings: Vec<LinkingWarning>,
    pending_error: Option<ProfileError>,
}

impl CacheEntry {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            value: None,
            in_flight: None,
            last_error: None,
            debounce_generation: 0,
            pending_warnings: Vec::new(),
            pending_error: None,
        }
    }

    /// Cached outcome carrying whatever a background cycle left behind
    fn served(&mut self, freshness: Freshness) -> Option<FetchOutcome> {
        let mut outcome = self.value.as_ref()?.outcome(freshness);
        outcome.warnings = std::mem::take(&mut self.pending_warnings);
        outcome.refresh_error = self.pending_error.take();
        Some(outcome)
    }
}

struct Inner {
    loader: Arc<MemberAggregateLoader>,
    policy: FetchPolicy,
    entries: Mutex<HashMap<Uuid, CacheEntry>>,
    next_epoch: AtomicU64,
}

/// Process-wide profile cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FetchOrchestrator {
    inner: Arc<Inner>,
}

impl FetchOrchestrator {
    pub fn new(loader: Arc<MemberAggregateLoader>, policy: FetchPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                policy,
                entries: Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.inner.policy
    }

    /// Profile data for `principal`, from cache when possible.
    pub async fn load(&self, principal: &Principal) -> Result<FetchOutcome, ProfileError> {
        let receiver = {
            let mut entries = self.inner.entries.lock().await;
            let entry = self.inner.entry(&mut entries, principal.id);
            let now = Instant::now();

            match entry.value.as_ref().map(|v| self.inner.policy.age(v, now)) {
                Some(Age::Fresh) => {
                    if let Some(outcome) = entry.served(Freshness::Fresh) {
                        return Ok(outcome);
                    }
                }
                Some(Age::Stale) => {
                    if let Some(outcome) = entry.served(Freshness::Stale) {
                        if entry.in_flight.is_none() {
                            tracing::debug!(principal_id = %principal.id, "Revalidating stale profile data");
                            self.inner.start_cycle(entry, principal.clone());
                        }
                        return Ok(outcome);
                    }
                }
                Some(Age::Expired) => {
                    tracing::debug!(principal_id = %principal.id, "Evicting expired profile data");
                    entry.value = None;
                }
                None => {}
            }

            match &entry.in_flight {
                Some(receiver) => {
                    tracing::debug!(principal_id = %principal.id, "Joining in-flight profile fetch");
                    receiver.clone()
                }
                None => self.inner.start_cycle(entry, principal.clone()),
            }
        };

        let loaded = wait_for_cycle(receiver).await?;
        Ok(FetchOutcome {
            aggregate: loaded.aggregate,
            warnings: loaded.warnings,
            freshness: Freshness::Fetched,
            refresh_error: None,
        })
    }

    /// Ask for a forced refresh. Calls arriving within the debounce window
    /// of each other collapse into one; only the last one fires.
    pub async fn refetch(&self, principal: &Principal) {
        let generation = {
            let mut entries = self.inner.entries.lock().await;
            let entry = self.inner.entry(&mut entries, principal.id);
            entry.debounce_generation += 1;
            entry.debounce_generation
        };

        let inner = Arc::clone(&self.inner);
        let principal = principal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.policy.refetch_debounce).await;

            let mut entries = inner.entries.lock().await;
            let Some(entry) = entries.get_mut(&principal.id) else {
                return;
            };
            if entry.debounce_generation != generation {
                tracing::trace!(principal_id = %principal.id, "Refetch superseded");
                return;
            }
            if let Some(value) = entry.value.as_mut() {
                value.invalidated = true;
            }
            if entry.in_flight.is_none() {
                tracing::debug!(principal_id = %principal.id, "Manual profile refetch");
                inner.start_cycle(entry, principal);
            }
        });
    }

    pub async fn status(&self, principal_id: Uuid) -> FetchStatus {
        let entries = self.inner.entries.lock().await;
        let Some(entry) = entries.get(&principal_id) else {
            return FetchStatus::Idle;
        };

        let age = entry
            .value
            .as_ref()
            .map(|v| self.inner.policy.age(v, Instant::now()));
        match (age, entry.in_flight.is_some(), entry.last_error.is_some()) {
            (Some(Age::Fresh), _, _) => FetchStatus::Fresh,
            (Some(Age::Stale), _, _) => FetchStatus::Stale,
            (Some(Age::Expired) | None, true, _) => FetchStatus::Fetching,
            (Some(Age::Expired) | None, false, true) => FetchStatus::Failed,
            (Some(Age::Expired) | None, false, false) => FetchStatus::Idle,
        }
    }

    /// Drop the entry of one principal (logout). A fetch still running for
    /// it completes for its waiting callers but is not cached.
    pub async fn reset(&self, principal_id: Uuid) -> bool {
        let removed = self.inner.entries.lock().await.remove(&principal_id).is_some();
        if removed {
            tracing::debug!(principal_id = %principal_id, key = PROFILE_QUERY_KEY, "Profile cache entry reset");
        }
        removed
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.inner.entries.lock().await.clear();
    }

    /// Remove entries with nothing worth keeping: no live value and no
    /// fetch in flight. Returns the number removed.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.in_flight.is_some()
                || entry
                    .value
                    .as_ref()
                    .is_some_and(|v| self.inner.policy.age(v, now) != Age::Expired)
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Inner {
    fn entry<'a>(&self, entries: &'a mut HashMap<Uuid, CacheEntry>, principal_id: Uuid) -> &'a mut CacheEntry {
        entries
            .entry(principal_id)
            .or_insert_with(|| CacheEntry::new(self.next_epoch.fetch_add(1, Ordering::Relaxed)))
    }

    /// Spawn a fetch cycle for `entry`. Must be called with the entry map
    /// locked and no cycle in flight.
    fn start_cycle(self: &Arc<Self>, entry: &mut CacheEntry, principal: Principal) -> CycleReceiver {
        let (sender, receiver) = watch::channel(None);
        entry.in_flight = Some(receiver.clone());
        entry.pending_warnings.clear();
        entry.pending_error = None;

        let inner = Arc::clone(self);
        let epoch = entry.epoch;
        tokio::spawn(async move {
            // Run the loader in its own task so a panic still ends the cycle
            let cycle = {
                let inner = Arc::clone(&inner);
                let principal = principal.clone();
                tokio::spawn(async move { inner.run_cycle(&principal).await })
            };
            let result = match cycle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(principal_id = %principal.id, error = %e, "Profile fetch task failed");
                    Err(ProfileError::Fetch(FetchError::new("profile fetch", e)))
                }
            };
            inner.finish_cycle(principal.id, epoch, &result, &sender).await;
            sender.send_replace(Some(result));
        });

        receiver
    }

    async fn run_cycle(&self, principal: &Principal) -> CycleResult {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.loader.load(principal).await {
                Ok(loaded) => return Ok(loaded),
                Err(err) if attempt >= max_attempts => {
                    tracing::error!(
                        principal_id = %principal.id,
                        attempts = attempt,
                        error = %err,
                        "Profile fetch failed, giving up"
                    );
                    return Err(ProfileError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff(attempt - 1);
                    tracing::warn!(
                        principal_id = %principal.id,
                        attempt = attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Profile fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn finish_cycle(
        &self,
        principal_id: Uuid,
        epoch: u64,
        result: &CycleResult,
        sender: &watch::Sender<Option<CycleResult>>,
    ) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&principal_id).filter(|e| e.epoch == epoch) else {
            tracing::debug!(principal_id = %principal_id, "Profile entry reset during fetch, result not cached");
            return;
        };

        entry.in_flight = None;
        // Receivers left now belong to callers about to get this result
        let unobserved = sender.receiver_count() == 0;
        match result {
            Ok(loaded) => {
                entry.value = Some(CachedValue {
                    aggregate: loaded.aggregate.clone(),
                    fetched_at: Instant::now(),
                    invalidated: false,
                });
                entry.last_error = None;
                if unobserved {
                    entry.pending_warnings = loaded.warnings.clone();
                }
            }
            Err(err) => {
                entry.last_error = Some(err.clone());
                if unobserved {
                    tracing::debug!(principal_id = %principal_id, "Parking background refresh error");
                    entry.pending_error = Some(err.clone());
                }
            }
        }
    }
}

async fn wait_for_cycle(mut receiver: CycleReceiver) -> CycleResult {
    let abandoned = || {
        ProfileError::Fetch(FetchError::new(
            "profile fetch",
            "fetch task stopped before producing a result",
        ))
    };

    match receiver.wait_for(Option::is_some).await {
        Ok(value) => value.as_ref().cloned().unwrap_or_else(|| Err(abandoned())),
        Err(_) => Err(abandoned()),
    }
}
