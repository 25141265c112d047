//! Tile cache with a per-tile load state machine
//!
//! ```text
//! Pending -> Loaded
//! Pending -> Failed -> (retry delay) -> Pending -> Loaded | Failed (final)
//! ```
//!
//! Loads are started through a [`TileLoader`] and complete asynchronously by
//! calling [`TileCache::on_load_success`] or [`TileCache::on_load_failure`]
//! with the URL the fetch was started for. A completion whose URL no longer
//! matches the entry is stale and ignored.

use std::collections::{BTreeSet, HashMap};

use crate::pyramid::{ImagePyramid, TileKey};
use crate::url::TileUrlProvider;

/// Load state of a single tile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// Fetch in flight
    Pending,
    Loaded,
    /// Fetch failed; may have a retry scheduled
    Failed,
    /// Outside the image; drawn blank and never fetched
    Placeholder,
}

/// One cached tile
#[derive(Debug)]
pub struct TileEntry<R> {
    id: u64,
    key: TileKey,
    state: TileState,
    url: String,
    attempts: u32,
    retry_at: Option<f64>,
    resource: Option<R>,
}

impl<R> TileEntry<R> {
    /// Unique per entry; a re-created entry for the same key gets a new id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of fetches started for this entry
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time at which the next automatic retry fires, if one is scheduled
    pub fn retry_at(&self) -> Option<f64> {
        self.retry_at
    }

    pub fn resource(&self) -> Option<&R> {
        self.resource.as_ref()
    }
}

/// Starts asynchronous tile fetches and frees their resources
pub trait TileLoader {
    /// Begin fetching `url`. Completion is reported back to the cache later.
    fn begin_load(&mut self, key: TileKey, url: &str);

    /// Called when an entry is dropped from the cache
    fn release(&mut self, _key: TileKey, _url: &str) {}
}

/// Automatic retry behaviour for failed fetches
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before a retry, in seconds
    pub delay: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: 1.0,
        }
    }
}

/// Entry counts by state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pending: usize,
    pub loaded: usize,
    pub failed: usize,
    pub placeholder: usize,
}

/// Maps tile keys to loaded, loading or failed tile resources
pub struct TileCache<R> {
    pyramid: ImagePyramid,
    provider: Box<dyn TileUrlProvider>,
    retry: RetryPolicy,
    entries: HashMap<TileKey, TileEntry<R>>,
    next_id: u64,
}

impl<R> TileCache<R> {
    pub fn new(pyramid: ImagePyramid, provider: Box<dyn TileUrlProvider>, retry: RetryPolicy) -> Self {
        Self {
            pyramid,
            provider,
            retry,
            entries: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn pyramid(&self) -> &ImagePyramid {
        &self.pyramid
    }

    pub fn get(&self, key: TileKey) -> Option<&TileEntry<R>> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the entry for `key`, starting a fetch if there is none.
    ///
    /// If the URL provider now yields a different address for an existing
    /// entry, the old entry is released and replaced.
    pub fn resolve(&mut self, key: TileKey, loader: &mut dyn TileLoader) -> &TileEntry<R> {
        if !self.pyramid.contains(key) {
            let next_id = &mut self.next_id;
            return self.entries.entry(key).or_insert_with(|| {
                *next_id += 1;
                TileEntry {
                    id: *next_id,
                    key,
                    state: TileState::Placeholder,
                    url: String::new(),
                    attempts: 0,
                    retry_at: None,
                    resource: None,
                }
            });
        }

        let url = self.provider.tile_url(key);
        match self.entries.get(&key).map(|e| e.url == url) {
            Some(true) => {}
            Some(false) => {
                if let Some(old) = self.entries.remove(&key) {
                    log::debug!("Tile {:?} moved from {} to {}", key, old.url, url);
                    loader.release(key, &old.url);
                }
                self.start(key, url, loader);
            }
            None => self.start(key, url, loader),
        }
        &self.entries[&key]
    }

    fn start(&mut self, key: TileKey, url: String, loader: &mut dyn TileLoader) {
        self.next_id += 1;
        loader.begin_load(key, &url);
        self.entries.insert(
            key,
            TileEntry {
                id: self.next_id,
                key,
                state: TileState::Pending,
                url,
                attempts: 1,
                retry_at: None,
                resource: None,
            },
        );
    }

    /// Drop an entry so that the next `resolve` fetches it again
    pub fn invalidate(&mut self, key: TileKey, loader: &mut dyn TileLoader) -> bool {
        match self.entries.remove(&key) {
            Some(entry) => {
                release(&entry, loader);
                true
            }
            None => false,
        }
    }

    /// Record a finished fetch. Returns false for stale completions.
    pub fn on_load_success(&mut self, key: TileKey, url: &str, resource: R) -> bool {
        let Some(entry) = self.current_pending(key, url) else {
            log::debug!("Ignoring stale load of {} for tile {:?}", url, key);
            return false;
        };
        entry.state = TileState::Loaded;
        entry.resource = Some(resource);
        true
    }

    /// Record a failed fetch and schedule a retry if attempts remain.
    /// Returns false for stale completions.
    pub fn on_load_failure(&mut self, key: TileKey, url: &str, now: f64) -> bool {
        let retry = self.retry;
        let Some(entry) = self.current_pending(key, url) else {
            log::debug!("Ignoring stale failure of {} for tile {:?}", url, key);
            return false;
        };
        entry.state = TileState::Failed;
        if entry.attempts <= retry.max_retries {
            entry.retry_at = Some(now + retry.delay);
            log::debug!("Tile {:?} failed, retrying in {}s", key, retry.delay);
        } else {
            entry.retry_at = None;
            log::warn!("Tile {:?} failed after {} attempts: {}", key, entry.attempts, url);
        }
        true
    }

    fn current_pending(&mut self, key: TileKey, url: &str) -> Option<&mut TileEntry<R>> {
        self.entries
            .get_mut(&key)
            .filter(|e| e.url == url && e.state == TileState::Pending)
    }

    /// Restart fetches whose retry delay has elapsed. Returns how many were restarted.
    pub fn poll_retries(&mut self, now: f64, loader: &mut dyn TileLoader) -> usize {
        let mut restarted = 0;
        for entry in self.entries.values_mut() {
            if entry.retry_at.is_some_and(|at| at <= now) {
                entry.retry_at = None;
                entry.state = TileState::Pending;
                entry.attempts += 1;
                loader.begin_load(entry.key, &entry.url);
                restarted += 1;
            }
        }
        restarted
    }

    /// Earliest scheduled retry
    pub fn next_retry_at(&self) -> Option<f64> {
        self.entries
            .values()
            .filter_map(|e| e.retry_at)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Evict entries not in `keep`. In-flight fetches stay so they can complete.
    pub fn retain(&mut self, keep: &BTreeSet<TileKey>, loader: &mut dyn TileLoader) -> usize {
        let evict: Vec<TileKey> = self
            .entries
            .values()
            .filter(|e| e.state != TileState::Pending && !keep.contains(&e.key))
            .map(|e| e.key)
            .collect();
        for key in &evict {
            if let Some(entry) = self.entries.remove(key) {
                release(&entry, loader);
            }
        }
        evict.len()
    }

    /// Release every entry
    pub fn clear(&mut self, loader: &mut dyn TileLoader) {
        for (_, entry) in self.entries.drain() {
            release(&entry, loader);
        }
    }

    /// Switch to a new image; all entries are released
    pub fn replace_pyramid(&mut self, pyramid: ImagePyramid, loader: &mut dyn TileLoader) {
        self.clear(loader);
        self.pyramid = pyramid;
    }

    /// Switch tile source; all entries are released
    pub fn replace_provider(&mut self, provider: Box<dyn TileUrlProvider>, loader: &mut dyn TileLoader) {
        self.clear(loader);
        self.provider = provider;
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries.values() {
            match entry.state {
                TileState::Pending => stats.pending += 1,
                TileState::Loaded => stats.loaded += 1,
                TileState::Failed => stats.failed += 1,
                TileState::Placeholder => stats.placeholder += 1,
            }
        }
        stats
    }
}

fn release<R>(entry: &TileEntry<R>, loader: &mut dyn TileLoader) {
    if entry.state != TileState::Placeholder {
        loader.release(entry.key, &entry.url);
    }
}
