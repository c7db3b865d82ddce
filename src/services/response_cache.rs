// src/services/response_cache.rs
use crate::clock::Clock;
use crate::config::DEFAULT_CACHE_TTL;
use crate::models::AnalysisKind;
use chrono::{DateTime, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SHA-256 fingerprint of image bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDigest(String);

impl ImageDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Digest of every image that goes into one request, namespaced by kind so
    /// a plant scan never answers for a bite scan of the same photo.
    pub fn for_request(kind: AnalysisKind, images: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        for image in images {
            hasher.update((image.len() as u64).to_be_bytes());
            hasher.update(image);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // A clock that stepped backwards leaves the entry fresh
        now.signed_duration_since(self.created_at)
            .to_std()
            .map(|age| age < ttl)
            .unwrap_or(true)
    }
}

/// Raw model responses keyed by image digest. Lives only as long as the
/// process.
pub struct ResponseCache {
    entries: Mutex<HashMap<ImageDigest, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ImageDigest, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &ImageDigest) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.entries();

        match entries.get(key) {
            Some(entry) if entry.is_valid(now, self.ttl) => Some(entry.response.clone()),
            Some(_) => {
                debug!("Evicting expired cache entry {}", key);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `response` and drops every entry that has outlived the TTL.
    pub fn put(&self, key: ImageDigest, response: impl Into<String>) {
        let now = self.clock.now();
        let mut entries = self.entries();

        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now, self.ttl));
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!("Pruned {} expired cache entries", pruned);
        }

        entries.insert(
            key,
            CacheEntry {
                response: response.into(),
                created_at: now,
            },
        );
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries. Expired ones linger until the next `put` or
    /// a read of their key.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn digest_is_stable_and_content_addressed() {
        assert_eq!(ImageDigest::of(b"abc"), ImageDigest::of(b"abc"));
        assert_ne!(ImageDigest::of(b"abc"), ImageDigest::of(b"abd"));
        assert_eq!(
            ImageDigest::of(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn request_digest_separates_kinds_and_image_boundaries() {
        let bite = ImageDigest::for_request(AnalysisKind::Bite, &[b"photo"]);
        let plant = ImageDigest::for_request(AnalysisKind::Plant, &[b"photo"]);
        assert_ne!(bite, plant);

        let split_a = ImageDigest::for_request(AnalysisKind::HealingComparison, &[b"ab", b"c"]);
        let split_b = ImageDigest::for_request(AnalysisKind::HealingComparison, &[b"a", b"bc"]);
        assert_ne!(split_a, split_b);
    }

    #[test]
    fn put_then_get_round_trips_within_ttl() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());
        let key = ImageDigest::of(b"image");

        cache.put(key.clone(), "Insect or Cause: Mosquito");
        clock.advance(Duration::from_secs(23 * 60 * 60 + 59 * 60));

        assert_eq!(cache.get(&key).as_deref(), Some("Insect or Cause: Mosquito"));
    }

    #[test]
    fn entries_expire_at_ttl_boundary_and_are_evicted() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());
        let key = ImageDigest::of(b"image");

        cache.put(key.clone(), "stale");
        clock.advance(Duration::from_secs(24 * 60 * 60));

        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_overwrites_and_refreshes_timestamp() {
        let clock = clock();
        let cache = ResponseCache::with_ttl(clock.clone(), Duration::from_secs(60));
        let key = ImageDigest::of(b"image");

        cache.put(key.clone(), "first");
        clock.advance(Duration::from_secs(50));
        cache.put(key.clone(), "second");
        clock.advance(Duration::from_secs(50));

        assert_eq!(cache.get(&key).as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_pruned_on_put() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());

        for i in 0..1000 {
            cache.put(ImageDigest::of(format!("scan-{i}").as_bytes()), "response");
            assert_eq!(cache.len(), 1);
            clock.advance(Duration::from_secs(25 * 60 * 60));
        }

        let fresh = ImageDigest::of(b"fresh");
        cache.put(fresh.clone(), "fresh");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fresh).as_deref(), Some("fresh"));
    }

    #[test]
    fn put_keeps_unexpired_neighbours() {
        let clock = clock();
        let cache = ResponseCache::new(clock.clone());

        cache.put(ImageDigest::of(b"old"), "old");
        clock.advance(Duration::from_secs(12 * 60 * 60));
        cache.put(ImageDigest::of(b"new"), "new");
        clock.advance(Duration::from_secs(13 * 60 * 60));
        cache.put(ImageDigest::of(b"newest"), "newest");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&ImageDigest::of(b"old")), None);
        assert_eq!(cache.get(&ImageDigest::of(b"new")).as_deref(), Some("new"));
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResponseCache::new(clock());
        cache.put(ImageDigest::of(b"a"), "a");
        cache.put(ImageDigest::of(b"b"), "b");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get(&ImageDigest::of(b"a")), None);
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        let cache = Arc::new(ResponseCache::new(clock()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let key = ImageDigest::of(format!("{i}-{j}").as_bytes());
                        cache.put(key.clone(), format!("response {i}-{j}"));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
