//! Single-flight cache of probed media timings.
//!
//! The cached value is the in-flight probe itself, so callers that arrive
//! while a probe is running attach to it instead of starting another. A failed
//! probe removes its own entry so the next caller retries. Entries expire a
//! fixed time after insertion, regardless of use.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use fv_av::{DurationProbe, MediaTiming};
use fv_media::{FdRegistry, ResourceKind};

type PendingTiming = Shared<BoxFuture<'static, Option<MediaTiming>>>;

struct CacheEntry {
    id: u64,
    inserted: Instant,
    pending: PendingTiming,
}

/// Per-path cache of [`MediaTiming`] with single-flight probing.
pub struct DurationCache {
    entries: DashMap<PathBuf, CacheEntry>,
    probe: Arc<dyn DurationProbe>,
    ttl: Duration,
    next_id: AtomicU64,
}

impl std::fmt::Debug for DurationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DurationCache {
    pub fn new(probe: Arc<dyn DurationProbe>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            probe,
            ttl,
            next_id: AtomicU64::new(0),
        })
    }

    /// Timing for `path`, probing at most once per TTL window.
    ///
    /// Returns `None` when the probe fails; the failure is not cached.
    pub async fn get(self: &Arc<Self>, path: &Path) -> Option<MediaTiming> {
        let pending = match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(e) if e.get().inserted.elapsed() < self.ttl => e.get().pending.clone(),
            Entry::Occupied(mut e) => {
                tracing::debug!(path = %path.display(), "Duration entry expired; re-probing");
                let entry = self.start_probe(path);
                let pending = entry.pending.clone();
                e.insert(entry);
                pending
            }
            Entry::Vacant(e) => {
                let entry = self.start_probe(path);
                let pending = entry.pending.clone();
                e.insert(entry);
                pending
            }
        };
        pending.await
    }

    /// Spawn the probe task. Must be called while holding the map entry so
    /// the task's failure eviction cannot run before the insert.
    fn start_probe(self: &Arc<Self>, path: &Path) -> CacheEntry {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = path.to_path_buf();
        let probe = Arc::clone(&self.probe);
        let cache: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let result = probe.probe(&key).await;
            match result {
                Ok(timing) => {
                    tracing::debug!(
                        path = %key.display(),
                        duration_secs = timing.duration_secs,
                        codec = timing.video_codec.as_deref().unwrap_or("unknown"),
                        "Media probed"
                    );
                    Some(timing)
                }
                Err(e) => {
                    tracing::warn!(path = %key.display(), "Duration probe failed: {e}");
                    if let Some(cache) = cache.upgrade() {
                        cache.entries.remove_if(&key, |_, entry| entry.id == id);
                    }
                    None
                }
            }
        });

        let pending = async move {
            match task.await {
                Ok(timing) => timing,
                Err(e) => {
                    tracing::warn!("Duration probe task failed: {e}");
                    None
                }
            }
        }
        .boxed()
        .shared();

        CacheEntry {
            id,
            inserted: Instant::now(),
            pending,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A [`DurationProbe`] whose runs show up in the registry as processes.
pub struct RegisteredProbe {
    inner: Arc<dyn DurationProbe>,
    registry: Arc<FdRegistry>,
}

impl RegisteredProbe {
    pub fn new(inner: Arc<dyn DurationProbe>, registry: Arc<FdRegistry>) -> Self {
        Self { inner, registry }
    }
}

#[async_trait::async_trait]
impl DurationProbe for RegisteredProbe {
    async fn probe(&self, path: &Path) -> fv_core::Result<MediaTiming> {
        let _lease = self
            .registry
            .register(ResourceKind::Process, format!("ffprobe {}", path.display()));
        self.inner.probe(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingProbe {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingProbe {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay: Duration::from_millis(50),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DurationProbe for CountingProbe {
        async fn probe(&self, _path: &Path) -> fv_core::Result<MediaTiming> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(fv_core::Error::Probe("boom".into()))
            } else {
                Ok(MediaTiming {
                    duration_secs: 100.0,
                    video_codec: Some("h264".into()),
                })
            }
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_probe() {
        let probe = CountingProbe::new(false);
        let cache = DurationCache::new(probe.clone(), Duration::from_secs(3600));
        let path = Path::new("/films/a.mkv");

        let (a, b) = tokio::join!(cache.get(path), cache.get(path));
        assert_eq!(a.unwrap().duration_secs, 100.0);
        assert_eq!(b.unwrap().duration_secs, 100.0);
        assert_eq!(probe.calls(), 1);

        // Resolved values are reused too.
        cache.get(path).await.unwrap();
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_paths_probe_separately() {
        let probe = CountingProbe::new(false);
        let cache = DurationCache::new(probe.clone(), Duration::from_secs(3600));
        let (_, _) = tokio::join!(
            cache.get(Path::new("/films/a.mkv")),
            cache.get(Path::new("/films/b.mkv"))
        );
        assert_eq!(probe.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failure_is_evicted_and_retried() {
        let probe = CountingProbe::new(true);
        let cache = DurationCache::new(probe.clone(), Duration::from_secs(3600));
        let path = Path::new("/films/broken.mkv");

        let (a, b) = tokio::join!(cache.get(path), cache.get(path));
        assert!(a.is_none() && b.is_none());
        assert_eq!(probe.calls(), 1);
        assert!(cache.is_empty());

        assert!(cache.get(path).await.is_none());
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_reprobed_and_purged() {
        let probe = CountingProbe::new(false);
        let cache = DurationCache::new(probe.clone(), Duration::from_millis(100));
        let path = Path::new("/films/a.mkv");

        cache.get(path).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        cache.get(path).await.unwrap();
        assert_eq!(probe.calls(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    /// Records how many processes the registry held while it ran.
    struct RegistryPeek {
        registry: Arc<FdRegistry>,
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DurationProbe for RegistryPeek {
        async fn probe(&self, _path: &Path) -> fv_core::Result<MediaTiming> {
            self.seen
                .store(self.registry.count(ResourceKind::Process), Ordering::SeqCst);
            Err(fv_core::Error::Probe("no streams".into()))
        }
    }

    #[tokio::test]
    async fn timing_runs_are_registered_as_processes() {
        let registry = FdRegistry::new();
        let peek = Arc::new(RegistryPeek {
            registry: Arc::clone(&registry),
            seen: AtomicUsize::new(0),
        });
        let probe = RegisteredProbe::new(peek.clone(), Arc::clone(&registry));

        assert!(probe.probe(Path::new("/films/a.mkv")).await.is_err());
        assert_eq!(peek.seen.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
