//! Open-resource registry.
//!
//! Every file descriptor and child process the streaming engines own is
//! recorded here for the lifetime of its [`FdLease`]. The table exists for
//! observability only: [`FdRegistry::sweep`] logs when the open count or the
//! age of a single entry crosses a threshold, which points at a cleanup bug
//! elsewhere.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// What a registry entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Process,
}

/// A live entry in the registry.
#[derive(Debug, Clone)]
pub struct DescriptorRecord {
    pub id: u64,
    pub kind: ResourceKind,
    pub opened_at: Instant,
    /// Caller-supplied context, usually a path or a pid.
    pub metadata: String,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorStat {
    pub id: u64,
    pub kind: ResourceKind,
    pub age_ms: u64,
    pub metadata: String,
}

/// Registry snapshot returned by [`FdRegistry::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct FdStats {
    pub open: usize,
    pub files: usize,
    pub processes: usize,
    pub details: Vec<DescriptorStat>,
}

/// Result of a leak sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub open: usize,
    pub over_limit: bool,
    pub stale: Vec<DescriptorStat>,
}

/// Process-wide table of open resources.
#[derive(Debug, Default)]
pub struct FdRegistry {
    entries: DashMap<u64, DescriptorRecord>,
    next_id: AtomicU64,
}

impl FdRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a newly opened resource. The entry is removed when the returned
    /// lease is released or dropped.
    pub fn register(self: &Arc<Self>, kind: ResourceKind, metadata: impl Into<String>) -> FdLease {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let metadata = metadata.into();
        tracing::trace!(id, ?kind, %metadata, "Resource registered");
        self.entries.insert(
            id,
            DescriptorRecord {
                id,
                kind,
                opened_at: Instant::now(),
                metadata,
            },
        );
        FdLease {
            registry: Arc::clone(self),
            id,
            released: AtomicBool::new(false),
        }
    }

    /// Number of resources currently open.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of open resources of one kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Snapshot of every entry, oldest first.
    pub fn stats(&self) -> FdStats {
        let now = Instant::now();
        let mut details: Vec<DescriptorStat> = self
            .entries
            .iter()
            .map(|e| DescriptorStat {
                id: e.id,
                kind: e.kind,
                age_ms: now.saturating_duration_since(e.opened_at).as_millis() as u64,
                metadata: e.metadata.clone(),
            })
            .collect();
        details.sort_by(|a, b| b.age_ms.cmp(&a.age_ms).then(a.id.cmp(&b.id)));

        let files = details.iter().filter(|d| d.kind == ResourceKind::File).count();
        FdStats {
            open: details.len(),
            files,
            processes: details.len() - files,
            details,
        }
    }

    /// Log a warning if more than `max_open` resources are open, and one per
    /// resource older than `max_age`.
    pub fn sweep(&self, max_open: usize, max_age: Duration) -> SweepReport {
        let stats = self.stats();
        let max_age_ms = max_age.as_millis() as u64;
        let over_limit = stats.open > max_open;

        if over_limit {
            let oldest: Vec<_> = stats.details.iter().take(5).collect();
            tracing::warn!(open = stats.open, max_open, ?oldest, "High open resource count");
        }

        let stale: Vec<DescriptorStat> = stats
            .details
            .into_iter()
            .filter(|d| d.age_ms > max_age_ms)
            .collect();
        for d in &stale {
            tracing::warn!(
                id = d.id,
                kind = ?d.kind,
                age_ms = d.age_ms,
                metadata = %d.metadata,
                "Long-lived resource detected"
            );
        }

        SweepReport {
            open: stats.open,
            over_limit,
            stale,
        }
    }

    fn remove(&self, id: u64) {
        if let Some((_, rec)) = self.entries.remove(&id) {
            tracing::trace!(
                id,
                kind = ?rec.kind,
                held_ms = rec.opened_at.elapsed().as_millis() as u64,
                "Resource released"
            );
        }
    }
}

/// Membership of one resource in an [`FdRegistry`].
///
/// Releasing is idempotent; every trigger (completion, client abort, error,
/// drop) funnels into the same one-shot [`release`](Self::release).
#[derive(Debug)]
pub struct FdLease {
    registry: Arc<FdRegistry>,
    id: u64,
    released: AtomicBool,
}

impl FdLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the entry. Returns `true` only for the call that removed it.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.remove(self.id);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for FdLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run [`FdRegistry::sweep`] on a fixed interval until cancelled.
pub async fn run_sweeper(
    registry: Arc<FdRegistry>,
    config: fv_core::config::RegistryConfig,
    cancel: CancellationToken,
) {
    if config.sweep_interval_secs == 0 {
        tracing::info!("Resource sweep disabled");
        return;
    }

    let period = Duration::from_secs(config.sweep_interval_secs);
    let max_age = Duration::from_secs(config.max_age_secs);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(interval_secs = config.sweep_interval_secs, "Resource sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = registry.sweep(config.max_open, max_age);
                tracing::debug!(open = report.open, stale = report.stale.len(), "Resource sweep");
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("Resource sweeper stopped");
}
