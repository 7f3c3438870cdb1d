//! Application context shared by every handler via Axum state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fv_av::{DurationProbe, FfprobeTimingProbe, ToolRegistry};
use fv_core::config::Config;
use fv_db::Catalog;
use fv_media::{FdRegistry, PathResolver};

use crate::duration_cache::{DurationCache, RegisteredProbe};

/// Central application context.
///
/// Cheap to clone; all heavy state sits behind `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn Catalog>,
    pub tools: Arc<ToolRegistry>,
    /// Open files and child processes held by in-flight streams.
    pub registry: Arc<FdRegistry>,
    pub resolver: Arc<PathResolver>,
    pub durations: Arc<DurationCache>,
}

impl AppContext {
    /// Build a context that probes durations with the discovered ffprobe.
    pub fn new(config: Config, catalog: Arc<dyn Catalog>, tools: Arc<ToolRegistry>) -> Self {
        let ffprobe = tools
            .require("ffprobe")
            .map(|t| t.path.clone())
            .unwrap_or_else(|_| PathBuf::from("ffprobe"));
        let probe = Arc::new(FfprobeTimingProbe::new(
            ffprobe,
            Duration::from_secs(config.streaming.probe_timeout_secs),
        ));
        Self::with_probe(config, catalog, tools, probe)
    }

    /// Build a context around an explicit duration probe. Each probe run is
    /// tracked in the registry.
    pub fn with_probe(
        config: Config,
        catalog: Arc<dyn Catalog>,
        tools: Arc<ToolRegistry>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        let registry = FdRegistry::new();
        let resolver = Arc::new(PathResolver::new(
            Arc::clone(&registry),
            config.streaming.strict_mime,
        ));
        let durations = DurationCache::new(
            Arc::new(RegisteredProbe::new(probe, Arc::clone(&registry))),
            Duration::from_secs(config.streaming.duration_ttl_secs),
        );
        Self {
            config: Arc::new(config),
            catalog,
            tools,
            registry,
            resolver,
            durations,
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("catalog", &self.catalog.name())
            .field("open_descriptors", &self.registry.len())
            .field("durations", &self.durations)
            .finish_non_exhaustive()
    }
}
