//! Catalog hot reload
//!
//! Watches the catalog file's directory (editors and ConfigMap mounts replace
//! files by rename) and republishes the catalog when the file changes. A
//! catalog that fails validation is rejected and the previous one stays live.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wizard_lib::{health::components, CatalogHandle, EventLogger, HealthRegistry, WizardMetrics};

/// Quiet period before a burst of file events triggers one reload
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Symlink a ConfigMap volume swaps atomically on update; the mounted file
/// itself never gets an event
const CONFIGMAP_DATA_LINK: &str = "..data";

/// Everything a reload reports into
#[derive(Clone)]
pub struct ReloadContext {
    pub catalog: CatalogHandle,
    pub metrics: WizardMetrics,
    pub logger: EventLogger,
    pub health_registry: HealthRegistry,
}

/// Reload `path` into the catalog handle; returns whether it was accepted
pub async fn reload_catalog(path: &Path, ctx: &ReloadContext) -> bool {
    let old_version = ctx.catalog.snapshot().await.version().to_string();

    match ctx.catalog.reload_from(path).await {
        Ok(new_version) => {
            ctx.metrics.inc_catalog_reload(true);
            ctx.metrics.set_catalog_version(&new_version);
            ctx.logger.log_catalog_reloaded(&old_version, &new_version, true);
            ctx.health_registry.record_success(components::CATALOG).await;
            true
        }
        Err(e) => {
            ctx.metrics.inc_catalog_reload(false);
            ctx.logger.log_catalog_reloaded(&old_version, &old_version, false);
            ctx.health_registry
                .record_failure(components::CATALOG, format!("{}: {}", path.display(), e))
                .await;
            false
        }
    }
}

/// Live watch; dropping it stops watching
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
    _task: tokio::task::JoinHandle<()>,
}

impl CatalogWatcher {
    pub fn spawn(path: PathBuf, ctx: ReloadContext) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .with_context(|| format!("catalog path has no file name: {}", path.display()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create catalog watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(path = %path.display(), "Watching catalog for changes");

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !touches(&event, &file_name) {
                    continue;
                }
                // collapse the write/rename burst of a single save
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                debug!(path = %path.display(), kind = ?event.kind, "Catalog file changed");
                reload_catalog(&path, &ctx).await;
            }
        });

        Ok(Self {
            _watcher: watcher,
            _task: task,
        })
    }
}

fn touches(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) && event.paths.iter().any(|p| {
        p.file_name()
            .is_some_and(|name| name == file_name || name == CONFIGMAP_DATA_LINK)
    })
}
