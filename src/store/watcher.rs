//! Dataset file watcher.
//!
//! Reloads a file-backed store when the external loader rewrites the dataset,
//! or on SIGHUP.

use crate::metrics::{MetricsCollector, ReloadResult};
use crate::store::memory::read_dataset;
use crate::store::MemoryStore;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Watches a dataset file and swaps reloaded records into a [`MemoryStore`].
pub struct DatasetWatcher {
    /// Path to the dataset file.
    path: PathBuf,
    /// Store receiving reloaded snapshots.
    store: Arc<MemoryStore>,
    /// Metrics collector.
    metrics: MetricsCollector,
}

impl DatasetWatcher {
    /// Create a new dataset watcher.
    pub fn new(path: PathBuf, store: Arc<MemoryStore>, metrics: MetricsCollector) -> Self {
        Self {
            path,
            store,
            metrics,
        }
    }

    /// Run the watcher until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(path = %self.path.display(), "dataset watcher starting");

        let (tx, rx) = mpsc::channel();

        let watcher_result: Result<RecommendedWatcher, _> = Watcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        );

        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to create dataset watcher");
                let _ = shutdown.recv().await;
                return;
            }
        };

        // Loaders usually write a temp file and rename it over the dataset,
        // so watch the parent directory rather than the file itself.
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
            error!(error = %e, dir = %parent.display(), "failed to watch dataset directory");
            let _ = shutdown.recv().await;
            return;
        }

        #[cfg(unix)]
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "failed to setup SIGHUP handler");
                None
            }
        };

        info!("dataset watcher ready");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    let mut changed = false;
                    while let Ok(event) = rx.try_recv() {
                        changed |= self.should_reload(&event);
                    }
                    if changed {
                        self.try_reload();
                    }
                }

                _ = async {
                    #[cfg(unix)]
                    {
                        if let Some(ref mut sig) = sighup {
                            sig.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        std::future::pending::<Option<()>>().await
                    }
                } => {
                    info!("received SIGHUP, reloading dataset");
                    self.try_reload();
                }

                _ = shutdown.recv() => {
                    info!("dataset watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.path.file_name());

        let is_modify_or_create = matches!(
            event.kind,
            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
        );

        is_our_file && is_modify_or_create
    }

    /// Reload the dataset, keeping the current snapshot on failure.
    fn try_reload(&self) -> bool {
        match read_dataset(&self.path) {
            Ok(records) => {
                let count = records.len();
                self.store.replace(records);
                self.metrics.set_dataset_records(count);
                self.metrics.record_reload(ReloadResult::Success);
                info!(path = %self.path.display(), records = count, "dataset reloaded");
                true
            }
            Err(e) => {
                self.metrics.record_reload(ReloadResult::Failure);
                error!(error = %e, "dataset reload failed, keeping current snapshot");
                false
            }
        }
    }
}
