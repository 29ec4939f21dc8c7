//! File-system watcher for config hot-reload.
//!
//! Watches the config file's directory and invokes the callback after a
//! debounce window. The watcher runs as a background tokio task; drop
//! the returned handle to stop watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle to a running config watcher. Drop to stop.
pub struct ConfigWatcherHandle {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Drop for ConfigWatcherHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start watching `path` for changes; `on_change` runs after each
/// debounced change burst.
pub fn watch_config(
    path: &str,
    debounce: Duration,
    on_change: impl Fn() + Send + 'static,
) -> Option<ConfigWatcherHandle> {
    let target: PathBuf = Path::new(path).to_path_buf();
    let watch_dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = event_tx.blocking_send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %err, "could not create config watcher");
            return None;
        }
    };
    if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        warn!(path = %watch_dir.display(), error = %err, "could not watch config directory");
        return None;
    }
    debug!(path = %watch_dir.display(), "watching config directory");

    let file_name = target.file_name().map(|n| n.to_os_string());
    tokio::spawn(async move {
        // Keep the watcher alive for the duration of the task.
        let _watcher = watcher;

        let mut pending = false;
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            let matches_file = file_name.as_ref().is_none_or(|name| {
                                event.paths.iter().any(|p| p.file_name() == Some(name))
                            });
                            if matches_file
                                && matches!(
                                    event.kind,
                                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                                )
                            {
                                pending = true;
                                deadline = Some(tokio::time::Instant::now() + debounce);
                            }
                        }
                        None => break,
                    }
                }
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                }, if pending => {
                    pending = false;
                    deadline = None;
                    on_change();
                }
            }
        }
    });

    Some(ConfigWatcherHandle {
        shutdown_tx: Some(shutdown_tx),
    })
}
