//! File watcher for schema and override documents.
//!
//! Emits change events through a tokio watch channel when documents change.
//! Uses debouncing to coalesce rapid file changes.

use super::files::is_document;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Event types emitted when documents change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChangeEvent {
    /// A schema document changed
    Schema(PathBuf),
    /// An override document changed
    Overrides(PathBuf),
    /// Multiple documents changed in quick succession
    Batch(Vec<PathBuf>),
    /// Watcher encountered an error
    Error(String),
}

impl DocumentChangeEvent {
    /// Returns true if this event requires a reload.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, DocumentChangeEvent::Error(_))
    }

    pub fn affected_paths(&self) -> Vec<&Path> {
        match self {
            DocumentChangeEvent::Schema(p) | DocumentChangeEvent::Overrides(p) => {
                vec![p.as_path()]
            }
            DocumentChangeEvent::Batch(paths) => paths.iter().map(|p| p.as_path()).collect(),
            DocumentChangeEvent::Error(_) => vec![],
        }
    }
}

/// Directories to watch.
#[derive(Debug, Clone)]
pub struct WatchPaths {
    pub schema_dir: Option<PathBuf>,
    pub overrides_dir: Option<PathBuf>,
}

/// Handle to the running watcher. Dropping it stops watching.
pub struct DocumentWatcherHandle {
    pub events: watch::Receiver<Option<DocumentChangeEvent>>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl DocumentWatcherHandle {
    /// Wait for the next change event.
    pub async fn wait_for_change(&mut self) -> Option<DocumentChangeEvent> {
        // Skip the initial None value
        loop {
            if self.events.changed().await.is_err() {
                return None;
            }
            let event = self.events.borrow().clone();
            if event.is_some() {
                return event;
            }
        }
    }

    pub fn latest_event(&self) -> Option<DocumentChangeEvent> {
        self.events.borrow().clone()
    }
}

/// Start watching the schema and override directories.
///
/// Missing directories are skipped with a warning.
pub fn start_document_watcher(
    paths: WatchPaths,
    debounce: Duration,
) -> Result<DocumentWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(debounce, notify_tx)?;
    let watcher = debouncer.watcher();

    for dir in [&paths.schema_dir, &paths.overrides_dir].into_iter().flatten() {
        if dir.exists() {
            info!("Watching document directory: {}", dir.display());
            watcher.watch(dir, notify::RecursiveMode::NonRecursive)?;
        } else {
            warn!(
                "Document directory does not exist, skipping watch: {}",
                dir.display()
            );
        }
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &paths);
    });

    Ok(DocumentWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<DocumentChangeEvent>>,
    paths: &WatchPaths,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let Some(event) = classify_events(events, paths) else {
                    continue;
                };
                debug!("Document change detected: {:?}", event);
                if tx.send(Some(event)).is_err() {
                    info!("Document watcher receiver dropped, stopping");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                let _ = tx.send(Some(DocumentChangeEvent::Error(e.to_string())));
            }
            Err(_) => {
                info!("Document watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Collapse one debounced batch into a single event.
fn classify_events(
    events: Vec<notify_debouncer_mini::DebouncedEvent>,
    paths: &WatchPaths,
) -> Option<DocumentChangeEvent> {
    let mut changed: Vec<DocumentChangeEvent> = events
        .into_iter()
        .filter(|event| {
            matches!(
                event.kind,
                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
            )
        })
        .filter_map(|event| classify_path(&event.path, paths))
        .collect();

    match changed.len() {
        0 => None,
        1 => changed.pop(),
        _ => Some(DocumentChangeEvent::Batch(
            changed
                .iter()
                .flat_map(|e| e.affected_paths())
                .map(Path::to_path_buf)
                .collect(),
        )),
    }
}

fn classify_path(path: &Path, paths: &WatchPaths) -> Option<DocumentChangeEvent> {
    if !is_document(path) {
        return None;
    }
    if let Some(ref dir) = paths.schema_dir
        && path.starts_with(dir)
    {
        return Some(DocumentChangeEvent::Schema(path.to_path_buf()));
    }
    if let Some(ref dir) = paths.overrides_dir
        && path.starts_with(dir)
    {
        return Some(DocumentChangeEvent::Overrides(path.to_path_buf()));
    }
    None
}
