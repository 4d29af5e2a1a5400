//! Directory Watcher - filesystem trigger
//!
//! Watches one directory (non-recursive) and submits every new capture file to
//! the dispatcher. A file is only submitted once its size has stopped changing
//! for one settle interval, so a capture still being copied in is not picked
//! up half-written. A path already being settled is not picked up again when
//! a second event for it arrives. Failures have no caller to report to: they
//! are logged and dropped.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::logic::artifact::{ArtifactOrigin, CaptureArtifact};
use crate::logic::dispatcher::Dispatcher;

/// Size checks before a growing file is given up on
const MAX_SETTLE_ROUNDS: u32 = 60;

pub struct DirectoryWatcher {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Start watching `dir` for `*.<extension>` files
    pub fn start(
        dir: &Path,
        extension: &str,
        dispatcher: Arc<Dispatcher>,
        settle: Duration,
    ) -> notify::Result<Self> {
        std::fs::create_dir_all(dir).map_err(notify::Error::io)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => log::warn!("Watcher error: {}", e),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let task = tokio::spawn(watch_loop(rx, extension.to_string(), dispatcher, settle));

        log::info!("Watching {} for *.{} captures", dir.display(), extension);
        Ok(Self {
            dir: dir.to_path_buf(),
            watcher: Some(watcher),
            task,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stop(mut self) {
        // Dropping the notify watcher closes the event channel
        self.watcher.take();
        self.task.abort();
        log::info!("Stopped watching {}", self.dir.display());
    }
}

async fn watch_loop(
    mut events: mpsc::UnboundedReceiver<Event>,
    extension: String,
    dispatcher: Arc<Dispatcher>,
    settle: Duration,
) {
    let in_flight = InFlight::default();
    while let Some(event) = events.recv().await {
        for path in candidate_paths(&event, &extension) {
            let Some(claim) = in_flight.begin(&path) else {
                log::debug!("Capture already being ingested: {}", path.display());
                continue;
            };
            log::debug!("New capture detected: {}", path.display());
            tokio::spawn(ingest(claim, dispatcher.clone(), settle));
        }
    }
}

/// Paths with an `ingest` task still running
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<PathBuf>>>);

impl InFlight {
    fn begin(&self, path: &Path) -> Option<InFlightClaim> {
        self.0.lock().insert(path.to_path_buf()).then(|| InFlightClaim {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

/// Released when the ingest task ends
struct InFlightClaim {
    set: InFlight,
    path: PathBuf,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set.0.lock().remove(&self.path);
    }
}

async fn ingest(claim: InFlightClaim, dispatcher: Arc<Dispatcher>, settle: Duration) {
    let path = claim.path.clone();
    if let Err(e) = wait_until_stable(&path, settle).await {
        log::warn!("Ignoring {}: {}", path.display(), e);
        return;
    }

    let artifact = match CaptureArtifact::from_path(&path, ArtifactOrigin::Watch) {
        Ok(artifact) => artifact,
        Err(e) => {
            log::warn!("Ignoring {}: {}", path.display(), e);
            return;
        }
    };

    match dispatcher.submit(artifact) {
        Ok(submission) => log::info!(
            "Watcher submitted {}: {} (job {})",
            path.display(),
            submission.status(),
            submission.snapshot().key.short()
        ),
        Err(e) => log::error!("Watcher could not submit {}: {}", path.display(), e),
    }
}

/// Paths of newly arrived files with the capture extension
pub fn candidate_paths(event: &Event, extension: &str) -> Vec<PathBuf> {
    let paths: Vec<&PathBuf> = match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event.paths.iter().collect(),
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1).into_iter().collect(),
        _ => Vec::new(),
    };

    paths
        .into_iter()
        .filter(|path| has_extension(path, extension))
        .filter(|path| !path.is_dir())
        .cloned()
        .collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Wait until the file size is unchanged across one settle interval
async fn wait_until_stable(path: &Path, settle: Duration) -> io::Result<()> {
    let mut last = tokio::fs::metadata(path).await?.len();
    for _ in 0..MAX_SETTLE_ROUNDS {
        tokio::time::sleep(settle).await;
        let size = tokio::fs::metadata(path).await?.len();
        if size == last {
            return Ok(());
        }
        last = size;
    }
    Err(io::Error::new(io::ErrorKind::TimedOut, "file still growing"))
}
