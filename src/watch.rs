//! File system watcher driving rebuilds in `kiln serve`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ notify   │───▶│ dispatch   │───▶│ RebuildGate  │───▶│ rebuild      │
//! │ events   │    │ thread     │    │ (atomic)     │    │ thread       │
//! └──────────┘    └────────────┘    └──────┬───────┘    └──────┬───────┘
//!                                          │ busy              │ ok
//!                                          ▼                   ▼
//!                                       dropped           on_success()
//! ```
//!
//! At most one rebuild runs at a time. Events arriving while it runs are
//! dropped, not queued: a burst of saves yields one rebuild that sees the
//! file system as it is when the rebuild starts. A change that lands after
//! that point is only picked up by the next event.

use crate::{config::SiteConfig, debug, log};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Pause between winning the gate and starting the build, so the rest of
/// an editor's save burst lands first.
const SETTLE_MS: u64 = 100;

/// Directories never worth a rebuild, wherever they appear.
const IGNORED_DIRS: &[&str] = &[".git", ".svn", ".hg", "node_modules", "target"];

// =============================================================================
// Rebuild Gate
// =============================================================================

/// Single-flight flag: `try_acquire` succeeds for exactly one caller until
/// `release`.
#[derive(Debug, Default)]
pub struct RebuildGate {
    busy: AtomicBool,
}

impl RebuildGate {
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the gate for one rebuild and releases it on drop, unwinding included.
struct GateGuard(Arc<RebuildGate>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

// =============================================================================
// Path Filtering
// =============================================================================

/// Decides which changed paths can affect the build output.
#[derive(Debug, Clone)]
struct PathFilter {
    skip: Vec<PathBuf>,
}

impl PathFilter {
    fn new(config: &SiteConfig) -> Self {
        Self {
            skip: vec![config.destination().to_path_buf(), config.cache_dir()],
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if self.skip.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        let in_ignored_dir = path
            .components()
            .any(|c| IGNORED_DIRS.iter().any(|d| c.as_os_str() == *d));
        !in_ignored_dir && !is_temp_file(path)
    }
}

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}

const fn is_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Dispatch
// =============================================================================

type RebuildFn = dyn Fn() -> Result<()> + Send + Sync;
type NotifyFn = dyn Fn() + Send + Sync;

/// Shared between the dispatch thread and `FileWatcher::stop`.
struct Dispatcher {
    filter: PathFilter,
    gate: Arc<RebuildGate>,
    rebuild: Arc<RebuildFn>,
    on_success: Arc<NotifyFn>,
    settle: Duration,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start a rebuild for `event` unless one is already running.
    /// Returns whether a rebuild was started.
    fn dispatch(&self, event: &Event) -> bool {
        if !is_change(event) {
            return false;
        }
        let Some(trigger) = event.paths.iter().find(|p| self.filter.is_relevant(p)) else {
            return false;
        };
        if !self.gate.try_acquire() {
            debug!("watch"; "rebuild in progress, dropping {}", trigger.display());
            return false;
        }

        log!("watch"; "{} changed, rebuilding", display_name(trigger));
        let guard = GateGuard(Arc::clone(&self.gate));
        let rebuild = Arc::clone(&self.rebuild);
        let on_success = Arc::clone(&self.on_success);
        let settle = self.settle;

        let handle = thread::spawn(move || {
            let _guard = guard;
            thread::sleep(settle);
            match panic::catch_unwind(AssertUnwindSafe(|| rebuild())) {
                Ok(Ok(())) => on_success(),
                Ok(Err(err)) => log!("error"; "rebuild failed: {:#}", err),
                Err(payload) => log!("error"; "rebuild panicked: {}", panic_message(&*payload)),
            }
        });

        // The previous rebuild has released the gate, so it is done or
        // about to return.
        if let Some(previous) = self.in_flight.lock().replace(handle) {
            let _ = previous.join();
        }
        true
    }

    /// Block until the current rebuild, if any, has finished.
    fn wait(&self) {
        if let Some(handle) = self.in_flight.lock().take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

// =============================================================================
// Public API
// =============================================================================

/// A running watch on a site's source tree.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    dispatcher: Arc<Dispatcher>,
    events: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Watch `config.source` recursively. `rebuild` runs on a worker thread
    /// for each accepted event; `on_success` runs after it returns `Ok`.
    pub fn start<R, N>(config: &SiteConfig, rebuild: R, on_success: N) -> Result<Self>
    where
        R: Fn() -> Result<()> + Send + Sync + 'static,
        N: Fn() + Send + Sync + 'static,
    {
        let dispatcher = Arc::new(Dispatcher {
            filter: PathFilter::new(config),
            gate: Arc::new(RebuildGate::default()),
            rebuild: Arc::new(rebuild),
            on_success: Arc::new(on_success),
            settle: Duration::from_millis(SETTLE_MS),
            in_flight: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
        watcher
            .watch(&config.source, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", config.source.display()))?;
        log!("watch"; "watching {}", config.source.display());

        let worker = Arc::clone(&dispatcher);
        let events = thread::spawn(move || {
            // Ends when the watcher, and with it the sender, is dropped.
            for event in rx {
                match event {
                    Ok(event) => {
                        worker.dispatch(&event);
                    }
                    Err(err) => log!("watch"; "error: {err}"),
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            dispatcher,
            events: Some(events),
        })
    }

    /// Close the watch handle, then wait for the in-flight rebuild.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.watcher.take());
        if let Some(events) = self.events.take() {
            let _ = events.join();
        }
        self.dispatcher.wait();
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
