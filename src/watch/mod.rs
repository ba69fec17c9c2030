//! File Watcher (spec §2 row D, §4.7): resolves patterns to watch roots,
//! matches changed paths by extension or glob, and coalesces bursts of
//! events into a single debounced batch of distinct paths.
//!
//! Built on `notify` directly rather than `notify-debouncer-full`: spec §8
//! requires exactly one `wait_for_change` resolution per silent period,
//! containing the distinct paths observed — a "last event" clock plus a
//! drain-on-settle collector task models that more directly than the
//! debouncer crate's per-event callback.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Extensions watched by default when a pattern names a plain directory
/// (spec §4.7).
pub fn default_extensions() -> HashSet<String> {
    [
        "ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "py", "pyw", "go", "rs", "java",
        "rb", "php", "cpp", "c", "h", "hpp", "cs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Directory components always ignored, regardless of pattern. Supplements
/// the distilled spec's `dist` with `target`/`build` — the Rust/general
/// build-output analogues a tool watching Rust and JS/TS projects side by
/// side will also want ignored.
fn is_ignored(path: &Path) -> bool {
    const IGNORED: [&str; 6] = ["node_modules", ".git", "dist", ".vscode", "target", "build"];
    path.components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| IGNORED.contains(&s)))
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub patterns: Vec<String>,
    pub cwd: PathBuf,
    pub debounce_ms: u64,
    pub extensions: HashSet<String>,
}

impl WatchConfig {
    pub fn new(patterns: Vec<String>, cwd: PathBuf) -> Self {
        Self {
            patterns,
            cwd,
            debounce_ms: 300,
            extensions: default_extensions(),
        }
    }
}

#[derive(Clone)]
enum Matcher {
    Extension(HashSet<String>),
    Glob(glob::Pattern),
}

#[derive(Clone)]
struct WatchRoot {
    dir: PathBuf,
    matcher: Matcher,
}

impl WatchRoot {
    fn matches(&self, cwd: &Path, path: &Path) -> bool {
        if is_ignored(path) {
            return false;
        }
        match &self.matcher {
            Matcher::Extension(extensions) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.contains(ext)),
            Matcher::Glob(pattern) => {
                let rel = path.strip_prefix(cwd).unwrap_or(path);
                pattern.matches_path(rel)
            }
        }
    }
}

fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Resolves one configured pattern to a watch root: a directory to watch
/// recursively plus a matcher over changed paths (spec §4.7).
fn resolve_root(cwd: &Path, pattern: &str, default_exts: &HashSet<String>) -> WatchRoot {
    let normalized = pattern.strip_prefix("./").unwrap_or(pattern);
    if is_glob_pattern(normalized) {
        let glob_start = normalized
            .find(['*', '?', '[', '{'])
            .unwrap_or(normalized.len());
        let prefix = &normalized[..glob_start];
        let root_rel = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
        let dir = cwd.join(root_rel);
        let pattern = glob::Pattern::new(normalized).unwrap_or_else(|_| {
            glob::Pattern::new("**/*").expect("fallback glob pattern is valid")
        });
        WatchRoot {
            dir,
            matcher: Matcher::Glob(pattern),
        }
    } else {
        WatchRoot {
            dir: cwd.join(normalized),
            matcher: Matcher::Extension(default_exts.clone()),
        }
    }
}

fn matches_any(roots: &[WatchRoot], cwd: &Path, path: &Path) -> bool {
    roots.iter().any(|root| root.matches(cwd, path))
}

/// Debounced multi-pattern file watcher. `start()`/`stop()` manage the
/// underlying OS watch resources and are idempotent; `wait_for_change()`
/// resolves once per silent period with the distinct paths seen during it.
pub struct FileWatcher {
    cwd: PathBuf,
    debounce: Duration,
    roots: Vec<WatchRoot>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
    collector: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    batch_tx: mpsc::Sender<Vec<PathBuf>>,
    batch_rx: Mutex<mpsc::Receiver<Vec<PathBuf>>>,
}

impl FileWatcher {
    pub fn new(config: WatchConfig) -> Self {
        let roots = config
            .patterns
            .iter()
            .map(|p| resolve_root(&config.cwd, p, &config.extensions))
            .collect();
        let (batch_tx, batch_rx) = mpsc::channel(16);
        Self {
            cwd: config.cwd,
            debounce: Duration::from_millis(config.debounce_ms),
            roots,
            watcher: std::sync::Mutex::new(None),
            collector: std::sync::Mutex::new(None),
            batch_tx,
            batch_rx: Mutex::new(batch_rx),
        }
    }

    /// Begins watching all resolved roots and starts the debounce
    /// collector. No-op if already started.
    pub fn start(&self) -> crate::error::Result<()> {
        if self.watcher.lock().unwrap().is_some() {
            return Ok(());
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            let _ = raw_tx.send(path);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })?;

        for root in &self.roots {
            if root.dir.exists() {
                watcher.watch(&root.dir, RecursiveMode::Recursive)?;
            } else {
                debug!(dir = %root.dir.display(), "watch root does not exist yet, skipping");
            }
        }

        let roots = self.roots.clone();
        let cwd = self.cwd.clone();
        let debounce = self.debounce;
        let batch_tx = self.batch_tx.clone();
        let collector = tokio::spawn(async move {
            run_collector(raw_rx, batch_tx, debounce, cwd, roots).await;
        });

        *self.watcher.lock().unwrap() = Some(watcher);
        *self.collector.lock().unwrap() = Some(collector);
        Ok(())
    }

    /// Stops the underlying OS watch and collector task. No-op if already
    /// stopped.
    pub fn stop(&self) {
        if let Some(task) = self.collector.lock().unwrap().take() {
            task.abort();
        }
        *self.watcher.lock().unwrap() = None;
    }

    /// Awaits the next debounced batch of distinct changed paths.
    pub async fn wait_for_change(&self) -> Vec<PathBuf> {
        loop {
            match self.batch_rx.lock().await.recv().await {
                Some(batch) => return batch,
                None => {
                    // Collector dropped its sender (e.g. after `stop()`):
                    // park rather than busy-loop until restarted.
                    std::future::pending::<()>().await
                }
            }
        }
    }
}

async fn run_collector(
    mut raw_rx: mpsc::UnboundedReceiver<PathBuf>,
    batch_tx: mpsc::Sender<Vec<PathBuf>>,
    debounce: Duration,
    cwd: PathBuf,
    roots: Vec<WatchRoot>,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    loop {
        let first = match raw_rx.recv().await {
            Some(path) => path,
            None => return,
        };
        if matches_any(&roots, &cwd, &first) {
            pending.insert(first);
        }

        loop {
            match tokio::time::timeout(debounce, raw_rx.recv()).await {
                Ok(Some(path)) => {
                    if matches_any(&roots, &cwd, &path) {
                        pending.insert(path);
                    }
                }
                Ok(None) => return,
                Err(_elapsed) => break, // silent for `debounce`: settle.
            }
        }

        if !pending.is_empty() {
            let batch: Vec<PathBuf> = pending.drain().collect();
            if batch_tx.send(batch).await.is_err() {
                return;
            }
        }
    }
}
