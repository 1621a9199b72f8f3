//! Watch mode.
//!
//! 1. **File watcher**: `notify` monitors the static roots of every binding
//!    recursively, with debouncing so a burst of saves arrives as one batch.
//! 2. **Coordinator**: each batch is matched against the bindings, and every
//!    bound task that matched is triggered once, no matter how many of its
//!    files changed.
//! 3. **Workers**: one thread per bound task. A worker is idle, or running
//!    its task. A trigger that arrives while the task runs is parked in a
//!    single-slot channel; further triggers find the slot full and are
//!    dropped. When the run ends the worker picks up the parked trigger and
//!    runs again at once, so a flood of edits costs at most one extra run.
//!
//! After a successful run the worker asks the [`Reload`] sink to refresh
//! connected browsers. A failed run is logged and reloads nothing; the worker
//! goes back to waiting for the next change.

use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};

use crate::core::as_overhead;
use crate::engine::TaskContext;
use crate::error::{RunError, WatchError};

/// Re-run `task` whenever a file matching `pattern` changes.
#[derive(Debug, Clone)]
pub struct Binding {
    pub pattern: Pattern,
    pub task: String,
}

impl Binding {
    /// `pattern` is a glob relative to the project root.
    pub fn new(pattern: &str, task: impl Into<String>) -> Result<Self, glob::PatternError> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            task: task.into(),
        })
    }

    /// Matches a path relative to the project root. `*` stops at `/`.
    pub fn matches(&self, path: &Utf8Path) -> bool {
        const OPTIONS: MatchOptions = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        self.pattern.matches_with(path.as_str(), OPTIONS)
    }
}

/// Receives a notification after every successful watched run.
pub trait Reload: Send + Sync {
    fn reload(&self);
}

/// Reload sink for watching without a dev server.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl Reload for NoReload {
    fn reload(&self) {}
}

/// Runs a task by name.
pub type Runner<'env> = &'env (dyn Fn(&str) -> Result<(), RunError> + Sync);

struct Worker<'scope> {
    task: String,
    trigger: SyncSender<()>,
    handle: ScopedJoinHandle<'scope, ()>,
}

/// Routes change notifications to per-task workers.
pub struct Coordinator<'scope> {
    bindings: Vec<(Binding, usize)>,
    workers: Vec<Worker<'scope>>,
}

impl<'scope> Coordinator<'scope> {
    /// Spawns one worker per distinct bound task inside `scope`.
    pub fn spawn<'env>(
        scope: &'scope Scope<'scope, 'env>,
        bindings: Vec<Binding>,
        run: Runner<'env>,
        reload: &'env dyn Reload,
    ) -> Self {
        let mut tasks: BTreeMap<String, usize> = BTreeMap::new();
        let mut workers = Vec::new();
        let mut routed = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let index = match tasks.get(&binding.task) {
                Some(&index) => index,
                None => {
                    let (trigger, rx) = sync_channel(1);
                    let task = binding.task.clone();
                    let handle = scope.spawn({
                        let task = task.clone();
                        move || work(&task, rx, run, reload)
                    });

                    workers.push(Worker {
                        task,
                        trigger,
                        handle,
                    });
                    tasks.insert(binding.task.clone(), workers.len() - 1);
                    workers.len() - 1
                }
            };

            routed.push((binding, index));
        }

        Self {
            bindings: routed,
            workers,
        }
    }

    /// Triggers every task with a binding that matches any of `paths`, once.
    /// Returns the names of the triggered tasks.
    pub fn dispatch<P: AsRef<Utf8Path>>(&self, paths: &[P]) -> Vec<&str> {
        let mut triggered = HashSet::new();

        for (binding, index) in &self.bindings {
            if paths.iter().any(|path| binding.matches(path.as_ref())) {
                triggered.insert(*index);
            }
        }

        let mut indices: Vec<_> = triggered.into_iter().collect();
        indices.sort_unstable();

        for &index in &indices {
            let worker = &self.workers[index];
            match worker.trigger.try_send(()) {
                Ok(()) => tracing::debug!("triggered '{}'", worker.task),
                Err(TrySendError::Full(())) => {
                    tracing::debug!("'{}' already has a pending run", worker.task)
                }
                Err(TrySendError::Disconnected(())) => {
                    tracing::error!("worker for '{}' has stopped", worker.task)
                }
            }
        }

        indices
            .into_iter()
            .map(|index| self.workers[index].task.as_str())
            .collect()
    }

    /// Stops accepting triggers, lets pending runs finish and joins the
    /// workers.
    pub fn shutdown(self) {
        for worker in self.workers {
            drop(worker.trigger);
            if worker.handle.join().is_err() {
                tracing::error!("worker for '{}' panicked", worker.task);
            }
        }
    }
}

fn work(task: &str, triggers: Receiver<()>, run: Runner<'_>, reload: &dyn Reload) {
    for () in triggers {
        let s = Instant::now();
        tracing::info!("change detected, re-running '{task}'...");

        match run(task) {
            Ok(()) => {
                tracing::info!("refreshed '{task}' {}", as_overhead(s));
                reload.reload();
            }
            Err(e) => tracing::error!("'{task}' failed, not reloading:\n{e}"),
        }
    }
}

/// Watches the project and re-runs bound tasks until the process exits.
///
/// Runs nothing up front; callers wanting an initial build run it first.
pub fn watch(ctx: &TaskContext<'_>, bindings: &[Binding], reload: &dyn Reload) -> Result<(), WatchError> {
    let env = ctx.env;
    let registry = ctx.registry;
    let root = env.root.canonicalize_utf8()?;

    let (tx, rx) = std::sync::mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(Duration::from_millis(env.config.debounce_ms), None, tx)?;

    let roots = bindings
        .iter()
        .map(|binding| watch_root(&root, binding.pattern.as_str()))
        .collect();

    for path in collapse_watch_paths(roots) {
        tracing::info!("watching {}", path);
        debouncer.watch(path.as_std_path(), RecursiveMode::Recursive)?;
    }

    let run = |task: &str| registry.run(task, env);

    std::thread::scope(|scope| {
        let coordinator = Coordinator::spawn(scope, bindings.to_vec(), &run, reload);

        while let Ok(result) = rx.recv() {
            let events = match result {
                Ok(events) => events,
                Err(errors) => {
                    for e in errors {
                        tracing::error!("watch error: {e}");
                    }
                    continue;
                }
            };

            let paths: Vec<Utf8PathBuf> = events
                .iter()
                .filter(|de| {
                    matches!(
                        de.event.kind,
                        EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                    )
                })
                .flat_map(|de| &de.event.paths)
                .filter_map(|path| {
                    let path = Utf8Path::from_path(path)?;
                    Some(path.strip_prefix(&root).ok()?.to_path_buf())
                })
                .collect();

            if paths.is_empty() {
                continue;
            }

            tracing::debug!("{} path(s) changed", paths.len());
            coordinator.dispatch(paths.as_slice());
        }

        coordinator.shutdown();
    });

    Ok(())
}

/// The directory to watch for a glob: its static prefix, or the nearest
/// existing ancestor when the prefix is a file or doesn't exist yet.
pub fn watch_root(root: &Utf8Path, pattern: &str) -> Utf8PathBuf {
    let mut path = root.join(crate::transform::static_prefix(pattern));

    while !path.is_dir() {
        match path.parent() {
            Some(parent) if parent.starts_with(root) => path = parent.to_path_buf(),
            _ => return root.to_path_buf(),
        }
    }

    path
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
