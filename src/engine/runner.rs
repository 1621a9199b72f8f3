//! Execution of resolved units.
//!
//! A series runs its children one after another on the calling thread and
//! stops at the first failure. A parallel group hands its children to the
//! rayon pool, waits for all of them and keeps every failure. Leaves run under
//! their own tracing span with a progress spinner.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;
use std::time::Instant;

use indicatif::ProgressStyle;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Environment, as_overhead};
use crate::engine::TaskContext;
use crate::error::{Failure, Failures};
use crate::registry::{Registry, TaskFn, Unit};

static STYLE_TASK: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
});

/// Executes `unit`, returning every failed leaf.
pub fn run_unit(unit: &Unit, registry: &Registry, env: &Environment) -> Result<(), Failures> {
    let s = Instant::now();
    let span = tracing::span!(Level::INFO, "run", task = unit.name());
    let _enter = span.enter();

    let result = execute(unit, registry, env);

    match &result {
        Ok(()) => tracing::info!("finished '{}' {}", unit.name(), as_overhead(s)),
        Err(failures) => tracing::error!(
            "'{}' failed in {} of {} tasks {}",
            unit.name(),
            failures.len(),
            unit.leaves(),
            as_overhead(s)
        ),
    }

    result
}

fn execute(unit: &Unit, registry: &Registry, env: &Environment) -> Result<(), Failures> {
    match unit {
        Unit::Leaf { name, func } => {
            run_leaf(name, func, registry, env).map_err(|failure| Failures(vec![failure]))
        }
        Unit::Series { children, .. } => {
            for child in children {
                execute(child, registry, env)?;
            }
            Ok(())
        }
        Unit::Parallel { children, .. } => {
            let failures: Vec<Failure> = children
                .par_iter()
                .filter_map(|child| execute(child, registry, env).err())
                .flat_map_iter(|failures| failures.0)
                .collect();

            if failures.is_empty() {
                Ok(())
            } else {
                Err(Failures(failures))
            }
        }
    }
}

fn run_leaf(
    name: &str,
    func: &TaskFn,
    registry: &Registry,
    env: &Environment,
) -> Result<(), Failure> {
    let span = tracing::span!(Level::INFO, "task", task = name);
    span.pb_set_style(&STYLE_TASK);
    span.pb_set_message(&format!("Running {name}"));
    let _enter = span.enter();

    let context = TaskContext { env, registry };

    let s = Instant::now();

    // A panic fails only its own leaf.
    let result = match catch_unwind(AssertUnwindSafe(|| func(&context))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("Task panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("Task panicked: {s}")
            } else {
                String::from("Task panicked with unknown payload")
            };

            Err(anyhow::anyhow!(msg))
        }
    };

    match result {
        Ok(()) => {
            tracing::info!("task '{name}' done {}", as_overhead(s));
            Ok(())
        }
        Err(cause) => {
            tracing::error!("task '{name}' failed: {cause:#}");
            Err(Failure {
                task: name.to_string(),
                cause,
            })
        }
    }
}
