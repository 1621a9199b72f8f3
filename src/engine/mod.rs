mod runner;

use crate::core::Environment;
use crate::error::RunError;
use crate::registry::Registry;

pub use runner::run_unit;

/// What a leaf task sees while it runs.
///
/// Long-running leaves (watch, serve) use `registry` to re-run other tasks by
/// name.
pub struct TaskContext<'a> {
    pub env: &'a Environment,
    pub registry: &'a Registry,
}

impl Registry {
    /// Resolves `name` and executes it to completion.
    ///
    /// Fails with [`RunError::Registry`] before anything runs when the task
    /// can't be resolved, otherwise with every leaf failure collected along
    /// the way.
    pub fn run(&self, name: &str, env: &Environment) -> Result<(), RunError> {
        let unit = self.resolve(name)?;
        run_unit(&unit, self, env).map_err(RunError::Failed)
    }
}
