#![forbid(unsafe_code)]
//! A static asset pipeline.
//!
//! Tasks are registered by name in a [`Registry`], either as leaves that do
//! one piece of work or as groups that run other tasks one after another
//! ([`Body::Series`]) or side by side ([`Body::Parallel`]). The standard
//! pipeline in [`pipeline`] minifies stylesheets, scripts and the entry
//! document, copies images and fonts, and can watch the sources and serve the
//! output with live reload.
//!
//! ```no_run
//! use camino::Utf8Path;
//! use tsumiki::{Config, Environment, pipeline};
//!
//! fn main() -> Result<(), tsumiki::TsumikiError> {
//!     let root = Utf8Path::new(".");
//!     let env = Environment::new(root, Config::load(root)?)?;
//!     let registry = pipeline::registry()?;
//!     registry.run(pipeline::BUILD, &env)?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod engine;
mod error;
mod registry;

pub mod pipeline;
pub mod transform;

#[cfg(feature = "logging")]
pub mod logging;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "live")]
pub mod watch;

pub use crate::config::{
    AssetsConfig, CONFIG_FILE, Compatibility, Config, ScriptsConfig, StylesConfig,
};
pub use crate::core::{Environment, as_overhead};
pub use crate::engine::{TaskContext, run_unit};
pub use crate::error::*;
pub use crate::registry::{Body, Kind, Registry, TaskFn, TaskResult, Unit};
