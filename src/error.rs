use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while defining or resolving tasks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{0}' depends on itself")]
    Cycle(String),
}

/// Errors raised by a single transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Entry document '{0}' does not exist")]
    MissingEntryDocument(Utf8PathBuf),

    #[error("Stylesheet '{path}' was rejected: {message}")]
    Stylesheet { path: Utf8PathBuf, message: String },

    #[error("Script '{path}' was rejected: {message}")]
    Script { path: Utf8PathBuf, message: String },

    #[error("Copying images failed: {images}\nCopying fonts failed: {fonts}")]
    Assets {
        images: Box<TransformError>,
        fonts: Box<TransformError>,
    },

    #[cfg(feature = "image")]
    #[error("Image '{path}' was rejected: {source}")]
    Image {
        path: Utf8PathBuf,
        source: image::ImageError,
    },
}

/// A leaf task that failed, together with the underlying cause.
#[derive(Debug)]
pub struct Failure {
    pub task: String,
    pub cause: anyhow::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task '{}': {:#}", self.task, self.cause)
    }
}

/// Every failure collected while running a task.
#[derive(Debug, Default)]
pub struct Failures(pub Vec<Failure>);

impl Failures {
    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [one] => write!(f, "{one}"),
            many => {
                write!(f, "{} tasks failed", many.len())?;
                for failure in many {
                    write!(f, "\n  - {failure}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Failed(Failures),
}

impl RunError {
    /// Failures of the leaf tasks, empty when the task never started.
    pub fn failures(&self) -> &[Failure] {
        match self {
            RunError::Registry(_) => &[],
            RunError::Failed(failures) => &failures.0,
        }
    }
}

#[cfg(feature = "server")]
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Couldn't bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("Failed to build runtime")]
    Runtime(#[source] std::io::Error),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file '{0}'.\n{1}")]
    Parse(Utf8PathBuf, toml::de::Error),

    #[error("Unknown compatibility target '{0}' (expected ie8, ie9, ie10, ie11 or modern)")]
    Compatibility(String),
}

#[derive(Debug, Error)]
pub enum TsumikiError {
    #[error("Error while loading configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Capability '{0}' is unavailable: {1}")]
    Capability(&'static str, String),
}
