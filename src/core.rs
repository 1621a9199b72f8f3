use std::fmt::Display;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;

use crate::config::Config;
use crate::error::TsumikiError;
use crate::transform::assets::ImageOptimizer;

const ANSI_BLUE: Style = Style::new().blue();

/// A 32-byte BLAKE3 hash, used to key cached image compression results by the
/// content of the source file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// Everything a task needs to know about the project it runs in.
///
/// Created once at startup. Capabilities that need initialization, such as the
/// image optimizer, are set up and checked here, before any task can run.
#[derive(Debug)]
pub struct Environment {
    /// Absolute or relative path of the project root.
    pub root: Utf8PathBuf,
    pub config: Config,
    pub(crate) images: ImageOptimizer,
}

impl Environment {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Result<Self, TsumikiError> {
        let images = ImageOptimizer::new(config.assets.quality)?;
        images.ready()?;

        Ok(Self {
            root: root.into(),
            config,
            images,
        })
    }

    /// Resolves a project-relative path against the root.
    pub fn source(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(path)
    }

    /// The output directory.
    pub fn dist(&self) -> Utf8PathBuf {
        self.root.join(&self.config.dist)
    }

    /// Directory for content-addressed intermediate results.
    pub(crate) fn cache(&self) -> Utf8PathBuf {
        self.root.join(".cache")
    }
}

pub fn as_overhead(s: Instant) -> impl Display {
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_is_stable() {
        let a = Hash32::hash(b"tsumiki");
        let b = Hash32::hash(b"tsumiki");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert!(a.to_hex().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, Hash32::hash(b"tsumiki!"));
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let env = Environment::new("/project", Config::default()).unwrap();
        assert_eq!(env.dist(), "/project/dist");
        assert_eq!(env.source("css/a.css"), "/project/css/a.css");
    }
}
