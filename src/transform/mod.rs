//! Leaf transforms.
//!
//! Each transform reads from the project root and writes only below its own
//! directory in the output tree, so any of them can run next to any other.

pub mod assets;
pub mod markup;
pub mod scripts;
pub mod styles;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::TransformError;

/// A source file selected by a glob.
#[derive(Debug, Clone)]
pub struct Input {
    /// Full path, as found on disk.
    pub path: Utf8PathBuf,
    /// Path relative to the glob's static root, used for output naming.
    pub relative: Utf8PathBuf,
}

/// Expands `pattern` below `root` into a sorted list of files. A pattern that
/// matches nothing, including one below a directory that doesn't exist,
/// yields an empty list.
pub(crate) fn glob_inputs(root: &Utf8Path, pattern: &str) -> Result<Vec<Input>, TransformError> {
    let base = root.join(static_prefix(pattern));
    let full = Utf8Path::new(&glob::Pattern::escape(root.as_str())).join(pattern);

    let mut inputs = Vec::new();
    for path in glob::glob(full.as_str())? {
        let path = Utf8PathBuf::try_from(path?)?;
        if !path.is_file() {
            continue;
        }

        let relative = path
            .strip_prefix(&base)
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| Utf8PathBuf::from(path.file_name().unwrap_or_default()));

        inputs.push(Input { path, relative });
    }

    inputs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(inputs)
}

/// The leading components of a glob that contain no wildcards.
pub(crate) fn static_prefix(pattern: &str) -> Utf8PathBuf {
    Utf8Path::new(pattern)
        .components()
        .take_while(|c| !c.as_str().contains(['*', '?', '[']))
        .collect()
}

/// Writes `data` to `path`, creating parent directories as needed.
pub(crate) fn write_output(path: &Utf8Path, data: impl AsRef<[u8]>) -> Result<(), TransformError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_prefix() {
        assert_eq!(static_prefix("css/*.css"), "css");
        assert_eq!(static_prefix("assets/images/**/*"), "assets/images");
        assert_eq!(static_prefix("index.html"), "index.html");
        assert_eq!(static_prefix("*.js"), "");
    }

    #[test]
    fn test_glob_inputs_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_output(&root.join("css/b.css"), "b{}").unwrap();
        write_output(&root.join("css/a.css"), "a{}").unwrap();
        write_output(&root.join("css/nested/c.css"), "c{}").unwrap();

        let inputs = glob_inputs(root, "css/*.css").unwrap();
        let names: Vec<_> = inputs.iter().map(|i| i.relative.as_str()).collect();
        assert_eq!(names, vec!["a.css", "b.css"]);
    }

    #[test]
    fn test_glob_inputs_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        assert!(glob_inputs(root, "js/*.js").unwrap().is_empty());
    }
}
