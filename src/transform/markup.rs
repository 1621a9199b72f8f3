use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use minify_html::Cfg;

use crate::core::Environment;
use crate::error::TransformError;
use crate::transform::write_output;

/// Collapses insignificant whitespace in the entry document and writes it to
/// the root of `dist`.
///
/// Unlike the other transforms, the input is mandatory: a missing entry
/// document fails with [`TransformError::MissingEntryDocument`] and writes
/// nothing.
pub fn minify_markup(env: &Environment) -> Result<Utf8PathBuf, TransformError> {
    let entry = env.source(&env.config.entry);
    if !entry.is_file() {
        return Err(TransformError::MissingEntryDocument(entry));
    }

    let html = fs::read(&entry)?;
    let name = entry
        .file_name()
        .map(Utf8Path::new)
        .unwrap_or(env.config.entry.as_path());
    let path = env.dist().join(name);

    write_output(&path, collapse_whitespace(&html))?;

    tracing::info!("minified {} into {}", env.config.entry, path);
    Ok(path)
}

/// Removes whitespace that doesn't affect rendering. Comments, closing tags
/// and inline `<script>`/`<style>` contents are kept as they are.
pub fn collapse_whitespace(html: &[u8]) -> Vec<u8> {
    let mut cfg = Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = true;

    minify_html::minify(html, &cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const PAGE: &str = "<!DOCTYPE html>\n<html>\n  <head>\n    <title>Hi</title>\n  </head>\n  <body>\n    <p>\n      Hello   world\n    </p>\n  </body>\n</html>\n";

    #[test]
    fn test_collapse_whitespace() {
        let out = String::from_utf8(collapse_whitespace(PAGE.as_bytes())).unwrap();

        assert!(out.len() < PAGE.len());
        assert!(!out.contains("\n    "));
        assert!(out.contains("Hello world"));
        assert!(out.contains("</p>"));
    }

    #[test]
    fn test_missing_entry_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let env = Environment::new(root, Config::default()).unwrap();

        let err = minify_markup(&env).unwrap_err();

        assert!(matches!(err, TransformError::MissingEntryDocument(ref path) if path.ends_with("index.html")));
        assert!(!root.join("dist").exists());
    }

    #[test]
    fn test_entry_lands_in_dist_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(root.join("index.html"), PAGE).unwrap();
        let env = Environment::new(root, Config::default()).unwrap();

        let path = minify_markup(&env).unwrap();

        assert_eq!(path, root.join("dist/index.html"));
        assert!(fs::read(&path).unwrap().len() < PAGE.len());
        assert_eq!(fs::read_to_string(root.join("index.html")).unwrap(), PAGE);
    }

    #[test]
    fn test_nested_entry_is_written_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_output(&root.join("pages/home.html"), PAGE).unwrap();

        let mut config = Config::default();
        config.entry = Utf8PathBuf::from("pages/home.html");
        let env = Environment::new(root, config).unwrap();

        assert_eq!(minify_markup(&env).unwrap(), root.join("dist/home.html"));
    }
}
