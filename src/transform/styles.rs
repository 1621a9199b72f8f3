use std::fs;
use std::sync::{Arc, PoisonError, RwLock};

use camino::{Utf8Path, Utf8PathBuf};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

use crate::config::Compatibility;
use crate::core::Environment;
use crate::error::TransformError;
use crate::transform::{glob_inputs, write_output};

/// Output directory for stylesheets, relative to `dist`.
pub const DIR_STYLES: &str = "css";

/// Minifies every stylesheet matching the configured source glob into
/// `dist/css`.
///
/// Each source keeps its file name, unless a bundle name is configured, in
/// which case the sources are concatenated in path order into that one file.
/// Returns the written files; no sources means nothing is written.
pub fn minify_styles(env: &Environment) -> Result<Vec<Utf8PathBuf>, TransformError> {
    let config = &env.config.styles;
    let inputs = glob_inputs(&env.root, &config.source)?;
    if inputs.is_empty() {
        tracing::debug!("no stylesheets match {}", config.source);
        return Ok(Vec::new());
    }

    let dir = env.dist().join(DIR_STYLES);
    let mut written = Vec::new();

    match &config.bundle {
        Some(bundle) => {
            let mut code = String::new();
            for input in &inputs {
                code.push_str(&fs::read_to_string(&input.path)?);
                code.push('\n');
            }

            let css = minify_css(Utf8Path::new(bundle), &code, config.compatibility)?;
            let path = dir.join(bundle);
            write_output(&path, css)?;
            written.push(path);
        }
        None => {
            for input in &inputs {
                let code = fs::read_to_string(&input.path)?;
                let css = minify_css(&input.path, &code, config.compatibility)?;
                let path = dir.join(&input.relative);
                write_output(&path, css)?;
                written.push(path);
            }
        }
    }

    tracing::info!("minified {} stylesheet(s) into {}", written.len(), dir);
    Ok(written)
}

/// Minifies a single stylesheet for the given compatibility target.
///
/// Rules and declarations the parser can't understand, such as legacy IE
/// hacks, are dropped with a warning instead of rejecting the whole file.
pub fn minify_css(
    path: &Utf8Path,
    code: &str,
    compatibility: Compatibility,
) -> Result<String, TransformError> {
    let rejected = |message: String| TransformError::Stylesheet {
        path: path.to_owned(),
        message,
    };

    let targets = compatibility.targets();
    let warnings = Arc::new(RwLock::new(Vec::new()));

    let mut sheet = StyleSheet::parse(
        code,
        ParserOptions {
            filename: path.to_string(),
            error_recovery: true,
            warnings: Some(warnings.clone()),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| rejected(e.to_string()))?;

    for warning in warnings.read().unwrap_or_else(PoisonError::into_inner).iter() {
        tracing::warn!("{path}: skipped {warning}");
    }

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| rejected(e.to_string()))?;

    let output = sheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| rejected(e.to_string()))?;

    Ok(output.code)
}
