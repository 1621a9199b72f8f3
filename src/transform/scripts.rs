use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::minifier::{MangleOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::core::Environment;
use crate::error::TransformError;
use crate::transform::{glob_inputs, write_output};

/// Output directory for scripts, relative to `dist`.
pub const DIR_SCRIPTS: &str = "js";

/// Minifies every script matching the configured source glob into `dist/js`,
/// optionally concatenated into one bundle.
pub fn minify_scripts(env: &Environment) -> Result<Vec<Utf8PathBuf>, TransformError> {
    let config = &env.config.scripts;
    let inputs = glob_inputs(&env.root, &config.source)?;
    if inputs.is_empty() {
        tracing::debug!("no scripts match {}", config.source);
        return Ok(Vec::new());
    }

    let dir = env.dist().join(DIR_SCRIPTS);
    let mut written = Vec::new();

    match &config.bundle {
        Some(bundle) => {
            let mut code = Vec::new();
            for input in &inputs {
                code.extend(fs::read(&input.path)?);
                // keeps a missing trailing semicolon from joining two files
                code.extend(b"\n;\n");
            }

            let path = dir.join(bundle);
            write_output(&path, minify_js(Utf8Path::new(bundle), &code)?)?;
            written.push(path);
        }
        None => {
            for input in &inputs {
                let code = fs::read(&input.path)?;
                let path = dir.join(&input.relative);
                write_output(&path, minify_js(&input.path, &code)?)?;
                written.push(path);
            }
        }
    }

    tracing::info!("minified {} script(s) into {}", written.len(), dir);
    Ok(written)
}

/// Minifies one script.
///
/// Whitespace and comments are dropped and local names are shortened. The
/// syntax itself is printed back as written, so function declarations stay
/// function declarations and no newer syntax than the source's is emitted.
/// Top-level names are kept, so globals the page relies on stay reachable.
pub fn minify_js(path: &Utf8Path, code: &[u8]) -> Result<Vec<u8>, TransformError> {
    let rejected = |message: String| TransformError::Script {
        path: path.to_owned(),
        message,
    };

    let code = std::str::from_utf8(code).map_err(|e| rejected(e.to_string()))?;

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(rejected(message));
    }

    let mut program = parsed.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: None,
    };
    let minified = Minifier::new(options).minify(&allocator, &mut program);

    let output = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_scoping(minified.scoping)
        .build(&program);

    Ok(output.code.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn minify(code: &str) -> String {
        String::from_utf8(minify_js(Utf8Path::new("a.js"), code.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_minify_keeps_globals() {
        let out = minify(
            "function greet(name) {\n    var message = 'hi ' + name;\n    return message;\n}\n",
        );

        assert!(out.starts_with("function greet("));
        assert!(!out.contains("message"));
        assert!(!out.contains("\n    "));
        assert!(out.len() < 60);
    }

    #[test]
    fn test_constructors_stay_functions() {
        let out = minify("function Point(x) {\n  this.x = x;\n}\nvar p = new Point(1);\n");

        assert!(out.contains("function Point("));
        assert!(out.contains("new Point(1)"));
        assert!(!out.contains("=>"));
    }

    #[test]
    fn test_arguments_and_this_keep_their_meaning() {
        let out = minify(
            "function sum() {\n  return arguments.length;\n}\n\
             el.addEventListener('click', function () {\n  this.className = 'on';\n});\n",
        );

        assert!(out.contains("function sum("));
        assert!(out.contains("return arguments.length"));
        assert!(out.contains("function("));
        assert!(out.contains("this.className="));
        assert!(!out.contains("=>"));
        assert!(!out.contains('`'));
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let err = minify_js(Utf8Path::new("broken.js"), b"function ( {").unwrap_err();
        assert!(matches!(err, TransformError::Script { .. }));
        assert!(err.to_string().contains("broken.js"));
    }

    #[test]
    fn test_missing_sources_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let env = Environment::new(root, Config::default()).unwrap();

        assert!(minify_scripts(&env).unwrap().is_empty());
        assert!(!root.join("dist/js").exists());
    }

    #[test]
    fn test_bundle_contains_every_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_output(&root.join("js/a.js"), "function alpha() { return 1 }").unwrap();
        write_output(&root.join("js/b.js"), "function beta() { return 2 }").unwrap();

        let mut config = Config::default();
        config.scripts.bundle = Some(String::from("app.min.js"));
        let env = Environment::new(root, config).unwrap();

        let written = minify_scripts(&env).unwrap();
        assert_eq!(written, vec![root.join("dist/js/app.min.js")]);

        let js = fs::read_to_string(&written[0]).unwrap();
        assert!(js.contains("alpha"));
        assert!(js.contains("beta"));
    }
}
