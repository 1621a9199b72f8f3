use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tsumiki::transform::markup::minify_markup;
use tsumiki::{Config, Environment, Registry, RunError, TransformError, pipeline};

fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();

    for (path, content) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    (dir, root)
}

#[test]
fn build_writes_only_what_has_sources() {
    let (_dir, root) = project(&[
        ("css/a.css", "body {\n    color: red;\n}\n"),
        ("index.html", "<html>\n  <body>\n    <p>hi</p>\n  </body>\n</html>\n"),
    ]);
    let env = Environment::new(&root, Config::load(&root).unwrap()).unwrap();
    let registry = pipeline::registry().unwrap();

    registry.run(pipeline::BUILD, &env).unwrap();

    let css = fs::read_to_string(root.join("dist/css/a.css")).unwrap();
    assert!(css.contains("color:red"));
    assert!(!css.contains('\n'));
    assert!(root.join("dist/index.html").is_file());
    assert!(!root.join("dist/js").exists());
    assert!(!root.join("dist/assets").exists());
}

#[test]
fn missing_entry_fails_the_build_but_not_its_siblings() {
    let (_dir, root) = project(&[
        ("css/a.css", "a { color: blue }"),
        ("js/app.js", "function app() { return 1 }"),
    ]);
    let env = Environment::new(&root, Config::default()).unwrap();
    let registry = pipeline::registry().unwrap();

    let err = registry.run(pipeline::BUILD, &env).unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task, pipeline::MARKUP);
    assert!(matches!(
        failures[0].cause.downcast_ref::<TransformError>(),
        Some(TransformError::MissingEntryDocument(_))
    ));
    assert!(err.to_string().contains("markup"));

    // parallel siblings still ran to completion
    assert!(root.join("dist/css/a.css").is_file());
    assert!(root.join("dist/js/app.js").is_file());
    assert!(!root.join("dist/index.html").exists());
}

#[test]
fn unknown_task_runs_nothing() {
    let (_dir, root) = project(&[("index.html", "<p>hi</p>")]);
    let env = Environment::new(&root, Config::default()).unwrap();
    let registry = pipeline::registry().unwrap();

    let err = registry.run("deploy", &env).unwrap_err();

    assert!(matches!(err, RunError::Registry(_)));
    assert!(!root.join("dist").exists());
}

#[test]
fn custom_tasks_compose_with_the_standard_ones() {
    let (_dir, root) = project(&[("index.html", "<p>hi</p>")]);
    let env = Environment::new(&root, Config::default()).unwrap();

    let mut registry = Registry::new();
    registry
        .leaf("markup", |ctx| {
            minify_markup(ctx.env)?;
            Ok(())
        })
        .unwrap();
    registry
        .leaf("stamp", |ctx| {
            fs::write(ctx.env.dist().join("stamp.txt"), "done")?;
            Ok(())
        })
        .unwrap();
    registry.series("release", ["markup", "stamp"]).unwrap();

    registry.run("release", &env).unwrap();

    assert_eq!(fs::read_to_string(root.join("dist/stamp.txt")).unwrap(), "done");
}

#[test]
fn config_file_is_honored() {
    let (_dir, root) = project(&[
        ("tsumiki.toml", "dist = \"public\"\n\n[scripts]\nbundle = \"app.js\"\n"),
        ("index.html", "<p>hi</p>"),
        ("js/a.js", "function a() { return 1 }"),
        ("js/b.js", "function b() { return 2 }"),
    ]);
    let env = Environment::new(&root, Config::load(&root).unwrap()).unwrap();
    let registry = pipeline::registry().unwrap();

    registry.run(pipeline::SCRIPT, &env).unwrap();

    let js = fs::read_to_string(root.join("public/js/app.js")).unwrap();
    assert!(js.contains("function a"));
    assert!(js.contains("function b"));
    assert!(!root.join("public/js/a.js").exists());
}
