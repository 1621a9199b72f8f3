//! The standard asset pipeline.
//!
//! ```text
//! default ── series ──┬── build ── parallel ──┬── stylesheet
//!                     │                       ├── script
//!                     │                       ├── markup
//!                     │                       └── asset-copy
//!                     └── serve (server + watch)
//! ```

use crate::error::RegistryError;
use crate::registry::Registry;
use crate::transform::assets::copy_assets;
use crate::transform::markup::minify_markup;
use crate::transform::scripts::minify_scripts;
use crate::transform::styles::minify_styles;

pub const STYLESHEET: &str = "stylesheet";
pub const SCRIPT: &str = "script";
pub const MARKUP: &str = "markup";
pub const ASSET_COPY: &str = "asset-copy";
pub const BUILD: &str = "build";
pub const WATCH: &str = "watch";
pub const SERVE: &str = "serve";
pub const DEFAULT: &str = "default";

/// Builds the registry with every standard task.
pub fn registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    registry.leaf(STYLESHEET, |ctx| {
        minify_styles(ctx.env)?;
        Ok(())
    })?;

    registry.leaf(SCRIPT, |ctx| {
        minify_scripts(ctx.env)?;
        Ok(())
    })?;

    registry.leaf(MARKUP, |ctx| {
        minify_markup(ctx.env)?;
        Ok(())
    })?;

    registry.leaf(ASSET_COPY, |ctx| {
        copy_assets(ctx.env).into_result()?;
        Ok(())
    })?;

    registry.parallel(BUILD, [STYLESHEET, SCRIPT, MARKUP, ASSET_COPY])?;

    #[cfg(feature = "live")]
    registry.leaf(WATCH, |ctx| {
        let bindings = bindings(ctx.env)?;
        crate::watch::watch(ctx, &bindings, &crate::watch::NoReload)?;
        Ok(())
    })?;

    #[cfg(feature = "server")]
    registry.leaf(SERVE, |ctx| {
        let server = crate::server::DevServer::start(&ctx.env.dist(), ctx.env.config.port)?;
        let bindings = bindings(ctx.env)?;
        crate::watch::watch(ctx, &bindings, server.reloader())?;
        server.shutdown();
        Ok(())
    })?;

    registry.series(DEFAULT, default_steps())?;

    Ok(registry)
}

fn default_steps() -> Vec<&'static str> {
    if cfg!(feature = "server") {
        vec![BUILD, SERVE]
    } else if cfg!(feature = "live") {
        vec![BUILD, WATCH]
    } else {
        vec![BUILD]
    }
}

/// Which sources re-run which task in watch mode.
#[cfg(feature = "live")]
pub fn bindings(
    env: &crate::core::Environment,
) -> Result<Vec<crate::watch::Binding>, glob::PatternError> {
    use crate::watch::Binding;
    use glob::Pattern;

    let config = &env.config;
    let tree = |dir: &camino::Utf8Path| format!("{}/**/*", Pattern::escape(dir.as_str()));

    Ok(vec![
        Binding::new(&config.styles.source, STYLESHEET)?,
        Binding::new(&config.scripts.source, SCRIPT)?,
        Binding::new(&Pattern::escape(config.entry.as_str()), MARKUP)?,
        Binding::new(&tree(&config.assets.images), ASSET_COPY)?,
        Binding::new(&tree(&config.assets.fonts), ASSET_COPY)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Kind, Unit};

    #[test]
    fn test_every_task_resolves() {
        let registry = registry().unwrap();

        for name in [STYLESHEET, SCRIPT, MARKUP, ASSET_COPY, BUILD, DEFAULT] {
            assert!(registry.resolve(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_build_runs_every_transform_in_parallel() {
        let registry = registry().unwrap();
        let build = registry.resolve(BUILD).unwrap();

        let Unit::Parallel { children, .. } = &build else {
            panic!("build is not a parallel group");
        };
        let names: Vec<_> = children.iter().map(Unit::name).collect();
        assert_eq!(names, [STYLESHEET, SCRIPT, MARKUP, ASSET_COPY]);
        assert!(children.iter().all(|unit| unit.kind() == Kind::Leaf));
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_default_builds_then_serves() {
        let registry = registry().unwrap();
        let default = registry.resolve(DEFAULT).unwrap();

        let Unit::Series { children, .. } = &default else {
            panic!("default is not a series");
        };
        let names: Vec<_> = children.iter().map(Unit::name).collect();
        assert_eq!(names, [BUILD, SERVE]);
        assert_eq!(default.leaves(), 5);
    }

    #[cfg(feature = "live")]
    #[test]
    fn test_bindings_route_sources_to_tasks() {
        use camino::Utf8Path;

        use crate::core::Environment;

        let env = Environment::new("/project", crate::config::Config::default()).unwrap();
        let bindings = bindings(&env).unwrap();

        let route = |path: &str| {
            bindings
                .iter()
                .filter(|binding| binding.matches(Utf8Path::new(path)))
                .map(|binding| binding.task.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(route("css/site.css"), [STYLESHEET]);
        assert_eq!(route("js/app.js"), [SCRIPT]);
        assert_eq!(route("index.html"), [MARKUP]);
        assert_eq!(route("assets/images/logo.png"), [ASSET_COPY]);
        assert_eq!(route("assets/fonts/sub/a.woff2"), [ASSET_COPY]);
        assert!(route("dist/index.html").is_empty());
        assert!(route("notes.txt").is_empty());
    }
}
