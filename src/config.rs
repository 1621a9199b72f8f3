//! Project configuration.
//!
//! Everything has a default that matches the conventional layout (`css/`,
//! `js/`, `index.html`, `assets/`), so `tsumiki.toml` is optional. Values are
//! read relative to the project root.

use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use lightningcss::targets::{Browsers, Targets};
use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILE: &str = "tsumiki.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output directory, relative to the root.
    pub dist: Utf8PathBuf,
    /// The single entry document for the markup transform.
    pub entry: Utf8PathBuf,
    /// Port of the HTTP dev server.
    pub port: u16,
    /// Quiet period used to debounce bursts of file events.
    pub debounce_ms: u64,
    pub styles: StylesConfig,
    pub scripts: ScriptsConfig,
    pub assets: AssetsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dist: Utf8PathBuf::from("dist"),
            entry: Utf8PathBuf::from("index.html"),
            port: 3000,
            debounce_ms: 250,
            styles: StylesConfig::default(),
            scripts: ScriptsConfig::default(),
            assets: AssetsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    pub source: String,
    pub compatibility: Compatibility,
    /// Concatenate every source into this file instead of one output per source.
    pub bundle: Option<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            source: String::from("css/*.css"),
            compatibility: Compatibility::default(),
            bundle: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    pub source: String,
    pub bundle: Option<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            source: String::from("js/*.js"),
            bundle: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    pub images: Utf8PathBuf,
    pub fonts: Utf8PathBuf,
    /// Quality used for lossy (JPEG) recompression, 1-100.
    pub quality: u8,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            images: Utf8PathBuf::from("assets/images"),
            fonts: Utf8PathBuf::from("assets/fonts"),
            quality: 80,
        }
    }
}

/// Oldest browser the minified stylesheets must still work in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Compatibility {
    #[default]
    Ie8,
    Ie9,
    Ie10,
    Ie11,
    /// No legacy target, only evergreen browsers.
    Modern,
}

impl Compatibility {
    /// Browser targets understood by the CSS minifier.
    pub fn targets(self) -> Targets {
        let ie = match self {
            Compatibility::Ie8 => 8,
            Compatibility::Ie9 => 9,
            Compatibility::Ie10 => 10,
            Compatibility::Ie11 => 11,
            Compatibility::Modern => return Targets::default(),
        };

        Targets::from(Browsers {
            ie: Some(ie << 16),
            ..Browsers::default()
        })
    }
}

impl FromStr for Compatibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ie8" => Ok(Compatibility::Ie8),
            "ie9" => Ok(Compatibility::Ie9),
            "ie10" => Ok(Compatibility::Ie10),
            "ie11" => Ok(Compatibility::Ie11),
            "modern" | "*" => Ok(Compatibility::Modern),
            other => Err(ConfigError::Compatibility(other.to_string())),
        }
    }
}

impl TryFrom<String> for Compatibility {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Config {
    /// Loads `tsumiki.toml` from `root`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Utf8Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }

        Self::from_file(&path)
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
    }
}
