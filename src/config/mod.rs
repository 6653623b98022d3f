//! Sandbox configuration management for `sandbox.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [render], [script], [document]
//! ├── error.rs       # ConfigError
//! └── mod.rs         # SandboxConfig (this file)
//! ```
//!
//! A missing config file means defaults. Unknown fields are reported and
//! ignored; invalid values are collected and reported together.

mod error;
mod section;

pub use error::ConfigError;
pub use section::{DocumentConfig, RenderConfig, ScriptConfig};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::script::library::Library;
use crate::{debug, log};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing sandbox.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Path the config was loaded from (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub document: DocumentConfig,
}

impl SandboxConfig {
    /// Load configuration for a CLI invocation and apply its overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = &cli.config;
        let mut config = if path.exists() {
            Self::from_path(path)?
        } else {
            debug!("config"; "{} not found, using defaults", path.display());
            Self::default()
        };

        config.config_path = path.clone();
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse config text without CLI overrides.
    pub fn parse(content: &str) -> Result<Self> {
        let (config, _) = Self::parse_with_ignored(content)?;
        config.validate()?;
        Ok(config)
    }

    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring: {}", display_path, fields.join(", "));
    }

    /// CLI flags win over the file.
    fn apply_cli(&mut self, cli: &Cli) {
        if let Commands::Watch(args) = &cli.command {
            if let Some(ms) = args.debounce_ms {
                self.render.debounce_ms = ms;
            }
            if args.no_auto_render {
                self.render.auto_render = false;
            }
        }
    }

    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.render.validate(&mut errors);
        self.script.validate(&mut errors);
        self.document.validate(&mut errors);

        if !errors.is_empty() {
            bail!(ConfigError::Validation(errors));
        }
        Ok(())
    }

    pub fn library(&self) -> Library {
        self.script.library()
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

/// Parse config text, panicking on unknown fields to catch typos in tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SandboxConfig {
    let (parsed, ignored) = SandboxConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
