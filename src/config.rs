//! Configuration surface (spec §6): the external contract the Orchestrator
//! consumes to drive the Server Lifecycle, Build Runner, and File Watcher.
//! Not part of the coordination core itself — CLI parsing and file loading
//! are explicitly out of scope for the core (spec §1) but are carried here
//! as the ambient surface a shippable binary needs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_debounce_ms() -> u64 {
    300
}

/// Deserialized shape of `--config <path>.toml`. Every field is optional so
/// a config file can supply a subset and let CLI flags fill in the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub server_command: Option<String>,
    #[serde(default)]
    pub server_args: Vec<String>,
    pub build_command: Option<String>,
    #[serde(default)]
    pub watch_pattern: Vec<String>,
    pub debounce_ms: Option<u64>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(Error::from)
    }
}

/// The fully-resolved configuration surface (spec §6), after layering CLI
/// overrides on top of an optional config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_command: String,
    pub server_args: Vec<String>,
    pub build_command: String,
    pub watch_patterns: Vec<String>,
    pub debounce_ms: u64,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.server_command.trim().is_empty() {
            return Err(Error::Config("server_command must not be empty".into()));
        }
        if self.watch_patterns.is_empty() {
            return Err(Error::Config(
                "at least one watch_pattern is required".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_command: String::new(),
            server_args: Vec::new(),
            build_command: String::new(),
            watch_patterns: Vec::new(),
            debounce_ms: default_debounce_ms(),
            cwd: PathBuf::from("."),
            env: HashMap::new(),
        }
    }
}

/// Plain (clap-free) mirror of the CLI flags that can override a config
/// file, field-by-field (SPEC_FULL §10). Kept independent of `clap` so the
/// merge logic here is testable without pulling argument parsing into this
/// module — `main.rs`'s derived `Cli` struct is converted into this shape.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_command: Option<String>,
    pub server_args: Vec<String>,
    pub build_command: Option<String>,
    pub watch: Vec<String>,
    pub debounce_ms: Option<u64>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<String>,
}

impl Config {
    /// Loads an optional config file, then layers `overrides` on top
    /// field-by-field (CLI wins over file, matching the teacher's
    /// CLI-overrides-file precedence in `main.rs`'s `Commands::Start`).
    pub fn resolve(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<Config> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            let file = ConfigFile::from_path(path)?;
            if let Some(v) = file.server_command {
                config.server_command = v;
            }
            if !file.server_args.is_empty() {
                config.server_args = file.server_args;
            }
            if let Some(v) = file.build_command {
                config.build_command = v;
            }
            if !file.watch_pattern.is_empty() {
                config.watch_patterns = file.watch_pattern;
            }
            if let Some(v) = file.debounce_ms {
                config.debounce_ms = v;
            }
            if let Some(v) = file.cwd {
                config.cwd = v;
            }
            if !file.env.is_empty() {
                config.env = file.env;
            }
        }

        if let Some(v) = &overrides.server_command {
            config.server_command = v.clone();
        }
        if !overrides.server_args.is_empty() {
            config.server_args = overrides.server_args.clone();
        }
        if let Some(v) = &overrides.build_command {
            config.build_command = v.clone();
        }
        if !overrides.watch.is_empty() {
            config.watch_patterns = overrides.watch.clone();
        }
        if let Some(v) = overrides.debounce_ms {
            config.debounce_ms = v;
        }
        if let Some(v) = &overrides.cwd {
            config.cwd = v.clone();
        }
        for kv in &overrides.env {
            let (key, value) = kv.split_once('=').ok_or_else(|| {
                Error::Config(format!("--env expects KEY=VALUE, got {kv:?}"))
            })?;
            config.env.insert(key.to_string(), value.to_string());
        }

        config.validate()?;
        Ok(config)
    }
}
