use anyhow::{Context, Result};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn config_path() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("cannot determine home directory")?
        .join(".burrow");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("config.toml"))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin serving the dashboard API
    pub server: String,
    /// Talk to the local development server instead of `server`; unset
    /// follows the build (debug builds use it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<bool>,
    /// Tunnel list refresh interval in seconds
    pub tunnels_refresh: u64,
    /// Pipe list refresh interval in seconds
    pub pipes_refresh: u64,
    /// Home summary refresh interval in seconds
    pub summary_refresh: u64,
    /// Shell for completions (bash, zsh, fish)
    pub shell: Option<String>,
    /// Editor for `burrow config` (overrides $VISUAL/$EDITOR)
    pub editor: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "http://localhost:8090/".to_string(),
            dev: None,
            tunnels_refresh: 5,
            pipes_refresh: 5,
            summary_refresh: 5,
            shell: None,
            editor: None,
        }
    }
}

impl Config {
    /// Load config from ~/.burrow/config.toml, falling back to defaults.
    pub fn load() -> Self {
        let path = match config_path() {
            Ok(p) => p,
            Err(_) => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    fn parse(content: &str) -> Self {
        toml::from_str(content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid config, using defaults");
            Self::default()
        })
    }

    pub fn dev_mode(&self) -> bool {
        self.dev.unwrap_or(cfg!(debug_assertions))
    }

    /// Shell named in the config, for `burrow completions` without an argument.
    pub fn completion_shell(&self) -> Result<Shell> {
        let name = self.shell.as_deref().context(
            "no shell given: pass one to `burrow completions` or set `shell` in ~/.burrow/config.toml",
        )?;
        name.parse::<Shell>()
            .map_err(|_| anyhow::anyhow!("unknown shell '{}' in config", name))
    }

    pub fn tunnels_interval(&self) -> Duration {
        Duration::from_secs(self.tunnels_refresh.max(1))
    }

    pub fn pipes_interval(&self) -> Duration {
        Duration::from_secs(self.pipes_refresh.max(1))
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_refresh.max(1))
    }

    /// Resolve which editor to use: config > $VISUAL > $EDITOR > vi
    pub fn resolve_editor(&self) -> String {
        if let Some(ref e) = self.editor {
            return e.clone();
        }
        std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string())
    }

    /// Write a default config file if none exists. Returns the path.
    pub fn init() -> Result<PathBuf> {
        let path = config_path()?;
        if path.exists() {
            return Ok(path);
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default)
            .context("failed to serialize default config")?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
