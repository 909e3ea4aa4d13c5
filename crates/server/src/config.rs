//! Server configuration, stored as JSON next to the binary.
//!
//! A missing or empty file is replaced by one holding the defaults, so a
//! fresh install always leaves something to edit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bricklayer_engine::world::Level;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    /// Message of the day, shown in server listings.
    pub description: String,
    /// Sent to every player on connect. `$Name`, `$Online` and `$Rooms`
    /// are substituted.
    pub intro: String,
    pub bind: String,
    pub max_players: usize,
    pub level_dir: PathBuf,
    /// Size of the level generated when none are saved.
    pub level_width: u16,
    pub level_height: u16,
    pub autosave_secs: u64,
    pub dashboard_port: u16,
    /// Extension identifiers that are never loaded.
    pub disabled_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Bricklayer Server".into(),
            description: "A Bricklayer Server running on the default configuration.\n\
                          Please edit your Message Of The Day in the config file!"
                .into(),
            intro: "Welcome to $Name!\n\
                    We currently have $Online player(s) in $Rooms room(s).\n\n\
                    Server News:\n-\n-\n-\n\n\
                    Server Rules:\n-\n-\n-"
                .into(),
            bind: "0.0.0.0:14242".into(),
            max_players: 8,
            level_dir: "levels".into(),
            level_width: 100,
            level_height: 60,
            autosave_secs: 300,
            dashboard_port: 8000,
            disabled_extensions: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read the config at `path`, writing the defaults there first if the
    /// file is missing or empty.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        if text.trim().is_empty() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }
        let config: Self = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate().with_context(|| format!("checking {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        Level::check_size(self.level_width, self.level_height).context("level_width / level_height")?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    pub fn render_intro(&self, online: usize, rooms: usize) -> String {
        self.intro
            .replace("$Name", &self.name)
            .replace("$Online", &online.to_string())
            .replace("$Rooms", &rooms.to_string())
    }

    /// `None` disables autosave.
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_secs > 0).then(|| Duration::from_secs(self.autosave_secs))
    }
}
