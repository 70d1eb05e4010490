//! Settings for the admin tool.
//!
//! Layered lowest to highest: built-in defaults, the optional TOML file
//! (`config/fintrack.toml` unless `--config` says otherwise), `FINTRACK_`
//! environment variables (`__` separates sections, e.g.
//! `FINTRACK_DATABASE__URL`), then command-line flags.

use chrono_tz::Tz;
use engine::EngineConfig;
use serde::Deserialize;

use crate::error::{AppError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/fintrack.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:./fintrack.db?mode=rwc";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub engine: EngineConfig,
}

/// Command-line values that win over every other source.
#[derive(Debug, Default)]
pub struct Overrides {
    pub level: Option<String>,
    pub database_url: Option<String>,
    pub timezone: Option<String>,
}

impl Settings {
    pub fn load(path: Option<&str>, overrides: Overrides) -> Result<Self> {
        let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let mut settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("FINTRACK").separator("__"))
            .build()?
            .try_deserialize()?;

        if let Some(level) = overrides.level {
            settings.app.level = level;
        }
        if let Some(url) = overrides.database_url {
            settings.database.url = url;
        }
        if let Some(timezone) = overrides.timezone {
            settings.engine.dashboard.timezone = timezone
                .parse::<Tz>()
                .map_err(|err| AppError::InvalidArgument(format!("timezone: {err}")))?;
        }

        Ok(settings)
    }
}
