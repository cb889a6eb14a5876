//! Playtest runner settings
//!
//! Loads from config/playtest_settings.json (local, gitignored) or falls back
//! to config/playtest_settings.template.json (tracked), then built-in
//! defaults. CLI args override file settings.

use bevy::log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::DiscoveryMode;
use crate::bots::goal::client::ChatError;
use crate::bots::goal::history::HistoryPolicy;
use crate::bots::goal::openai::OpenAiConfig;
use crate::constants::{DEFAULT_API_KEY_ENV, DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, DEFAULT_RECORDING_DIR};
use crate::recording::RecorderConfig;
use crate::recording::recorder::resolve_recording_dir;

/// Local settings (gitignored, user's custom settings)
pub const SETTINGS_FILE: &str = "config/playtest_settings.json";
/// Template settings (checked into git)
pub const SETTINGS_TEMPLATE: &str = "config/playtest_settings.template.json";

/// Chat service settings for goal bots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub endpoint: String,
    /// Model used when a scenario doesn't name one
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Inline key; the environment variable wins when both are set
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub timeout_secs: u64,
    pub history: HistoryPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            organization: None,
            timeout_secs: 120,
            history: HistoryPolicy::Unbounded,
        }
    }
}

impl ChatSettings {
    pub fn api_key(&self) -> Result<String, ChatError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
            .ok_or_else(|| ChatError::MissingApiKey(self.api_key_env.clone()))
    }

    pub fn openai_config(&self) -> Result<OpenAiConfig, ChatError> {
        Ok(OpenAiConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key()?,
            organization: self.organization.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        })
    }
}

/// Configuration for a playtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaytestSettings {
    /// Scenario file to run (None = built-in random exploration)
    pub scenario: Option<String>,
    /// Tick budget when the scenario doesn't set one
    pub max_ticks: u64,
    /// Simulated seconds per tick
    pub tick_secs: f64,
    /// Recording root; relative paths resolve against the working directory
    pub recording_dir: String,
    /// Ticks between recorded snapshots
    pub snapshot_rate: u64,
    pub save_only_when_changed: bool,
    /// SQLite catalog of recordings (None = no catalog)
    pub catalog_path: Option<String>,
    pub discovery_mode: DiscoveryMode,
    /// Seconds to let workers flush queued frames at shutdown
    pub drain_timeout_secs: f64,
    /// RNG seed for random bots (None = random)
    pub seed: Option<u64>,
    /// Suppress the end-of-run report
    pub quiet: bool,
    pub chat: ChatSettings,
}

impl Default for PlaytestSettings {
    fn default() -> Self {
        Self {
            scenario: None,
            max_ticks: 600,
            tick_secs: 1.0 / 60.0,
            recording_dir: DEFAULT_RECORDING_DIR.to_string(),
            snapshot_rate: 1,
            save_only_when_changed: true,
            catalog_path: None,
            discovery_mode: DiscoveryMode::OnSceneChange,
            drain_timeout_secs: 10.0,
            seed: None,
            quiet: false,
            chat: ChatSettings::default(),
        }
    }
}

impl PlaytestSettings {
    /// Load settings from a JSON file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse {}: {}", path, e))
    }

    /// Priority: local settings > template settings > built-in defaults
    pub fn from_config_files() -> Self {
        if let Ok(settings) = Self::from_file(SETTINGS_FILE) {
            info!("Loaded playtest settings from {}", SETTINGS_FILE);
            return settings;
        }
        if let Ok(settings) = Self::from_file(SETTINGS_TEMPLATE) {
            info!("Loaded playtest settings from {}", SETTINGS_TEMPLATE);
            return settings;
        }
        Self::default()
    }

    /// Load settings and apply command line overrides
    pub fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        if args.iter().any(|a| a == "--help" || a == "-h") {
            print_help();
            std::process::exit(0);
        }

        // An explicit settings file replaces the config files entirely
        let mut settings = match args.iter().position(|a| a == "--settings") {
            Some(i) => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| "--settings requires a file path".to_string())?;
                Self::from_file(path)?
            }
            None => Self::from_config_files(),
        };
        settings.apply_cli_overrides(&args)?;
        Ok(settings)
    }

    /// Apply CLI argument overrides (args[0] is the program name)
    pub fn apply_cli_overrides(&mut self, args: &[String]) -> Result<(), String> {
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i)
                    .cloned()
                    .ok_or_else(|| format!("{} requires a value", flag))
            };
            match flag {
                "--settings" => {
                    value()?;
                }
                "--scenario" => self.scenario = Some(value()?),
                "--ticks" => {
                    let raw = value()?;
                    self.max_ticks = raw
                        .parse()
                        .map_err(|_| format!("Invalid tick count: {}", raw))?;
                }
                "--recordings" => self.recording_dir = value()?,
                "--seed" => {
                    let raw = value()?;
                    self.seed = Some(raw.parse().map_err(|_| format!("Invalid seed: {}", raw))?);
                }
                "--catalog" => self.catalog_path = Some(value()?),
                "--discovery" => {
                    let raw = value()?;
                    self.discovery_mode = raw.parse()?;
                }
                "--quiet" | "-q" => self.quiet = true,
                other => return Err(format!("Unknown argument: {}", other)),
            }
            i += 1;
        }
        Ok(())
    }

    pub fn recorder_config(&self, base: &Path) -> RecorderConfig {
        RecorderConfig {
            directory: resolve_recording_dir(&self.recording_dir, base),
            snapshot_rate: self.snapshot_rate.max(1),
            save_only_when_changed: self.save_only_when_changed,
        }
    }

    pub fn catalog_path(&self, base: &Path) -> Option<PathBuf> {
        self.catalog_path.as_ref().map(|p| base.join(p))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.drain_timeout_secs.max(0.0))
    }
}

fn print_help() {
    println!(
        r#"Playtest - Run automation bots against the demo scene and record the session

USAGE:
    cargo run --bin playtest -- [OPTIONS]

OPTIONS:
    --settings <FILE>     Load settings from JSON file (CLI args override file settings)
    --scenario <FILE>     TOML scenario naming the bots to run (default: one random bot)
    --ticks <N>           Tick budget when the scenario sets none (default: 600)
    --recordings <DIR>    Recording root directory (default: recordings)
    --seed <N>            RNG seed for random bots
    --catalog <FILE>      Index recordings in a SQLite catalog
    --discovery <MODE>    on-scene-change or every-tick (default: on-scene-change)
    --quiet, -q           Suppress the end-of-run report
    --help, -h            Show this help

SETTINGS FILES:
    config/playtest_settings.json          Local settings (gitignored)
    config/playtest_settings.template.json Template with defaults (tracked)

ENVIRONMENT:
    OPENAI_API_KEY        API key for goal bots (name configurable as chat.api_key_env)

EXAMPLES:
    cargo run --bin playtest -- --ticks 300 --seed 7
    cargo run --bin playtest -- --scenario scenarios/start_game.toml --catalog recordings.db
"#
    );
}
