//! TOML scenario files
//!
//! A scenario sets a tick budget, recording options and the bots to
//! schedule:
//!
//! ```toml
//! name = "start_game"
//! max_ticks = 600
//!
//! [[bots]]
//! kind = "random"
//! interval_ticks = 5
//! seed = 42
//!
//! [[bots]]
//! kind = "goal"
//! goal = "Start the game"
//! interval_secs = 1.0
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::bots::goal::client::ChatClient;
use crate::bots::goal::history::HistoryPolicy;
use crate::bots::{ActivationInterval, Bot, GoalBot, GoalBotConfig, RandomBot};
use crate::constants::{DEFAULT_GOAL_INTERVAL_SECS, DEFAULT_RANDOM_INTERVAL_TICKS};
use crate::settings::ChatSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    /// Overrides the settings' tick budget
    pub max_ticks: Option<u64>,
    #[serde(default)]
    pub recording: RecordingOptions,
    #[serde(default)]
    pub bots: Vec<BotDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Session name (default: scenario name)
    pub name: Option<String>,
    /// Overrides the settings' change filter
    pub save_only_when_changed: Option<bool>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            save_only_when_changed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One scheduled bot
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum BotDef {
    #[serde(rename = "random")]
    Random {
        name: Option<String>,
        interval_ticks: Option<u64>,
        interval_secs: Option<f64>,
        seed: Option<u64>,
    },
    #[serde(rename = "goal")]
    Goal {
        name: Option<String>,
        goal: String,
        interval_ticks: Option<u64>,
        interval_secs: Option<f64>,
        model: Option<String>,
        system_prompt: Option<String>,
        /// Keep only this many recent exchanges (default: settings' policy)
        max_history: Option<usize>,
    },
}

impl BotDef {
    pub fn name(&self, index: usize) -> String {
        match self {
            BotDef::Random { name, .. } => name
                .clone()
                .unwrap_or_else(|| format!("random-{}", index)),
            BotDef::Goal { name, .. } => name.clone().unwrap_or_else(|| format!("goal-{}", index)),
        }
    }

    pub fn is_goal(&self) -> bool {
        matches!(self, BotDef::Goal { .. })
    }

    fn interval_fields(&self) -> (Option<u64>, Option<f64>) {
        match self {
            BotDef::Random {
                interval_ticks,
                interval_secs,
                ..
            }
            | BotDef::Goal {
                interval_ticks,
                interval_secs,
                ..
            } => (*interval_ticks, *interval_secs),
        }
    }

    pub fn interval(&self) -> ActivationInterval {
        match self.interval_fields() {
            (Some(n), _) => ActivationInterval::Ticks(n),
            (None, Some(s)) => ActivationInterval::Seconds(s),
            (None, None) if self.is_goal() => {
                ActivationInterval::Seconds(DEFAULT_GOAL_INTERVAL_SECS)
            }
            (None, None) => ActivationInterval::Ticks(DEFAULT_RANDOM_INTERVAL_TICKS),
        }
    }

    fn validate(&self, index: usize) -> Result<(), String> {
        let name = self.name(index);
        let (ticks, secs) = self.interval_fields();
        if ticks.is_some() && secs.is_some() {
            return Err(format!("{}: set interval_ticks or interval_secs, not both", name));
        }
        if ticks == Some(0) {
            return Err(format!("{}: interval_ticks must be at least 1", name));
        }
        if let Some(s) = secs
            && (s.is_nan() || s <= 0.0)
        {
            return Err(format!("{}: interval_secs must be positive", name));
        }
        if let BotDef::Goal { goal, .. } = self
            && goal.trim().is_empty()
        {
            return Err(format!("{}: goal must not be empty", name));
        }
        Ok(())
    }
}

impl Scenario {
    /// The scenario used when none is given: one random bot every tick
    pub fn random_exploration() -> Self {
        Self {
            name: "random_exploration".to_string(),
            description: Some("Random bot exploring the demo scene".to_string()),
            max_ticks: None,
            recording: RecordingOptions::default(),
            bots: vec![BotDef::Random {
                name: Some("random".to_string()),
                interval_ticks: None,
                interval_secs: None,
                seed: None,
            }],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bots.is_empty() {
            return Err(format!("Scenario '{}' has no bots", self.name));
        }
        for (index, bot) in self.bots.iter().enumerate() {
            bot.validate(index)?;
        }
        Ok(())
    }

    pub fn has_goal_bots(&self) -> bool {
        self.bots.iter().any(BotDef::is_goal)
    }

    pub fn session_name(&self) -> &str {
        self.recording.name.as_deref().unwrap_or(&self.name)
    }

    /// Build the scenario's bots. Random bots without a seed derive one from
    /// `base_seed` (when set) so a whole run is reproducible from one number.
    pub fn build_bots(
        &self,
        base_seed: Option<u64>,
        chat: &ChatSettings,
        client: Option<Arc<dyn ChatClient>>,
    ) -> Result<Vec<(Box<dyn Bot>, ActivationInterval)>, String> {
        let mut bots: Vec<(Box<dyn Bot>, ActivationInterval)> = Vec::with_capacity(self.bots.len());
        for (index, def) in self.bots.iter().enumerate() {
            let name = def.name(index);
            let bot: Box<dyn Bot> = match def {
                BotDef::Random { seed, .. } => {
                    let seed = seed.or_else(|| base_seed.map(|s| s.wrapping_add(index as u64)));
                    Box::new(RandomBot::new(&name, seed))
                }
                BotDef::Goal {
                    goal,
                    model,
                    system_prompt,
                    max_history,
                    ..
                } => {
                    let client = client
                        .clone()
                        .ok_or_else(|| format!("{}: goal bots need a chat client", name))?;
                    let mut config = GoalBotConfig::new(goal);
                    config.model = model.clone().unwrap_or_else(|| chat.model.clone());
                    if let Some(prompt) = system_prompt {
                        config.system_prompt = prompt.clone();
                    }
                    config.history = match max_history {
                        Some(n) => HistoryPolicy::LastExchanges(*n),
                        None => chat.history,
                    };
                    Box::new(GoalBot::new(&name, config, client))
                }
            };
            bots.push((bot, def.interval()));
        }
        Ok(bots)
    }
}

/// Parse and validate a scenario file
pub fn parse_scenario_file(path: &Path) -> Result<Scenario, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let scenario: Scenario =
        toml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    scenario
        .validate()
        .map_err(|e| format!("Invalid scenario {}: {}", path.display(), e))?;
    Ok(scenario)
}
