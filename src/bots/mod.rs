//! Bots - policies that pick and invoke actions
//!
//! The [`BotScheduler`] decides when each bot runs; a bot only decides what
//! to do with the [`BotContext`] it is handed.

pub mod goal;
pub mod random;
pub mod scheduler;

use serde::Serialize;

use crate::automation::{ActionKey, AutomationError, EntityId, Registry};
use crate::snapshot::{FrameInfo, FrameSnapshot, SceneInfo, build_snapshot};
use goal::client::ChatError;

pub use goal::{GoalBot, GoalBotConfig, GoalPhase};
pub use random::RandomBot;
pub use scheduler::{ActivationInterval, BotId, BotRunState, BotScheduler, BotSummary};

/// How a bot ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BotOutcome {
    /// The bot's goal was met
    GoalReached(String),
    /// The bot decided the test failed
    TestFailed(String),
    /// The bot's driver broke protocol and was terminated
    ProtocolViolation(String),
}

impl std::fmt::Display for BotOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotOutcome::GoalReached(reason) => write!(f, "goal reached: {}", reason),
            BotOutcome::TestFailed(message) => write!(f, "test failed: {}", message),
            BotOutcome::ProtocolViolation(reason) => write!(f, "protocol violation: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BotStatus {
    Running,
    Finished(BotOutcome),
}

/// Recoverable bot fault. The scheduler logs it and keeps the bot's cadence.
#[derive(Debug, Clone, PartialEq)]
pub enum BotError {
    Automation(AutomationError),
    Chat(ChatError),
    Other(String),
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Automation(e) => write!(f, "{}", e),
            BotError::Chat(e) => write!(f, "chat request failed: {}", e),
            BotError::Other(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for BotError {}

impl From<AutomationError> for BotError {
    fn from(e: AutomationError) -> Self {
        BotError::Automation(e)
    }
}

impl From<ChatError> for BotError {
    fn from(e: ChatError) -> Self {
        BotError::Chat(e)
    }
}

/// A policy driven by the scheduler
pub trait Bot: Send {
    fn name(&self) -> &str;

    /// Called every tick while the bot is running, before activation.
    /// Lets a suspended bot pick up results that arrived since last tick.
    fn poll(&mut self, _ctx: &mut BotContext) -> Result<BotStatus, BotError> {
        Ok(BotStatus::Running)
    }

    /// True while the bot is waiting on something; busy bots are not activated
    fn is_busy(&self) -> bool {
        false
    }

    /// Take one turn
    fn activate(&mut self, ctx: &mut BotContext) -> Result<BotStatus, BotError>;
}

/// What a bot sees and may touch during one call
pub struct BotContext<'a> {
    pub frame: FrameInfo,
    pub scene: &'a SceneInfo,
    /// Actions whose predicate holds right now
    pub available: &'a [ActionKey],
    /// Every discovered action, available or not
    pub discovered: &'a [ActionKey],
    registry: &'a mut Registry,
    screenshot_requests: &'a mut Vec<u64>,
}

impl<'a> BotContext<'a> {
    pub fn new(
        frame: FrameInfo,
        scene: &'a SceneInfo,
        available: &'a [ActionKey],
        discovered: &'a [ActionKey],
        registry: &'a mut Registry,
        screenshot_requests: &'a mut Vec<u64>,
    ) -> Self {
        Self {
            frame,
            scene,
            available,
            discovered,
            registry,
            screenshot_requests,
        }
    }

    pub fn tick(&self) -> u64 {
        self.frame.frame_count
    }

    pub fn time(&self) -> f64 {
        self.frame.time
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn activate(&mut self, key: &ActionKey) -> Result<(), AutomationError> {
        let tick = self.tick();
        self.registry.activate(key, tick)
    }

    /// Resolve an action by entity id and action key, then activate it
    pub fn activate_by_id(
        &mut self,
        entity_id: EntityId,
        action: &str,
    ) -> Result<(), AutomationError> {
        let handle = self
            .registry
            .handle_of(entity_id)
            .ok_or(AutomationError::UnknownEntity(entity_id))?;
        let key = ActionKey {
            handle,
            entity_id,
            action: action.to_string(),
        };
        self.activate(&key)
    }

    /// Snapshot of the world as the bot sees it now
    pub fn snapshot(&self) -> FrameSnapshot {
        build_snapshot(self.registry, self.frame, self.scene)
    }

    /// Ask the recorder for a screenshot `delay` ticks from now
    pub fn request_screenshot(&mut self, delay: u64) {
        self.screenshot_requests.push(self.tick() + delay);
    }
}
