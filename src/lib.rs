//! Playtest - automated exploratory and goal-directed testing for interactive apps
//!
//! Discoverers expose a scene's controllable entities, bots pick and invoke
//! their actions on a tick cadence, and the recorder persists every frame's
//! state for later inspection.

// Core modules
pub mod automation;
pub mod constants;
pub mod controller;
pub mod snapshot;

// Bots and recording
pub mod bots;
pub mod recording;

// Host integration and runner support
pub mod demo;
pub mod plugin;
pub mod scenario;
pub mod settings;

// Re-export commonly used types for convenience
pub use automation::{
    Action, ActionKey, Automatable, AutomationError, DiscoveryManager, DiscoveryMode, Entity,
    EntityDiscoverer, EntityId, Registry, SceneGraph, StateProperty, StateValue, is_automatable,
};
pub use bots::{
    ActivationInterval, Bot, BotContext, BotError, BotOutcome, BotScheduler, BotStatus, GoalBot,
    GoalBotConfig, RandomBot,
};
pub use controller::{AutomationController, TickReport};
pub use plugin::{ActiveScene, AutomationHarness, PlaytestPlugin};
pub use recording::{
    AutomationRecorder, FinalizeReport, RecorderConfig, RecordingCatalog, RecordingReader,
    RecordingSession, ScreenshotSource,
};
pub use scenario::{Scenario, parse_scenario_file};
pub use settings::PlaytestSettings;
pub use snapshot::{FrameInfo, FrameSnapshot, SceneInfo, build_snapshot};
