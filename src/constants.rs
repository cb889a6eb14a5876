//! Shared constants for recording layout, bot defaults and the chat protocol

// =============================================================================
// RECORDING LAYOUT
// =============================================================================

/// Session header written before any frame data
pub const RECORDING_INFO_FILE: &str = "recording.json";

/// Version stamped into every `recording.json`
pub const RECORDING_FORMAT_VERSION: u32 = 1;

/// Archive suffix appended to `<name>.<id>`
pub const ARCHIVE_EXTENSION: &str = ".rgrec.zip";

/// Default recording directory (relative paths resolve against the working directory)
pub const DEFAULT_RECORDING_DIR: &str = "recordings";

/// Session name used when the caller passes an empty one
pub const DEFAULT_SESSION_NAME: &str = "recording";

pub fn snapshot_file_name(frame: u64) -> String {
    format!("snapshot.{}.json", frame)
}

pub fn screenshot_file_name(frame: u64) -> String {
    format!("screenshot.{}.png", frame)
}

// =============================================================================
// BOTS
// =============================================================================

/// Ticks between random bot activations when nothing else is configured
pub const DEFAULT_RANDOM_INTERVAL_TICKS: u64 = 1;

/// Seconds between goal bot prompts
pub const DEFAULT_GOAL_INTERVAL_SECS: f64 = 1.0;

// =============================================================================
// CHAT PROTOCOL
// =============================================================================

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4-1106-preview";

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Tool acknowledgement sent back after each call that lets the bot continue
pub const TOOL_ACK_CONTENT: &str = "Success";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an automated QA testing engine for a video game.
Each prompt will contain information about your goal, the entities in the scene, their state, and the available actions on those entities.
Your response should contain a call to one of the provided tools, specifying the action to take.
You must not call an undefined function, or reference an entity or action that does not exist in the frame snapshot.
Your objective is to take an action to progress towards achieving the goal in the prompt.
It may be necessary to wait for the game to progress after taking an action.
Be patient, but raise an exception if the game has not progressed after 5 or more wait calls.";
