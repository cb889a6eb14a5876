//! Chat messages, the tool schema and reply interpretation
//!
//! Message shapes follow the OpenAI chat completions format so the same
//! values can be sent on the wire unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::automation::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        ChatMessage::System {
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        ChatMessage::User {
            content: content.to_string(),
        }
    }

    pub fn tool(tool_call_id: &str, content: &str) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.to_string(),
            content: content.to_string(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, ChatMessage::User { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// Always `function` for calls we understand
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Absent for tool types other than `function`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>,
}

impl ToolCall {
    pub fn function(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            kind: "function".to_string(),
            function: Some(FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON object encoded as a string
    pub arguments: String,
}

/// Everything a chat client needs for one completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// The assistant turn of a completion
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ChatReply {
    pub fn with_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            usage: None,
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

// =============================================================================
// PROMPT AND TOOLS
// =============================================================================

pub fn render_prompt(goal: &str, snapshot_json: &str) -> String {
    format!(
        "Goal: {}\nFrame Snapshot:\n```\n{}\n```",
        goal, snapshot_json
    )
}

fn string_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn function_tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

/// The four functions offered to the model
pub fn tool_definitions() -> Vec<Value> {
    vec![
        function_tool(
            "wait",
            "Waits for the next tick of the game.",
            json!({
                "reasoning": string_param(
                    "A description of why you believe waiting is the correct action to take."
                ),
            }),
            &["reasoning"],
        ),
        function_tool(
            "invoke_action",
            "Invokes an action on an entity.",
            json!({
                "entity_id": string_param("The ID of the entity, as provided in the previous prompt"),
                "action_id": string_param("The ID of the action, as provided in the previous prompt"),
                "reasoning": string_param(
                    "A description of why you are taking the specified action and how it makes progress towards the goal."
                ),
            }),
            &["entity_id", "action_id", "reasoning"],
        ),
        function_tool(
            "goal_reached",
            "Indicate that the goal has been reached and terminate the test.",
            json!({
                "reasoning": string_param("A description of why you believe the goal has been reached."),
            }),
            &["reasoning"],
        ),
        function_tool(
            "throw_exception",
            "Throw an exception to terminate the test.",
            json!({
                "message": string_param(
                    "A message to be presented to a human QA engineer to understand why the test failed to reach the goal."
                ),
                "reasoning": string_param("A description of why you are throwing the exception."),
            }),
            &["message", "reasoning"],
        ),
    ]
}

// =============================================================================
// REPLY INTERPRETATION
// =============================================================================

/// A reply the bot cannot act on
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolViolation {
    NoToolCalls,
    NotAFunction(String),
    UnknownFunction(String),
    BadArguments { function: String, reason: String },
    MissingArgument { function: String, argument: &'static str },
    UnknownEntity(EntityId),
    UnknownAction { entity_id: EntityId, action: String },
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::NoToolCalls => write!(f, "reply contained no tool calls"),
            ProtocolViolation::NotAFunction(kind) => {
                write!(f, "tool call of type '{}' is not a function call", kind)
            }
            ProtocolViolation::UnknownFunction(name) => write!(f, "unknown function '{}'", name),
            ProtocolViolation::BadArguments { function, reason } => {
                write!(f, "{}: unreadable arguments: {}", function, reason)
            }
            ProtocolViolation::MissingArgument { function, argument } => {
                write!(f, "{}: missing argument '{}'", function, argument)
            }
            ProtocolViolation::UnknownEntity(id) => write!(f, "unknown entity {}", id),
            ProtocolViolation::UnknownAction { entity_id, action } => {
                write!(f, "entity {} has no action '{}'", entity_id, action)
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// A validated function call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Wait,
    InvokeAction { entity_id: EntityId, action: String },
    GoalReached,
    ThrowException { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub call_id: String,
    pub function: String,
    pub reasoning: String,
    pub invocation: ToolInvocation,
}

/// Read an argument that may arrive as a JSON string or number
fn argument_text(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required(
    args: &Map<String, Value>,
    function: &str,
    argument: &'static str,
) -> Result<String, ProtocolViolation> {
    argument_text(args, argument).ok_or_else(|| ProtocolViolation::MissingArgument {
        function: function.to_string(),
        argument,
    })
}

/// Validate one tool call's shape and arguments. Entity and action
/// existence is checked at dispatch, against the live registry.
pub fn parse_call(call: &ToolCall) -> Result<ParsedCall, ProtocolViolation> {
    let call_fn = match &call.function {
        Some(call_fn) if call.kind == "function" => call_fn,
        _ => return Err(ProtocolViolation::NotAFunction(call.kind.clone())),
    };
    let function = call_fn.name.as_str();
    if !matches!(
        function,
        "wait" | "invoke_action" | "goal_reached" | "throw_exception"
    ) {
        return Err(ProtocolViolation::UnknownFunction(function.to_string()));
    }

    let raw = if call_fn.arguments.trim().is_empty() {
        "{}"
    } else {
        call_fn.arguments.as_str()
    };
    let args: Map<String, Value> =
        serde_json::from_str(raw).map_err(|e| ProtocolViolation::BadArguments {
            function: function.to_string(),
            reason: e.to_string(),
        })?;

    let reasoning = required(&args, function, "reasoning")?;
    let invocation = match function {
        "wait" => ToolInvocation::Wait,
        "invoke_action" => {
            let entity_text = required(&args, function, "entity_id")?;
            let entity_id = entity_text.trim().parse::<EntityId>().map_err(|_| {
                ProtocolViolation::BadArguments {
                    function: function.to_string(),
                    reason: format!("entity_id '{}' is not an integer", entity_text),
                }
            })?;
            let action = required(&args, function, "action_id")?;
            ToolInvocation::InvokeAction { entity_id, action }
        }
        "goal_reached" => ToolInvocation::GoalReached,
        _ => ToolInvocation::ThrowException {
            message: required(&args, function, "message")?,
        },
    };

    Ok(ParsedCall {
        call_id: call.id.clone(),
        function: function.to_string(),
        reasoning,
        invocation,
    })
}
