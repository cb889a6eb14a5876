//! Chat completion seam
//!
//! The goal bot talks to a [`ChatClient`]; the OpenAI client implements it
//! for real runs and [`ScriptedChatClient`] replays canned replies in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::protocol::{ChatReply, ChatRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatError {
    /// Request never got a response
    Transport(String),
    /// Service answered with a non-success status
    Http { status: u16, body: String },
    /// Response held no choices
    EmptyReply,
    /// Response body could not be read
    Decode(String),
    MissingApiKey(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Transport(e) => write!(f, "transport error: {}", e),
            ChatError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ChatError::EmptyReply => write!(f, "reply contained no choices"),
            ChatError::Decode(e) => write!(f, "could not decode reply: {}", e),
            ChatError::MissingApiKey(var) => {
                write!(f, "no API key configured (set {} or chat.api_key)", var)
            }
        }
    }
}

impl std::error::Error for ChatError {}

/// A blocking chat completion backend. Called from a worker thread.
pub trait ChatClient: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ChatError>;
}

/// Replays queued results in order and records every request
#[derive(Default)]
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<Result<ChatReply, ChatError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Result<ChatReply, ChatError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl ChatClient for ScriptedChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.replies
            .lock()
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::Transport("script exhausted".to_string())))
    }
}
