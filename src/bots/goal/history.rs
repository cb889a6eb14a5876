//! Conversation history with an optional retention cap

use serde::{Deserialize, Serialize};

use super::protocol::ChatMessage;

/// How much of the conversation is sent with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Keep every exchange
    #[default]
    Unbounded,
    /// Keep the system prompt plus the most recent N exchanges. An exchange
    /// starts at a user turn, so tool acknowledgements stay with their calls.
    LastExchanges(usize),
}

#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: ChatMessage,
    turns: Vec<ChatMessage>,
    policy: HistoryPolicy,
}

impl Conversation {
    pub fn new(system_prompt: &str, policy: HistoryPolicy) -> Self {
        Self {
            system_prompt: ChatMessage::system(system_prompt),
            turns: Vec::new(),
            policy,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        let starts_exchange = message.is_user();
        self.turns.push(message);
        if starts_exchange {
            self.trim();
        }
    }

    /// Drop the last turn if it is an unanswered user prompt
    pub fn pop_dangling_prompt(&mut self) -> bool {
        if self.turns.last().is_some_and(|m| m.is_user()) {
            self.turns.pop();
            true
        } else {
            false
        }
    }

    /// System prompt followed by the retained turns
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(self.system_prompt.clone());
        messages.extend(self.turns.iter().cloned());
        messages
    }

    /// Messages sent with the next request, system prompt included
    pub fn message_count(&self) -> usize {
        self.turns.len() + 1
    }

    pub fn exchange_count(&self) -> usize {
        self.turns.iter().filter(|m| m.is_user()).count()
    }

    fn trim(&mut self) {
        let HistoryPolicy::LastExchanges(limit) = self.policy else {
            return;
        };
        let limit = limit.max(1);
        let excess = self.exchange_count().saturating_sub(limit);
        if excess == 0 {
            return;
        }
        // Index of the first user turn to keep
        let cut = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_user())
            .nth(excess)
            .map(|(i, _)| i)
            .unwrap_or(self.turns.len());
        self.turns.drain(..cut);
    }
}
