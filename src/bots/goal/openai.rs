//! OpenAI chat completions client

use std::time::Duration;

use bevy::log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{ChatClient, ChatError};
use super::protocol::{ChatMessage, ChatReply, ChatRequest, TokenUsage, ToolCall};

/// Endpoint and credentials for a chat completions service
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full endpoint URL, e.g. `https://api.openai.com/v1/chat/completions`
    pub endpoint: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl ChatClient for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            tools: &request.tools,
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
        };

        let mut builder = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        debug!(
            "chat completion: {} choice(s), usage {:?}",
            parsed.choices.len(),
            parsed.usage
        );
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ChatError::EmptyReply)?;

        Ok(ChatReply {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
            usage: parsed.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::goal::protocol::{ProtocolViolation, parse_call, tool_definitions};

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let tools = tool_definitions();
        let body = CompletionRequest {
            model: "gpt-test",
            messages: &messages,
            tools: &tools,
            tool_choice: Some("auto"),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-test");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["tools"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_response_decoding() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "wait", "arguments": "{\"reasoning\":\"loading\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 18, "total_tokens": 138}
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        let call = &parsed.choices[0].message.tool_calls[0];
        assert_eq!(call.function.as_ref().map(|f| f.name.as_str()), Some("wait"));
        assert_eq!(
            parsed.usage,
            Some(TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 18
            })
        );
    }

    #[test]
    fn test_non_function_tool_call_decodes() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "custom",
                        "custom": {"name": "shell", "input": "ls"}
                    }]
                }
            }]
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        let call = &parsed.choices[0].message.tool_calls[0];
        assert_eq!(call.kind, "custom");
        assert!(call.function.is_none());
        assert_eq!(
            parse_call(call),
            Err(ProtocolViolation::NotAFunction("custom".to_string()))
        );
    }

    #[test]
    fn test_no_choices_decodes_empty() {
        let parsed: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
