//! Goal bot - drives the game toward a natural-language goal through a chat model
//!
//! Each activation sends the goal and a compact frame snapshot. The reply is
//! awaited off-thread; while it is outstanding the bot reports busy and the
//! scheduler skips it. Tool calls in the reply are dispatched in order on the
//! tick the reply is picked up.

pub mod client;
pub mod history;
pub mod openai;
pub mod protocol;

use std::sync::Arc;
use std::thread;

use bevy::log::{debug, error, info, warn};
use crossbeam_channel::{Receiver, TryRecvError, bounded};

use super::{Bot, BotContext, BotError, BotOutcome, BotStatus};
use crate::constants::{DEFAULT_CHAT_MODEL, DEFAULT_SYSTEM_PROMPT, TOOL_ACK_CONTENT};
use client::{ChatClient, ChatError};
use history::{Conversation, HistoryPolicy};
use protocol::{
    ChatMessage, ChatReply, ChatRequest, ProtocolViolation, ToolInvocation, parse_call,
    render_prompt, tool_definitions,
};

#[derive(Debug, Clone)]
pub struct GoalBotConfig {
    pub goal: String,
    pub system_prompt: String,
    pub model: String,
    pub history: HistoryPolicy,
}

impl GoalBotConfig {
    pub fn new(goal: &str) -> Self {
        Self {
            goal: goal.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            history: HistoryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GoalPhase {
    Idle,
    /// Building the prompt and issuing the request
    Prompting,
    AwaitingResponse,
    /// Running the reply's tool calls
    Dispatching,
    Terminated(BotOutcome),
}

/// What one tool call leaves the bot to do next
enum CallResult {
    Continue,
    Finish(BotOutcome),
}

pub struct GoalBot {
    name: String,
    config: GoalBotConfig,
    client: Arc<dyn ChatClient>,
    conversation: Conversation,
    tools: Vec<serde_json::Value>,
    pending: Option<Receiver<Result<ChatReply, ChatError>>>,
    phase: GoalPhase,
}

impl GoalBot {
    pub fn new(name: &str, config: GoalBotConfig, client: Arc<dyn ChatClient>) -> Self {
        let conversation = Conversation::new(&config.system_prompt, config.history);
        Self {
            name: name.to_string(),
            config,
            client,
            conversation,
            tools: tool_definitions(),
            pending: None,
            phase: GoalPhase::Idle,
        }
    }

    pub fn phase(&self) -> &GoalPhase {
        &self.phase
    }

    pub fn goal(&self) -> &str {
        &self.config.goal
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn terminate(&mut self, outcome: BotOutcome) -> BotStatus {
        self.phase = GoalPhase::Terminated(outcome.clone());
        BotStatus::Finished(outcome)
    }

    /// Run every tool call of a reply in order
    fn dispatch(&mut self, reply: ChatReply, ctx: &mut BotContext) -> BotStatus {
        if let Some(usage) = reply.usage {
            info!(
                "[{}] Token usage: {} prompt, {} completion",
                self.name, usage.prompt_tokens, usage.completion_tokens
            );
        }
        if let Some(content) = reply.content.as_deref().filter(|c| !c.trim().is_empty()) {
            debug!("[{}] Model said: {}", self.name, content);
        }

        self.phase = GoalPhase::Dispatching;
        self.conversation.push(reply.to_message());
        if reply.tool_calls.is_empty() {
            return self.violation(ProtocolViolation::NoToolCalls);
        }

        let mut acks = Vec::with_capacity(reply.tool_calls.len());
        for call in &reply.tool_calls {
            let parsed = match parse_call(call) {
                Ok(parsed) => parsed,
                Err(violation) => return self.violation(violation),
            };
            info!(
                "[{}] Model is invoking {} because '{}'",
                self.name, parsed.function, parsed.reasoning
            );
            match self.handle(parsed.invocation, &parsed.reasoning, ctx) {
                Ok(CallResult::Continue) => acks.push(parsed.call_id),
                Ok(CallResult::Finish(outcome)) => return self.terminate(outcome),
                Err(violation) => return self.violation(violation),
            }
        }

        for call_id in acks {
            self.conversation
                .push(ChatMessage::tool(&call_id, TOOL_ACK_CONTENT));
        }
        self.phase = GoalPhase::Idle;
        BotStatus::Running
    }

    fn handle(
        &mut self,
        invocation: ToolInvocation,
        reasoning: &str,
        ctx: &mut BotContext,
    ) -> Result<CallResult, ProtocolViolation> {
        match invocation {
            ToolInvocation::Wait => Ok(CallResult::Continue),
            ToolInvocation::InvokeAction { entity_id, action } => {
                let entity = ctx
                    .registry()
                    .find_by_id(entity_id)
                    .ok_or(ProtocolViolation::UnknownEntity(entity_id))?;
                if entity.action(&action).is_none() {
                    return Err(ProtocolViolation::UnknownAction { entity_id, action });
                }
                ctx.activate_by_id(entity_id, &action)
                    .map_err(|_| ProtocolViolation::UnknownAction {
                        entity_id,
                        action: action.clone(),
                    })?;
                ctx.request_screenshot(1);
                Ok(CallResult::Continue)
            }
            ToolInvocation::GoalReached => Ok(CallResult::Finish(BotOutcome::GoalReached(
                reasoning.to_string(),
            ))),
            ToolInvocation::ThrowException { message } => {
                Ok(CallResult::Finish(BotOutcome::TestFailed(message)))
            }
        }
    }

    fn violation(&mut self, violation: ProtocolViolation) -> BotStatus {
        error!("[{}] Protocol violation: {}", self.name, violation);
        self.terminate(BotOutcome::ProtocolViolation(violation.to_string()))
    }

    /// The request failed; forget the unanswered prompt and go back to idle
    fn recover(&mut self, e: ChatError) -> Result<BotStatus, BotError> {
        self.conversation.pop_dangling_prompt();
        self.phase = GoalPhase::Idle;
        Err(BotError::Chat(e))
    }
}

impl Bot for GoalBot {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, ctx: &mut BotContext) -> Result<BotStatus, BotError> {
        if let GoalPhase::Terminated(outcome) = &self.phase {
            return Ok(BotStatus::Finished(outcome.clone()));
        }
        let Some(rx) = &self.pending else {
            return Ok(BotStatus::Running);
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return Ok(BotStatus::Running),
            Err(TryRecvError::Disconnected) => Err(ChatError::Transport(
                "chat worker exited without a reply".to_string(),
            )),
        };
        self.pending = None;

        match result {
            Ok(reply) => Ok(self.dispatch(reply, ctx)),
            Err(e) => {
                warn!("[{}] Chat request failed, will retry: {}", self.name, e);
                self.recover(e)
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.phase == GoalPhase::AwaitingResponse
    }

    fn activate(&mut self, ctx: &mut BotContext) -> Result<BotStatus, BotError> {
        match &self.phase {
            GoalPhase::Terminated(outcome) => return Ok(BotStatus::Finished(outcome.clone())),
            GoalPhase::Idle => {}
            _ => return Ok(BotStatus::Running),
        }
        self.phase = GoalPhase::Prompting;

        let snapshot_json = match ctx.snapshot().to_compact_json() {
            Ok(json) => json,
            Err(e) => {
                self.phase = GoalPhase::Idle;
                return Err(BotError::Other(format!("Failed to serialize snapshot: {}", e)));
            }
        };
        self.conversation
            .push(ChatMessage::user(&render_prompt(&self.config.goal, &snapshot_json)));

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: self.conversation.messages(),
            tools: self.tools.clone(),
        };
        let client = Arc::clone(&self.client);
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("goal-bot-{}", self.name))
            .spawn(move || {
                let _ = tx.send(client.complete(&request));
            });
        if let Err(e) = spawned {
            return self.recover(ChatError::Transport(e.to_string()));
        }

        debug!(
            "[{}] Prompted on tick {} with {} message(s)",
            self.name,
            ctx.tick(),
            self.conversation.message_count()
        );
        self.pending = Some(rx);
        self.phase = GoalPhase::AwaitingResponse;
        Ok(BotStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::client::ScriptedChatClient;
    use super::protocol::ToolCall;
    use super::*;
    use crate::automation::{Action, Entity, Registry};
    use crate::snapshot::{FrameInfo, SceneInfo};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn frame(n: u64) -> FrameInfo {
        FrameInfo {
            frame_count: n,
            time: n as f64,
            time_scale: 1.0,
            delta_time: 1.0,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Entity::new(1, "StartButton", "Button")
                    .with_action(Action::from_fn("Click", "Starts the game", || true, || {})),
            )
            .unwrap();
        registry
    }

    fn bot(client: &Arc<ScriptedChatClient>, history: HistoryPolicy) -> GoalBot {
        let mut config = GoalBotConfig::new("Start the game");
        config.history = history;
        GoalBot::new("gpt", config, client.clone())
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::function(id, name, args)
    }

    /// Activate on `tick`, then poll until the reply has been handled
    fn turn(
        bot: &mut GoalBot,
        registry: &mut Registry,
        tick: u64,
        requests: &mut Vec<u64>,
    ) -> Result<BotStatus, BotError> {
        let scene = SceneInfo::new("Menu", "scenes/menu");
        let keys = registry.action_keys();
        {
            let mut ctx = BotContext::new(frame(tick), &scene, &keys, &keys, registry, requests);
            assert_eq!(bot.activate(&mut ctx)?, BotStatus::Running);
        }
        assert!(bot.is_busy());
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let mut ctx = BotContext::new(frame(tick), &scene, &keys, &keys, registry, requests);
            let status = bot.poll(&mut ctx);
            if !bot.is_busy() {
                return status;
            }
            assert!(Instant::now() < deadline, "reply never arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn clicked_on(registry: &Registry, tick: u64) -> bool {
        registry
            .find_by_id(1)
            .unwrap()
            .action("Click")
            .unwrap()
            .activated_on(tick)
    }

    #[test]
    fn test_invoke_action_then_goal_reached() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_1",
            "invoke_action",
            json!({"entity_id": "1", "action_id": "Click", "reasoning": "Start is visible"}),
        )])));
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_2",
            "goal_reached",
            json!({"reasoning": "The game started"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        assert_eq!(turn(&mut bot, &mut registry, 1, &mut requests), Ok(BotStatus::Running));
        assert!(clicked_on(&registry, 1));
        assert_eq!(requests, vec![2]);

        let status = turn(&mut bot, &mut registry, 2, &mut requests).unwrap();
        assert_eq!(
            status,
            BotStatus::Finished(BotOutcome::GoalReached("The game started".to_string()))
        );

        // Second request carries the first exchange and its acknowledgement
        let sent = client.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].messages.len(), 2);
        assert_eq!(sent[1].messages.len(), 5);
        assert_eq!(sent[1].messages[3], ChatMessage::tool("call_1", "Success"));
        match &sent[0].messages[1] {
            ChatMessage::User { content } => {
                assert!(content.starts_with("Goal: Start the game\nFrame Snapshot:\n```\n"));
                assert!(content.contains("\"StartButton\""));
            }
            other => panic!("expected a user prompt, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entity_is_a_violation() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_1",
            "invoke_action",
            json!({"entity_id": "99", "action_id": "Click", "reasoning": "guess"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let status = turn(&mut bot, &mut registry, 1, &mut requests).unwrap();
        assert!(matches!(
            status,
            BotStatus::Finished(BotOutcome::ProtocolViolation(_))
        ));
        assert!(!clicked_on(&registry, 1));
        assert!(matches!(bot.phase(), GoalPhase::Terminated(_)));
    }

    #[test]
    fn test_unknown_action_is_a_violation() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_1",
            "invoke_action",
            json!({"entity_id": "1", "action_id": "DoubleClick", "reasoning": "guess"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let status = turn(&mut bot, &mut registry, 1, &mut requests).unwrap();
        assert!(matches!(
            status,
            BotStatus::Finished(BotOutcome::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_no_tool_calls_is_a_violation() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply {
            content: Some("I think I should click start.".to_string()),
            tool_calls: Vec::new(),
            usage: None,
        }));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let status = turn(&mut bot, &mut registry, 1, &mut requests).unwrap();
        assert_eq!(
            status,
            BotStatus::Finished(BotOutcome::ProtocolViolation(
                "reply contained no tool calls".to_string()
            ))
        );
    }

    #[test]
    fn test_non_function_call_is_a_violation() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![ToolCall {
            id: "call_1".to_string(),
            kind: "custom".to_string(),
            function: None,
        }])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let status = turn(&mut bot, &mut registry, 1, &mut requests).unwrap();
        assert_eq!(
            status,
            BotStatus::Finished(BotOutcome::ProtocolViolation(
                "tool call of type 'custom' is not a function call".to_string()
            ))
        );
        assert!(matches!(bot.phase(), GoalPhase::Terminated(_)));
    }

    #[test]
    fn test_terminal_call_stops_remaining_calls() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![
            call("call_a", "goal_reached", json!({"reasoning": "Already playing"})),
            call(
                "call_b",
                "invoke_action",
                json!({"entity_id": "1", "action_id": "Click", "reasoning": "Just in case"}),
            ),
        ])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let status = turn(&mut bot, &mut registry, 1, &mut requests).unwrap();
        assert_eq!(
            status,
            BotStatus::Finished(BotOutcome::GoalReached("Already playing".to_string()))
        );
        assert!(!clicked_on(&registry, 1));
        assert!(requests.is_empty());
    }

    #[test]
    fn test_continue_calls_acknowledged_in_order() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![
            call(
                "call_a",
                "invoke_action",
                json!({"entity_id": "1", "action_id": "Click", "reasoning": "Start"}),
            ),
            call("call_b", "wait", json!({"reasoning": "Let it load"})),
        ])));
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_c",
            "goal_reached",
            json!({"reasoning": "Started"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        assert_eq!(turn(&mut bot, &mut registry, 1, &mut requests), Ok(BotStatus::Running));
        assert!(clicked_on(&registry, 1));
        turn(&mut bot, &mut registry, 2, &mut requests).unwrap();

        let sent = client.requests();
        let messages = &sent[1].messages;
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[3], ChatMessage::tool("call_a", "Success"));
        assert_eq!(messages[4], ChatMessage::tool("call_b", "Success"));
        assert!(messages[5].is_user());
    }

    #[test]
    fn test_wait_continues_and_throw_exception_fails() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_1",
            "wait",
            json!({"reasoning": "Still loading"}),
        )])));
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_2",
            "throw_exception",
            json!({"message": "Start button never responds", "reasoning": "Waited too long"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        assert_eq!(turn(&mut bot, &mut registry, 1, &mut requests), Ok(BotStatus::Running));
        assert_eq!(bot.phase(), &GoalPhase::Idle);
        assert!(!clicked_on(&registry, 1));

        let status = turn(&mut bot, &mut registry, 2, &mut requests).unwrap();
        assert_eq!(
            status,
            BotStatus::Finished(BotOutcome::TestFailed(
                "Start button never responds".to_string()
            ))
        );
    }

    #[test]
    fn test_transport_error_is_retried() {
        let client = Arc::new(ScriptedChatClient::new());
        client.push(Err(ChatError::Transport("connection reset".to_string())));
        client.push(Ok(ChatReply::with_calls(vec![call(
            "call_1",
            "wait",
            json!({"reasoning": "Nothing yet"}),
        )])));
        let mut bot = bot(&client, HistoryPolicy::Unbounded);
        let mut registry = registry();
        let mut requests = Vec::new();

        let first = turn(&mut bot, &mut registry, 1, &mut requests);
        assert!(matches!(first, Err(BotError::Chat(ChatError::Transport(_)))));
        assert_eq!(bot.phase(), &GoalPhase::Idle);
        assert_eq!(bot.conversation().exchange_count(), 0);

        assert_eq!(turn(&mut bot, &mut registry, 2, &mut requests), Ok(BotStatus::Running));
        // Retry sends a single prompt, not the failed one as well
        assert_eq!(client.requests()[1].messages.len(), 2);
    }

    #[test]
    fn test_history_cap_bounds_requests() {
        let client = Arc::new(ScriptedChatClient::new());
        for n in 0..4 {
            client.push(Ok(ChatReply::with_calls(vec![call(
                &format!("call_{}", n),
                "wait",
                json!({"reasoning": "waiting"}),
            )])));
        }
        let mut bot = bot(&client, HistoryPolicy::LastExchanges(1));
        let mut registry = registry();
        let mut requests = Vec::new();

        for tick in 1..=4 {
            turn(&mut bot, &mut registry, tick, &mut requests).unwrap();
        }
        for request in client.requests() {
            assert_eq!(request.messages.len(), 2);
        }
    }
}
