//! Bot scheduler
//!
//! Once per tick: poll every running bot, then activate each idle bot whose
//! interval has elapsed. A bot's last-activation marker is stamped before it
//! runs, so a bot that errors or panics is retried at its normal cadence.
//! Faults are contained per bot.

use bevy::log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use uuid::Uuid;

use super::{Bot, BotContext, BotError, BotOutcome, BotStatus};
use crate::automation::Registry;
use crate::snapshot::{FrameInfo, SceneInfo};

/// Minimum spacing between a bot's activations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationInterval {
    Ticks(u64),
    Seconds(f64),
}

impl Default for ActivationInterval {
    fn default() -> Self {
        ActivationInterval::Ticks(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BotId(Uuid);

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BotRunState {
    Running,
    Finished(BotOutcome),
}

/// Reportable view of one scheduled bot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSummary {
    pub id: BotId,
    pub name: String,
    pub state: BotRunState,
    pub activations: u64,
    pub faults: u64,
}

struct ScheduledBot {
    id: BotId,
    bot: Box<dyn Bot>,
    interval: ActivationInterval,
    last_tick: Option<u64>,
    last_time: Option<f64>,
    state: BotRunState,
    was_busy: bool,
    activations: u64,
    faults: u64,
}

impl ScheduledBot {
    fn is_due(&self, frame: &FrameInfo) -> bool {
        match self.interval {
            ActivationInterval::Ticks(n) => self
                .last_tick
                .is_none_or(|last| frame.frame_count.saturating_sub(last) >= n),
            ActivationInterval::Seconds(s) => {
                self.last_time.is_none_or(|last| frame.time - last >= s)
            }
        }
    }

    fn stamp(&mut self, frame: &FrameInfo) {
        self.last_tick = Some(frame.frame_count);
        self.last_time = Some(frame.time);
    }

    /// Apply the result of a poll or activation, logging faults
    fn settle(&mut self, result: Result<Result<BotStatus, BotError>, String>, phase: &str) {
        match result {
            Ok(Ok(BotStatus::Running)) => {}
            Ok(Ok(BotStatus::Finished(outcome))) => {
                info!(
                    "Bot {} ({}) finished: {}",
                    self.bot.name(),
                    self.id,
                    outcome
                );
                self.state = BotRunState::Finished(outcome);
            }
            Ok(Err(e)) => {
                self.faults += 1;
                warn!("Bot {} ({}) {} failed: {}", self.bot.name(), self.id, phase, e);
            }
            Err(panic) => {
                self.faults += 1;
                error!(
                    "Bot {} ({}) panicked during {}: {}",
                    self.bot.name(),
                    self.id,
                    phase,
                    panic
                );
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Default)]
pub struct BotScheduler {
    bots: Vec<ScheduledBot>,
    /// Screenshot ticks requested by bots during the current tick
    screenshot_requests: Vec<u64>,
}

impl BotScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bot: impl Bot + 'static, interval: ActivationInterval) -> BotId {
        self.add_boxed(Box::new(bot), interval)
    }

    pub fn add_boxed(&mut self, bot: Box<dyn Bot>, interval: ActivationInterval) -> BotId {
        let id = BotId(Uuid::new_v4());
        info!("Scheduling bot {} ({}) every {:?}", bot.name(), id, interval);
        self.bots.push(ScheduledBot {
            id,
            bot,
            interval,
            last_tick: None,
            last_time: None,
            state: BotRunState::Running,
            was_busy: false,
            activations: 0,
            faults: 0,
        });
        id
    }

    pub fn remove(&mut self, id: BotId) -> bool {
        let before = self.bots.len();
        self.bots.retain(|b| b.id != id);
        self.bots.len() != before
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn state(&self, id: BotId) -> Option<&BotRunState> {
        self.bots.iter().find(|b| b.id == id).map(|b| &b.state)
    }

    /// True once every scheduled bot has finished (false with no bots)
    pub fn all_finished(&self) -> bool {
        !self.bots.is_empty()
            && self
                .bots
                .iter()
                .all(|b| matches!(b.state, BotRunState::Finished(_)))
    }

    pub fn summaries(&self) -> Vec<BotSummary> {
        self.bots
            .iter()
            .map(|b| BotSummary {
                id: b.id,
                name: b.bot.name().to_string(),
                state: b.state.clone(),
                activations: b.activations,
                faults: b.faults,
            })
            .collect()
    }

    /// Run one scheduling pass. Returns the screenshot ticks bots asked for.
    pub fn tick(
        &mut self,
        registry: &mut Registry,
        frame: FrameInfo,
        scene: &SceneInfo,
    ) -> Vec<u64> {
        let discovered = registry.action_keys();
        let Self {
            bots,
            screenshot_requests,
        } = self;

        for scheduled in bots.iter_mut() {
            if scheduled.state != BotRunState::Running {
                continue;
            }

            // Poll
            let available = registry.available_actions();
            let mut ctx = BotContext::new(
                frame,
                scene,
                &available,
                &discovered,
                registry,
                screenshot_requests,
            );
            let bot = &mut scheduled.bot;
            let result =
                catch_unwind(AssertUnwindSafe(|| bot.poll(&mut ctx))).map_err(panic_message);
            scheduled.settle(result, "poll");
            if scheduled.state != BotRunState::Running {
                continue;
            }

            let busy = scheduled.bot.is_busy();
            if scheduled.was_busy && !busy {
                // Interval restarts when a suspended bot comes back
                scheduled.stamp(&frame);
            }
            scheduled.was_busy = busy;
            if busy || !scheduled.is_due(&frame) {
                continue;
            }

            // Activate
            scheduled.stamp(&frame);
            scheduled.activations += 1;
            let available = registry.available_actions();
            let mut ctx = BotContext::new(
                frame,
                scene,
                &available,
                &discovered,
                registry,
                screenshot_requests,
            );
            let bot = &mut scheduled.bot;
            let result =
                catch_unwind(AssertUnwindSafe(|| bot.activate(&mut ctx))).map_err(panic_message);
            scheduled.settle(result, "activation");
            scheduled.was_busy = scheduled.bot.is_busy();
        }

        std::mem::take(screenshot_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Action, Entity};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn frame(n: u64, time: f64) -> FrameInfo {
        FrameInfo {
            frame_count: n,
            time,
            time_scale: 1.0,
            delta_time: 0.5,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Entity::new(1, "StartButton", "Button")
                    .with_action(Action::from_fn("Click", "Start", || true, || {})),
            )
            .unwrap();
        registry
    }

    /// Counts activations, optionally failing or panicking every time
    struct CountingBot {
        name: &'static str,
        calls: Arc<AtomicU32>,
        fail: bool,
        panic: bool,
    }

    impl CountingBot {
        fn new(name: &'static str, fail: bool, panic: bool) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name,
                    calls: calls.clone(),
                    fail,
                    panic,
                },
                calls,
            )
        }
    }

    impl Bot for CountingBot {
        fn name(&self) -> &str {
            self.name
        }

        fn activate(&mut self, ctx: &mut BotContext) -> Result<BotStatus, BotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("bot exploded");
            }
            if self.fail {
                return Err(BotError::Other("always fails".to_string()));
            }
            if let Some(key) = ctx.available.first().cloned() {
                ctx.activate(&key)?;
            }
            Ok(BotStatus::Running)
        }
    }

    #[test]
    fn test_tick_interval() {
        let mut scheduler = BotScheduler::new();
        let (bot, calls) = CountingBot::new("every-third", false, false);
        scheduler.add(bot, ActivationInterval::Ticks(3));
        let mut registry = registry();
        let scene = SceneInfo::default();

        for tick in 1..=7 {
            scheduler.tick(&mut registry, frame(tick, tick as f64), &scene);
        }
        // Ticks 1, 4, 7
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_seconds_interval() {
        let mut scheduler = BotScheduler::new();
        let (bot, calls) = CountingBot::new("every-second", false, false);
        scheduler.add(bot, ActivationInterval::Seconds(1.0));
        let mut registry = registry();
        let scene = SceneInfo::default();

        // Half-second ticks: activations at 0.0, 1.0, 2.0
        for tick in 0..5 {
            scheduler.tick(&mut registry, frame(tick + 1, tick as f64 * 0.5), &scene);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_faulty_bots_do_not_affect_others() {
        let mut scheduler = BotScheduler::new();
        let (failing, failing_calls) = CountingBot::new("failing", true, false);
        let (panicking, panicking_calls) = CountingBot::new("panicking", false, true);
        let (healthy, healthy_calls) = CountingBot::new("healthy", false, false);
        let failing_id = scheduler.add(failing, ActivationInterval::Ticks(1));
        scheduler.add(panicking, ActivationInterval::Ticks(1));
        let healthy_id = scheduler.add(healthy, ActivationInterval::Ticks(1));
        let mut registry = registry();
        let scene = SceneInfo::default();

        for tick in 1..=4 {
            scheduler.tick(&mut registry, frame(tick, tick as f64), &scene);
        }

        // Faulty bots are retried every tick, the healthy one never misses
        assert_eq!(failing_calls.load(Ordering::SeqCst), 4);
        assert_eq!(panicking_calls.load(Ordering::SeqCst), 4);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.state(failing_id), Some(&BotRunState::Running));
        assert_eq!(scheduler.state(healthy_id), Some(&BotRunState::Running));
        assert!(
            registry
                .find_by_id(1)
                .unwrap()
                .action("Click")
                .unwrap()
                .activated_on(4)
        );

        let summaries = scheduler.summaries();
        assert_eq!(summaries[0].faults, 4);
        assert_eq!(summaries[1].faults, 4);
        assert_eq!(summaries[2].faults, 0);
    }

    struct FinishingBot;

    impl Bot for FinishingBot {
        fn name(&self) -> &str {
            "finisher"
        }

        fn activate(&mut self, _ctx: &mut BotContext) -> Result<BotStatus, BotError> {
            Ok(BotStatus::Finished(BotOutcome::GoalReached("done".to_string())))
        }
    }

    #[test]
    fn test_finished_bot_is_not_activated_again() {
        let mut scheduler = BotScheduler::new();
        let id = scheduler.add(FinishingBot, ActivationInterval::Ticks(1));
        let mut registry = registry();
        let scene = SceneInfo::default();

        assert!(!scheduler.all_finished());
        scheduler.tick(&mut registry, frame(1, 0.0), &scene);
        scheduler.tick(&mut registry, frame(2, 1.0), &scene);

        assert!(scheduler.all_finished());
        assert_eq!(
            scheduler.state(id),
            Some(&BotRunState::Finished(BotOutcome::GoalReached(
                "done".to_string()
            )))
        );
        assert_eq!(scheduler.summaries()[0].activations, 1);
    }

    /// Busy for a fixed number of polls after each activation
    struct SlowBot {
        busy_polls: u32,
        activations: Arc<AtomicU32>,
    }

    impl Bot for SlowBot {
        fn name(&self) -> &str {
            "slow"
        }

        fn poll(&mut self, _ctx: &mut BotContext) -> Result<BotStatus, BotError> {
            self.busy_polls = self.busy_polls.saturating_sub(1);
            Ok(BotStatus::Running)
        }

        fn is_busy(&self) -> bool {
            self.busy_polls > 0
        }

        fn activate(&mut self, _ctx: &mut BotContext) -> Result<BotStatus, BotError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            self.busy_polls = 3;
            Ok(BotStatus::Running)
        }
    }

    #[test]
    fn test_busy_bot_waits_and_restarts_interval() {
        let activations = Arc::new(AtomicU32::new(0));
        let mut scheduler = BotScheduler::new();
        scheduler.add(
            SlowBot {
                busy_polls: 0,
                activations: activations.clone(),
            },
            ActivationInterval::Ticks(2),
        );
        let mut registry = registry();
        let scene = SceneInfo::default();

        // Tick 1 activates; polls on 2, 3 keep it busy; poll on 4 frees it and
        // restamps; due again on tick 6
        for tick in 1..=5 {
            scheduler.tick(&mut registry, frame(tick, tick as f64), &scene);
        }
        assert_eq!(activations.load(Ordering::SeqCst), 1);
        scheduler.tick(&mut registry, frame(6, 6.0), &scene);
        assert_eq!(activations.load(Ordering::SeqCst), 2);
    }
}
