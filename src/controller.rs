//! Automation controller - one entry point per host tick
//!
//! Order within a tick: refresh discovery, run the scheduler (bots poll and
//! activate), forward screenshot requests, then record the end-of-tick
//! snapshot. Recording last means the snapshot sees this tick's activations.

use std::sync::Arc;
use std::time::Duration;

use bevy::log::{info, warn};

use crate::automation::{AutomationError, DiscoveryManager, Registry};
use crate::bots::{ActivationInterval, Bot, BotId, BotScheduler, BotSummary};
use crate::recording::{AutomationRecorder, FinalizeReport};
use crate::snapshot::{FrameInfo, FrameSnapshot, SceneInfo};

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Discoverers ran this tick
    pub discovered: bool,
    /// Snapshot handed to the recording sessions, if one was taken
    pub snapshot: Option<Arc<FrameSnapshot>>,
}

pub struct AutomationController {
    registry: Registry,
    discovery: DiscoveryManager,
    scheduler: BotScheduler,
    recorder: AutomationRecorder,
    ticks: u64,
}

impl AutomationController {
    pub fn new(discovery: DiscoveryManager, recorder: AutomationRecorder) -> Self {
        Self {
            registry: Registry::new(),
            discovery,
            scheduler: BotScheduler::new(),
            recorder,
            ticks: 0,
        }
    }

    /// Fail fast on a harness that could never do anything
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.discovery.is_empty() {
            return Err(AutomationError::MissingCollaborator("entity discoverer"));
        }
        if self.scheduler.is_empty() {
            warn!("No bots scheduled; the harness will only record");
        }
        Ok(())
    }

    pub fn add_bot(&mut self, bot: impl Bot + 'static, interval: ActivationInterval) -> BotId {
        self.scheduler.add(bot, interval)
    }

    pub fn add_boxed_bot(&mut self, bot: Box<dyn Bot>, interval: ActivationInterval) -> BotId {
        self.scheduler.add_boxed(bot, interval)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn discovery_mut(&mut self) -> &mut DiscoveryManager {
        &mut self.discovery
    }

    pub fn scheduler(&self) -> &BotScheduler {
        &self.scheduler
    }

    pub fn recorder(&self) -> &AutomationRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut AutomationRecorder {
        &mut self.recorder
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bot_summaries(&self) -> Vec<BotSummary> {
        self.scheduler.summaries()
    }

    /// True once every scheduled bot has reached an outcome
    pub fn is_finished(&self) -> bool {
        self.scheduler.all_finished()
    }

    pub fn tick(&mut self, frame: FrameInfo, scene: &SceneInfo) -> TickReport {
        let tick = frame.frame_count;
        self.ticks += 1;

        let discovered = self.discovery.refresh(&mut self.registry, scene);
        self.recorder.begin_tick(tick);

        for requested in self.scheduler.tick(&mut self.registry, frame, scene) {
            self.recorder.request_screenshot_at(requested);
        }

        let snapshot = self.recorder.record_tick(&self.registry, frame, scene);
        TickReport {
            tick,
            discovered,
            snapshot,
        }
    }

    /// Release discovered entities and finalize every recording session,
    /// giving workers up to `drain_timeout` to flush queued frames
    pub fn shutdown(&mut self, drain_timeout: Duration) -> Vec<FinalizeReport> {
        self.discovery.release_all(&mut self.registry);
        let reports = self.recorder.finish_all(drain_timeout);
        info!(
            "Automation stopped after {} tick(s), {} session(s) finalized",
            self.ticks,
            reports.len()
        );
        reports
    }
}
