//! Bevy integration
//!
//! Insert an [`AutomationHarness`] and keep [`ActiveScene`] current; the
//! plugin ticks the controller once per frame in `Last`, after the game's own
//! systems have run.

use std::sync::{Mutex, PoisonError};

use bevy::prelude::*;

use crate::controller::AutomationController;
use crate::snapshot::{FrameInfo, SceneInfo};

/// Scene the host is currently showing
#[derive(Resource, Debug, Clone, Default)]
pub struct ActiveScene(pub SceneInfo);

/// Owns the controller for the lifetime of the app
#[derive(Resource)]
pub struct AutomationHarness {
    controller: Mutex<AutomationController>,
    frames: u64,
}

impl AutomationHarness {
    pub fn new(controller: AutomationController) -> Self {
        Self {
            controller: Mutex::new(controller),
            frames: 0,
        }
    }

    pub fn controller(&mut self) -> &mut AutomationController {
        self.controller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames automated so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_controller(self) -> AutomationController {
        self.controller
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PlaytestPlugin;

impl Plugin for PlaytestPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ActiveScene>().add_systems(
            Last,
            automation_tick.run_if(resource_exists::<AutomationHarness>),
        );
    }
}

/// Run one automation tick for the frame that just finished
pub fn automation_tick(
    mut harness: ResMut<AutomationHarness>,
    scene: Res<ActiveScene>,
    time: Res<Time>,
    virtual_time: Res<Time<Virtual>>,
) {
    harness.frames += 1;
    let frame = FrameInfo {
        frame_count: harness.frames,
        time: time.elapsed_secs_f64(),
        time_scale: virtual_time.relative_speed_f64(),
        delta_time: time.delta_secs_f64(),
    };
    harness.controller().tick(frame, &scene.0);
}
