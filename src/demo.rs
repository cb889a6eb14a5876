//! Demo host - a tiny menu/game scene for headless runs and tests
//!
//! The menu has a start button, a volume slider, a mute toggle and a status
//! label. A debug overlay is marked non-automatable, so neither it nor its
//! children are ever discovered. Pressing start switches to the game scene,
//! which only exposes a pause button.

use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{ImageFormat, Rgb, RgbImage};

use crate::automation::{
    Action, Automatable, Entity, EntityDiscoverer, EntityId, SceneGraph, StateProperty,
    is_automatable,
};
use crate::recording::ScreenshotSource;
use crate::snapshot::SceneInfo;

pub const MENU_SCENE: &str = "Menu";
pub const GAME_SCENE: &str = "Game";

pub const MAX_VOLUME: i64 = 10;

/// Backing state the demo's actions mutate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuState {
    pub started: bool,
    pub paused: bool,
    pub volume: i64,
    pub muted: bool,
}

impl Default for MenuState {
    fn default() -> Self {
        Self {
            started: false,
            paused: false,
            volume: 5,
            muted: false,
        }
    }
}

struct Node {
    id: EntityId,
    name: &'static str,
    type_name: &'static str,
    scene: &'static str,
    parent: Option<usize>,
    marker: Option<Automatable>,
}

const fn node(
    id: EntityId,
    name: &'static str,
    type_name: &'static str,
    scene: &'static str,
    parent: Option<usize>,
) -> Node {
    Node {
        id,
        name,
        type_name,
        scene,
        parent,
        marker: None,
    }
}

/// Excluded from automation along with its children
const fn hidden(mut node: Node) -> Node {
    node.marker = Some(Automatable {
        is_automatable: false,
        children_are_automatable: false,
    });
    node
}

const NODES: &[Node] = &[
    node(0, "Canvas", "Canvas", MENU_SCENE, None),
    node(1, "StartButton", "Button", MENU_SCENE, Some(0)),
    node(2, "VolumeSlider", "Slider", MENU_SCENE, Some(0)),
    node(3, "MuteToggle", "Toggle", MENU_SCENE, Some(0)),
    node(4, "StatusLabel", "Label", MENU_SCENE, Some(0)),
    hidden(node(5, "DebugOverlay", "Panel", MENU_SCENE, Some(0))),
    node(6, "DebugResetButton", "Button", MENU_SCENE, Some(5)),
    node(10, "PauseButton", "Button", GAME_SCENE, None),
];

/// Shared handle to the demo's state; clones see the same scene
#[derive(Clone, Default)]
pub struct DemoScene {
    state: Arc<Mutex<MenuState>>,
}

impl DemoScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MenuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> MenuState {
        *self.lock()
    }

    /// Scene the host should report this frame
    pub fn scene_info(&self) -> SceneInfo {
        if self.lock().started {
            SceneInfo::new(GAME_SCENE, "scenes/game")
        } else {
            SceneInfo::new(MENU_SCENE, "scenes/menu")
        }
    }

    fn status_text(state: &MenuState) -> &'static str {
        match (state.started, state.paused) {
            (false, _) => "Press Start",
            (true, false) => "Playing",
            (true, true) => "Paused",
        }
    }

    fn action(
        &self,
        name: &str,
        description: &str,
        can_activate: impl Fn(&MenuState) -> bool + Send + 'static,
        execute: impl Fn(&mut MenuState) + Send + 'static,
    ) -> Action {
        let check = self.clone();
        let apply = self.clone();
        Action::from_fn(
            name,
            description,
            move || can_activate(&check.lock()),
            move || execute(&mut apply.lock()),
        )
    }

    fn build_entity(&self, node: &Node) -> Entity {
        let entity = Entity::new(node.id, node.name, node.type_name);
        match node.name {
            "StartButton" => entity
                .with_description("Starts a new game")
                .with_action(self.action("Click", "Press the button", |s| !s.started, |s| {
                    s.started = true;
                })),
            "VolumeSlider" => {
                let reader = self.clone();
                entity
                    .with_description("Master volume")
                    .with_action(self.action(
                        "Increase",
                        "Raise the volume one step",
                        |s| s.volume < MAX_VOLUME,
                        |s| s.volume += 1,
                    ))
                    .with_action(self.action(
                        "Decrease",
                        "Lower the volume one step",
                        |s| s.volume > 0,
                        |s| s.volume -= 1,
                    ))
                    .with_state(move || {
                        vec![StateProperty::new(
                            "Value",
                            "Volume from 0 to 10",
                            reader.lock().volume,
                        )]
                    })
            }
            "MuteToggle" => {
                let reader = self.clone();
                entity
                    .with_action(self.action("Toggle", "Flip mute on or off", |_| true, |s| {
                        s.muted = !s.muted;
                    }))
                    .with_state(move || {
                        vec![StateProperty::new("IsOn", "Audio is muted", reader.lock().muted)]
                    })
            }
            "StatusLabel" => {
                let reader = self.clone();
                entity.with_state(move || {
                    let state = reader.lock();
                    vec![StateProperty::new(
                        "Text",
                        "Label text",
                        Self::status_text(&state),
                    )]
                })
            }
            "PauseButton" => entity.with_action(self.action(
                "Click",
                "Pause or resume the game",
                |s| s.started,
                |s| s.paused = !s.paused,
            )),
            _ => entity,
        }
    }
}

/// Demo scene graph; nodes are indices into a fixed table
impl SceneGraph for DemoScene {
    type Node = usize;

    fn automatable(&self, node: usize) -> Option<Automatable> {
        NODES.get(node).and_then(|n| n.marker)
    }

    fn parent(&self, node: usize) -> Option<usize> {
        NODES.get(node).and_then(|n| n.parent)
    }
}

/// Discovers the demo's automatable nodes for the active scene
pub struct MenuDiscoverer {
    scene: DemoScene,
}

impl MenuDiscoverer {
    pub fn new(scene: DemoScene) -> Self {
        Self { scene }
    }
}

impl EntityDiscoverer for MenuDiscoverer {
    fn name(&self) -> &str {
        "demo-menu"
    }

    fn discover_entities(&mut self, scene: &SceneInfo) -> Vec<Entity> {
        NODES
            .iter()
            .enumerate()
            // Canvases are containers, not something to automate
            .filter(|(index, node)| {
                node.scene == scene.name
                    && node.type_name != "Canvas"
                    && is_automatable(&self.scene, *index)
            })
            .map(|(_, node)| self.scene.build_entity(node))
            .collect()
    }
}

/// Renders the demo state as a small PNG
pub struct DemoScreenshots {
    scene: DemoScene,
    width: u32,
    height: u32,
}

impl DemoScreenshots {
    pub fn new(scene: DemoScene) -> Self {
        Self {
            scene,
            width: 160,
            height: 90,
        }
    }

    pub fn render(&self) -> RgbImage {
        let state = self.scene.state();
        let background = match (state.started, state.paused) {
            (false, _) => Rgb([30, 30, 60]),
            (true, false) => Rgb([20, 90, 40]),
            (true, true) => Rgb([90, 90, 20]),
        };
        let mut img = RgbImage::from_pixel(self.width, self.height, background);

        // Volume bar along the bottom
        let bar_width = self.width * state.volume.clamp(0, MAX_VOLUME) as u32 / MAX_VOLUME as u32;
        for x in 0..bar_width {
            for y in self.height - 8..self.height - 2 {
                img.put_pixel(x, y, Rgb([220, 220, 220]));
            }
        }

        if state.muted {
            for x in 4..14 {
                for y in 4..14 {
                    img.put_pixel(x, y, Rgb([200, 40, 40]));
                }
            }
        }
        img
    }
}

impl ScreenshotSource for DemoScreenshots {
    fn capture_png(&mut self) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        self.render()
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| format!("Failed to encode screenshot: {}", e))?;
        Ok(bytes)
    }
}
