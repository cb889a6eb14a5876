//! Entity discovery
//!
//! Discoverers inspect the host's scene and build entities for everything
//! that should be automatable. The [`DiscoveryManager`] keeps the registry in
//! sync with them: each discoverer's entities are replaced wholesale when the
//! scene changes (or every tick, if configured).

use bevy::log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::entity::Entity;
use super::registry::{EntityHandle, Registry};
use crate::snapshot::SceneInfo;

/// Source of entities for one kind of scene object
pub trait EntityDiscoverer: Send {
    fn name(&self) -> &str;

    /// Build fresh entities for the given scene
    fn discover_entities(&mut self, scene: &SceneInfo) -> Vec<Entity>;
}

/// When discoverers are re-run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Once at start and again whenever the active scene changes
    #[default]
    OnSceneChange,
    /// Every tick
    EveryTick,
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "on-scene-change" | "scene" | "once" => Ok(DiscoveryMode::OnSceneChange),
            "every-tick" | "tick" | "always" => Ok(DiscoveryMode::EveryTick),
            _ => Err(format!("Invalid discovery mode: {}", s)),
        }
    }
}

struct DiscovererSlot {
    discoverer: Box<dyn EntityDiscoverer>,
    /// Entities this discoverer currently has registered
    handles: Vec<EntityHandle>,
}

/// Keeps registered entities in step with the discoverers
#[derive(Default)]
pub struct DiscoveryManager {
    slots: Vec<DiscovererSlot>,
    mode: DiscoveryMode,
    last_scene: Option<SceneInfo>,
}

impl DiscoveryManager {
    pub fn new(mode: DiscoveryMode) -> Self {
        Self {
            slots: Vec::new(),
            mode,
            last_scene: None,
        }
    }

    pub fn add(&mut self, discoverer: impl EntityDiscoverer + 'static) {
        self.slots.push(DiscovererSlot {
            discoverer: Box::new(discoverer),
            handles: Vec::new(),
        });
        // Force the new discoverer to run on the next refresh
        self.last_scene = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// Rediscover if the mode calls for it. Returns true if discovery ran.
    pub fn refresh(&mut self, registry: &mut Registry, scene: &SceneInfo) -> bool {
        let scene_changed = self.last_scene.as_ref() != Some(scene);
        if !scene_changed && self.mode == DiscoveryMode::OnSceneChange {
            return false;
        }
        if scene_changed {
            debug!("Discovering entities for scene '{}'", scene.name);
        }
        self.rediscover(registry, scene);
        self.last_scene = Some(scene.clone());
        true
    }

    fn rediscover(&mut self, registry: &mut Registry, scene: &SceneInfo) {
        for slot in &mut self.slots {
            for handle in slot.handles.drain(..) {
                registry.unregister(handle);
            }
            for entity in slot.discoverer.discover_entities(scene) {
                let id = entity.id;
                match registry.register(entity) {
                    Ok(handle) => slot.handles.push(handle),
                    Err(e) => warn!(
                        "Discoverer '{}' produced entity {}: {}",
                        slot.discoverer.name(),
                        id,
                        e
                    ),
                }
            }
        }
    }

    /// Unregister everything the discoverers own
    pub fn release_all(&mut self, registry: &mut Registry) {
        for slot in &mut self.slots {
            for handle in slot.handles.drain(..) {
                registry.unregister(handle);
            }
        }
        self.last_scene = None;
    }
}

// =============================================================================
// AUTOMATABLE POLICY
// =============================================================================

/// Marker controlling whether a scene node (and its children) may be automated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Automatable {
    pub is_automatable: bool,
    pub children_are_automatable: bool,
}

impl Default for Automatable {
    fn default() -> Self {
        Self {
            is_automatable: true,
            children_are_automatable: true,
        }
    }
}

/// Read-only view of the host's object hierarchy
pub trait SceneGraph {
    type Node: Copy;

    fn automatable(&self, node: Self::Node) -> Option<Automatable>;

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
}

/// A node's own marker wins; otherwise the nearest marked ancestor's
/// `children_are_automatable` decides; unmarked chains default to true.
pub fn is_automatable<G: SceneGraph>(graph: &G, node: G::Node) -> bool {
    if let Some(marker) = graph.automatable(node) {
        return marker.is_automatable;
    }
    let mut current = graph.parent(node);
    while let Some(ancestor) = current {
        if let Some(marker) = graph.automatable(ancestor) {
            return marker.children_are_automatable;
        }
        current = graph.parent(ancestor);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::entity::Action;

    /// Flat arena of (parent, marker) pairs
    struct TestGraph {
        nodes: Vec<(Option<usize>, Option<Automatable>)>,
    }

    impl SceneGraph for TestGraph {
        type Node = usize;

        fn automatable(&self, node: usize) -> Option<Automatable> {
            self.nodes[node].1
        }

        fn parent(&self, node: usize) -> Option<usize> {
            self.nodes[node].0
        }
    }

    #[test]
    fn test_is_automatable_chain() {
        let blocked_children = Automatable {
            is_automatable: true,
            children_are_automatable: false,
        };
        let opted_in = Automatable {
            is_automatable: true,
            children_are_automatable: true,
        };
        let graph = TestGraph {
            nodes: vec![
                (None, None),                      // 0 root
                (Some(0), Some(blocked_children)), // 1 overlay
                (Some(1), None),                   // 2 child of overlay
                (Some(2), None),                   // 3 grandchild of overlay
                (Some(1), Some(opted_in)),         // 4 explicitly marked child
                (Some(0), None),                   // 5 plain node
            ],
        };

        assert!(is_automatable(&graph, 0));
        assert!(is_automatable(&graph, 1));
        assert!(!is_automatable(&graph, 2));
        assert!(!is_automatable(&graph, 3));
        assert!(is_automatable(&graph, 4));
        assert!(is_automatable(&graph, 5));
    }

    struct CountingDiscoverer {
        runs: u32,
    }

    impl EntityDiscoverer for CountingDiscoverer {
        fn name(&self) -> &str {
            "counting"
        }

        fn discover_entities(&mut self, scene: &SceneInfo) -> Vec<Entity> {
            self.runs += 1;
            vec![
                Entity::new(1, &scene.name, "Marker")
                    .with_action(Action::from_fn("Poke", "", || true, || {})),
                // Same id again, rejected by the registry
                Entity::new(1, "dup", "Marker"),
            ]
        }
    }

    fn scene(name: &str) -> SceneInfo {
        SceneInfo {
            name: name.to_string(),
            path: format!("scenes/{}", name),
        }
    }

    #[test]
    fn test_rediscovers_on_scene_change_only() {
        let mut registry = Registry::new();
        let mut manager = DiscoveryManager::new(DiscoveryMode::OnSceneChange);
        manager.add(CountingDiscoverer { runs: 0 });

        assert!(manager.refresh(&mut registry, &scene("Menu")));
        assert!(!manager.refresh(&mut registry, &scene("Menu")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_id(1).map(|e| e.name.as_str()), Some("Menu"));

        assert!(manager.refresh(&mut registry, &scene("Level1")));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.find_by_id(1).map(|e| e.name.as_str()),
            Some("Level1")
        );

        manager.release_all(&mut registry);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_every_tick_mode_always_runs() {
        let mut registry = Registry::new();
        let mut manager = DiscoveryManager::new(DiscoveryMode::EveryTick);
        manager.add(CountingDiscoverer { runs: 0 });

        for _ in 0..3 {
            assert!(manager.refresh(&mut registry, &scene("Menu")));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_discovery_mode_from_str() {
        assert_eq!(
            "every_tick".parse::<DiscoveryMode>(),
            Ok(DiscoveryMode::EveryTick)
        );
        assert_eq!(
            "On-Scene-Change".parse::<DiscoveryMode>(),
            Ok(DiscoveryMode::OnSceneChange)
        );
        assert_eq!(
            "sometimes".parse::<DiscoveryMode>(),
            Err("Invalid discovery mode: sometimes".to_string())
        );
    }
}
