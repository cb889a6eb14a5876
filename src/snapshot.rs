//! Frame snapshots - immutable copies of the registry for one tick
//!
//! Snapshots are detached from live entities so they can be queued to the
//! recording workers, compared across ticks and serialized to JSON.
//! In JSON, `actions` and `state` are objects keyed by name.

use serde::{Deserialize, Serialize};

use crate::automation::{EntityId, Registry, StateValue};

/// Timing for the tick a snapshot was taken on
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    /// Tick number, starting at 1 for the first automated tick
    pub frame_count: u64,
    /// Seconds since the host started
    pub time: f64,
    pub time_scale: f64,
    /// Seconds since the previous tick
    pub delta_time: f64,
}

/// Scene the host currently has loaded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneInfo {
    pub name: String,
    pub path: String,
}

impl SceneInfo {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSnapshot {
    pub name: String,
    pub description: String,
    /// Activated on the snapshot's tick
    pub activated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub name: String,
    pub value: StateValue,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    /// Sorted by name
    #[serde(with = "keyed_actions")]
    pub actions: Vec<ActionSnapshot>,
    /// Sorted by name
    #[serde(with = "keyed_state")]
    pub state: Vec<StateSnapshot>,
}

impl EntitySnapshot {
    pub fn action(&self, name: &str) -> Option<&ActionSnapshot> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn state_value(&self, name: &str) -> Option<&StateValue> {
        self.state.iter().find(|s| s.name == name).map(|s| &s.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub frame: FrameInfo,
    pub active_scene: SceneInfo,
    pub entities: Vec<EntitySnapshot>,
}

impl FrameSnapshot {
    /// Compares scene and entities. Frame timing is ignored, so two ticks
    /// with an unchanged world compare equal.
    pub fn has_changes_from(&self, other: &FrameSnapshot) -> bool {
        self.active_scene != other.active_scene || self.entities != other.entities
    }

    pub fn any_action_activated(&self) -> bool {
        self.entities
            .iter()
            .any(|e| e.actions.iter().any(|a| a.activated))
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Indented JSON, as written to `snapshot.<frame>.json`
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Single-line JSON, as embedded in goal bot prompts
    pub fn to_compact_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Snapshot the registry for the given tick
pub fn build_snapshot(registry: &Registry, frame: FrameInfo, scene: &SceneInfo) -> FrameSnapshot {
    let entities = registry
        .iter()
        .map(|(_, entity)| {
            // BTreeMap iteration is already name-ordered
            let actions = entity
                .actions
                .values()
                .map(|action| ActionSnapshot {
                    name: action.name.clone(),
                    description: action.description.clone(),
                    activated: action.activated_on(frame.frame_count),
                })
                .collect();

            let mut state: Vec<StateSnapshot> = entity
                .state()
                .into_iter()
                .map(|p| StateSnapshot {
                    name: p.name,
                    value: p.value.normalized(),
                    description: p.description,
                })
                .collect();
            state.sort_by(|a, b| a.name.cmp(&b.name));

            EntitySnapshot {
                id: entity.id,
                name: entity.name.clone(),
                type_name: entity.type_name.clone(),
                description: entity.description.clone(),
                actions,
                state,
            }
        })
        .collect();

    FrameSnapshot {
        frame,
        active_scene: scene.clone(),
        entities,
    }
}

// =============================================================================
// KEYED JSON ENCODING
// =============================================================================

mod keyed_actions {
    use super::ActionSnapshot;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct BodyRef<'a> {
        description: &'a str,
        activated: bool,
    }

    #[derive(Deserialize)]
    struct Body {
        #[serde(default)]
        description: String,
        #[serde(default)]
        activated: bool,
    }

    pub fn serialize<S: Serializer>(actions: &[ActionSnapshot], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(actions.len()))?;
        for action in actions {
            map.serialize_entry(
                &action.name,
                &BodyRef {
                    description: &action.description,
                    activated: action.activated,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ActionSnapshot>, D::Error> {
        let map = BTreeMap::<String, Body>::deserialize(d)?;
        Ok(map
            .into_iter()
            .map(|(name, body)| ActionSnapshot {
                name,
                description: body.description,
                activated: body.activated,
            })
            .collect())
    }
}

mod keyed_state {
    use super::StateSnapshot;
    use crate::automation::StateValue;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct BodyRef<'a> {
        value: &'a StateValue,
        description: &'a str,
    }

    #[derive(Deserialize)]
    struct Body {
        value: StateValue,
        #[serde(default)]
        description: String,
    }

    pub fn serialize<S: Serializer>(state: &[StateSnapshot], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(state.len()))?;
        for property in state {
            map.serialize_entry(
                &property.name,
                &BodyRef {
                    value: &property.value,
                    description: &property.description,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<StateSnapshot>, D::Error> {
        let map = BTreeMap::<String, Body>::deserialize(d)?;
        Ok(map
            .into_iter()
            .map(|(name, body)| StateSnapshot {
                name,
                value: body.value,
                description: body.description,
            })
            .collect())
    }
}
