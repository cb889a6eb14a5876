//! Automation model - entities, actions, the live registry and discovery
//!
//! Discoverers turn scene objects into [`Entity`] values, the [`Registry`]
//! owns them for as long as they are live, and bots reach them through
//! [`ActionKey`]s.

pub mod discovery;
pub mod entity;
pub mod registry;

pub use discovery::{
    Automatable, DiscoveryManager, DiscoveryMode, EntityDiscoverer, SceneGraph, is_automatable,
};
pub use entity::{
    Action, ActionHandler, Entity, EntityId, FnActionHandler, StateProperty, StateSource,
    StateValue,
};
pub use registry::{ActionKey, EntityHandle, Registry};

/// Errors raised by the registry and controller wiring
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// Another live entity already uses this id
    DuplicateEntityId(EntityId),
    /// No live entity has this id
    UnknownEntity(EntityId),
    /// The entity exists but has no action with this key
    UnknownAction { entity_id: EntityId, action: String },
    /// A required collaborator (discoverer, screenshot source, ...) was never supplied
    MissingCollaborator(&'static str),
}

impl std::fmt::Display for AutomationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutomationError::DuplicateEntityId(id) => {
                write!(f, "entity id {} is already registered", id)
            }
            AutomationError::UnknownEntity(id) => write!(f, "no entity with id {}", id),
            AutomationError::UnknownAction { entity_id, action } => {
                write!(f, "entity {} has no action '{}'", entity_id, action)
            }
            AutomationError::MissingCollaborator(what) => {
                write!(f, "no {} configured", what)
            }
        }
    }
}

impl std::error::Error for AutomationError {}
