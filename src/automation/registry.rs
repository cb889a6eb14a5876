//! Live entity registry
//!
//! Insertion-ordered arena. Callers hold [`EntityHandle`]s, never references,
//! so entities can be dropped on unregister without dangling anything.

use super::AutomationError;
use super::entity::{Action, Entity, EntityId};

/// Stable handle to a registered entity. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(u64);

/// Addresses one action on one live entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub handle: EntityHandle,
    pub entity_id: EntityId,
    pub action: String,
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity_id, self.action)
    }
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<(EntityHandle, Entity)>,
    next_handle: u64,
    /// Bumped on every successful register/unregister
    revision: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity. Fails if a live entity already has the same id.
    pub fn register(&mut self, entity: Entity) -> Result<EntityHandle, AutomationError> {
        if self.find_by_id(entity.id).is_some() {
            return Err(AutomationError::DuplicateEntityId(entity.id));
        }
        let handle = EntityHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, entity));
        self.revision += 1;
        Ok(handle)
    }

    /// Remove an entity. Unknown handles are ignored.
    pub fn unregister(&mut self, handle: EntityHandle) -> Option<Entity> {
        let index = self.entries.iter().position(|(h, _)| *h == handle)?;
        let (_, entity) = self.entries.remove(index);
        self.revision += 1;
        Some(entity)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entries
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, e)| e)
    }

    pub fn find_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.entries.iter().find(|(_, e)| e.id == id).map(|(_, e)| e)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<EntityHandle> {
        self.entries.iter().find(|(_, e)| e.id == id).map(|(h, _)| *h)
    }

    /// Live entities in registration order
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every action of every live entity, registration order then name order
    pub fn action_keys(&self) -> Vec<ActionKey> {
        self.collect_keys(|_| true)
    }

    /// Actions whose activation predicate currently holds
    pub fn available_actions(&self) -> Vec<ActionKey> {
        self.collect_keys(|action| action.can_activate_this_frame())
    }

    fn collect_keys(&self, filter: impl Fn(&Action) -> bool) -> Vec<ActionKey> {
        let mut keys = Vec::new();
        for (handle, entity) in &self.entries {
            for (name, action) in &entity.actions {
                if filter(action) {
                    keys.push(ActionKey {
                        handle: *handle,
                        entity_id: entity.id,
                        action: name.clone(),
                    });
                }
            }
        }
        keys
    }

    /// Activate the action behind a key on the given tick
    pub fn activate(&mut self, key: &ActionKey, tick: u64) -> Result<(), AutomationError> {
        let entity = self
            .get_mut(key.handle)
            .ok_or(AutomationError::UnknownEntity(key.entity_id))?;
        let action = entity
            .action_mut(&key.action)
            .ok_or_else(|| AutomationError::UnknownAction {
                entity_id: key.entity_id,
                action: key.action.clone(),
            })?;
        action.activate(tick);
        Ok(())
    }

    /// True if any action on any live entity was activated on `tick`
    pub fn any_activated_on(&self, tick: u64) -> bool {
        self.entries
            .iter()
            .any(|(_, e)| e.actions.values().any(|a| a.activated_on(tick)))
    }
}
