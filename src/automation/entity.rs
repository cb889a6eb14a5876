//! Entities, actions and state properties

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity identity, unique among live entities but reusable after unregister
pub type EntityId = i64;

/// Scalar state value reported by an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl StateValue {
    /// Non-finite numbers become their string form so the value compares
    /// equal to itself and survives a JSON round trip
    pub fn normalized(self) -> Self {
        match self {
            StateValue::Number(n) if !n.is_finite() => StateValue::String(n.to_string()),
            other => other,
        }
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Number(n) => write!(f, "{}", n),
            StateValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<f32> for StateValue {
    fn from(value: f32) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::String(value)
    }
}

/// Named piece of entity state
#[derive(Debug, Clone, PartialEq)]
pub struct StateProperty {
    pub name: String,
    pub description: String,
    pub value: StateValue,
}

impl StateProperty {
    pub fn new(name: &str, description: &str, value: impl Into<StateValue>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value: value.into(),
        }
    }
}

/// Produces an entity's state on demand
///
/// State is read every snapshot, so implementations should only read
/// from the backing object.
pub trait StateSource: Send {
    fn state(&self) -> Vec<StateProperty>;
}

impl<F> StateSource for F
where
    F: Fn() -> Vec<StateProperty> + Send,
{
    fn state(&self) -> Vec<StateProperty> {
        self()
    }
}

/// Behaviour behind an [`Action`]
pub trait ActionHandler: Send {
    /// Whether the action may be activated right now. Must be side-effect free.
    fn can_activate(&self) -> bool {
        true
    }

    /// Perform the action against the backing object
    fn execute(&mut self);
}

/// [`ActionHandler`] built from a pair of closures
pub struct FnActionHandler<C, E> {
    can_activate: C,
    execute: E,
}

impl<C, E> FnActionHandler<C, E>
where
    C: Fn() -> bool + Send,
    E: FnMut() + Send,
{
    pub fn new(can_activate: C, execute: E) -> Self {
        Self {
            can_activate,
            execute,
        }
    }
}

impl<C, E> ActionHandler for FnActionHandler<C, E>
where
    C: Fn() -> bool + Send,
    E: FnMut() + Send,
{
    fn can_activate(&self) -> bool {
        (self.can_activate)()
    }

    fn execute(&mut self) {
        (self.execute)()
    }
}

/// A named operation a bot can invoke on an entity
pub struct Action {
    pub name: String,
    pub description: String,
    handler: Box<dyn ActionHandler>,
    /// Tick of the most recent activation
    last_activation: Option<u64>,
}

impl Action {
    pub fn new(name: &str, description: &str, handler: impl ActionHandler + 'static) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            handler: Box::new(handler),
            last_activation: None,
        }
    }

    /// Action backed by closures for the availability check and the effect
    pub fn from_fn(
        name: &str,
        description: &str,
        can_activate: impl Fn() -> bool + Send + 'static,
        execute: impl FnMut() + Send + 'static,
    ) -> Self {
        Self::new(name, description, FnActionHandler::new(can_activate, execute))
    }

    pub fn can_activate_this_frame(&self) -> bool {
        self.handler.can_activate()
    }

    /// Run the action and remember the tick it happened on
    pub fn activate(&mut self, tick: u64) {
        self.last_activation = Some(tick);
        self.handler.execute();
    }

    pub fn activated_on(&self, tick: u64) -> bool {
        self.last_activation == Some(tick)
    }

    pub fn last_activation(&self) -> Option<u64> {
        self.last_activation
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("last_activation", &self.last_activation)
            .finish()
    }
}

/// A controllable object exposed to bots
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub type_name: String,
    pub description: String,
    /// Actions keyed by name, iterated in name order
    pub actions: BTreeMap<String, Action>,
    state: Option<Box<dyn StateSource>>,
}

impl Entity {
    pub fn new(id: EntityId, name: &str, type_name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            type_name: type_name.to_string(),
            description: String::new(),
            actions: BTreeMap::new(),
            state: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Add an action, replacing any existing action with the same name
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action.name.clone(), action);
        self
    }

    pub fn with_state(mut self, source: impl StateSource + 'static) -> Self {
        self.state = Some(Box::new(source));
        self
    }

    pub fn action(&self, key: &str) -> Option<&Action> {
        self.actions.get(key)
    }

    pub fn action_mut(&mut self, key: &str) -> Option<&mut Action> {
        self.actions.get_mut(key)
    }

    /// Current state, read from the backing object
    pub fn state(&self) -> Vec<StateProperty> {
        match &self.state {
            Some(source) => source.state(),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_activation_tracks_single_tick() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let mut action = Action::from_fn("Click", "Press the button", || true, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!action.activated_on(1));
        action.activate(1);
        assert!(action.activated_on(1));
        assert!(!action.activated_on(2));

        action.activate(5);
        assert_eq!(action.last_activation(), Some(5));
        assert!(!action.activated_on(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_state_is_read_lazily() {
        let volume = Arc::new(Mutex::new(0.5_f64));
        let reader = volume.clone();
        let entity = Entity::new(1, "Slider", "Slider").with_state(move || {
            vec![StateProperty::new(
                "value",
                "Current value",
                *reader.lock().unwrap(),
            )]
        });

        assert_eq!(entity.state()[0].value, StateValue::Number(0.5));
        *volume.lock().unwrap() = 0.75;
        assert_eq!(entity.state()[0].value, StateValue::Number(0.75));
    }

    #[test]
    fn test_actions_iterate_in_name_order() {
        let entity = Entity::new(1, "Slider", "Slider")
            .with_action(Action::from_fn("Increase", "", || true, || {}))
            .with_action(Action::from_fn("Decrease", "", || true, || {}));

        let names: Vec<&str> = entity.actions.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Decrease", "Increase"]);
    }

    #[test]
    fn test_normalized_replaces_non_finite_numbers() {
        assert_eq!(
            StateValue::from(f64::NAN).normalized(),
            StateValue::String("NaN".to_string())
        );
        assert_eq!(
            StateValue::from(f64::NEG_INFINITY).normalized(),
            StateValue::String("-inf".to_string())
        );
        assert_eq!(StateValue::from(0.5).normalized(), StateValue::Number(0.5));
        assert_eq!(StateValue::from(true).normalized(), StateValue::Bool(true));
    }

    #[test]
    fn test_state_value_json_is_untagged() {
        let values = vec![
            StateValue::Bool(true),
            StateValue::Number(2.5),
            StateValue::String("hi".to_string()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[true,2.5,"hi"]"#);
        let back: Vec<StateValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
