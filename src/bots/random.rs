//! Random bot - activates one available action per turn

use bevy::log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Bot, BotContext, BotError, BotStatus};

pub struct RandomBot {
    name: String,
    rng: StdRng,
}

impl RandomBot {
    /// `seed` makes runs reproducible; `None` seeds from entropy
    pub fn new(name: &str, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            name: name.to_string(),
            rng,
        }
    }
}

impl Bot for RandomBot {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&mut self, ctx: &mut BotContext) -> Result<BotStatus, BotError> {
        if ctx.available.is_empty() {
            return Ok(BotStatus::Running);
        }
        let key = ctx.available[self.rng.gen_range(0..ctx.available.len())].clone();
        debug!("{}: activating {} on tick {}", self.name, key, ctx.tick());
        ctx.activate(&key)?;
        ctx.request_screenshot(1);
        Ok(BotStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Action, Entity, Registry};
    use crate::snapshot::{FrameInfo, SceneInfo};

    fn frame(n: u64) -> FrameInfo {
        FrameInfo {
            frame_count: n,
            time: n as f64,
            time_scale: 1.0,
            delta_time: 1.0,
        }
    }

    #[test]
    fn test_activates_one_available_action() {
        let mut registry = Registry::new();
        registry
            .register(
                Entity::new(1, "Toggle", "Toggle")
                    .with_action(Action::from_fn("On", "", || true, || {}))
                    .with_action(Action::from_fn("Off", "", || false, || {})),
            )
            .unwrap();
        let available = registry.available_actions();
        let discovered = registry.action_keys();
        let scene = SceneInfo::default();
        let mut requests = Vec::new();
        let mut bot = RandomBot::new("monkey", Some(7));

        {
            let mut ctx = BotContext::new(
                frame(3),
                &scene,
                &available,
                &discovered,
                &mut registry,
                &mut requests,
            );
            assert_eq!(bot.activate(&mut ctx).unwrap(), BotStatus::Running);
        }

        let entity = registry.find_by_id(1).unwrap();
        assert!(entity.action("On").unwrap().activated_on(3));
        assert!(entity.action("Off").unwrap().last_activation().is_none());
        assert_eq!(requests, vec![4]);
    }

    #[test]
    fn test_nothing_available_is_a_no_op() {
        let mut registry = Registry::new();
        let scene = SceneInfo::default();
        let mut requests = Vec::new();
        let mut bot = RandomBot::new("monkey", Some(1));
        let mut ctx = BotContext::new(frame(1), &scene, &[], &[], &mut registry, &mut requests);

        assert_eq!(bot.activate(&mut ctx).unwrap(), BotStatus::Running);
        assert!(requests.is_empty());
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let picks = |seed| {
            let mut registry = Registry::new();
            for id in 0..5 {
                registry
                    .register(
                        Entity::new(id, "Button", "Button")
                            .with_action(Action::from_fn("Click", "", || true, || {})),
                    )
                    .unwrap();
            }
            let available = registry.available_actions();
            let scene = SceneInfo::default();
            let mut requests = Vec::new();
            let mut bot = RandomBot::new("monkey", Some(seed));
            let mut chosen = Vec::new();
            for tick in 1..=10 {
                let mut ctx = BotContext::new(
                    frame(tick),
                    &scene,
                    &available,
                    &available,
                    &mut registry,
                    &mut requests,
                );
                bot.activate(&mut ctx).unwrap();
                chosen.push(
                    ctx.registry()
                        .iter()
                        .find(|(_, e)| e.action("Click").unwrap().activated_on(tick))
                        .map(|(_, e)| e.id),
                );
            }
            chosen
        };
        assert_eq!(picks(42), picks(42));
    }
}
