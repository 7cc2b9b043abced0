//! Point-mass reaching task with a continuous 2-D velocity action.

use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Action, ActionSpace, Env, EnvError, Observation, Transition};

const SPEED: f64 = 0.1;
const TARGET_RANGE: f64 = 1.0;
const REACH_RADIUS: f64 = 0.05;

/// A point starting at the origin must reach a target drawn from the reset seed.
///
/// Observation is `[x, y, target_x, target_y]`. Action components are clamped to
/// `[-1, 1]` and scaled by a fixed speed. Reward is the negative distance to the target
/// after moving; reaching it ends the episode early.
#[derive(Debug, Clone)]
pub struct PointReach {
    position: [f64; 2],
    target: [f64; 2],
    steps: usize,
    max_steps: usize,
}

impl Default for PointReach {
    fn default() -> Self {
        Self::new(200)
    }
}

impl PointReach {
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self {
            position: [0.0; 2],
            target: [0.0; 2],
            steps: 0,
            max_steps,
        }
    }

    fn observation(&self) -> Observation {
        vec![
            self.position[0],
            self.position[1],
            self.target[0],
            self.target[1],
        ]
    }

    fn distance(&self) -> f64 {
        (self.target[0] - self.position[0]).hypot(self.target[1] - self.position[1])
    }
}

impl Env for PointReach {
    fn observation_size(&self) -> usize {
        4
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Continuous { dim: 2 }
    }

    fn reset(&mut self, seed: u64) -> Result<Observation, EnvError> {
        let mut rng = Pcg32::seed_from_u64(seed);
        self.position = [0.0; 2];
        self.target = [
            rng.random_range(-TARGET_RANGE..TARGET_RANGE),
            rng.random_range(-TARGET_RANGE..TARGET_RANGE),
        ];
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        let Action::Continuous(velocity) = action else {
            return Err(EnvError::InvalidAction {
                action: action.clone(),
                space: self.action_space(),
            });
        };
        if velocity.len() != 2 {
            return Err(EnvError::InvalidAction {
                action: action.clone(),
                space: self.action_space(),
            });
        }

        for (p, v) in self.position.iter_mut().zip(velocity) {
            // NaN outputs are treated as standing still
            let v = if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
            *p += SPEED * v;
        }
        self.steps += 1;

        let distance = self.distance();
        let reached = distance < REACH_RADIUS;
        let truncated = !reached && self.steps >= self.max_steps;
        Ok(Transition {
            observation: self.observation(),
            reward: -distance,
            done: reached || truncated,
            truncated,
        })
    }
}
