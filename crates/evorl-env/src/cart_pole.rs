//! Classic cart-pole balancing task with a discrete push-left / push-right action.

use std::f64::consts::PI;

use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Action, ActionSpace, Env, EnvError, Observation, Transition};

const GRAVITY: f64 = 9.8;
const CART_MASS: f64 = 1.0;
const POLE_MASS: f64 = 0.1;
const TOTAL_MASS: f64 = CART_MASS + POLE_MASS;
const POLE_HALF_LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = POLE_MASS * POLE_HALF_LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const X_THRESHOLD: f64 = 2.4;
const THETA_THRESHOLD: f64 = 12.0 * 2.0 * PI / 360.0;
const INIT_RANGE: f64 = 0.05;

/// Cart-pole environment.
///
/// Observation is `[x, x_dot, theta, theta_dot]`; every step survived yields reward
/// `1.0`. The episode ends when the pole falls past 12 degrees, the cart leaves the
/// track, or `max_steps` is reached (truncation).
#[derive(Debug, Clone)]
pub struct CartPole {
    state: [f64; 4],
    steps: usize,
    max_steps: usize,
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new(500)
    }
}

impl CartPole {
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self {
            state: [0.0; 4],
            steps: 0,
            max_steps,
        }
    }
}

impl Env for CartPole {
    fn observation_size(&self) -> usize {
        4
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete { n: 2 }
    }

    fn reset(&mut self, seed: u64) -> Result<Observation, EnvError> {
        let mut rng = Pcg32::seed_from_u64(seed);
        for value in &mut self.state {
            *value = rng.random_range(-INIT_RANGE..INIT_RANGE);
        }
        self.steps = 0;
        Ok(self.state.to_vec())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        let force = match action {
            Action::Discrete(0) => -FORCE_MAG,
            Action::Discrete(1) => FORCE_MAG,
            _ => {
                return Err(EnvError::InvalidAction {
                    action: action.clone(),
                    space: self.action_space(),
                });
            }
        };

        let [x, x_dot, theta, theta_dot] = self.state;
        let (sin, cos) = theta.sin_cos();
        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        let terminated =
            self.state[0].abs() > X_THRESHOLD || self.state[2].abs() > THETA_THRESHOLD;
        let truncated = !terminated && self.steps >= self.max_steps;
        Ok(Transition {
            observation: self.state.to_vec(),
            reward: 1.0,
            done: terminated || truncated,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_depends_only_on_seed() {
        let mut a = CartPole::default();
        let mut b = CartPole::default();
        assert_eq!(a.reset(3).unwrap(), b.reset(3).unwrap());
        assert_ne!(a.reset(3).unwrap(), a.reset(4).unwrap());
        assert!(
            a.reset(5)
                .unwrap()
                .iter()
                .all(|v| v.abs() < INIT_RANGE)
        );
    }

    #[test]
    fn test_constant_push_terminates() {
        let mut env = CartPole::default();
        env.reset(0).unwrap();
        let mut steps = 0;
        loop {
            let transition = env.step(&Action::Discrete(1)).unwrap();
            steps += 1;
            assert_eq!(transition.reward, 1.0);
            if transition.done {
                assert!(!transition.truncated);
                break;
            }
            assert!(steps < 500);
        }
        assert!(steps < 100);
    }

    #[test]
    fn test_truncates_at_max_steps() {
        let mut env = CartPole::new(3);
        env.reset(0).unwrap();
        let mut last = None;
        for i in 0..3 {
            let transition = env.step(&Action::Discrete(i % 2)).unwrap();
            last = Some(transition);
        }
        let last = last.unwrap();
        assert!(last.done);
        assert!(last.truncated);
    }

    #[test]
    fn test_rejects_continuous_action() {
        let mut env = CartPole::default();
        env.reset(0).unwrap();
        assert!(env.step(&Action::Continuous(vec![1.0])).is_err());
    }
}
