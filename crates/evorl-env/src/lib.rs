//! Environment boundary for population rollouts.
//!
//! The trainer never talks to a single simulation directly. It drives a
//! [`VecEnv`]: a fixed number of instances that are reset and stepped together,
//! returning only once every instance has produced its result.
//!
//! # Layers
//!
//! ```text
//! Env (one simulation instance)
//!     ↓ owned by
//! SyncVecEnv (lock-step batch, sequential or scoped threads)
//!     ↓ optionally wrapped by
//! FrameStack (concatenates recent observations)
//!     ↓ optionally wrapped by
//! NormalizeObservation (running mean and variance rescaling)
//!     ↓ driven by
//! PopulationTrainer (evorl-training)
//! ```
//!
//! # No-op Actions
//!
//! Instances inside one batch finish at different times. [`VecEnv::step`] takes one
//! `Option<Action>` per instance; `None` must be accepted for an instance that is
//! already done and leaves it untouched.

use serde::{Deserialize, Serialize};

pub use self::{
    cart_pole::CartPole,
    frame_stack::FrameStack,
    normalize::{NormalizeObservation, ObservationStats},
    point_reach::PointReach,
    sync_vec_env::SyncVecEnv,
};

pub mod cart_pole;
pub mod frame_stack;
pub mod normalize;
pub mod point_reach;
pub mod sync_vec_env;

/// A flat observation vector.
pub type Observation = Vec<f64>;

/// An action submitted to one environment instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::IsVariant)]
pub enum Action {
    /// Index into a discrete action set.
    Discrete(usize),
    /// Raw continuous control vector.
    Continuous(Vec<f64>),
}

/// Shape of the actions an environment accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpace {
    Discrete { n: usize },
    Continuous { dim: usize },
}

impl ActionSpace {
    /// Number of outputs a policy needs to produce for this space.
    #[must_use]
    pub fn size(&self) -> usize {
        match *self {
            ActionSpace::Discrete { n } => n,
            ActionSpace::Continuous { dim } => dim,
        }
    }

    #[must_use]
    pub fn is_continuous(&self) -> bool {
        matches!(self, ActionSpace::Continuous { .. })
    }

    /// Returns `true` if `action` is well-formed for this space.
    #[must_use]
    pub fn contains(&self, action: &Action) -> bool {
        match (*self, action) {
            (ActionSpace::Discrete { n }, Action::Discrete(index)) => *index < n,
            (ActionSpace::Continuous { dim }, Action::Continuous(values)) => values.len() == dim,
            _ => false,
        }
    }
}

/// Result of stepping a single environment instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    /// `true` when the episode ended because of a time limit rather than a terminal state.
    pub truncated: bool,
}

/// A single simulation instance.
pub trait Env {
    fn observation_size(&self) -> usize;

    fn action_space(&self) -> ActionSpace;

    /// Starts a new episode. The same seed must yield the same initial observation.
    fn reset(&mut self, seed: u64) -> Result<Observation, EnvError>;

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError>;
}

/// Per-instance side information returned by [`VecEnv::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepInfo {
    /// Steps taken by this instance since its last reset.
    pub episode_steps: usize,
    pub truncated: bool,
    /// The instance received a no-op and was not advanced.
    pub skipped: bool,
}

/// Batched result of one lock-step [`VecEnv::step`] call, index-aligned with the instances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepBatch {
    pub observations: Vec<Observation>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub infos: Vec<StepInfo>,
}

/// Vectorized environment: `num_envs()` instances reset and stepped together.
pub trait VecEnv {
    fn num_envs(&self) -> usize;

    /// Length of every observation in the batch.
    fn observation_size(&self) -> usize;

    fn action_space(&self) -> ActionSpace;

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError>;

    /// Steps every instance. `actions` has exactly `num_envs()` entries; `None` is a no-op.
    fn step(&mut self, actions: &[Option<Action>]) -> Result<StepBatch, EnvError>;
}

impl<V> VecEnv for Box<V>
where
    V: VecEnv + ?Sized,
{
    fn num_envs(&self) -> usize {
        (**self).num_envs()
    }

    fn observation_size(&self) -> usize {
        (**self).observation_size()
    }

    fn action_space(&self) -> ActionSpace {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[Option<Action>]) -> Result<StepBatch, EnvError> {
        (**self).step(actions)
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum EnvError {
    #[display("expected {expected} actions, got {actual}")]
    ActionCount { expected: usize, actual: usize },
    #[display("action {action:?} does not fit action space {space:?}")]
    InvalidAction { action: Action, space: ActionSpace },
    #[display("observation has length {actual}, expected {expected}")]
    ObservationShape { expected: usize, actual: usize },
    #[display("instance {index} stepped before reset")]
    NotReset { index: usize },
    #[display("instance {index} failed: {message}")]
    Instance { index: usize, message: String },
}
