//! Gradient-free policy search with CMA-ES.
//!
//! This crate optimizes the flat parameter vector of a
//! [`ParameterizedPolicy`](evorl_policy::ParameterizedPolicy) by evolving a multivariate
//! Gaussian search distribution. Each candidate is scored by the cumulative reward of one
//! episode it plays in its own environment instance.
//!
//! # How Training Works
//!
//! 1. **Sample** - The strategy draws `N` parameter vectors (the population)
//! 2. **Rollout** - Candidate `i` plays instance `i` of a [`VecEnv`](evorl_env::VecEnv)
//!    until every instance is done
//! 3. **Score** - Fitness is the negated cumulative reward (lower is better)
//! 4. **Update** - The strategy moves its mean, step size and covariance toward the
//!    better candidates
//! 5. **Repeat** - Until the environment step budget is spent
//!
//! # Architecture
//!
//! ```text
//! CmaEs (search distribution)
//!     ↓ asks
//! Population (N parameter vectors)
//!     ↓ configures
//! ParameterizedPolicy (evorl-policy)
//!     ↓ acts in
//! VecEnv (evorl-env, N lock-step instances)
//!     ↓ rewards
//! Fitness
//!     ↓ told to
//! CmaEs
//! ```
//!
//! # Modules
//!
//! - [`cma_es`]: the ask/tell search strategy
//! - [`eigen`]: covariance eigendecomposition backed by `nalgebra`
//! - [`trainer`]: the generation loop, step budget and evaluation
//! - [`checkpoint`]: saving and restoring a trainer

pub use self::{
    checkpoint::{Checkpoint, CheckpointError},
    cma_es::{CmaEs, CmaEsState, ProtocolViolation, StrategyError},
    trainer::{
        GenerationReport, PopulationTrainer, StepContext, TrainerConfig, TrainerError,
        TrainingSummary, evaluate_parameters,
    },
};

pub mod checkpoint;
pub mod cma_es;
pub mod eigen;
pub mod trainer;
