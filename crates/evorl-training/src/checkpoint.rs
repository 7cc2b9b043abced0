//! Saving and restoring a [`PopulationTrainer`].
//!
//! A checkpoint is one JSON document holding the trainer configuration, the policy, the
//! strategy's evolving state, the cached best parameters and the counters. Derived
//! quantities (strategy constants, policy layer shapes) are never stored; loading
//! re-runs the constructors and overwrites the evolving state, so a restored trainer
//! samples exactly the population the saved one would have sampled next.
//!
//! Observation normalization statistics live in the environment wrapper, not in the
//! trainer. They are attached with [`Checkpoint::with_observation_stats`] and must be
//! handed back to a [`NormalizeObservation`](evorl_env::NormalizeObservation) when the
//! checkpoint is used.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use evorl_env::ObservationStats;
use evorl_policy::ParameterizedPolicy;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    cma_es::CmaEsState,
    trainer::{PopulationTrainer, TrainerConfig},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<P> {
    pub saved_at: DateTime<Utc>,
    pub config: TrainerConfig,
    pub policy: P,
    pub strategy: CmaEsState,
    pub best_parameters: Vec<f64>,
    pub total_steps: u64,
    pub generation: usize,
    /// Statistics of the observation normalization the policy was trained behind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_stats: Option<ObservationStats>,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CheckpointError {
    #[display("failed to access checkpoint file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("malformed checkpoint: {_0}")]
    Format(serde_json::Error),
    #[display("inconsistent checkpoint: {reason}")]
    Inconsistent { reason: String },
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        CheckpointError::Format(err)
    }
}

fn inconsistent(reason: impl Into<String>) -> CheckpointError {
    CheckpointError::Inconsistent {
        reason: reason.into(),
    }
}

impl<P> Checkpoint<P>
where
    P: ParameterizedPolicy + Clone,
{
    /// Captures the current state of `trainer`.
    #[must_use]
    pub fn capture(trainer: &PopulationTrainer<P>) -> Self {
        Self {
            saved_at: Utc::now(),
            config: trainer.config.clone(),
            policy: trainer.policy.clone(),
            strategy: trainer.strategy.state().clone(),
            best_parameters: trainer.best_parameters.clone(),
            total_steps: trainer.total_steps,
            generation: trainer.strategy.generation(),
            observation_stats: None,
        }
    }

    #[must_use]
    pub fn with_observation_stats(mut self, stats: ObservationStats) -> Self {
        self.observation_stats = Some(stats);
        self
    }

    /// Rebuilds a trainer from this checkpoint.
    ///
    /// The strategy is recreated from the stored configuration and the evolving state
    /// is restored on top of it; any mismatch between the parts is reported as
    /// [`CheckpointError::Inconsistent`].
    pub fn into_trainer(self) -> Result<PopulationTrainer<P>, CheckpointError> {
        let Self {
            saved_at: _,
            config,
            policy,
            strategy,
            best_parameters,
            total_steps,
            generation,
            observation_stats: _,
        } = self;

        if config.population_size == 0 {
            return Err(inconsistent("population size is zero"));
        }
        if !(config.sigma_init.is_finite() && config.sigma_init > 0.0) {
            return Err(inconsistent(format!(
                "initial step size {} is not positive",
                config.sigma_init
            )));
        }
        if policy.action_mode() != config.action_mode {
            return Err(inconsistent(format!(
                "policy action mode {:?} differs from configured {:?}",
                policy.action_mode(),
                config.action_mode
            )));
        }
        let dimension = policy.parameter_count();
        if dimension == 0 {
            return Err(inconsistent("policy has no parameters"));
        }
        if best_parameters.len() != dimension {
            return Err(inconsistent(format!(
                "best parameters have length {}, policy has {dimension} parameters",
                best_parameters.len()
            )));
        }

        let mut trainer = PopulationTrainer::new(config, policy);
        trainer
            .strategy
            .restore(strategy)
            .map_err(|err| inconsistent(err.to_string()))?;
        if trainer.strategy.generation() != generation {
            return Err(inconsistent(format!(
                "generation counter {generation} disagrees with strategy state ({})",
                trainer.strategy.generation()
            )));
        }
        trainer.best_parameters = best_parameters;
        trainer.total_steps = total_steps;
        Ok(trainer)
    }
}

/// Serializes `trainer` into a JSON checkpoint.
pub fn save<P>(trainer: &PopulationTrainer<P>) -> Result<Vec<u8>, CheckpointError>
where
    P: ParameterizedPolicy + Clone + Serialize,
{
    Ok(serde_json::to_vec_pretty(&Checkpoint::capture(trainer))?)
}

/// Restores a trainer from a JSON checkpoint produced by [`save`].
pub fn load<P>(bytes: &[u8]) -> Result<PopulationTrainer<P>, CheckpointError>
where
    P: ParameterizedPolicy + Clone + DeserializeOwned,
{
    serde_json::from_slice::<Checkpoint<P>>(bytes)?.into_trainer()
}

pub fn save_to_path<P>(
    trainer: &PopulationTrainer<P>,
    path: impl AsRef<Path>,
) -> Result<(), CheckpointError>
where
    P: ParameterizedPolicy + Clone + Serialize,
{
    let path = path.as_ref();
    let io_error = |source| CheckpointError::Io {
        path: path.to_owned(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &Checkpoint::capture(trainer))?;
    writeln!(writer).map_err(io_error)?;
    writer.flush().map_err(io_error)?;
    Ok(())
}

pub fn load_from_path<P>(path: impl AsRef<Path>) -> Result<PopulationTrainer<P>, CheckpointError>
where
    P: ParameterizedPolicy + Clone + DeserializeOwned,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CheckpointError::Io {
        path: path.to_owned(),
        source,
    })?;
    let checkpoint: Checkpoint<P> = serde_json::from_reader(BufReader::new(file))?;
    log::debug!(
        "loaded checkpoint saved at {} (generation {}, {} steps)",
        checkpoint.saved_at,
        checkpoint.generation,
        checkpoint.total_steps
    );
    checkpoint.into_trainer()
}
