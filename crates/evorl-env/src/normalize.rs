//! Running observation normalization.
//!
//! [`NormalizeObservation`] keeps a per-coordinate running mean and variance of every
//! observation it passes on, and rescales observations to roughly zero mean and unit
//! variance before the policy sees them. The statistics are part of what a trained
//! policy expects as input, so they are exposed as the serializable
//! [`ObservationStats`] and can be restored with [`NormalizeObservation::with_stats`].

use serde::{Deserialize, Serialize};

use crate::{Action, ActionSpace, EnvError, Observation, StepBatch, VecEnv};

/// Default bound of normalized observation coordinates.
pub const DEFAULT_CLIP: f64 = 10.0;

const VARIANCE_EPSILON: f64 = 1e-8;
/// Pseudo-count the statistics start from, so the first batch does not divide by zero.
const INITIAL_COUNT: f64 = 1e-4;

/// Per-coordinate running mean and variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationStats {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
    pub count: f64,
}

impl ObservationStats {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            mean: vec![0.0; size],
            var: vec![1.0; size],
            count: INITIAL_COUNT,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.mean.len()
    }

    /// Merges the moments of `batch` into the running moments.
    #[expect(clippy::cast_precision_loss)]
    pub fn update<'a, I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let batch = batch.into_iter().collect::<Vec<_>>();
        if batch.is_empty() {
            return;
        }
        let batch_count = batch.len() as f64;
        let total = self.count + batch_count;
        for i in 0..self.size() {
            let batch_mean = batch.iter().map(|o| o[i]).sum::<f64>() / batch_count;
            let batch_var = batch
                .iter()
                .map(|o| (o[i] - batch_mean).powi(2))
                .sum::<f64>()
                / batch_count;
            let delta = batch_mean - self.mean[i];
            let m2 = self.var[i] * self.count
                + batch_var * batch_count
                + delta * delta * self.count * batch_count / total;
            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    /// Rescales `observation` with the current moments and clips it to `[-clip, clip]`.
    #[must_use]
    pub fn normalize(&self, observation: &[f64], clip: f64) -> Observation {
        observation
            .iter()
            .zip(self.mean.iter().zip(&self.var))
            .map(|(x, (mean, var))| {
                ((x - mean) / (var + VARIANCE_EPSILON).sqrt()).clamp(-clip, clip)
            })
            .collect()
    }
}

/// Normalizes the observations of every instance with shared running statistics.
#[derive(Debug)]
pub struct NormalizeObservation<V> {
    inner: V,
    stats: ObservationStats,
    clip: f64,
    update: bool,
}

impl<V> NormalizeObservation<V>
where
    V: VecEnv,
{
    pub fn new(inner: V) -> Self {
        let stats = ObservationStats::new(inner.observation_size());
        Self {
            inner,
            stats,
            clip: DEFAULT_CLIP,
            update: true,
        }
    }

    /// Continues from previously collected statistics.
    pub fn with_stats(inner: V, stats: ObservationStats) -> Result<Self, EnvError> {
        let expected = inner.observation_size();
        if stats.size() != expected || stats.var.len() != expected {
            return Err(EnvError::ObservationShape {
                expected,
                actual: stats.size(),
            });
        }
        Ok(Self {
            inner,
            stats,
            clip: DEFAULT_CLIP,
            update: true,
        })
    }

    /// # Panics
    ///
    /// Panics if `clip` is not positive.
    #[must_use]
    pub fn clip(mut self, clip: f64) -> Self {
        assert!(clip > 0.0, "clip bound must be positive");
        self.clip = clip;
        self
    }

    /// Whether passing observations keep updating the statistics.
    #[must_use]
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    #[must_use]
    pub fn stats(&self) -> &ObservationStats {
        &self.stats
    }

    pub fn into_inner(self) -> V {
        self.inner
    }

    fn check_shape(&self, observation: &Observation) -> Result<(), EnvError> {
        let expected = self.stats.size();
        if observation.len() == expected {
            Ok(())
        } else {
            Err(EnvError::ObservationShape {
                expected,
                actual: observation.len(),
            })
        }
    }

    fn normalize_all(&self, observations: &mut [Observation]) {
        for observation in observations {
            *observation = self.stats.normalize(observation, self.clip);
        }
    }
}

impl<V> VecEnv for NormalizeObservation<V>
where
    V: VecEnv,
{
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn observation_size(&self) -> usize {
        self.inner.observation_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.inner.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        let mut observations = self.inner.reset()?;
        for observation in &observations {
            self.check_shape(observation)?;
        }
        if self.update {
            self.stats.update(&observations);
        }
        self.normalize_all(&mut observations);
        Ok(observations)
    }

    fn step(&mut self, actions: &[Option<Action>]) -> Result<StepBatch, EnvError> {
        let mut batch = self.inner.step(actions)?;
        for observation in &batch.observations {
            self.check_shape(observation)?;
        }
        // instances that were not advanced repeat their last observation
        if self.update {
            let advanced = batch
                .observations
                .iter()
                .zip(&batch.infos)
                .filter(|(_, info)| !info.skipped)
                .map(|(observation, _)| observation);
            self.stats.update(advanced);
        }
        self.normalize_all(&mut batch.observations);
        Ok(batch)
    }
}
