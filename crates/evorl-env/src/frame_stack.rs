use std::collections::VecDeque;

use crate::{Action, ActionSpace, EnvError, Observation, StepBatch, VecEnv};

/// Stacks the last `num_stack` observations of every instance into one vector.
///
/// Frames are concatenated oldest first. After a reset the stack is filled with copies
/// of the initial observation.
#[derive(Debug)]
pub struct FrameStack<V> {
    inner: V,
    num_stack: usize,
    frames: Vec<VecDeque<Observation>>,
}

impl<V> FrameStack<V>
where
    V: VecEnv,
{
    /// # Panics
    ///
    /// Panics if `num_stack` is zero.
    pub fn new(inner: V, num_stack: usize) -> Self {
        assert!(num_stack > 0, "frame stack needs at least one frame");
        Self {
            inner,
            num_stack,
            frames: vec![],
        }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }

    fn check_shape(&self, observation: &Observation) -> Result<(), EnvError> {
        let expected = self.inner.observation_size();
        if observation.len() == expected {
            Ok(())
        } else {
            Err(EnvError::ObservationShape {
                expected,
                actual: observation.len(),
            })
        }
    }

    fn stacked(&self) -> Vec<Observation> {
        self.frames
            .iter()
            .map(|frames| frames.iter().flatten().copied().collect())
            .collect()
    }
}

impl<V> VecEnv for FrameStack<V>
where
    V: VecEnv,
{
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn observation_size(&self) -> usize {
        self.inner.observation_size() * self.num_stack
    }

    fn action_space(&self) -> ActionSpace {
        self.inner.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        let observations = self.inner.reset()?;
        for observation in &observations {
            self.check_shape(observation)?;
        }
        self.frames = observations
            .into_iter()
            .map(|observation| {
                std::iter::repeat_n(observation, self.num_stack).collect::<VecDeque<_>>()
            })
            .collect();
        Ok(self.stacked())
    }

    fn step(&mut self, actions: &[Option<Action>]) -> Result<StepBatch, EnvError> {
        let mut batch = self.inner.step(actions)?;
        for observation in &batch.observations {
            self.check_shape(observation)?;
        }
        if self.frames.len() != batch.observations.len() {
            return Err(EnvError::NotReset { index: self.frames.len() });
        }
        for (frames, observation) in self.frames.iter_mut().zip(batch.observations.drain(..)) {
            frames.pop_front();
            frames.push_back(observation);
        }
        batch.observations = self.stacked();
        Ok(batch)
    }
}
