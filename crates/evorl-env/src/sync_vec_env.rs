use std::thread;

use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Action, ActionSpace, Env, EnvError, Observation, StepBatch, StepInfo};

/// Lock-step batch of [`Env`] instances owned by the current process.
///
/// Each `reset()` draws one seed per instance from the batch's own generator, so a
/// batch built with the same seed replays the same episodes.
///
/// With [`parallel`](Self::parallel) enabled every instance is stepped on its own
/// scoped thread; the call still returns only after all of them finished.
///
/// # Example
///
/// ```
/// use evorl_env::{Action, CartPole, SyncVecEnv, VecEnv as _};
///
/// let mut envs = SyncVecEnv::new(4, 0, |_| CartPole::default());
/// let observations = envs.reset().unwrap();
/// assert_eq!(observations.len(), 4);
///
/// let actions = vec![Some(Action::Discrete(0)), None, Some(Action::Discrete(1)), None];
/// let batch = envs.step(&actions).unwrap();
/// assert!(batch.infos[1].skipped);
/// ```
#[derive(Debug)]
pub struct SyncVecEnv<E> {
    slots: Vec<Slot<E>>,
    rng: Pcg32,
    parallel: bool,
}

#[derive(Debug)]
struct Slot<E> {
    env: E,
    last_observation: Option<Observation>,
    done: bool,
    episode_steps: usize,
}

#[derive(Debug)]
struct SlotStep {
    observation: Observation,
    reward: f64,
    done: bool,
    info: StepInfo,
}

impl<E> SyncVecEnv<E>
where
    E: Env,
{
    /// Builds `count` instances with `factory`, which receives the instance index.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new<F>(count: usize, seed: u64, factory: F) -> Self
    where
        F: FnMut(usize) -> E,
    {
        Self::from_envs((0..count).map(factory).collect(), seed)
    }

    /// # Panics
    ///
    /// Panics if `envs` is empty.
    #[must_use]
    pub fn from_envs(envs: Vec<E>, seed: u64) -> Self {
        assert!(!envs.is_empty(), "vectorized environment needs at least one instance");
        let slots = envs
            .into_iter()
            .map(|env| Slot {
                env,
                last_observation: None,
                done: false,
                episode_steps: 0,
            })
            .collect();
        Self {
            slots,
            rng: Pcg32::seed_from_u64(seed),
            parallel: false,
        }
    }

    /// Enables or disables stepping instances on scoped threads.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn envs(&self) -> impl Iterator<Item = &E> + '_ {
        self.slots.iter().map(|slot| &slot.env)
    }
}

impl<E> Slot<E>
where
    E: Env,
{
    fn step(
        &mut self,
        index: usize,
        action: Option<&Action>,
        space: ActionSpace,
    ) -> Result<SlotStep, EnvError> {
        let Some(action) = action else {
            let observation = self
                .last_observation
                .clone()
                .ok_or(EnvError::NotReset { index })?;
            return Ok(SlotStep {
                observation,
                reward: 0.0,
                done: self.done,
                info: StepInfo {
                    episode_steps: self.episode_steps,
                    truncated: false,
                    skipped: true,
                },
            });
        };

        if self.last_observation.is_none() {
            return Err(EnvError::NotReset { index });
        }
        if !space.contains(action) {
            return Err(EnvError::InvalidAction {
                action: action.clone(),
                space,
            });
        }

        let transition = self.env.step(action)?;
        self.episode_steps += 1;
        self.done = transition.done;
        self.last_observation = Some(transition.observation.clone());
        Ok(SlotStep {
            observation: transition.observation,
            reward: transition.reward,
            done: transition.done,
            info: StepInfo {
                episode_steps: self.episode_steps,
                truncated: transition.truncated,
                skipped: false,
            },
        })
    }
}

impl<E> crate::VecEnv for SyncVecEnv<E>
where
    E: Env + Send,
{
    fn num_envs(&self) -> usize {
        self.slots.len()
    }

    fn observation_size(&self) -> usize {
        self.slots[0].env.observation_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.slots[0].env.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        self.slots
            .iter_mut()
            .map(|slot| {
                let seed = self.rng.random::<u64>();
                let observation = slot.env.reset(seed)?;
                slot.last_observation = Some(observation.clone());
                slot.done = false;
                slot.episode_steps = 0;
                Ok(observation)
            })
            .collect()
    }

    fn step(&mut self, actions: &[Option<Action>]) -> Result<StepBatch, EnvError> {
        if actions.len() != self.slots.len() {
            return Err(EnvError::ActionCount {
                expected: self.slots.len(),
                actual: actions.len(),
            });
        }
        let space = self.action_space();

        let steps = if self.parallel {
            thread::scope(|s| {
                let handles = self
                    .slots
                    .iter_mut()
                    .zip(actions)
                    .enumerate()
                    .map(|(index, (slot, action))| {
                        s.spawn(move || slot.step(index, action.as_ref(), space))
                    })
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .enumerate()
                    .map(|(index, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            Err(EnvError::Instance {
                                index,
                                message: "worker thread panicked".to_owned(),
                            })
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })?
        } else {
            self.slots
                .iter_mut()
                .zip(actions)
                .enumerate()
                .map(|(index, (slot, action))| slot.step(index, action.as_ref(), space))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut batch = StepBatch {
            observations: Vec::with_capacity(steps.len()),
            rewards: Vec::with_capacity(steps.len()),
            dones: Vec::with_capacity(steps.len()),
            infos: Vec::with_capacity(steps.len()),
        };
        for step in steps {
            batch.observations.push(step.observation);
            batch.rewards.push(step.reward);
            batch.dones.push(step.done);
            batch.infos.push(step.info);
        }
        Ok(batch)
    }
}
