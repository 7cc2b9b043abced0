//! Generation loop driving the search strategy against a vectorized environment.
//!
//! One generation moves through the phases of [`TrainerPhase`]:
//!
//! 1. **Sampling** - ask the strategy for `N` parameter vectors and reset all `N`
//!    environment instances
//! 2. **Rolling out** - lock-step until every instance is done: instance `i` acts with
//!    the policy configured from `population[i]`; finished instances get a no-op
//! 3. **Scoring** - negate the accumulated rewards into fitness and tell the strategy
//!
//! # Reward Masking
//!
//! Done flags are merged with logical OR, and a step's reward is added only to
//! instances that are still not done after merging. The reward of the step on which an
//! instance first reports done is therefore not counted, and nothing after it is.
//!
//! # Step Budget
//!
//! [`PopulationTrainer::train`] counts `N` environment steps per lock-step call. Once
//! the global counter reaches the budget inside a generation, all instances still
//! running are marked done, the partial rewards are scored, and training stops. The
//! counter then ends in `[budget, budget + N)`.

use std::{error::Error, time::Instant};

use evorl_env::{Action, EnvError, Observation, StepInfo, VecEnv};
use evorl_policy::{ActionMode, ParameterizedPolicy, PolicyError};
use evorl_stats::descriptive::DescriptiveStats;
use serde::{Deserialize, Serialize};

use crate::cma_es::{CmaEs, StrategyError};

/// Error type step callbacks may return.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Candidates per generation; must equal the number of environment instances.
    pub population_size: usize,
    /// Initial value of every coordinate of the search mean.
    pub mean_init: f64,
    /// Initial global step size.
    pub sigma_init: f64,
    /// Action mode the policy must use.
    pub action_mode: ActionMode,
    /// Seed of the strategy's random generator.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            mean_init: 0.0,
            sigma_init: 0.2,
            action_mode: ActionMode::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum TrainerPhase {
    Idle,
    SamplingPopulation,
    RollingOut,
    ScoringGeneration,
}

/// Local state of the rollout loop, handed to the step callback after every step.
#[derive(Debug)]
pub struct StepContext<'a> {
    /// Number of generations completed before this one.
    pub generation: usize,
    /// 1-based index of the lock-step call within this rollout.
    pub step: usize,
    pub total_steps: u64,
    pub population: &'a [Vec<f64>],
    /// Actions submitted this step; `None` for instances already done.
    pub actions: &'a [Option<Action>],
    pub observations: &'a [Observation],
    /// Raw rewards returned by this step, before masking.
    pub rewards: &'a [f64],
    /// Merged done flags.
    pub dones: &'a [bool],
    pub cumulative_rewards: &'a [f64],
    pub infos: &'a [StepInfo],
}

/// Summary of one completed generation.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Number of generations completed, including this one.
    pub generation: usize,
    pub rollout_steps: usize,
    /// Global step counter after this generation.
    pub total_steps: u64,
    /// Negated cumulative rewards, index-aligned with the population.
    pub fitness: Vec<f64>,
    pub reward_stats: Option<DescriptiveStats>,
    /// Step size after the update.
    pub sigma: f64,
    pub best_fitness: Option<f64>,
    /// The rollout was cut short by the step budget.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub generations: Vec<GenerationReport>,
    pub total_steps: u64,
    pub elapsed_secs: f64,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum TrainerError {
    #[display("policy error: {_0}")]
    Policy(PolicyError),
    #[display("search strategy error: {_0}")]
    Strategy(StrategyError),
    #[display("environment error: {_0}")]
    Env(EnvError),
    #[display("step callback failed: {_0}")]
    Callback(#[error(not(source))] BoxError),
    #[display("environment batch has {actual} instances, population has {expected}")]
    EnvCount { expected: usize, actual: usize },
}

impl From<PolicyError> for TrainerError {
    fn from(err: PolicyError) -> Self {
        TrainerError::Policy(err)
    }
}

impl From<StrategyError> for TrainerError {
    fn from(err: StrategyError) -> Self {
        TrainerError::Strategy(err)
    }
}

impl From<EnvError> for TrainerError {
    fn from(err: EnvError) -> Self {
        TrainerError::Env(err)
    }
}

/// Rewards accumulated by one lock-step rollout.
#[derive(Debug, Clone)]
struct Rollout {
    cumulative_rewards: Vec<f64>,
    steps: usize,
    truncated: bool,
}

/// Runs `population[i]` on instance `i` until every instance is done or the step
/// counter reaches `step_limit`.
fn rollout<P, V, C>(
    policy: &mut P,
    env: &mut V,
    population: &[Vec<f64>],
    generation: usize,
    total_steps: &mut u64,
    step_limit: Option<u64>,
    callback: &mut C,
) -> Result<Rollout, TrainerError>
where
    P: ParameterizedPolicy + ?Sized,
    V: VecEnv + ?Sized,
    C: FnMut(&StepContext<'_>) -> Result<(), BoxError>,
{
    let n = population.len();
    let check_count = |actual: usize| {
        if actual == n {
            Ok(())
        } else {
            Err(TrainerError::EnvCount {
                expected: n,
                actual,
            })
        }
    };
    check_count(env.num_envs())?;

    let mut observations = env.reset()?;
    check_count(observations.len())?;
    let mut cumulative_rewards = vec![0.0; n];
    let mut dones = vec![false; n];
    let mut steps = 0;
    let mut truncated = false;

    while !dones.iter().all(|done| *done) {
        let actions = population
            .iter()
            .zip(&observations)
            .zip(&dones)
            .map(|((parameters, observation), done)| {
                if *done {
                    return Ok(None);
                }
                policy.set_parameters(parameters)?;
                policy.select_action(observation).map(Some)
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;

        let batch = env.step(&actions)?;
        check_count(batch.observations.len())?;
        check_count(batch.rewards.len())?;
        check_count(batch.dones.len())?;
        *total_steps += n as u64;
        steps += 1;

        for ((done, cumulative), (new_done, reward)) in dones
            .iter_mut()
            .zip(&mut cumulative_rewards)
            .zip(batch.dones.iter().zip(&batch.rewards))
        {
            *done |= *new_done;
            if !*done {
                *cumulative += reward;
            }
        }
        observations = batch.observations;

        callback(&StepContext {
            generation,
            step: steps,
            total_steps: *total_steps,
            population,
            actions: &actions,
            observations: &observations,
            rewards: &batch.rewards,
            dones: &dones,
            cumulative_rewards: &cumulative_rewards,
            infos: &batch.infos,
        })
        .map_err(TrainerError::Callback)?;

        if let Some(limit) = step_limit
            && *total_steps >= limit
            && !dones.iter().all(|done| *done)
        {
            dones.fill(true);
            truncated = true;
        }
    }

    Ok(Rollout {
        cumulative_rewards,
        steps,
        truncated,
    })
}

/// Population-based trainer: CMA-ES over the flat parameters of `P`.
#[derive(Debug, Clone)]
pub struct PopulationTrainer<P> {
    pub(crate) config: TrainerConfig,
    pub(crate) policy: P,
    pub(crate) strategy: CmaEs,
    pub(crate) best_parameters: Vec<f64>,
    pub(crate) total_steps: u64,
    phase: TrainerPhase,
}

impl<P> PopulationTrainer<P>
where
    P: ParameterizedPolicy,
{
    /// Creates a trainer whose search space is the parameter space of `policy`.
    ///
    /// # Panics
    ///
    /// Panics if the population size is zero, the initial step size is not positive, the
    /// policy has no parameters, or its action mode differs from `config.action_mode`.
    #[must_use]
    pub fn new(config: TrainerConfig, policy: P) -> Self {
        assert_eq!(
            policy.action_mode(),
            config.action_mode,
            "policy action mode must match the configured action mode"
        );
        let strategy = CmaEs::new(
            policy.parameter_count(),
            config.mean_init,
            config.sigma_init,
            config.population_size,
            config.seed,
        );
        let best_parameters = strategy.current_best().to_vec();
        Self {
            config,
            policy,
            strategy,
            best_parameters,
            total_steps: 0,
            phase: TrainerPhase::Idle,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    #[must_use]
    pub fn strategy(&self) -> &CmaEs {
        &self.strategy
    }

    /// Best parameters found so far, refreshed after every generation.
    #[must_use]
    pub fn best_parameters(&self) -> &[f64] {
        &self.best_parameters
    }

    /// Environment steps taken across all generations (`N` per lock-step call).
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    #[must_use]
    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    /// Runs one full generation: ask, lock-step rollout until every instance is done,
    /// tell.
    pub fn run_generation<V, C>(
        &mut self,
        env: &mut V,
        callback: &mut C,
    ) -> Result<GenerationReport, TrainerError>
    where
        V: VecEnv + ?Sized,
        C: FnMut(&StepContext<'_>) -> Result<(), BoxError>,
    {
        self.run_generation_with_limit(env, None, callback)
    }

    /// Runs one generation and returns to [`TrainerPhase::Idle`] whether or not it
    /// succeeded.
    fn run_generation_with_limit<V, C>(
        &mut self,
        env: &mut V,
        step_limit: Option<u64>,
        callback: &mut C,
    ) -> Result<GenerationReport, TrainerError>
    where
        V: VecEnv + ?Sized,
        C: FnMut(&StepContext<'_>) -> Result<(), BoxError>,
    {
        let result = self.step_generation(env, step_limit, callback);
        self.phase = TrainerPhase::Idle;
        result
    }

    fn step_generation<V, C>(
        &mut self,
        env: &mut V,
        step_limit: Option<u64>,
        callback: &mut C,
    ) -> Result<GenerationReport, TrainerError>
    where
        V: VecEnv + ?Sized,
        C: FnMut(&StepContext<'_>) -> Result<(), BoxError>,
    {
        self.phase = TrainerPhase::SamplingPopulation;
        let population = self.strategy.ask();

        self.phase = TrainerPhase::RollingOut;
        let rollout = rollout(
            &mut self.policy,
            env,
            &population,
            self.strategy.generation(),
            &mut self.total_steps,
            step_limit,
            callback,
        )?;

        self.phase = TrainerPhase::ScoringGeneration;
        let fitness = rollout
            .cumulative_rewards
            .iter()
            .map(|reward| -reward)
            .collect::<Vec<_>>();
        self.strategy.tell(&population, &fitness)?;
        self.best_parameters = self.strategy.current_best().to_vec();

        Ok(GenerationReport {
            generation: self.strategy.generation(),
            rollout_steps: rollout.steps,
            total_steps: self.total_steps,
            reward_stats: DescriptiveStats::new(rollout.cumulative_rewards.iter().copied()),
            fitness,
            sigma: self.strategy.sigma(),
            best_fitness: self.strategy.best_fitness(),
            truncated: rollout.truncated,
        })
    }

    /// Runs generations until the global step counter reaches `step_budget`.
    ///
    /// Logs step count and throughput once per generation.
    pub fn train<V, C>(
        &mut self,
        env: &mut V,
        step_budget: u64,
        callback: &mut C,
    ) -> Result<TrainingSummary, TrainerError>
    where
        V: VecEnv + ?Sized,
        C: FnMut(&StepContext<'_>) -> Result<(), BoxError>,
    {
        let start = Instant::now();
        let start_steps = self.total_steps;
        let mut generations = vec![];

        while self.total_steps < step_budget {
            let report = self.run_generation_with_limit(env, Some(step_budget), callback)?;

            let elapsed = start.elapsed().as_secs_f64();
            #[expect(clippy::cast_precision_loss)]
            let fps = (self.total_steps - start_steps) as f64 / elapsed.max(f64::EPSILON);
            match &report.reward_stats {
                Some(stats) => log::info!(
                    "{} steps - {fps:.2} FPS - reward min {:.3} / mean {:.3} / max {:.3}",
                    self.total_steps,
                    stats.min,
                    stats.mean,
                    stats.max
                ),
                None => log::info!("{} steps - {fps:.2} FPS", self.total_steps),
            }
            log::debug!(
                "generation {}: sigma {:.4e}, condition {:.3e}",
                report.generation,
                report.sigma,
                self.strategy.condition_number()
            );
            generations.push(report);
        }

        Ok(TrainingSummary {
            generations,
            total_steps: self.total_steps,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Plays `episodes` episodes with the best parameters found so far.
    ///
    /// See [`evaluate_parameters`]; the global step counter is left untouched.
    pub fn evaluate_best<V>(&mut self, env: &mut V, episodes: usize) -> Result<Vec<f64>, TrainerError>
    where
        V: VecEnv + ?Sized,
    {
        evaluate_parameters(&mut self.policy, &self.best_parameters, env, episodes)
    }
}

/// Plays `episodes` episodes with `policy` configured from `parameters` and returns each
/// episode's cumulative reward, masked the same way as during training.
///
/// Episodes run in batches of `env.num_envs()`, all instances sharing the same
/// parameters. The policy is left configured with `parameters`.
pub fn evaluate_parameters<P, V>(
    policy: &mut P,
    parameters: &[f64],
    env: &mut V,
    episodes: usize,
) -> Result<Vec<f64>, TrainerError>
where
    P: ParameterizedPolicy + ?Sized,
    V: VecEnv + ?Sized,
{
    policy.set_parameters(parameters)?;
    let batch = vec![parameters.to_vec(); env.num_envs()];
    let mut returns = Vec::with_capacity(episodes);
    let mut steps = 0;
    let mut round = 0;
    while returns.len() < episodes {
        let rollout = rollout(policy, env, &batch, round, &mut steps, None, &mut |_| Ok(()))?;
        if rollout.cumulative_rewards.is_empty() {
            break;
        }
        let remaining = episodes - returns.len();
        returns.extend(rollout.cumulative_rewards.into_iter().take(remaining));
        round += 1;
    }
    log::debug!("evaluated {episodes} episodes in {steps} steps");
    Ok(returns)
}
