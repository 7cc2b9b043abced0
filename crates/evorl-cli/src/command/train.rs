use std::path::PathBuf;

use anyhow::Context as _;
use evorl_env::VecEnv;
use evorl_policy::{ActionMode, MlpPolicy, ParameterizedPolicy as _};
use evorl_training::{Checkpoint, PopulationTrainer, TrainerConfig, TrainingSummary};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

use crate::util::{self, EnvKind, EnvOptions, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Environment to train on
    #[arg(long, default_value = "cartpole")]
    env: EnvKind,
    /// Candidates per generation, one environment instance each
    #[arg(long, default_value_t = 20)]
    num_population: usize,
    /// Initial mean of every parameter
    #[arg(long, default_value_t = 0.0)]
    mu: f64,
    /// Initial step size
    #[arg(long, default_value_t = 0.2)]
    sigma: f64,
    /// Total environment step budget, including steps of a resumed checkpoint
    #[arg(long, default_value_t = 100_000)]
    num_timesteps: u64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Hidden layer sizes of the policy network
    #[arg(long, value_delimiter = ',', default_values_t = [100])]
    hidden: Vec<usize>,
    /// Number of consecutive observations fed to the policy
    #[arg(long, default_value_t = 1)]
    num_stack: usize,
    /// Step environment instances on parallel threads
    #[arg(long)]
    parallel: bool,
    /// Normalize observations with running mean and variance
    #[arg(long)]
    normalize: bool,
    /// Output checkpoint path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Checkpoint to continue training from
    #[arg(long)]
    resume: Option<PathBuf>,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg {
        env: env_kind,
        num_population,
        mu,
        sigma,
        num_timesteps,
        seed,
        hidden,
        num_stack,
        parallel,
        normalize,
        output,
        resume,
    } = arg;

    let mut observation_stats = None;
    let mut trainer = match resume {
        Some(path) => {
            let mut checkpoint: Checkpoint<MlpPolicy> =
                util::read_json_file("checkpoint", path)?;
            observation_stats = checkpoint.observation_stats.take();
            eprintln!("Resuming from {}", path.display());
            eprintln!("  Saved at: {}", checkpoint.saved_at);
            eprintln!("  Generation: {}", checkpoint.generation);
            eprintln!("  Steps: {}", checkpoint.total_steps);
            let trainer = checkpoint
                .into_trainer()
                .with_context(|| format!("Failed to restore checkpoint: {}", path.display()))?;
            if observation_stats.is_some() && !*normalize {
                log::warn!("checkpoint carries observation statistics; normalizing observations");
            }
            if trainer.config().population_size != *num_population {
                log::warn!(
                    "using population size {} from checkpoint instead of {num_population}",
                    trainer.config().population_size
                );
            }
            trainer
        }
        None => {
            let env = util::build_env(EnvOptions {
                kind: *env_kind,
                num_envs: 1,
                seed: *seed,
                num_stack: *num_stack,
                parallel: false,
            })?;
            let space = env.action_space();
            let mut layer_sizes = vec![env.observation_size()];
            layer_sizes.extend(hidden);
            layer_sizes.push(space.size());

            let mut rng = Pcg32::seed_from_u64(*seed);
            let mode = ActionMode::for_space(space);
            let policy = MlpPolicy::random(&layer_sizes, mode, &mut rng)
                .with_context(|| format!("Failed to build policy with layers {layer_sizes:?}"))?;
            anyhow::ensure!(*num_population > 0, "--num-population must be at least 1");
            anyhow::ensure!(
                sigma.is_finite() && *sigma > 0.0,
                "--sigma must be positive"
            );
            let config = TrainerConfig {
                population_size: *num_population,
                mean_init: *mu,
                sigma_init: *sigma,
                action_mode: mode,
                seed: *seed,
            };
            PopulationTrainer::new(config, policy)
        }
    };

    let generation = trainer.strategy().generation();
    let env = util::build_env(EnvOptions {
        kind: *env_kind,
        num_envs: trainer.config().population_size,
        seed: util::env_seed(*seed, generation),
        num_stack: *num_stack,
        parallel: *parallel,
    })?;

    eprintln!("Training on {env_kind:?}");
    eprintln!("  Layers: {:?}", trainer.policy().layer_sizes());
    eprintln!("  Parameters: {}", trainer.policy().parameter_count());
    eprintln!("  Population: {}", trainer.config().population_size);
    eprintln!("  Step budget: {num_timesteps}");

    let (summary, observation_stats) = if *normalize || observation_stats.is_some() {
        eprintln!("  Observation normalization: on");
        let mut env = util::normalize_env(env, observation_stats, true)?;
        let summary = train_on(&mut trainer, &mut env, *num_timesteps)?;
        (summary, Some(env.stats().clone()))
    } else {
        let mut env = env;
        (train_on(&mut trainer, &mut env, *num_timesteps)?, None)
    };

    eprintln!();
    eprintln!("Training completed");
    eprintln!("  Generations: {}", trainer.strategy().generation());
    eprintln!("  Total steps: {}", summary.total_steps);
    eprintln!("  Elapsed: {:.1}s", summary.elapsed_secs);
    if let Some(report) = summary.generations.last() {
        eprintln!("  Final sigma: {:.4e}", report.sigma);
        if let Some(stats) = &report.reward_stats {
            eprintln!("  Final rewards:");
            eprintln!("    Min:  {:.3}", stats.min);
            eprintln!("    Max:  {:.3}", stats.max);
            eprintln!("    Mean: {:.3}", stats.mean);
        }
    }
    if let Some(fitness) = trainer.strategy().best_fitness() {
        eprintln!("  Best reward: {:.3}", -fitness);
    }

    let mut checkpoint = Checkpoint::capture(&trainer);
    if let Some(stats) = observation_stats {
        checkpoint = checkpoint.with_observation_stats(stats);
    }
    Output::save_json(&checkpoint, output.clone())?;

    eprintln!();
    eprintln!("Checkpoint saved successfully");
    if let Some(path) = &output {
        eprintln!("  Path: {}", path.display());
    }

    Ok(())
}

fn train_on<V>(
    trainer: &mut PopulationTrainer<MlpPolicy>,
    env: &mut V,
    num_timesteps: u64,
) -> anyhow::Result<TrainingSummary>
where
    V: VecEnv,
{
    util::ensure_policy_fits(trainer.policy(), &*env)?;
    Ok(trainer.train(env, num_timesteps, &mut |_| Ok(()))?)
}
