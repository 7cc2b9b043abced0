use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Utc;
use evorl_policy::MlpPolicy;
use evorl_stats::descriptive::DescriptiveStats;
use evorl_training::Checkpoint;

use crate::util::{self, EnvKind, EnvOptions};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct EvaluateArg {
    /// Checkpoint written by the train command
    #[arg(long)]
    checkpoint: PathBuf,
    /// Environment the checkpoint was trained on
    #[arg(long, default_value = "cartpole")]
    env: EnvKind,
    /// Number of episodes to play
    #[arg(long, default_value_t = 10)]
    episodes: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Number of consecutive observations fed to the policy
    #[arg(long, default_value_t = 1)]
    num_stack: usize,
}

pub(crate) fn run(arg: &EvaluateArg) -> anyhow::Result<()> {
    let EvaluateArg {
        checkpoint: path,
        env: env_kind,
        episodes,
        seed,
        num_stack,
    } = arg;
    anyhow::ensure!(*episodes > 0, "--episodes must be at least 1");

    let mut checkpoint: Checkpoint<MlpPolicy> = util::read_json_file("checkpoint", path)?;
    let saved_at = checkpoint.saved_at;
    let observation_stats = checkpoint.observation_stats.take();
    let mut trainer = checkpoint
        .into_trainer()
        .with_context(|| format!("Failed to restore checkpoint: {}", path.display()))?;

    let env = util::build_env(EnvOptions {
        kind: *env_kind,
        num_envs: *episodes,
        seed: *seed,
        num_stack: *num_stack,
        parallel: false,
    })?;
    util::ensure_policy_fits(trainer.policy(), env.as_ref())?;

    let normalized = observation_stats.is_some();
    let returns = match observation_stats {
        Some(stats) => {
            let mut env = util::normalize_env(env, Some(stats), false)?;
            trainer.evaluate_best(&mut env, *episodes)?
        }
        None => {
            let mut env = env;
            trainer.evaluate_best(&mut env, *episodes)?
        }
    };

    eprintln!("Evaluated {}", path.display());
    eprintln!(
        "  Saved at: {saved_at} ({} minutes ago)",
        (Utc::now() - saved_at).num_minutes()
    );
    eprintln!("  Generation: {}", trainer.strategy().generation());
    eprintln!("  Training steps: {}", trainer.total_steps());
    eprintln!(
        "  Observation normalization: {}",
        if normalized { "on" } else { "off" }
    );
    eprintln!("  Episodes:");
    for (i, episode_return) in returns.iter().enumerate() {
        eprintln!("  {i:3}: {episode_return:.3}");
    }
    if let Some(stats) = DescriptiveStats::new(returns.iter().copied()) {
        eprintln!("  Return Stats:");
        eprintln!("    Min:    {:.3}", stats.min);
        eprintln!("    Max:    {:.3}", stats.max);
        eprintln!("    Mean:   {:.3}", stats.mean);
        eprintln!("    Median: {:.3}", stats.median);
        eprintln!("    Stddev: {:.3}", stats.std_dev);
    }

    Ok(())
}
