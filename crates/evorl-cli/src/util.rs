use std::{
    fs::File,
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use evorl_env::{
    CartPole, FrameStack, NormalizeObservation, ObservationStats, PointReach, SyncVecEnv, VecEnv,
};
use evorl_policy::{ActionMode, MlpPolicy, ParameterizedPolicy as _};
use rand::Rng as _;
use rand_pcg::Pcg32;

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Built-in environments selectable from the command line.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, derive_more::FromStr)]
pub enum EnvKind {
    #[default]
    CartPole,
    PointReach,
}

/// Options shared by every command that builds an environment batch.
#[derive(Debug, Clone, Copy)]
pub struct EnvOptions {
    pub kind: EnvKind,
    pub num_envs: usize,
    pub seed: u64,
    pub num_stack: usize,
    pub parallel: bool,
}

/// Builds `num_envs` lock-step instances, stacking frames when `num_stack > 1`.
pub fn build_env(options: EnvOptions) -> anyhow::Result<Box<dyn VecEnv>> {
    let EnvOptions {
        kind,
        num_envs,
        seed,
        num_stack,
        parallel,
    } = options;
    anyhow::ensure!(num_envs > 0, "at least one environment instance is required");
    anyhow::ensure!(num_stack > 0, "--num-stack must be at least 1");

    let env: Box<dyn VecEnv> = match kind {
        EnvKind::CartPole => Box::new(
            SyncVecEnv::new(num_envs, seed, |_| CartPole::default()).parallel(parallel),
        ),
        EnvKind::PointReach => Box::new(
            SyncVecEnv::new(num_envs, seed, |_| PointReach::default()).parallel(parallel),
        ),
    };
    if num_stack > 1 {
        Ok(Box::new(FrameStack::new(env, num_stack)))
    } else {
        Ok(env)
    }
}

/// Wraps `env` in observation normalization, continuing from `stats` when given.
///
/// With `update` off the statistics stay frozen, as when evaluating a trained policy.
pub fn normalize_env(
    env: Box<dyn VecEnv>,
    stats: Option<ObservationStats>,
    update: bool,
) -> anyhow::Result<NormalizeObservation<Box<dyn VecEnv>>> {
    let env = match stats {
        Some(stats) => NormalizeObservation::with_stats(env, stats)
            .context("Observation statistics do not fit the environment")?,
        None => NormalizeObservation::new(env),
    };
    Ok(env.update(update))
}

/// Seed of the environment batch for a run that starts at `generation`.
///
/// A fresh run uses `seed` as is. A resumed run derives a seed from the generation, so
/// it does not replay the episodes the first generations were scored on.
pub fn env_seed(seed: u64, generation: usize) -> u64 {
    if generation == 0 {
        return seed;
    }
    Pcg32::new(seed, generation as u64).random()
}

/// Checks that `policy` reads the environment's observations and emits its actions.
pub fn ensure_policy_fits(policy: &MlpPolicy, env: &dyn VecEnv) -> anyhow::Result<()> {
    anyhow::ensure!(
        policy.input_size() == env.observation_size(),
        "policy expects observations of length {}, environment produces {}",
        policy.input_size(),
        env.observation_size()
    );
    anyhow::ensure!(
        policy.output_size() == env.action_space().size(),
        "policy produces {} outputs, environment action space has size {}",
        policy.output_size(),
        env.action_space().size()
    );
    anyhow::ensure!(
        policy.action_mode() == ActionMode::for_space(env.action_space()),
        "policy action mode {:?} does not match action space {:?}",
        policy.action_mode(),
        env.action_space()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(num_stack: usize) -> EnvOptions {
        EnvOptions {
            kind: EnvKind::CartPole,
            num_envs: 2,
            seed: 0,
            num_stack,
            parallel: false,
        }
    }

    #[test]
    fn test_env_seed_of_fresh_run() {
        assert_eq!(env_seed(0, 0), 0);
        assert_eq!(env_seed(42, 0), 42);
    }

    #[test]
    fn test_env_seed_changes_on_resume() {
        let seeds = (0..5).map(|generation| env_seed(7, generation)).collect::<Vec<_>>();
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(env_seed(7, 3), env_seed(7, 3));
        assert_ne!(env_seed(7, 3), env_seed(8, 3));
    }

    #[test]
    fn test_resumed_env_plays_other_episodes() {
        let mut fresh = build_env(options(1)).unwrap();
        let mut resumed = build_env(EnvOptions {
            seed: env_seed(0, 4),
            ..options(1)
        })
        .unwrap();
        assert_ne!(fresh.reset().unwrap(), resumed.reset().unwrap());
    }

    #[test]
    fn test_normalize_env_wraps_stacked_frames() {
        let env = build_env(options(3)).unwrap();
        let size = env.observation_size();
        let mut env = normalize_env(env, None, true).unwrap();
        assert_eq!(env.observation_size(), size);
        let observations = env.reset().unwrap();
        assert!(observations.iter().all(|o| o.len() == size));
        assert!(env.stats().count > 1.0);
    }

    #[test]
    fn test_normalize_env_rejects_foreign_stats() {
        let env = build_env(options(1)).unwrap();
        let stats = ObservationStats::new(env.observation_size() + 1);
        assert!(normalize_env(env, Some(stats), false).is_err());
    }

    #[test]
    fn test_frozen_normalization_keeps_stats() {
        let env = build_env(options(1)).unwrap();
        let stats = ObservationStats::new(env.observation_size());
        let mut env = normalize_env(env, Some(stats.clone()), false).unwrap();
        env.reset().unwrap();
        assert_eq!(env.stats(), &stats);
    }

    #[test]
    fn test_policy_mode_must_match_space() {
        let env = build_env(options(1)).unwrap();
        let sizes = [env.observation_size(), env.action_space().size()];
        let discrete = MlpPolicy::zeros(&sizes, ActionMode::Discrete).unwrap();
        ensure_policy_fits(&discrete, env.as_ref()).unwrap();
        let continuous = MlpPolicy::zeros(&sizes, ActionMode::Continuous).unwrap();
        assert!(ensure_policy_fits(&continuous, env.as_ref()).is_err());
    }
}
