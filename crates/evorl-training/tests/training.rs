use evorl_env::{
    CartPole, FrameStack, NormalizeObservation, PointReach, SyncVecEnv, VecEnv as _,
};
use evorl_policy::{ActionMode, MlpPolicy};
use evorl_training::{Checkpoint, PopulationTrainer, TrainerConfig, checkpoint};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

const POPULATION: usize = 6;

fn cart_pole_envs(seed: u64) -> SyncVecEnv<CartPole> {
    SyncVecEnv::new(POPULATION, seed, |_| CartPole::new(100))
}

fn cart_pole_trainer(input_size: usize) -> PopulationTrainer<MlpPolicy> {
    let mut rng = Pcg32::seed_from_u64(5);
    let policy = MlpPolicy::random(&[input_size, 8, 2], ActionMode::Discrete, &mut rng).unwrap();
    let config = TrainerConfig {
        population_size: POPULATION,
        seed: 17,
        ..TrainerConfig::default()
    };
    PopulationTrainer::new(config, policy)
}

#[test]
fn restored_checkpoint_continues_identically() {
    let mut trainer = cart_pole_trainer(4);
    let mut envs = cart_pole_envs(1);
    for _ in 0..2 {
        trainer.run_generation(&mut envs, &mut |_| Ok(())).unwrap();
    }

    let bytes = checkpoint::save(&trainer).unwrap();
    let mut restored = checkpoint::load::<MlpPolicy>(&bytes).unwrap();
    assert_eq!(restored.total_steps(), trainer.total_steps());
    assert_eq!(restored.best_parameters(), trainer.best_parameters());
    assert_eq!(restored.strategy().generation(), 2);

    let original = trainer
        .run_generation(&mut cart_pole_envs(9), &mut |_| Ok(()))
        .unwrap();
    let resumed = restored
        .run_generation(&mut cart_pole_envs(9), &mut |_| Ok(()))
        .unwrap();
    assert_eq!(original.fitness, resumed.fitness);
    assert_eq!(original.sigma, resumed.sigma);
    assert_eq!(trainer.strategy().mean(), restored.strategy().mean());
    assert_eq!(trainer.best_parameters(), restored.best_parameters());
}

#[test]
fn checkpoint_file_round_trip() {
    let mut trainer = cart_pole_trainer(4);
    trainer
        .run_generation(&mut cart_pole_envs(2), &mut |_| Ok(()))
        .unwrap();

    let path = std::env::temp_dir().join(format!(
        "evorl-checkpoint-round-trip-{}.json",
        std::process::id()
    ));
    checkpoint::save_to_path(&trainer, &path).unwrap();
    let restored = checkpoint::load_from_path::<MlpPolicy>(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(restored.strategy().mean(), trainer.strategy().mean());
    assert_eq!(restored.strategy().sigma(), trainer.strategy().sigma());
    assert_eq!(restored.total_steps(), trainer.total_steps());
}

#[test]
fn parallel_rollout_matches_sequential() {
    let run = |parallel: bool| {
        let mut trainer = cart_pole_trainer(4);
        let mut envs = cart_pole_envs(3).parallel(parallel);
        (0..2)
            .map(|_| {
                trainer
                    .run_generation(&mut envs, &mut |_| Ok(()))
                    .unwrap()
                    .fitness
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(false), run(true));
}

#[test]
fn budget_bounds_cart_pole_training() {
    let budget = 1_000;
    let mut trainer = cart_pole_trainer(4);
    let summary = trainer
        .train(&mut cart_pole_envs(4), budget, &mut |_| Ok(()))
        .unwrap();
    assert!(summary.total_steps >= budget);
    assert!(summary.total_steps < budget + POPULATION as u64);
    assert_eq!(
        trainer.strategy().generation(),
        summary.generations.len()
    );
    // every completed generation beats or matches the first one's best candidate
    let first_best = summary.generations[0]
        .fitness
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    assert!(trainer.strategy().best_fitness().unwrap() <= first_best);
}

#[test]
fn cart_pole_fitness_is_negative_survival_time() {
    let mut trainer = cart_pole_trainer(4);
    let mut longest = 0;
    let report = trainer
        .run_generation(&mut cart_pole_envs(6), &mut |ctx| {
            longest = ctx.step;
            Ok(())
        })
        .unwrap();
    #[expect(clippy::cast_precision_loss)]
    let longest_reward = (longest - 1) as f64;
    assert!(report.fitness.iter().all(|f| *f <= 0.0 && *f >= -99.0));
    assert!(report.fitness.iter().any(|f| *f == -longest_reward));
}

#[test]
fn frame_stacked_observations_feed_wider_policy() {
    let mut envs = FrameStack::new(cart_pole_envs(7), 3);
    assert_eq!(envs.observation_size(), 12);
    let mut trainer = cart_pole_trainer(12);
    let report = trainer.run_generation(&mut envs, &mut |_| Ok(())).unwrap();
    assert_eq!(report.fitness.len(), POPULATION);
}

#[test]
fn continuous_point_reach_generation() {
    let mut rng = Pcg32::seed_from_u64(8);
    let policy = MlpPolicy::random(&[4, 2], ActionMode::Continuous, &mut rng).unwrap();
    let mut trainer = PopulationTrainer::new(
        TrainerConfig {
            population_size: 4,
            action_mode: ActionMode::Continuous,
            ..TrainerConfig::default()
        },
        policy,
    );
    let mut envs = SyncVecEnv::new(4, 0, |_| PointReach::new(20));
    let report = trainer.run_generation(&mut envs, &mut |_| Ok(())).unwrap();
    // rewards are negative distances, so fitness is non-negative
    assert!(report.fitness.iter().all(|f| *f >= 0.0));

    let returns = trainer.evaluate_best(&mut envs, 6).unwrap();
    assert_eq!(returns.len(), 6);
    assert!(returns.iter().all(|r| *r <= 0.0));
}

#[test]
fn normalized_training_stats_survive_checkpoint() {
    let mut trainer = cart_pole_trainer(8);
    let mut envs = NormalizeObservation::new(FrameStack::new(cart_pole_envs(4), 2));
    trainer.run_generation(&mut envs, &mut |_| Ok(())).unwrap();
    let stats = envs.stats().clone();
    assert!(stats.count > POPULATION as f64);

    let json = serde_json::to_string(
        &Checkpoint::capture(&trainer).with_observation_stats(stats.clone()),
    )
    .unwrap();
    let mut checkpoint: Checkpoint<MlpPolicy> = serde_json::from_str(&json).unwrap();
    let restored_stats = checkpoint.observation_stats.take().unwrap();
    assert_eq!(restored_stats, stats);
    let mut restored = checkpoint.into_trainer().unwrap();

    let frozen = |stats| {
        NormalizeObservation::with_stats(FrameStack::new(cart_pole_envs(8), 2), stats)
            .unwrap()
            .update(false)
    };
    let mut live = frozen(stats);
    let mut resumed = frozen(restored_stats);
    assert_eq!(
        trainer.evaluate_best(&mut live, 3).unwrap(),
        restored.evaluate_best(&mut resumed, 3).unwrap()
    );
    assert_eq!(live.stats(), resumed.stats());
}
