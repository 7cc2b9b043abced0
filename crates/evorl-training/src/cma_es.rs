//! Covariance Matrix Adaptation Evolution Strategy.
//!
//! [`CmaEs`] keeps a Gaussian search distribution `N(m, σ² C)` over parameter vectors
//! and adapts it from ranked fitness feedback (lower is better):
//!
//! 1. **Ask** - sample `λ` candidates `x = m + σ B D z` with `z ~ N(0, I)` and `C = B D² Bᵀ`
//! 2. **Evaluate** - the caller scores every candidate
//! 3. **Tell** - rank candidates, recombine the best `μ` into the new mean, update the
//!    step-size path (cumulative step-size adaptation) and the covariance path, then
//!    apply the rank-one and rank-μ covariance updates
//!
//! `ask` and `tell` strictly alternate: `tell` accepts only the exact population
//! returned by the immediately preceding `ask`.
//!
//! # Randomness
//!
//! The strategy owns a seeded [`Pcg32`]. Its state is part of [`CmaEsState`], so a
//! restored strategy samples exactly the population the original would have.
//!
//! # Non-finite Fitness
//!
//! NaN and infinite fitness values rank after every finite value (ties keep population
//! order). They are never reported as errors.
//!
//! # Example
//!
//! ```
//! use evorl_training::cma_es::CmaEs;
//!
//! let mut es = CmaEs::new(3, 1.0, 0.5, 8, 0);
//! for _ in 0..150 {
//!     let population = es.ask();
//!     let fitness = population
//!         .iter()
//!         .map(|x| x.iter().map(|v| v * v).sum())
//!         .collect::<Vec<f64>>();
//!     es.tell(&population, &fitness).unwrap();
//! }
//! assert!(es.best_fitness().unwrap() < 1e-6);
//! ```

use rand::{Rng as _, SeedableRng as _};
use rand_distr::StandardNormal;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::eigen::{self, SymmetricEigen};

/// Smallest eigenvalue kept, relative to the largest one.
const MIN_EIGENVALUE_RATIO: f64 = 1e-14;

/// Constants derived from the dimension and population size.
///
/// Never serialized; always recomputed by [`CmaEs::new`].
#[derive(Debug, Clone)]
struct Constants {
    mu: usize,
    weights: Vec<f64>,
    mu_eff: f64,
    c_sigma: f64,
    d_sigma: f64,
    c_c: f64,
    c_1: f64,
    c_mu: f64,
    chi_n: f64,
    eigen_interval: usize,
}

impl Constants {
    #[expect(clippy::cast_precision_loss)]
    fn new(dimension: usize, population_size: usize) -> Self {
        let n = dimension as f64;
        let lambda = population_size as f64;
        let mu = (population_size / 2).max(1);

        let mut weights = (0..mu)
            .map(|i| ((lambda + 1.0) / 2.0).ln() - ((i + 1) as f64).ln())
            .collect::<Vec<_>>();
        let sum = weights.iter().sum::<f64>();
        if sum > 0.0 {
            for w in &mut weights {
                *w /= sum;
            }
        } else {
            weights = vec![1.0 / mu as f64; mu];
        }
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        let c_1 = 2.0 / ((n + 1.3).powi(2) + mu_eff);
        let c_mu =
            (2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((n + 2.0).powi(2) + mu_eff)).min(1.0 - c_1);
        let chi_n = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n * n));

        // O(n^3) decomposition is refreshed every few generations only
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let eigen_interval = (lambda / (c_1 + c_mu) / n / 10.0).floor() as usize;

        Self {
            mu,
            weights,
            mu_eff,
            c_sigma,
            d_sigma,
            c_c,
            c_1,
            c_mu,
            chi_n,
            eigen_interval,
        }
    }
}

/// Best candidate seen across all generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSolution {
    pub parameters: Vec<f64>,
    pub fitness: f64,
}

/// Evolving state of the search distribution.
///
/// Matrices are dense row-major `n * n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmaEsState {
    dimension: usize,
    population_size: usize,
    mean: Vec<f64>,
    sigma: f64,
    covariance: Vec<f64>,
    path_sigma: Vec<f64>,
    path_c: Vec<f64>,
    /// Eigenvalues of the covariance (`D²`).
    eigenvalues: Vec<f64>,
    /// Eigenvectors of the covariance as columns (`B`).
    eigenvectors: Vec<f64>,
    eigen_generation: usize,
    generation: usize,
    best: Option<BestSolution>,
    /// Population handed out by the last `ask`, awaiting `tell`.
    pending: Option<Vec<Vec<f64>>>,
    rng: Pcg32,
}

impl CmaEsState {
    fn check_shapes(&self) -> Result<(), String> {
        let n = self.dimension;
        let vectors = [
            ("mean", self.mean.len(), n),
            ("path_sigma", self.path_sigma.len(), n),
            ("path_c", self.path_c.len(), n),
            ("eigenvalues", self.eigenvalues.len(), n),
            ("covariance", self.covariance.len(), n * n),
            ("eigenvectors", self.eigenvectors.len(), n * n),
        ];
        for (name, actual, expected) in vectors {
            if actual != expected {
                return Err(format!("{name} has length {actual}, expected {expected}"));
            }
        }
        if let Some(best) = &self.best
            && best.parameters.len() != n
        {
            return Err(format!(
                "best solution has length {}, expected {n}",
                best.parameters.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StrategyError {
    #[display("protocol violation: {_0}")]
    ProtocolViolation(ProtocolViolation),
    #[display("incompatible strategy state: {reason}")]
    IncompatibleState { reason: String },
}

impl From<ProtocolViolation> for StrategyError {
    fn from(violation: ProtocolViolation) -> Self {
        StrategyError::ProtocolViolation(violation)
    }
}

/// Misuse of the ask/tell protocol.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ProtocolViolation {
    #[display("tell called without a preceding ask")]
    TellWithoutAsk,
    #[display("population differs from the one returned by the preceding ask")]
    PopulationMismatch,
    #[display("fitness has {actual} entries, population has {expected}")]
    FitnessLength { expected: usize, actual: usize },
}

/// CMA-ES search strategy over `dimension`-length parameter vectors.
#[derive(Debug, Clone)]
pub struct CmaEs {
    state: CmaEsState,
    constants: Constants,
}

impl CmaEs {
    /// Creates a strategy with mean `mean_init` in every coordinate, step size
    /// `sigma_init`, identity covariance and `population_size` candidates per generation.
    ///
    /// # Panics
    ///
    /// Panics if `dimension` or `population_size` is zero, or `sigma_init` is not positive.
    #[must_use]
    pub fn new(
        dimension: usize,
        mean_init: f64,
        sigma_init: f64,
        population_size: usize,
        seed: u64,
    ) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        assert!(population_size > 0, "population size must be positive");
        assert!(sigma_init > 0.0, "initial step size must be positive");

        let state = CmaEsState {
            dimension,
            population_size,
            mean: vec![mean_init; dimension],
            sigma: sigma_init,
            covariance: eigen::identity(dimension),
            path_sigma: vec![0.0; dimension],
            path_c: vec![0.0; dimension],
            eigenvalues: vec![1.0; dimension],
            eigenvectors: eigen::identity(dimension),
            eigen_generation: 0,
            generation: 0,
            best: None,
            pending: None,
            rng: Pcg32::seed_from_u64(seed),
        };
        Self {
            state,
            constants: Constants::new(dimension, population_size),
        }
    }

    /// Replaces the evolving state with `state`, keeping this strategy's derived constants.
    ///
    /// Fails if `state` was produced for a different dimension or population size.
    pub fn restore(&mut self, state: CmaEsState) -> Result<(), StrategyError> {
        if state.dimension != self.state.dimension
            || state.population_size != self.state.population_size
        {
            return Err(StrategyError::IncompatibleState {
                reason: format!(
                    "state is for dimension {} and population {}, strategy has {} and {}",
                    state.dimension,
                    state.population_size,
                    self.state.dimension,
                    self.state.population_size
                ),
            });
        }
        state
            .check_shapes()
            .map_err(|reason| StrategyError::IncompatibleState { reason })?;
        self.state = state;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &CmaEsState {
        &self.state
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.state.dimension
    }

    #[must_use]
    pub fn population_size(&self) -> usize {
        self.state.population_size
    }

    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.state.mean
    }

    #[must_use]
    pub fn sigma(&self) -> f64 {
        self.state.sigma
    }

    /// Number of completed `tell` calls.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.state.generation
    }

    /// Ratio of the largest to the smallest covariance eigenvalue.
    #[must_use]
    pub fn condition_number(&self) -> f64 {
        let max = self.state.eigenvalues.iter().copied().fold(0.0, f64::max);
        let min = self
            .state
            .eigenvalues
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        max / min
    }

    /// Best solution seen so far, or the current mean before the first `tell`.
    #[must_use]
    pub fn current_best(&self) -> &[f64] {
        self.state
            .best
            .as_ref()
            .map_or(&self.state.mean, |best| &best.parameters)
    }

    #[must_use]
    pub fn best_fitness(&self) -> Option<f64> {
        self.state.best.as_ref().map(|best| best.fitness)
    }

    /// Samples a population from the current distribution.
    ///
    /// Calling `ask` again before `tell` discards the earlier population.
    pub fn ask(&mut self) -> Vec<Vec<f64>> {
        let n = self.state.dimension;
        let scales = self
            .state
            .eigenvalues
            .iter()
            .map(|d| d.sqrt())
            .collect::<Vec<_>>();

        let population = (0..self.state.population_size)
            .map(|_| {
                let dz = scales
                    .iter()
                    .map(|scale| scale * self.state.rng.sample::<f64, _>(StandardNormal))
                    .collect::<Vec<_>>();
                (0..n)
                    .map(|i| {
                        let row = &self.state.eigenvectors[i * n..(i + 1) * n];
                        let y = row.iter().zip(&dz).map(|(b, v)| b * v).sum::<f64>();
                        self.state.mean[i] + self.state.sigma * y
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        self.state.pending = Some(population.clone());
        population
    }

    /// Updates the distribution from the fitness of the population returned by the
    /// preceding [`ask`](Self::ask). Lower fitness is better.
    pub fn tell(&mut self, population: &[Vec<f64>], fitness: &[f64]) -> Result<(), StrategyError> {
        let Some(pending) = &self.state.pending else {
            return Err(ProtocolViolation::TellWithoutAsk.into());
        };
        if pending.as_slice() != population {
            return Err(ProtocolViolation::PopulationMismatch.into());
        }
        if fitness.len() != population.len() {
            return Err(ProtocolViolation::FitnessLength {
                expected: population.len(),
                actual: fitness.len(),
            }
            .into());
        }
        self.state.pending = None;

        let ranking = rank(fitness);
        let non_finite = fitness.iter().filter(|f| !f.is_finite()).count();
        if non_finite > 0 {
            log::warn!("{non_finite} non-finite fitness values ranked last");
        }

        let best_index = ranking[0];
        let best_fitness = fitness[best_index];
        if best_fitness.is_finite()
            && self
                .state
                .best
                .as_ref()
                .is_none_or(|best| best_fitness < best.fitness)
        {
            self.state.best = Some(BestSolution {
                parameters: population[best_index].clone(),
                fitness: best_fitness,
            });
        }

        self.update_distribution(population, &ranking);
        Ok(())
    }

    #[expect(clippy::cast_precision_loss)]
    fn update_distribution(&mut self, population: &[Vec<f64>], ranking: &[usize]) {
        let Constants {
            mu,
            ref weights,
            mu_eff,
            c_sigma,
            d_sigma,
            c_c,
            c_1,
            c_mu,
            chi_n,
            eigen_interval,
        } = self.constants;
        let state = &mut self.state;
        let n = state.dimension;
        let sigma = state.sigma;

        // steps of the selected candidates in units of sigma
        let steps = ranking[..mu]
            .iter()
            .map(|&k| {
                population[k]
                    .iter()
                    .zip(&state.mean)
                    .map(|(x, m)| (x - m) / sigma)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let mut y_w = vec![0.0; n];
        for (w, y) in weights.iter().zip(&steps) {
            for (acc, v) in y_w.iter_mut().zip(y) {
                *acc += w * v;
            }
        }

        for (m, y) in state.mean.iter_mut().zip(&y_w) {
            *m += sigma * y;
        }

        // C^{-1/2} y_w = B D^{-1} Bᵀ y_w
        let b = &state.eigenvectors;
        let projected = (0..n)
            .map(|j| {
                let dot = (0..n).map(|i| b[i * n + j] * y_w[i]).sum::<f64>();
                dot / state.eigenvalues[j].sqrt()
            })
            .collect::<Vec<_>>();
        let whitened = (0..n)
            .map(|i| (0..n).map(|j| b[i * n + j] * projected[j]).sum::<f64>())
            .collect::<Vec<_>>();

        let sigma_factor = (c_sigma * (2.0 - c_sigma) * mu_eff).sqrt();
        for (p, w) in state.path_sigma.iter_mut().zip(&whitened) {
            *p = (1.0 - c_sigma) * *p + sigma_factor * w;
        }
        let path_sigma_norm = state.path_sigma.iter().map(|p| p * p).sum::<f64>().sqrt();

        let generations = (state.generation + 1) as f64;
        let stalled = path_sigma_norm / (1.0 - (1.0 - c_sigma).powf(2.0 * generations)).sqrt() / chi_n
            >= 1.4 + 2.0 / (n as f64 + 1.0);
        let h_sigma = if stalled { 0.0 } else { 1.0 };

        let c_factor = (c_c * (2.0 - c_c) * mu_eff).sqrt();
        for (p, y) in state.path_c.iter_mut().zip(&y_w) {
            *p = (1.0 - c_c) * *p + h_sigma * c_factor * y;
        }

        let delta_h = (1.0 - h_sigma) * c_c * (2.0 - c_c);
        let decay = 1.0 - c_1 - c_mu + c_1 * delta_h;
        for i in 0..n {
            for j in 0..=i {
                let rank_one = state.path_c[i] * state.path_c[j];
                let rank_mu = weights
                    .iter()
                    .zip(&steps)
                    .map(|(w, y)| w * y[i] * y[j])
                    .sum::<f64>();
                let value = decay * state.covariance[i * n + j] + c_1 * rank_one + c_mu * rank_mu;
                state.covariance[i * n + j] = value;
                state.covariance[j * n + i] = value;
            }
        }

        let exponent = (c_sigma / d_sigma) * (path_sigma_norm / chi_n - 1.0);
        state.sigma *= exponent.min(1.0).exp();

        state.generation += 1;
        if state.generation - state.eigen_generation > eigen_interval {
            let SymmetricEigen { values, vectors } = eigen::symmetric_eigen(&state.covariance, n);
            state.eigenvalues = clamp_eigenvalues(values);
            state.eigenvectors = vectors;
            state.eigen_generation = state.generation;
        }

        log::debug!(
            "CMA-ES generation {}: sigma {:.4e}, path norm {:.3}, h_sigma {}",
            state.generation,
            state.sigma,
            path_sigma_norm,
            h_sigma
        );
    }
}

/// Raises eigenvalues below `MIN_EIGENVALUE_RATIO` times the largest one.
///
/// The floor scales with the covariance, so a distribution that has contracted
/// far below unit scale keeps its shape.
fn clamp_eigenvalues(values: Vec<f64>) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0, f64::max);
    let floor = (max * MIN_EIGENVALUE_RATIO).max(f64::MIN_POSITIVE);
    values.into_iter().map(|v| v.max(floor)).collect()
}

/// Candidate indices ordered from best to worst; non-finite fitness ranks last.
fn rank(fitness: &[f64]) -> Vec<usize> {
    let key = |f: f64| if f.is_finite() { f } else { f64::INFINITY };
    let mut order = (0..fitness.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| key(fitness[a]).total_cmp(&key(fitness[b])));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_ask_returns_population_of_dimension() {
        for population_size in [1, 2, 5, 20] {
            let mut es = CmaEs::new(7, 0.0, 0.2, population_size, 3);
            let population = es.ask();
            assert_eq!(population.len(), population_size);
            assert!(population.iter().all(|x| x.len() == 7));
        }
    }

    #[test]
    fn test_initial_mean_is_broadcast() {
        let es = CmaEs::new(4, 1.5, 0.2, 6, 0);
        assert_eq!(es.mean(), &[1.5; 4]);
        assert_eq!(es.current_best(), &[1.5; 4]);
        assert_eq!(es.best_fitness(), None);
        assert_eq!(es.sigma(), 0.2);
    }

    #[test]
    fn test_ask_is_deterministic_for_seed() {
        let mut a = CmaEs::new(5, 0.0, 0.3, 4, 42);
        let mut b = CmaEs::new(5, 0.0, 0.3, 4, 42);
        assert_eq!(a.ask(), b.ask());
        let mut c = CmaEs::new(5, 0.0, 0.3, 4, 43);
        assert_ne!(a.ask(), c.ask());
    }

    #[test]
    fn test_tell_without_ask() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        let err = es.tell(&vec![vec![0.0; 2]; 4], &[0.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::ProtocolViolation(ProtocolViolation::TellWithoutAsk)
        ));
    }

    #[test]
    fn test_tell_twice_after_one_ask() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        let population = es.ask();
        es.tell(&population, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let err = es.tell(&population, &[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::ProtocolViolation(ProtocolViolation::TellWithoutAsk)
        ));
    }

    #[test]
    fn test_tell_with_foreign_population() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        let mut population = es.ask();
        population[2][1] += 1e-9;
        let err = es.tell(&population, &[0.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::ProtocolViolation(ProtocolViolation::PopulationMismatch)
        ));
    }

    #[test]
    fn test_tell_with_stale_population() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        let stale = es.ask();
        let _fresh = es.ask();
        let err = es.tell(&stale, &[0.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::ProtocolViolation(ProtocolViolation::PopulationMismatch)
        ));
    }

    #[test]
    fn test_tell_with_wrong_fitness_length() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        let population = es.ask();
        let err = es.tell(&population, &[0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::ProtocolViolation(ProtocolViolation::FitnessLength {
                expected: 4,
                actual: 3
            })
        ));
        // the population is still pending and can be told correctly
        es.tell(&population, &[0.0; 4]).unwrap();
    }

    #[test]
    fn test_rank_puts_non_finite_last() {
        let ranking = rank(&[3.0, f64::NAN, -1.0, f64::INFINITY, f64::NEG_INFINITY, 0.5]);
        assert_eq!(ranking, vec![2, 5, 0, 1, 3, 4]);
    }

    #[test]
    fn test_clamp_eigenvalues_is_relative_to_largest() {
        // a contracted covariance keeps its conditioning
        let values = clamp_eigenvalues(vec![1e-24, 1e-30, 1e-27]);
        assert_eq!(values, vec![1e-24, 1e-30, 1e-27]);

        let values = clamp_eigenvalues(vec![1.0, -1e-3, 0.0]);
        assert_eq!(values, vec![1.0, 1e-14, 1e-14]);

        let values = clamp_eigenvalues(vec![0.0, 0.0]);
        assert_eq!(values, vec![f64::MIN_POSITIVE; 2]);
    }

    #[test]
    fn test_non_finite_fitness_never_becomes_best() {
        let mut es = CmaEs::new(3, 0.0, 0.2, 4, 1);
        let population = es.ask();
        es.tell(&population, &[f64::NAN, f64::NEG_INFINITY, 5.0, f64::INFINITY])
            .unwrap();
        assert_eq!(es.best_fitness(), Some(5.0));
        assert_eq!(es.current_best(), population[2].as_slice());
        assert!(es.mean().iter().all(|m| m.is_finite()));
        assert!(es.sigma().is_finite());
    }

    #[test]
    fn test_all_non_finite_keeps_distribution_finite() {
        let mut es = CmaEs::new(3, 0.0, 0.2, 4, 1);
        let population = es.ask();
        es.tell(&population, &[f64::NAN; 4]).unwrap();
        assert_eq!(es.best_fitness(), None);
        assert!(es.mean().iter().all(|m| m.is_finite()));
        assert_eq!(es.generation(), 1);
    }

    #[test]
    fn test_best_only_improves() {
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 5);
        let population = es.ask();
        es.tell(&population, &[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(es.best_fitness(), Some(1.0));
        assert_eq!(es.current_best(), population[1].as_slice());

        let population = es.ask();
        es.tell(&population, &[7.0, 8.0, 9.0, 10.0]).unwrap();
        assert_eq!(es.best_fitness(), Some(1.0));
    }

    #[test]
    fn test_minimizes_sphere() {
        let mut es = CmaEs::new(4, 2.0, 0.5, 12, 7);
        for _ in 0..400 {
            let population = es.ask();
            let fitness = population.iter().map(|x| sphere(x)).collect::<Vec<_>>();
            es.tell(&population, &fitness).unwrap();
        }
        assert!(es.best_fitness().unwrap() < 1e-8);
        assert!(sphere(es.mean()) < 1e-6);
    }

    #[test]
    fn test_adapts_to_ill_conditioned_ellipsoid() {
        let ellipsoid = |x: &[f64]| {
            x.iter()
                .enumerate()
                .map(|(i, v)| 10f64.powi(i32::try_from(i).unwrap()) * v * v)
                .sum::<f64>()
        };
        let mut es = CmaEs::new(3, 1.0, 0.5, 10, 11);
        for _ in 0..600 {
            let population = es.ask();
            let fitness = population.iter().map(|x| ellipsoid(x)).collect::<Vec<_>>();
            es.tell(&population, &fitness).unwrap();
        }
        assert!(es.best_fitness().unwrap() < 1e-8);
        assert!(es.condition_number() > 10.0);
    }

    #[test]
    fn test_population_of_one() {
        let mut es = CmaEs::new(2, 1.0, 0.3, 1, 0);
        for _ in 0..20 {
            let population = es.ask();
            assert_eq!(population.len(), 1);
            let fitness = [sphere(&population[0])];
            es.tell(&population, &fitness).unwrap();
        }
        assert!(es.mean().iter().all(|m| m.is_finite()));
        assert!(es.best_fitness().is_some());
        assert_eq!(es.generation(), 20);
    }

    #[test]
    fn test_restore_rejects_other_dimension() {
        let other = CmaEs::new(3, 0.0, 0.2, 4, 0);
        let mut es = CmaEs::new(2, 0.0, 0.2, 4, 0);
        assert!(matches!(
            es.restore(other.state().clone()),
            Err(StrategyError::IncompatibleState { .. })
        ));
    }

    #[test]
    fn test_restore_continues_identically() {
        let mut original = CmaEs::new(3, 0.0, 0.4, 6, 9);
        let population = original.ask();
        let fitness = population.iter().map(|x| sphere(x)).collect::<Vec<_>>();
        original.tell(&population, &fitness).unwrap();

        let json = serde_json::to_string(original.state()).unwrap();
        let mut restored = CmaEs::new(3, 0.0, 0.4, 6, 0);
        restored.restore(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(original.ask(), restored.ask());
        assert_eq!(original.sigma(), restored.sigma());
        assert_eq!(original.current_best(), restored.current_best());
    }
}
