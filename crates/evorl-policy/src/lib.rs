//! Policies as opaque parameterized functions.
//!
//! A gradient-free optimizer sees a policy only through one capability: a fixed-size
//! flat parameter vector it can write, plus an action-selection call. Whatever the
//! function approximator looks like inside, [`ParameterizedPolicy`] is all the trainer
//! needs.
//!
//! # Flattening Order
//!
//! [`ParameterizedPolicy::set_parameters`] and [`ParameterizedPolicy::parameters`] must use
//! the same deterministic order, so that a vector written and read back is unchanged. The
//! search distribution relies on this: coordinate `i` always means the same weight.
//!
//! # Action Modes
//!
//! - [`ActionMode::Continuous`] returns the raw function output as the action vector.
//! - [`ActionMode::Discrete`] returns the index of the largest output, lowest index on
//!   ties. Softmax is monotonic, so this is also the most probable action under
//!   [`softmax`]; comparing raw outputs keeps an infinite output selectable.

use evorl_env::{Action, ActionSpace};
use serde::{Deserialize, Serialize};

pub use self::mlp::MlpPolicy;

pub mod mlp;

/// How the output of the wrapped function is turned into an [`Action`].
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::FromStr,
)]
pub enum ActionMode {
    Continuous,
    #[default]
    Discrete,
}

impl ActionMode {
    /// Picks the mode matching an environment's action space.
    #[must_use]
    pub fn for_space(space: ActionSpace) -> Self {
        if space.is_continuous() {
            ActionMode::Continuous
        } else {
            ActionMode::Discrete
        }
    }

    /// Converts raw function output into an action.
    #[must_use]
    pub fn to_action(self, output: Vec<f64>) -> Action {
        match self {
            ActionMode::Continuous => Action::Continuous(output),
            ActionMode::Discrete => Action::Discrete(argmax(&output)),
        }
    }
}

/// A decision function with a fixed-size flat parameter vector.
pub trait ParameterizedPolicy {
    /// Total number of learnable scalars.
    fn parameter_count(&self) -> usize;

    /// Reads all parameters in flattening order.
    fn parameters(&self) -> Vec<f64>;

    /// Overwrites all parameters in flattening order.
    ///
    /// Fails with [`PolicyError::ShapeMismatch`] if `parameters.len()` differs from
    /// [`parameter_count`](Self::parameter_count); the policy is left unchanged then.
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), PolicyError>;

    /// How [`select_action`](Self::select_action) turns the function output into an action.
    fn action_mode(&self) -> ActionMode;

    fn select_action(&self, observation: &[f64]) -> Result<Action, PolicyError>;
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PolicyError {
    #[display("parameter vector has length {actual}, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[display("observation has length {actual}, expected {expected}")]
    ObservationMismatch { expected: usize, actual: usize },
    #[display("invalid layer sizes {sizes:?}: need at least input and output, all non-zero")]
    InvalidLayers { sizes: Vec<usize> },
}

/// Numerically stable softmax.
#[must_use]
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = values.iter().map(|v| (v - max).exp()).collect::<Vec<_>>();
    let sum = exps.iter().sum::<f64>();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the lowest index wins ties and NaN never wins.
///
/// Returns 0 for an empty or all-NaN slice.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.is_none_or(|b| *v > values[b]) {
            best = Some(i);
        }
    }
    best.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_values_are_finite() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f64::NAN, -1.0, 2.0]), 2);
        assert_eq!(argmax(&[3.0, f64::NAN, 2.0]), 0);
        assert_eq!(argmax(&[f64::NAN, f64::NAN]), 0);
    }

    #[test]
    fn test_discrete_mode_with_infinite_output() {
        assert_eq!(
            ActionMode::Discrete.to_action(vec![1.0, f64::INFINITY]),
            Action::Discrete(1)
        );
        assert_eq!(
            ActionMode::Discrete.to_action(vec![f64::NEG_INFINITY, -5.0, f64::NEG_INFINITY]),
            Action::Discrete(1)
        );
    }

    #[test]
    fn test_mode_to_action() {
        assert_eq!(
            ActionMode::Continuous.to_action(vec![0.3, -2.0]),
            Action::Continuous(vec![0.3, -2.0])
        );
        assert_eq!(
            ActionMode::Discrete.to_action(vec![0.3, 4.0, 4.0]),
            Action::Discrete(1)
        );
    }

    #[test]
    fn test_mode_for_space() {
        assert_eq!(
            ActionMode::for_space(ActionSpace::Discrete { n: 2 }),
            ActionMode::Discrete
        );
        assert_eq!(
            ActionMode::for_space(ActionSpace::Continuous { dim: 2 }),
            ActionMode::Continuous
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("continuous".parse::<ActionMode>().unwrap(), ActionMode::Continuous);
        assert_eq!("Discrete".parse::<ActionMode>().unwrap(), ActionMode::Discrete);
    }
}
