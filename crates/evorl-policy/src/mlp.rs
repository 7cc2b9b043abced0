//! Fully connected network policy.
//!
//! Hidden layers use ReLU; the output layer is linear. With no hidden layers the
//! network is a plain linear model.
//!
//! Parameters are flattened layer by layer, each layer contributing its weight matrix
//! (row-major, one row per output unit) followed by its bias vector.

use evorl_env::Action;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ActionMode, ParameterizedPolicy, PolicyError};

#[derive(Debug, Clone, PartialEq)]
struct Dense {
    inputs: usize,
    outputs: usize,
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl Dense {
    fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            bias: vec![0.0; outputs],
        }
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .chunks_exact(self.inputs)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// Multi-layer perceptron implementing [`ParameterizedPolicy`].
///
/// Serialized form is the layer sizes, the action mode and the flat parameter vector.
/// Deserializing rebuilds the network through the same constructor and then writes the
/// parameters, so shapes and the parameter count are always derived, never trusted.
///
/// # Example
///
/// ```
/// use evorl_policy::{ActionMode, MlpPolicy, ParameterizedPolicy as _};
/// use rand::SeedableRng as _;
///
/// let mut rng = rand_pcg::Pcg32::seed_from_u64(0);
/// let policy = MlpPolicy::random(&[4, 8, 2], ActionMode::Discrete, &mut rng).unwrap();
/// assert_eq!(policy.parameter_count(), 4 * 8 + 8 + 8 * 2 + 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MlpSnapshot", into = "MlpSnapshot")]
pub struct MlpPolicy {
    layers: Vec<Dense>,
    mode: ActionMode,
    parameter_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpSnapshot {
    layer_sizes: Vec<usize>,
    mode: ActionMode,
    parameters: Vec<f64>,
}

impl MlpPolicy {
    /// Builds a network with all parameters set to zero.
    ///
    /// `layer_sizes` lists the input size, any hidden sizes, and the output size.
    pub fn zeros(layer_sizes: &[usize], mode: ActionMode) -> Result<Self, PolicyError> {
        if layer_sizes.len() < 2 || layer_sizes.contains(&0) {
            return Err(PolicyError::InvalidLayers {
                sizes: layer_sizes.to_vec(),
            });
        }
        let layers = layer_sizes
            .windows(2)
            .map(|pair| Dense::zeros(pair[0], pair[1]))
            .collect::<Vec<_>>();
        let parameter_count = layers.iter().map(Dense::parameter_count).sum();
        Ok(Self {
            layers,
            mode,
            parameter_count,
        })
    }

    /// Builds a network with weights and biases drawn uniformly from
    /// `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`.
    pub fn random<R>(layer_sizes: &[usize], mode: ActionMode, rng: &mut R) -> Result<Self, PolicyError>
    where
        R: Rng + ?Sized,
    {
        let mut policy = Self::zeros(layer_sizes, mode)?;
        for layer in &mut policy.layers {
            #[expect(clippy::cast_precision_loss)]
            let bound = 1.0 / (layer.inputs as f64).sqrt();
            for value in layer.weights.iter_mut().chain(&mut layer.bias) {
                *value = rng.random_range(-bound..=bound);
            }
        }
        Ok(policy)
    }

    /// Input, hidden, and output sizes.
    #[must_use]
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.layers[0].inputs];
        sizes.extend(self.layers.iter().map(|layer| layer.outputs));
        sizes
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.layers[0].inputs
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].outputs
    }

    /// Evaluates the raw network output for `observation`.
    pub fn forward(&self, observation: &[f64]) -> Result<Vec<f64>, PolicyError> {
        if observation.len() != self.input_size() {
            return Err(PolicyError::ObservationMismatch {
                expected: self.input_size(),
                actual: observation.len(),
            });
        }
        let last = self.layers.len() - 1;
        let mut x = observation.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x);
            if i != last {
                for v in &mut x {
                    *v = v.max(0.0);
                }
            }
        }
        Ok(x)
    }
}

impl ParameterizedPolicy for MlpPolicy {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn parameters(&self) -> Vec<f64> {
        let mut parameters = Vec::with_capacity(self.parameter_count);
        for layer in &self.layers {
            parameters.extend_from_slice(&layer.weights);
            parameters.extend_from_slice(&layer.bias);
        }
        parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), PolicyError> {
        if parameters.len() != self.parameter_count {
            return Err(PolicyError::ShapeMismatch {
                expected: self.parameter_count,
                actual: parameters.len(),
            });
        }
        let mut rest = parameters;
        for layer in &mut self.layers {
            let (weights, tail) = rest.split_at(layer.weights.len());
            let (bias, tail) = tail.split_at(layer.bias.len());
            layer.weights.copy_from_slice(weights);
            layer.bias.copy_from_slice(bias);
            rest = tail;
        }
        Ok(())
    }

    fn action_mode(&self) -> ActionMode {
        self.mode
    }

    fn select_action(&self, observation: &[f64]) -> Result<Action, PolicyError> {
        Ok(self.mode.to_action(self.forward(observation)?))
    }
}

impl From<MlpPolicy> for MlpSnapshot {
    fn from(policy: MlpPolicy) -> Self {
        Self {
            layer_sizes: policy.layer_sizes(),
            mode: policy.mode,
            parameters: policy.parameters(),
        }
    }
}

impl TryFrom<MlpSnapshot> for MlpPolicy {
    type Error = PolicyError;

    fn try_from(snapshot: MlpSnapshot) -> Result<Self, Self::Error> {
        let mut policy = MlpPolicy::zeros(&snapshot.layer_sizes, snapshot.mode)?;
        policy.set_parameters(&snapshot.parameters)?;
        Ok(policy)
    }
}
