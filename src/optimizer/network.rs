//! Small feed-forward network mapping hardware/network features to predicted
//! mining performance.
//!
//! The network is deliberately tiny: three dense layers trained with
//! per-example gradient descent. All inputs are expected to be normalized to
//! `[0, 1]` by the caller.

use crate::optimizer::error::{EngineError, Result};
use crate::optimizer::types::TrainingExample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Width of the feature vector fed to the network.
pub const INPUT_WIDTH: usize = 10;
/// Width of the prediction vector produced by the network.
pub const OUTPUT_WIDTH: usize = 4;
/// Hidden and output layers of the mining model.
pub const MINING_TOPOLOGY: [(usize, Activation); 3] = [
    (16, Activation::Relu),
    (8, Activation::Relu),
    (OUTPUT_WIDTH, Activation::Sigmoid),
];

/// Elementwise activation applied after a layer's biased sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Linear,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }

    /// Derivative evaluated on the post-activation value `y` recorded during
    /// the forward pass. Sigmoid and tanh apply their formula to `y` itself.
    pub fn derivative(&self, y: f64) -> f64 {
        match self {
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => {
                let s = sigmoid(y);
                s * (1.0 - s)
            }
            Activation::Tanh => 1.0 - y.tanh().powi(2),
            Activation::Linear => 1.0,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Xavier-uniform weight matrix shaped `[input_width][output_width]`.
pub fn initialize_weights<R: Rng + ?Sized>(
    input_width: usize,
    output_width: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let limit = (6.0 / (input_width + output_width) as f64).sqrt();
    (0..input_width)
        .map(|_| {
            (0..output_width)
                .map(|_| rng.gen_range(-limit..=limit))
                .collect()
        })
        .collect()
}

/// A dense layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Row per input, column per output
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl Layer {
    /// Create a layer with Xavier weights and biases drawn from `[-0.1, 0.1]`.
    pub fn new<R: Rng + ?Sized>(
        input_width: usize,
        output_width: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let weights = initialize_weights(input_width, output_width, rng);
        let biases = (0..output_width).map(|_| rng.gen_range(-0.1..=0.1)).collect();
        Self {
            weights,
            biases,
            activation,
        }
    }

    pub fn input_width(&self) -> usize {
        self.weights.len()
    }

    pub fn output_width(&self) -> usize {
        self.biases.len()
    }

    fn evaluate(&self, input: &[f64]) -> Vec<f64> {
        let mut sums = self.biases.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (sum, w) in sums.iter_mut().zip(row) {
                *sum += x * w;
            }
        }
        sums.into_iter().map(|s| self.activation.apply(s)).collect()
    }
}

/// Feed-forward network with its training scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    pub input_width: usize,
    pub layers: Vec<Layer>,
    pub learning_rate: f64,
    /// Reserved; updates are plain gradient steps.
    pub momentum: f64,
    /// Completed training epochs
    pub iterations: u64,
    /// `1 - mean absolute error` over the last training epoch
    pub accuracy: f64,
}

impl NeuralNetwork {
    /// Build a network with the given `(width, activation)` layers.
    pub fn new<R: Rng + ?Sized>(
        input_width: usize,
        topology: &[(usize, Activation)],
        learning_rate: f64,
        momentum: f64,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(topology.len());
        let mut fan_in = input_width;
        for &(width, activation) in topology {
            layers.push(Layer::new(fan_in, width, activation, rng));
            fan_in = width;
        }

        Self {
            input_width,
            layers,
            learning_rate,
            momentum,
            iterations: 0,
            accuracy: 0.0,
        }
    }

    /// The fixed 10 → 16 → 8 → 4 mining model.
    pub fn mining_model<R: Rng + ?Sized>(learning_rate: f64, momentum: f64, rng: &mut R) -> Self {
        Self::new(INPUT_WIDTH, &MINING_TOPOLOGY, learning_rate, momentum, rng)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map(Layer::output_width).unwrap_or(self.input_width)
    }

    /// Run the network and return the activation trace. Entry 0 is the input,
    /// entry `l + 1` is the output of layer `l`.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<Vec<f64>>> {
        if input.len() != self.input_width {
            return Err(EngineError::ShapeMismatch {
                expected: self.input_width,
                actual: input.len(),
            });
        }

        let mut trace = Vec::with_capacity(self.layers.len() + 1);
        trace.push(input.to_vec());
        for layer in &self.layers {
            let next = match trace.last() {
                Some(previous) => layer.evaluate(previous),
                None => break,
            };
            trace.push(next);
        }
        Ok(trace)
    }

    /// Final-layer output only.
    pub fn predict(&self, input: &[f64]) -> Result<Vec<f64>> {
        let mut trace = self.forward(input)?;
        Ok(trace.pop().unwrap_or_default())
    }

    /// One stochastic gradient step toward `expected`. Returns the prediction
    /// made before the weights were updated.
    pub fn backpropagate(&mut self, input: &[f64], expected: &[f64]) -> Result<Vec<f64>> {
        let output_width = self.output_width();
        if expected.len() != output_width {
            return Err(EngineError::ShapeMismatch {
                expected: output_width,
                actual: expected.len(),
            });
        }

        let trace = self.forward(input)?;
        let prediction = trace.last().cloned().unwrap_or_default();
        let learning_rate = self.learning_rate;

        let mut error: Vec<f64> = expected
            .iter()
            .zip(&prediction)
            .map(|(target, predicted)| target - predicted)
            .collect();

        for (index, layer) in self.layers.iter_mut().enumerate().rev() {
            let layer_input = &trace[index];
            let layer_output = &trace[index + 1];

            let gradients: Vec<f64> = error
                .iter()
                .zip(layer_output)
                .map(|(e, y)| e * layer.activation.derivative(*y) * learning_rate)
                .collect();

            for (bias, gradient) in layer.biases.iter_mut().zip(&gradients) {
                *bias += gradient;
            }
            for (row, x) in layer.weights.iter_mut().zip(layer_input) {
                for (weight, gradient) in row.iter_mut().zip(&gradients) {
                    *weight += x * gradient;
                }
            }

            // Propagated through the freshly updated weights.
            if index > 0 {
                error = layer
                    .weights
                    .iter()
                    .map(|row| row.iter().zip(&error).map(|(w, e)| w * e).sum())
                    .collect();
            }
        }

        Ok(prediction)
    }

    /// Full-batch training: `epochs` passes of backpropagation over every
    /// example. Each pass bumps `iterations` and sets `accuracy` to one minus
    /// the mean absolute error of that pass. Returns the final accuracy.
    #[instrument(skip(self, examples), fields(examples = examples.len()))]
    pub fn train(&mut self, examples: &[TrainingExample], epochs: usize) -> Result<f64> {
        if examples.is_empty() {
            debug!("No training examples supplied; model unchanged");
            return Ok(self.accuracy);
        }

        let output_width = self.output_width().max(1);
        for epoch in 0..epochs {
            let mut absolute_error = 0.0;
            for example in examples {
                let prediction = self.backpropagate(&example.input, &example.expected_output)?;
                absolute_error += example
                    .expected_output
                    .iter()
                    .zip(&prediction)
                    .map(|(target, predicted)| (target - predicted).abs())
                    .sum::<f64>();
            }

            let mean_error = absolute_error / (examples.len() * output_width) as f64;
            self.accuracy = (1.0 - mean_error).clamp(0.0, 1.0);
            self.iterations += 1;

            if epoch % 100 == 0 {
                debug!("Epoch {}: accuracy {:.4}", epoch, self.accuracy);
            }
        }

        Ok(self.accuracy)
    }

    /// Check that every layer's shape chains from the input width.
    pub fn validate_shapes(&self) -> Result<()> {
        let mut expected_rows = self.input_width;
        for layer in &self.layers {
            if layer.input_width() != expected_rows {
                return Err(EngineError::ShapeMismatch {
                    expected: expected_rows,
                    actual: layer.input_width(),
                });
            }
            for row in &layer.weights {
                if row.len() != layer.output_width() {
                    return Err(EngineError::ShapeMismatch {
                        expected: layer.output_width(),
                        actual: row.len(),
                    });
                }
            }
            expected_rows = layer.output_width();
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a snapshot produced by [`NeuralNetwork::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        let network: NeuralNetwork = serde_json::from_str(json)?;
        if network.layers.is_empty() {
            return Err(EngineError::InvalidSnapshot("network has no layers".to_string()));
        }
        network
            .validate_shapes()
            .map_err(|e| EngineError::InvalidSnapshot(e.to_string()))?;
        Ok(network)
    }
}
