//! Built-in model implementations backing the JSON artefacts.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;

use super::domain::{Classifier, InferenceError, Preprocessor};

/// `(x - mean) / scale`, column-wise.
#[derive(Clone, Debug)]
pub struct StandardScaler {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

impl StandardScaler {
    /// Zero scales are replaced by 1 so constant features pass through centred.
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self, String> {
        if mean.len() != scale.len() {
            return Err(format!(
                "scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            ));
        }
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect::<Vec<_>>();
        Ok(Self {
            mean: Array1::from(mean),
            scale: Array1::from(scale),
        })
    }
}

impl Preprocessor for StandardScaler {
    fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        if x.ncols() != self.mean.len() {
            return Err(InferenceError::ShapeMismatch {
                stage: "preprocessor",
                expected: self.mean.len(),
                got: x.ncols(),
            });
        }
        Ok((&x - &self.mean) / &self.scale)
    }
}

/// Leaves features untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Preprocessor for Identity {
    fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        Ok(x.to_owned())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    Softmax,
}

impl Activation {
    fn apply(self, h: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => h.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => h.mapv_inplace(f32::tanh),
            Activation::Sigmoid => h.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Softmax => {
                for mut row in h.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

/// Fully connected layer, `weights` shaped `(inputs, outputs)`.
#[derive(Clone, Debug)]
pub struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> Result<Self, String> {
        let inputs = weights.len();
        let outputs = weights.first().map(Vec::len).unwrap_or(0);
        if inputs == 0 || outputs == 0 {
            return Err("dense layer has an empty weight matrix".into());
        }
        if weights.iter().any(|row| row.len() != outputs) {
            return Err("dense layer weight rows differ in length".into());
        }
        if bias.len() != outputs {
            return Err(format!(
                "dense layer has {outputs} outputs but {} biases",
                bias.len()
            ));
        }
        let flat = weights.into_iter().flatten().collect::<Vec<_>>();
        let weights = Array2::from_shape_vec((inputs, outputs), flat).map_err(|e| e.to_string())?;
        Ok(Self {
            weights,
            bias: Array1::from(bias),
            activation,
        })
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }
}

/// Feed-forward stack of dense layers; the last layer's width is the class count.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<DenseLayer>,
}

impl Sequential {
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, String> {
        if layers.is_empty() {
            return Err("network has no layers".into());
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(format!(
                    "layer {} emits {} values but layer {} expects {}",
                    i,
                    pair[0].outputs(),
                    i + 1,
                    pair[1].inputs()
                ));
            }
        }
        Ok(Self { layers })
    }
}

impl Classifier for Sequential {
    fn classes(&self) -> Option<usize> {
        self.layers.last().map(DenseLayer::outputs)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        let mut h = x.to_owned();
        for layer in &self.layers {
            if h.ncols() != layer.inputs() {
                return Err(InferenceError::ShapeMismatch {
                    stage: "classifier",
                    expected: layer.inputs(),
                    got: h.ncols(),
                });
            }
            h = h.dot(&layer.weights) + &layer.bias;
            layer.activation.apply(&mut h);
        }
        Ok(h)
    }
}
