//! Loading of preprocessing and classifier artefacts from JSON files.
//!
//! Artefacts are produced by the training side; this module only checks that
//! they are internally consistent, never that they fit the variable list.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use crate::common::error::{AnnotateError, AnnotateResult};

use super::domain::{Classifier, Ensemble, Preprocessor};
use super::models::{Activation, DenseLayer, Identity, Sequential, StandardScaler};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PreprocessorArtifact {
    StandardScaler { mean: Vec<f32>, scale: Vec<f32> },
    Identity,
}

#[derive(Debug, Deserialize)]
struct DenseLayerArtifact {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    #[serde(default)]
    activation: Activation,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ClassifierArtifact {
    Sequential { layers: Vec<DenseLayerArtifact> },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> AnnotateResult<T> {
    let raw = fs::read(path).map_err(|err| AnnotateError::artifact(path, err))?;
    serde_json::from_slice(&raw).map_err(|err| AnnotateError::artifact(path, err))
}

pub fn load_preprocessor(path: &Path) -> AnnotateResult<Box<dyn Preprocessor>> {
    let artifact: PreprocessorArtifact = read_json(path)?;
    let preprocessor: Box<dyn Preprocessor> = match artifact {
        PreprocessorArtifact::StandardScaler { mean, scale } => Box::new(
            StandardScaler::new(mean, scale).map_err(|err| AnnotateError::artifact(path, err))?,
        ),
        PreprocessorArtifact::Identity => Box::new(Identity),
    };
    Ok(preprocessor)
}

pub fn load_classifier(path: &Path) -> AnnotateResult<Box<dyn Classifier>> {
    let artifact: ClassifierArtifact = read_json(path)?;
    let ClassifierArtifact::Sequential { layers } = artifact;
    let layers = layers
        .into_iter()
        .map(|l| DenseLayer::new(l.weights, l.bias, l.activation))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| AnnotateError::artifact(path, err))?;
    let net = Sequential::new(layers).map_err(|err| AnnotateError::artifact(path, err))?;
    Ok(Box::new(net))
}

/// Load and pair the booked artefacts. Both lists are in reverse fold order.
pub fn load_ensemble(models: &[PathBuf], preprocessing: &[PathBuf]) -> AnnotateResult<Ensemble> {
    if models.len() != preprocessing.len() {
        return Err(AnnotateError::Ensemble(format!(
            "{} models but {} preprocessing files booked",
            models.len(),
            preprocessing.len()
        )));
    }

    let classifiers = models
        .iter()
        .map(|p| load_classifier(p))
        .collect::<AnnotateResult<Vec<_>>>()?;
    let preprocessors = preprocessing
        .iter()
        .map(|p| load_preprocessor(p))
        .collect::<AnnotateResult<Vec<_>>>()?;

    for (fold, (model, pre)) in models.iter().zip(preprocessing).enumerate() {
        info!(
            fold,
            model = %model.display(),
            preprocessing = %pre.display(),
            "booked ensemble member"
        );
    }
    Ensemble::from_booked(classifiers, preprocessors)
}
