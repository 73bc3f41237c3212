//! Capabilities of pretrained models, the k-fold ensemble and fold routing.
//!
//! Models are opaque: the core only ever calls `transform` on a preprocessor
//! and `predict` on a classifier, both on single-row matrices.

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::common::error::{AnnotateError, AnnotateResult};

/// Failures raised while scoring a row.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("fold {fold} out of range for an ensemble of {folds} members")]
    FoldOutOfRange { fold: usize, folds: usize },

    #[error("{stage} expected {expected} input features, got {got}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("classifier returned {rows} rows for a single input row")]
    UnexpectedRows { rows: usize },

    #[error("classifier returned no scores")]
    EmptyScores,
}

/// Fitted feature transform.
pub trait Preprocessor: Send + Sync {
    fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError>;
}

/// Fitted classifier producing one score per class for each input row.
pub trait Classifier: Send + Sync {
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError>;

    /// Scores per row, when the model knows it before predicting.
    fn classes(&self) -> Option<usize> {
        None
    }
}

/// Paired preprocessor and classifier serving one fold.
pub struct EnsembleMember {
    pub fold_index: usize,
    pub preprocessor: Box<dyn Preprocessor>,
    pub classifier: Box<dyn Classifier>,
}

/// Ordered k-fold ensemble.
///
/// Members are addressed by booking position: the member at position `i`
/// scores every event routed to fold `i`. Training conventions book models in
/// reverse fold order (`[fold1, fold0]` for two folds), so the model scoring
/// fold `i` is the one that never saw those events.
pub struct Ensemble {
    members: Vec<EnsembleMember>,
}

impl Ensemble {
    /// Pair classifiers and preprocessors by booking position.
    pub fn from_booked(
        classifiers: Vec<Box<dyn Classifier>>,
        preprocessors: Vec<Box<dyn Preprocessor>>,
    ) -> AnnotateResult<Self> {
        if classifiers.is_empty() {
            return Err(AnnotateError::Ensemble("no classifiers booked".into()));
        }
        if classifiers.len() != preprocessors.len() {
            return Err(AnnotateError::Ensemble(format!(
                "{} classifiers but {} preprocessors booked",
                classifiers.len(),
                preprocessors.len()
            )));
        }

        let members = classifiers
            .into_iter()
            .zip(preprocessors)
            .enumerate()
            .map(|(fold_index, (classifier, preprocessor))| EnsembleMember {
                fold_index,
                preprocessor,
                classifier,
            })
            .collect::<Vec<_>>();
        debug!(folds = members.len(), "ensemble assembled");
        Ok(Self { members })
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    /// Number of members, K.
    pub fn folds(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, fold: usize) -> Result<&EnsembleMember, InferenceError> {
        self.members.get(fold).ok_or(InferenceError::FoldOutOfRange {
            fold,
            folds: self.members.len(),
        })
    }
}

/// Maps an event identifier to the fold whose member scores it.
pub trait FoldRouter: Send + Sync {
    fn route(&self, event: i64) -> usize;
}

/// `event mod K`, always in `[0, K)` including for negative events.
pub fn fold(event: i64, folds: usize) -> usize {
    debug_assert!(folds > 0);
    event.rem_euclid(folds as i64) as usize
}

/// Stateless modulo router over a fixed number of folds.
#[derive(Copy, Clone, Debug)]
pub struct ModuloRouter {
    folds: usize,
}

impl ModuloRouter {
    pub fn new(folds: usize) -> AnnotateResult<Self> {
        if folds == 0 {
            return Err(AnnotateError::Ensemble("router needs at least one fold".into()));
        }
        Ok(Self { folds })
    }

    pub fn for_ensemble(ensemble: &Ensemble) -> Self {
        Self {
            folds: ensemble.folds(),
        }
    }
}

impl FoldRouter for ModuloRouter {
    fn route(&self, event: i64) -> usize {
        fold(event, self.folds)
    }
}
