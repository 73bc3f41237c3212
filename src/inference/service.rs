//! Per-row scoring: ensemble prediction and argmax reduction.

use ndarray::{aview1, Axis};

use crate::common::buf::SENTINEL;

use super::domain::{Ensemble, InferenceError};

/// Best class of a score vector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ArgMax {
    pub score: f32,
    pub index: usize,
}

/// Score one feature row with the member serving `fold`.
///
/// Scores are returned exactly as the classifier produced them.
pub fn predict(ensemble: &Ensemble, features: &[f32], fold: usize) -> Result<Vec<f32>, InferenceError> {
    let member = ensemble.member(fold)?;
    let x = aview1(features).insert_axis(Axis(0));

    let transformed = member.preprocessor.transform(x)?;
    let scores = member.classifier.predict(transformed.view())?;
    if scores.nrows() != 1 {
        return Err(InferenceError::UnexpectedRows {
            rows: scores.nrows(),
        });
    }

    let flat: Vec<f32> = scores.iter().copied().collect();
    if flat.is_empty() {
        return Err(InferenceError::EmptyScores);
    }
    Ok(flat)
}

/// Highest score and its index, earliest index on ties.
///
/// Starts from the sentinel and only moves on a strictly greater score, so
/// `None` means no score exceeded -999 (or every score was NaN).
pub fn reduce(scores: &[f32]) -> Option<ArgMax> {
    let mut best_score = SENTINEL;
    let mut best_index = None;
    for (i, &score) in scores.iter().enumerate() {
        if score > best_score {
            best_score = score;
            best_index = Some(i);
        }
    }
    best_index.map(|index| ArgMax {
        score: best_score,
        index,
    })
}
