//! Worker pool for scoring chunks of rows in parallel.
//!
//! Members are read-only and pure, so rows can be scored in any order; the
//! results come back in input order and the caller writes them sequentially.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::common::error::{AnnotateError, AnnotateResult};

use super::domain::{Ensemble, InferenceError};
use super::service::predict;

/// One row queued for scoring.
#[derive(Clone, Debug)]
pub struct RowJob {
    pub row: usize,
    pub event: i64,
    pub fold: usize,
    pub features: Vec<f32>,
}

pub struct Pool {
    inner: ThreadPool,
}

impl Pool {
    pub fn new(size: usize) -> AnnotateResult<Self> {
        let inner = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("kfold-score-{i}"))
            .build()
            .map_err(|err| AnnotateError::config(format!("cannot start worker pool: {err}")))?;
        Ok(Self { inner })
    }

    pub fn threads(&self) -> usize {
        self.inner.current_num_threads()
    }

    /// Score every job; element `i` of the result belongs to `jobs[i]`.
    pub fn score(
        &self,
        ensemble: &Ensemble,
        jobs: &[RowJob],
    ) -> Vec<Result<Vec<f32>, InferenceError>> {
        self.inner.install(|| {
            jobs.par_iter()
                .map(|job| predict(ensemble, &job.features, job.fold))
                .collect()
        })
    }
}
