//! Inference domain: k-fold ensemble, fold routing and per-row scoring.

pub mod domain;
pub mod models;
pub mod repo_fs;
pub mod service;
pub mod workers;

pub use domain::{Classifier, Ensemble, FoldRouter, InferenceError, ModuloRouter, Preprocessor};
pub use service::{predict, reduce, ArgMax};
