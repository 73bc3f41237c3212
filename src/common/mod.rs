//! Shared utilities that glue the different domains together.
pub mod buf;
pub mod config;
pub mod error;
pub mod log;

pub use config::{AnnotateCfg, TrainingConfig};
pub use error::{AnnotateError, AnnotateResult, ErrorCode};
