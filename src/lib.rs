//! K-fold ensemble annotation of partitioned row-tables.
//!
//! Rows are routed to the ensemble member that did not train on them, scored,
//! and the best class and its score are written back as two new fields. The
//! whole container is committed once, or not at all.
pub mod annotate;
pub mod api;
pub mod common;
pub mod data;
pub mod inference;

pub use annotate::{annotate_file, Annotator, RunReport};
pub use common::{AnnotateCfg, AnnotateError, AnnotateResult, ErrorCode, TrainingConfig};
pub use data::{Container, FieldAccess, FsContainer};
pub use inference::{Classifier, Ensemble, Preprocessor};
