//! Annotation engine: binds fields, scores every row and commits the result.

pub mod binder;
pub mod domain;
pub mod service;

pub use domain::{Bindings, PartitionReport, RunReport};
pub use service::{annotate_file, Annotator};
