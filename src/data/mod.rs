//! Data domain: dataset containers, row-tables and partition discovery.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Column, Container, Document, FieldAccess, FieldId, RowTable};
pub use repo_fs::FsContainer;
