//! Run configuration and the training schema consumed by the core.
//!
//! Both are plain value objects handed to components at construction; nothing
//! in the crate reads configuration from ambient state.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::{AnnotateError, AnnotateResult};

pub const DEFAULT_DIR_PREFIX: &str = "mt_";
pub const DEFAULT_TREE: &str = "ntuple";
pub const DEFAULT_EVENT_BRANCH: &str = "event";
pub const DEFAULT_BATCH_ROWS: usize = 256;

/// Snapshot of the settings for one annotation run.
#[derive(Clone, Debug)]
pub struct AnnotateCfg {
    /// Only top-level directories starting with this prefix are annotated.
    pub dir_prefix: String,
    /// Name of the row-table inside each directory.
    pub tree: String,
    /// Integer field used to route rows to an ensemble member.
    pub event_branch: String,
    /// Prefix of the two output fields.
    pub tag: String,
    /// Worker threads for scoring; 1 keeps the strict row-by-row loop.
    pub threads: usize,
    /// Rows read per chunk when scoring in parallel.
    pub batch_rows: usize,
}

impl AnnotateCfg {
    /// Defaults for everything but the tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            dir_prefix: DEFAULT_DIR_PREFIX.to_string(),
            tree: DEFAULT_TREE.to_string(),
            event_branch: DEFAULT_EVENT_BRANCH.to_string(),
            tag: tag.into(),
            threads: 1,
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn validate(&self) -> AnnotateResult<()> {
        if self.tag.trim().is_empty() {
            return Err(AnnotateError::config("tag must not be empty"));
        }
        if self.tree.is_empty() {
            return Err(AnnotateError::config("tree name must not be empty"));
        }
        if self.event_branch.is_empty() {
            return Err(AnnotateError::config("event branch must not be empty"));
        }
        if self.threads == 0 {
            return Err(AnnotateError::config("threads must be at least 1"));
        }
        if self.batch_rows == 0 {
            return Err(AnnotateError::config("batch rows must be at least 1"));
        }
        Ok(())
    }

    /// Name of the best-score output field.
    pub fn score_field(&self) -> String {
        format!("{}_max_score", self.tag)
    }

    /// Name of the best-class-index output field.
    pub fn index_field(&self) -> String {
        format!("{}_max_index", self.tag)
    }
}

/// Class and variable lists shared with the training step.
#[derive(Clone, Debug, Deserialize)]
pub struct TrainingConfig {
    /// Class labels; position is the class index written to the output.
    pub classes: Vec<String>,
    /// Input variables in the order the models were fit with.
    pub variables: Vec<String>,
}

impl TrainingConfig {
    pub fn new(classes: Vec<String>, variables: Vec<String>) -> AnnotateResult<Self> {
        let cfg = Self { classes, variables };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML document. Unknown keys (training hyperparameters etc.) are ignored.
    pub fn from_yaml_str(raw: &str) -> AnnotateResult<Self> {
        let cfg: Self = serde_yaml::from_str(raw)
            .map_err(|err| AnnotateError::config(format!("training config: {err}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> AnnotateResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AnnotateError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    fn validate(&self) -> AnnotateResult<()> {
        if self.variables.is_empty() {
            return Err(AnnotateError::config("training config lists no variables"));
        }
        Ok(())
    }
}
