//! Command-line surface of `annotate-file`.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::annotate::domain::RunReport;
use crate::annotate::service::annotate_file;
use crate::common::config::{AnnotateCfg, TrainingConfig, DEFAULT_BATCH_ROWS};
use crate::common::error::AnnotateResult;
use crate::data::repo_fs::ensure_exists;
use crate::inference::repo_fs::load_ensemble;

/// Apply a k-fold classifier ensemble to a dataset container.
#[derive(Debug, Parser)]
#[command(name = "annotate-file")]
pub struct Args {
    /// Path to input file, where the response will be added.
    pub input: PathBuf,

    /// Tag used as prefix of the output fields.
    pub tag: String,

    /// Training config holding the class and variable lists.
    #[arg(long, env = "KFOLD_CONFIG_TRAINING", default_value = "mt_training_config.yaml")]
    pub config_training: PathBuf,

    /// Prefix of directories to be annotated.
    #[arg(long, env = "KFOLD_DIR_PREFIX", default_value = "mt_")]
    pub dir_prefix: String,

    /// Classifier artefacts, booked in reverse fold order: fold1 first, then fold0.
    #[arg(long, num_args = 1.., default_values = ["fold1_model.json", "fold0_model.json"])]
    pub models: Vec<PathBuf>,

    /// Preprocessing artefacts, booked in the same reverse fold order as the models.
    #[arg(
        long,
        num_args = 1..,
        default_values = ["fold1_preprocessing.json", "fold0_preprocessing.json"]
    )]
    pub preprocessing: Vec<PathBuf>,

    /// Name of the row-table inside each directory.
    #[arg(long, env = "KFOLD_TREE", default_value = "ntuple")]
    pub tree: String,

    /// Field holding the event number used to select the classifier.
    #[arg(long, env = "KFOLD_EVENT_BRANCH", default_value = "event")]
    pub event_branch: String,

    /// Scoring threads; 1 scores strictly row by row.
    #[arg(long, env = "KFOLD_THREADS", default_value_t = 1)]
    pub threads: usize,

    /// Rows per parallel scoring chunk.
    #[arg(long, env = "KFOLD_BATCH_ROWS", default_value_t = DEFAULT_BATCH_ROWS)]
    pub batch_rows: usize,

    /// Emit logs as JSON lines.
    #[arg(long, env = "KFOLD_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn annotate_cfg(&self) -> AnnotateCfg {
        AnnotateCfg {
            dir_prefix: self.dir_prefix.clone(),
            tree: self.tree.clone(),
            event_branch: self.event_branch.clone(),
            tag: self.tag.clone(),
            threads: self.threads,
            batch_rows: self.batch_rows,
        }
    }
}

/// Check the input, load schema and artefacts, then annotate.
pub fn run(args: &Args) -> AnnotateResult<RunReport> {
    ensure_exists(&args.input)?;
    let cfg = args.annotate_cfg();
    cfg.validate()?;

    let schema = TrainingConfig::load(&args.config_training)?;
    let ensemble = load_ensemble(&args.models, &args.preprocessing)?;
    info!(
        input = %args.input.display(),
        tag = %cfg.tag,
        folds = ensemble.folds(),
        variables = schema.variables.len(),
        "starting annotation"
    );
    annotate_file(&args.input, cfg, schema, &ensemble)
}
