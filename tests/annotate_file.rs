use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use clap::Parser;
use ndarray::{Array2, ArrayView2};
use rstest::rstest;

use kfold_annotate::api::cli::{self, Args};
use kfold_annotate::data::domain::{Column, Document, RowTable};
use kfold_annotate::inference::domain::{fold, InferenceError};
use kfold_annotate::inference::models::Identity;
use kfold_annotate::{
    annotate_file, AnnotateCfg, AnnotateError, Classifier, Ensemble, ErrorCode, FsContainer,
    Preprocessor, TrainingConfig,
};

struct Constant(Vec<f32>);

impl Classifier for Constant {
    fn predict(&self, _: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        Ok(Array2::from_shape_vec((1, self.0.len()), self.0.clone()).unwrap())
    }
}

/// Scores `[pt, eta]` unchanged, so outputs depend on row contents.
struct Echo;

impl Classifier for Echo {
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        Ok(x.to_owned())
    }
}

fn constant_ensemble() -> Ensemble {
    Ensemble::from_booked(
        vec![
            Box::new(Constant(vec![0.1, 0.9])) as Box<dyn Classifier>,
            Box::new(Constant(vec![0.7, 0.2])) as Box<dyn Classifier>,
        ],
        vec![
            Box::new(Identity) as Box<dyn Preprocessor>,
            Box::new(Identity) as Box<dyn Preprocessor>,
        ],
    )
    .unwrap()
}

fn echo_ensemble() -> Ensemble {
    Ensemble::from_booked(
        vec![
            Box::new(Echo) as Box<dyn Classifier>,
            Box::new(Echo) as Box<dyn Classifier>,
        ],
        vec![
            Box::new(Identity) as Box<dyn Preprocessor>,
            Box::new(Identity) as Box<dyn Preprocessor>,
        ],
    )
    .unwrap()
}

fn schema() -> TrainingConfig {
    TrainingConfig::new(
        vec!["signal".into(), "background".into()],
        vec!["pt".into(), "eta".into()],
    )
    .unwrap()
}

fn ntuple(events: Vec<i64>, pt: Vec<f32>, eta: Vec<f32>) -> RowTable {
    RowTable::new("ntuple", events.len())
        .with_column("event", Column::I64(events))
        .with_column("pt", Column::F32(pt))
        .with_column("eta", Column::F32(eta))
}

fn write_container(dir: &Path, doc: &Document) -> PathBuf {
    let path = dir.join("sample.json");
    FsContainer::create(&path, doc).unwrap();
    path
}

fn reopen(path: &Path) -> Document {
    FsContainer::open(path).unwrap().document().clone()
}

#[test]
fn two_rows_routed_to_their_folds() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory(
        "mt_0",
        vec![ntuple(vec![10, 11], vec![30.0, 45.0], vec![0.1, -1.3])],
    );
    let path = write_container(dir.path(), &doc);

    let report = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap();
    assert_eq!(report.rows(), 2);

    let out = reopen(&path);
    let t = out.table("mt_0", "ntuple").unwrap();
    assert_eq!(t.column("nn_max_score"), Some(&Column::F32(vec![0.9, 0.7])));
    assert_eq!(t.column("nn_max_index"), Some(&Column::F32(vec![1.0, 0.0])));
    assert_eq!(t.column("pt"), Some(&Column::F32(vec![30.0, 45.0])));
}

#[test]
fn lock_left_by_a_crashed_run_does_not_block_the_next_one() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory(
        "mt_0",
        vec![ntuple(vec![10, 11], vec![30.0, 45.0], vec![0.1, -1.3])],
    );
    let path = write_container(dir.path(), &doc);
    let lock = dir.path().join("sample.json.lock");
    fs::write(&lock, "unix_time_ms=0\npid=4000000000\n").unwrap();

    annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap();
    assert!(!lock.exists());

    let out = reopen(&path);
    let t = out.table("mt_0", "ntuple").unwrap();
    assert_eq!(t.column("nn_max_score"), Some(&Column::F32(vec![0.9, 0.7])));
}

#[test]
fn empty_table_gets_empty_output_columns() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory("mt_0", vec![ntuple(vec![], vec![], vec![])]);
    let path = write_container(dir.path(), &doc);

    let report = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap();
    assert_eq!(report.partitions.len(), 1);
    assert_eq!(report.rows(), 0);

    let out = reopen(&path);
    let t = out.table("mt_0", "ntuple").unwrap();
    assert_eq!(t.column("nn_max_score"), Some(&Column::F32(vec![])));
    assert_eq!(t.column("nn_max_index"), Some(&Column::F32(vec![])));
}

#[test]
fn no_matching_partition_is_a_successful_noop() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory(
        "et_0",
        vec![ntuple(vec![1], vec![20.0], vec![0.0])],
    );
    let path = write_container(dir.path(), &doc);

    let report = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap();
    assert!(report.partitions.is_empty());
    assert_eq!(reopen(&path), doc);
}

#[test]
fn failing_partition_leaves_the_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let broken = RowTable::new("ntuple", 1)
        .with_column("event", Column::I64(vec![5]))
        .with_column("pt", Column::F32(vec![20.0]));
    let doc = Document::new()
        .with_directory("mt_0", vec![ntuple(vec![1, 2], vec![20.0, 21.0], vec![0.0, 0.5])])
        .with_directory("mt_1", vec![broken])
        .with_directory("mt_2", vec![ntuple(vec![3], vec![22.0], vec![1.0])]);
    let path = write_container(dir.path(), &doc);
    let before = fs::read(&path).unwrap();

    let err = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchemaBinding);
    assert_eq!(err.to_string(), "field eta not found in mt_1/ntuple");
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn missing_tree_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new()
        .with_directory("mt_0", vec![ntuple(vec![1], vec![20.0], vec![0.0])])
        .with_directory("mt_1", vec![]);
    let path = write_container(dir.path(), &doc);
    let before = fs::read(&path).unwrap();

    let err = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap_err();
    assert!(matches!(err, AnnotateError::PartitionResolution { ref partition, .. } if partition == "mt_1"));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn rerun_with_the_same_tag_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory("mt_0", vec![ntuple(vec![1], vec![20.0], vec![0.0])]);
    let path = write_container(dir.path(), &doc);

    annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap();
    let after_first = fs::read(&path).unwrap();

    let err = annotate_file(&path, AnnotateCfg::new("nn"), schema(), &constant_ensemble()).unwrap_err();
    assert!(matches!(err, AnnotateError::ColumnExists { .. }));
    assert_eq!(fs::read(&path).unwrap(), after_first);
}

#[test]
fn two_tags_carry_identical_values() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new().with_directory(
        "mt_0",
        vec![ntuple(
            vec![4, 9, 12, 17],
            vec![0.5, 3.0, -2.0, 2.0],
            vec![1.0, 1.0, -1.0, 2.0],
        )],
    );
    let path = write_container(dir.path(), &doc);
    let ensemble = echo_ensemble();

    annotate_file(&path, AnnotateCfg::new("first"), schema(), &ensemble).unwrap();
    annotate_file(&path, AnnotateCfg::new("second"), schema(), &ensemble).unwrap();

    let out = reopen(&path);
    let t = out.table("mt_0", "ntuple").unwrap();
    assert_eq!(t.column("first_max_score"), t.column("second_max_score"));
    assert_eq!(t.column("first_max_index"), t.column("second_max_index"));
    // [2, 2] ties resolve to the first class
    assert_eq!(
        t.column("first_max_index"),
        Some(&Column::F32(vec![1.0, 0.0, 1.0, 0.0]))
    );
}

#[test]
fn runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new()
        .with_directory("mt_a", vec![ntuple(vec![1, 2, 3], vec![1.5, 2.5, 3.5], vec![0.3, 0.2, 0.1])])
        .with_directory("mt_b", vec![ntuple(vec![8], vec![7.0], vec![9.0])]);

    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    FsContainer::create(&first, &doc).unwrap();
    FsContainer::create(&second, &doc).unwrap();

    let ensemble = echo_ensemble();
    annotate_file(&first, AnnotateCfg::new("nn"), schema(), &ensemble).unwrap();
    let mut cfg = AnnotateCfg::new("nn");
    cfg.threads = 2;
    cfg.batch_rows = 2;
    annotate_file(&second, cfg, schema(), &ensemble).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[rstest]
#[case(10, 2, 0)]
#[case(11, 2, 1)]
#[case(0, 3, 0)]
#[case(14, 3, 2)]
#[case(-1, 2, 1)]
#[case(-6, 4, 2)]
fn fold_is_event_modulo_k(#[case] event: i64, #[case] k: usize, #[case] expected: usize) {
    assert_eq!(fold(event, k), expected);
    assert_eq!(fold(event + k as i64, k), expected);
}

#[test]
fn cli_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let doc = Document::new()
        .with_directory("mt_jetFakes", vec![ntuple(vec![2, 3], vec![1.0, 1.0], vec![0.0, 0.0])])
        .with_directory("tt_jetFakes", vec![ntuple(vec![2], vec![1.0], vec![0.0])]);
    let input = write_container(root, &doc);

    fs::write(
        root.join("training.yaml"),
        "classes: [ggh, ztt]\nvariables: [pt, eta]\n",
    )
    .unwrap();
    // booked as [fold1, fold0]: position 0 serves even events
    fs::write(
        root.join("fold1_model.json"),
        r#"{"kind":"sequential","layers":[{"weights":[[1.0,-1.0],[0.0,0.0]],"bias":[0.0,0.0],"activation":"softmax"}]}"#,
    )
    .unwrap();
    fs::write(
        root.join("fold0_model.json"),
        r#"{"kind":"sequential","layers":[{"weights":[[-1.0,1.0],[0.0,0.0]],"bias":[0.0,0.0],"activation":"softmax"}]}"#,
    )
    .unwrap();
    fs::write(root.join("fold1_pre.json"), r#"{"kind":"identity"}"#).unwrap();
    fs::write(
        root.join("fold0_pre.json"),
        r#"{"kind":"standard_scaler","mean":[0.0,0.0],"scale":[1.0,1.0]}"#,
    )
    .unwrap();

    let path = |name: &str| root.join(name).to_str().unwrap().to_string();
    let args = Args::try_parse_from([
        "annotate-file".to_string(),
        path("sample.json"),
        "mt".to_string(),
        "--config-training".to_string(),
        path("training.yaml"),
        "--models".to_string(),
        path("fold1_model.json"),
        path("fold0_model.json"),
        "--preprocessing".to_string(),
        path("fold1_pre.json"),
        path("fold0_pre.json"),
    ])
    .unwrap();

    let report = cli::run(&args).unwrap();
    assert_eq!(report.partitions.len(), 1);

    let out = reopen(&input);
    let t = out.table("mt_jetFakes", "ntuple").unwrap();
    let expected = 1.0 / (1.0 + (-2.0f32).exp());
    match t.column("mt_max_score") {
        Some(Column::F32(scores)) => {
            assert_eq!(scores.len(), 2);
            assert_relative_eq!(scores[0], expected, epsilon = 1e-6);
            assert_relative_eq!(scores[1], expected, epsilon = 1e-6);
        }
        other => panic!("unexpected score column {other:?}"),
    }
    assert_eq!(t.column("mt_max_index"), Some(&Column::F32(vec![0.0, 1.0])));
    assert!(out.table("tt_jetFakes", "ntuple").unwrap().column("mt_max_score").is_none());
}
