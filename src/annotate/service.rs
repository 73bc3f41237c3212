//! Annotation loop and persistence controller.
//!
//! Every matched partition is annotated in memory; the container is committed
//! once, after the last partition. Any error returns before the commit, so the
//! backing file is left exactly as it was.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::common::buf::{FeatureBuffer, OutputSlot};
use crate::common::config::{AnnotateCfg, TrainingConfig};
use crate::common::error::{AnnotateError, AnnotateResult};
use crate::data::domain::{Container, FieldAccess};
use crate::data::repo_fs::FsContainer;
use crate::data::service::{locate_partitions, resolve_table};
use crate::inference::domain::{Ensemble, FoldRouter, InferenceError, ModuloRouter};
use crate::inference::service::{predict, reduce};
use crate::inference::workers::{Pool, RowJob};

use super::binder::bind;
use super::domain::{Bindings, PartitionReport, RunReport};

/// Annotates containers with one ensemble under one configuration.
pub struct Annotator<'e> {
    cfg: AnnotateCfg,
    schema: TrainingConfig,
    ensemble: &'e Ensemble,
    router: ModuloRouter,
    pool: Option<Pool>,
}

impl<'e> Annotator<'e> {
    pub fn new(
        cfg: AnnotateCfg,
        schema: TrainingConfig,
        ensemble: &'e Ensemble,
    ) -> AnnotateResult<Self> {
        cfg.validate()?;
        for (fold, classes) in class_count_mismatches(ensemble, schema.classes.len()) {
            warn!(
                fold,
                classes,
                expected = schema.classes.len(),
                "classifier class count differs from the training config"
            );
        }
        let pool = if cfg.threads > 1 {
            let pool = Pool::new(cfg.threads)?;
            debug!(threads = pool.threads(), batch_rows = cfg.batch_rows, "scoring pool started");
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            router: ModuloRouter::for_ensemble(ensemble),
            cfg,
            schema,
            ensemble,
            pool,
        })
    }

    /// Annotate every matched partition, then commit the container once.
    pub fn run<C: Container>(&self, container: &mut C) -> AnnotateResult<RunReport> {
        debug!("following mapping of classes to class numbers is used");
        for (index, class) in self.schema.classes.iter().enumerate() {
            debug!(index, class = %class, "class mapping");
        }

        let partitions: Vec<String> =
            locate_partitions(container.keys(), &self.cfg.dir_prefix).collect();
        if let Some(partition) = first_duplicate(&partitions) {
            return Err(AnnotateError::DuplicatePartition {
                partition: partition.to_string(),
            });
        }
        let mut report = RunReport::default();

        for name in partitions {
            let span = info_span!("partition", partition = %name);
            let _entered = span.enter();
            debug!(tree = %self.cfg.tree, "process directory");

            let table = resolve_table(container, &name, &self.cfg.tree)?;
            report.partitions.push(self.annotate_table(&name, table)?);
        }

        container.commit()?;
        info!(
            partitions = report.partitions.len(),
            rows = report.rows(),
            tag = %self.cfg.tag,
            "annotations committed"
        );
        Ok(report)
    }

    /// Bind and fill the output fields of one row-table.
    pub fn annotate_table<T: FieldAccess>(
        &self,
        partition: &str,
        table: &mut T,
    ) -> AnnotateResult<PartitionReport> {
        let start = Instant::now();
        let bindings = bind(table, partition, &self.cfg, &self.schema.variables)?;
        let mut rows_per_fold = vec![0usize; self.ensemble.folds()];

        match &self.pool {
            Some(pool) => self.fill_parallel(pool, partition, table, &bindings, &mut rows_per_fold)?,
            None => self.fill_sequential(partition, table, &bindings, &mut rows_per_fold)?,
        }

        let report = PartitionReport {
            name: partition.to_string(),
            rows: table.entries(),
            rows_per_fold,
            dur_ms: start.elapsed().as_millis(),
        };
        info!(
            rows = report.rows,
            rows_per_fold = ?report.rows_per_fold,
            dur_ms = report.dur_ms as u64,
            "partition annotated"
        );
        Ok(report)
    }

    fn fill_sequential<T: FieldAccess>(
        &self,
        partition: &str,
        table: &mut T,
        bindings: &Bindings,
        rows_per_fold: &mut [usize],
    ) -> AnnotateResult<()> {
        let mut features = FeatureBuffer::new(bindings.features.len());
        let mut out = OutputSlot::default();

        for row in 0..table.entries() {
            features.load(|slot| table.get_f32(bindings.features[slot], row));
            let event = self.event(partition, table, bindings, row)?;
            let fold = self.router.route(event);
            let scored = predict(self.ensemble, features.as_slice(), fold);

            self.record(partition, table, bindings, &mut out, row, event, scored)?;
            rows_per_fold[fold] += 1;
        }
        Ok(())
    }

    fn fill_parallel<T: FieldAccess>(
        &self,
        pool: &Pool,
        partition: &str,
        table: &mut T,
        bindings: &Bindings,
        rows_per_fold: &mut [usize],
    ) -> AnnotateResult<()> {
        let entries = table.entries();
        let mut out = OutputSlot::default();
        let mut begin = 0;

        while begin < entries {
            let end = (begin + self.cfg.batch_rows).min(entries);
            let jobs = (begin..end)
                .map(|row| -> AnnotateResult<RowJob> {
                    let event = self.event(partition, table, bindings, row)?;
                    Ok(RowJob {
                        row,
                        event,
                        fold: self.router.route(event),
                        features: bindings
                            .features
                            .iter()
                            .map(|&field| table.get_f32(field, row))
                            .collect(),
                    })
                })
                .collect::<AnnotateResult<Vec<_>>>()?;

            let scored = pool.score(self.ensemble, &jobs);
            for (job, scores) in jobs.iter().zip(scored) {
                self.record(partition, table, bindings, &mut out, job.row, job.event, scores)?;
                rows_per_fold[job.fold] += 1;
            }
            begin = end;
        }
        Ok(())
    }

    fn event<T: FieldAccess>(
        &self,
        partition: &str,
        table: &T,
        bindings: &Bindings,
        row: usize,
    ) -> AnnotateResult<i64> {
        table
            .get_i64(bindings.event, row)
            .ok_or_else(|| AnnotateError::InvalidEvent {
                partition: partition.to_string(),
                row,
                field: self.cfg.event_branch.clone(),
            })
    }

    /// Reduce one row's scores and append them to the output fields.
    #[allow(clippy::too_many_arguments)]
    fn record<T: FieldAccess>(
        &self,
        partition: &str,
        table: &mut T,
        bindings: &Bindings,
        out: &mut OutputSlot,
        row: usize,
        event: i64,
        scored: Result<Vec<f32>, InferenceError>,
    ) -> AnnotateResult<()> {
        let scores = scored.map_err(|source| AnnotateError::Inference {
            partition: partition.to_string(),
            row,
            event,
            source,
        })?;
        let best = reduce(&scores).ok_or_else(|| AnnotateError::UnresolvedArgmax {
            partition: partition.to_string(),
            row,
            event,
        })?;

        out.set(best.score, best.index);
        table.fill(bindings.max_score, out.max_score);
        table.fill(bindings.max_index, out.max_index);
        Ok(())
    }
}

/// `(fold, classes)` for every member whose classifier disagrees with `expected`.
fn class_count_mismatches(ensemble: &Ensemble, expected: usize) -> Vec<(usize, usize)> {
    ensemble
        .members()
        .iter()
        .filter_map(|m| {
            m.classifier
                .classes()
                .filter(|&n| n != expected)
                .map(|n| (m.fold_index, n))
        })
        .collect()
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    names
        .iter()
        .enumerate()
        .find_map(|(i, name)| names[..i].contains(name).then_some(name.as_str()))
}

/// Open the container at `path`, annotate it and commit.
///
/// The container lock is held for the whole run and released on return.
pub fn annotate_file(
    path: &Path,
    cfg: AnnotateCfg,
    schema: TrainingConfig,
    ensemble: &Ensemble,
) -> AnnotateResult<RunReport> {
    let annotator = Annotator::new(cfg, schema, ensemble)?;
    let mut container = FsContainer::open(path)?;
    annotator.run(&mut container)
}
