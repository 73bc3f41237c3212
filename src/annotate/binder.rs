//! Binds configured variable names and the two output fields on a row-table.

use tracing::debug;

use crate::common::config::AnnotateCfg;
use crate::common::error::{AnnotateError, AnnotateResult};
use crate::data::domain::{FieldAccess, FieldId};

use super::domain::Bindings;

/// Bind reads for `variables` and the event field, then declare the outputs.
///
/// Any missing input is fatal, as is an output name that already exists. The
/// table must be complete, since rows are read by index afterwards.
pub fn bind<T: FieldAccess>(
    table: &mut T,
    partition: &str,
    cfg: &AnnotateCfg,
    variables: &[String],
) -> AnnotateResult<Bindings> {
    table
        .validate()
        .map_err(|reason| AnnotateError::MalformedTable {
            partition: partition.to_string(),
            table: cfg.tree.clone(),
            reason,
        })?;

    let lookup = |table: &T, field: &str| -> AnnotateResult<FieldId> {
        table.field(field).ok_or_else(|| AnnotateError::SchemaBinding {
            partition: partition.to_string(),
            table: cfg.tree.clone(),
            field: field.to_string(),
        })
    };

    let features = variables
        .iter()
        .map(|v| lookup(&*table, v))
        .collect::<AnnotateResult<Vec<_>>>()?;
    let event = lookup(&*table, &cfg.event_branch)?;

    let mut declare = |field: String| -> AnnotateResult<FieldId> {
        table.declare(&field).ok_or_else(|| AnnotateError::ColumnExists {
            partition: partition.to_string(),
            table: cfg.tree.clone(),
            field,
        })
    };
    let max_score = declare(cfg.score_field())?;
    let max_index = declare(cfg.index_field())?;

    debug!(partition, variables = features.len(), "bound row-table fields");
    Ok(Bindings {
        features,
        event,
        max_score,
        max_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{Column, RowTable};

    fn table() -> RowTable {
        RowTable::new("ntuple", 1)
            .with_column("event", Column::I64(vec![7]))
            .with_column("eta", Column::F32(vec![0.5]))
            .with_column("pt", Column::F32(vec![40.0]))
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn binds_in_configured_order_and_declares_tagged_outputs() {
        let mut t = table();
        let cfg = AnnotateCfg::new("nn");
        let b = bind(&mut t, "mt_0", &cfg, &vars(&["pt", "eta"])).unwrap();

        assert_eq!(b.features, vec![FieldId(2), FieldId(1)]);
        assert_eq!(b.event, FieldId(0));
        assert_eq!(t.field("nn_max_score"), Some(b.max_score));
        assert_eq!(t.field("nn_max_index"), Some(b.max_index));
        assert_eq!(t.column("nn_max_score"), Some(&Column::F32(vec![])));
    }

    #[test]
    fn missing_variable_fails_before_outputs_are_declared() {
        let mut t = table();
        let cfg = AnnotateCfg::new("nn");
        let err = bind(&mut t, "mt_3", &cfg, &vars(&["pt", "phi"])).unwrap_err();
        assert_eq!(err.to_string(), "field phi not found in mt_3/ntuple");
        assert_eq!(t.field("nn_max_score"), None);
    }

    #[test]
    fn missing_event_field_is_a_binding_error() {
        let mut t = table();
        let mut cfg = AnnotateCfg::new("nn");
        cfg.event_branch = "evt".into();
        assert!(matches!(
            bind(&mut t, "mt_0", &cfg, &vars(&["pt"])),
            Err(AnnotateError::SchemaBinding { ref field, .. }) if field == "evt"
        ));
    }

    #[test]
    fn rebinding_the_same_tag_is_refused() {
        let mut t = table();
        let cfg = AnnotateCfg::new("nn");
        bind(&mut t, "mt_0", &cfg, &vars(&["pt"])).unwrap();
        assert!(matches!(
            bind(&mut t, "mt_0", &cfg, &vars(&["pt"])),
            Err(AnnotateError::ColumnExists { .. })
        ));
    }
}
