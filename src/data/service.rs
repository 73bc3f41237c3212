//! Partition discovery over an opened container.

use crate::common::error::{AnnotateError, AnnotateResult};

use super::domain::Container;

/// Names of top-level entries starting with `prefix`, in container order.
pub fn locate_partitions<'a, I>(keys: I, prefix: &'a str) -> impl Iterator<Item = String> + 'a
where
    I: IntoIterator<Item = String>,
    I::IntoIter: 'a,
{
    keys.into_iter().filter(move |name| name.starts_with(prefix))
}

/// Resolve `partition/table`, failing the run if it is not there.
pub fn resolve_table<'c, C: Container>(
    container: &'c mut C,
    partition: &str,
    table: &str,
) -> AnnotateResult<&'c mut C::Table> {
    container
        .table_mut(partition, table)
        .ok_or_else(|| AnnotateError::PartitionResolution {
            partition: partition.to_string(),
            table: table.to_string(),
        })
}
