//! Dataset container model and the capabilities the annotation engine binds against.
//!
//! A container holds ordered top-level directories; each directory holds named
//! row-tables; a row-table holds `entries` rows stored column-wise. The engine
//! never touches these types directly, only the [`FieldAccess`] and
//! [`Container`] traits.

use serde::{Deserialize, Serialize};

use crate::common::error::{AnnotateError, AnnotateResult};

/// Typed column storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::F32(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::I32(v) => v.len(),
            Column::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_f32(&self, row: usize) -> f32 {
        match self {
            Column::F32(v) => v[row],
            Column::F64(v) => v[row] as f32,
            Column::I32(v) => v[row] as f32,
            Column::I64(v) => v[row] as f32,
        }
    }

    /// Integer view; floats truncate toward zero and NaN or infinity has none.
    fn get_i64(&self, row: usize) -> Option<i64> {
        match self {
            Column::F32(v) => truncate(f64::from(v[row])),
            Column::F64(v) => truncate(v[row]),
            Column::I32(v) => Some(i64::from(v[row])),
            Column::I64(v) => Some(v[row]),
        }
    }

    fn push_f32(&mut self, value: f32) {
        match self {
            Column::F32(v) => v.push(value),
            Column::F64(v) => v.push(f64::from(value)),
            Column::I32(v) => v.push(value as i32),
            Column::I64(v) => v.push(value as i64),
        }
    }
}

fn truncate(value: f64) -> Option<i64> {
    value.is_finite().then(|| value as i64)
}

/// Named column inside a row-table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub column: Column,
}

/// Position of a field inside a row-table, valid for the table's lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldId(pub usize);

/// Sequence of uniformly-schemaed rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowTable {
    pub name: String,
    pub entries: usize,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

impl RowTable {
    pub fn new(name: impl Into<String>, entries: usize) -> Self {
        Self {
            name: name.into(),
            entries,
            branches: Vec::new(),
        }
    }

    /// Builder used by fixtures and importers.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.branches.push(Branch {
            name: name.into(),
            column,
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.branches
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.column)
    }

    /// Check every column holds exactly `entries` values.
    pub fn check_lengths(&self) -> Result<(), String> {
        for branch in &self.branches {
            if branch.column.len() != self.entries {
                return Err(format!(
                    "branch {} of tree {} has {} values, expected {}",
                    branch.name,
                    self.name,
                    branch.column.len(),
                    self.entries
                ));
            }
        }
        Ok(())
    }
}

/// Capability for reading and extending a row-table by field name.
///
/// Reads take `row < entries()`; callers bind field ids once per table and
/// reuse them for every row.
pub trait FieldAccess {
    fn entries(&self) -> usize;
    fn field(&self, name: &str) -> Option<FieldId>;
    fn get_f32(&self, field: FieldId, row: usize) -> f32;
    /// `None` when the stored value is not a finite number.
    fn get_i64(&self, field: FieldId, row: usize) -> Option<i64>;
    /// Check every field holds `entries()` values before any row is read.
    fn validate(&self) -> Result<(), String>;
    /// Add a new, empty float field. Returns `None` if the name is taken.
    fn declare(&mut self, name: &str) -> Option<FieldId>;
    /// Append the next row's value to a declared field.
    fn fill(&mut self, field: FieldId, value: f32);
}

impl FieldAccess for RowTable {
    fn entries(&self) -> usize {
        self.entries
    }

    fn field(&self, name: &str) -> Option<FieldId> {
        self.branches
            .iter()
            .position(|b| b.name == name)
            .map(FieldId)
    }

    fn get_f32(&self, field: FieldId, row: usize) -> f32 {
        self.branches[field.0].column.get_f32(row)
    }

    fn get_i64(&self, field: FieldId, row: usize) -> Option<i64> {
        self.branches[field.0].column.get_i64(row)
    }

    fn validate(&self) -> Result<(), String> {
        self.check_lengths()
    }

    fn declare(&mut self, name: &str) -> Option<FieldId> {
        if self.field(name).is_some() {
            return None;
        }
        self.branches.push(Branch {
            name: name.to_string(),
            column: Column::F32(Vec::with_capacity(self.entries)),
        });
        Some(FieldId(self.branches.len() - 1))
    }

    fn fill(&mut self, field: FieldId, value: f32) {
        self.branches[field.0].column.push_f32(value);
    }
}

/// Top-level entry holding row-tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<RowTable>,
}

/// Whole container contents, in native enumeration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub directories: Vec<Directory>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(mut self, name: impl Into<String>, tables: Vec<RowTable>) -> Self {
        self.directories.push(Directory {
            name: name.into(),
            tables,
        });
        self
    }

    pub fn table(&self, dir: &str, table: &str) -> Option<&RowTable> {
        self.directories
            .iter()
            .find(|d| d.name == dir)?
            .tables
            .iter()
            .find(|t| t.name == table)
    }

    /// Directory names must be unique and every column must be complete.
    pub fn validate(&self) -> Result<(), String> {
        for (i, dir) in self.directories.iter().enumerate() {
            if self.directories[..i].iter().any(|d| d.name == dir.name) {
                return Err(format!("directory {} appears more than once", dir.name));
            }
            for table in &dir.tables {
                table
                    .check_lengths()
                    .map_err(|reason| format!("{}: {reason}", dir.name))?;
            }
        }
        Ok(())
    }
}

/// Container opened for update for the duration of one run.
pub trait Container {
    type Table: FieldAccess;

    /// Names of the top-level entries in native order.
    fn keys(&self) -> Vec<String>;

    /// Resolve `dir/table`.
    fn table_mut(&mut self, dir: &str, table: &str) -> Option<&mut Self::Table>;

    /// Make every mutation durable in one write.
    fn commit(&mut self) -> AnnotateResult<()>;
}

/// In-memory container; commit only re-validates the contents.
impl Container for Document {
    type Table = RowTable;

    fn keys(&self) -> Vec<String> {
        self.directories.iter().map(|d| d.name.clone()).collect()
    }

    fn table_mut(&mut self, dir: &str, table: &str) -> Option<&mut RowTable> {
        self.directories
            .iter_mut()
            .find(|d| d.name == dir)?
            .tables
            .iter_mut()
            .find(|t| t.name == table)
    }

    fn commit(&mut self) -> AnnotateResult<()> {
        self.validate().map_err(AnnotateError::Inconsistent)
    }
}
