//! Catalog descriptors read from the source database.
//!
//! Descriptors are created once by the catalog reader and never mutated
//! afterwards; phases share them through `Arc`.

use chrono::{DateTime, Local};

/// A base table with its raw DDL, columns and secondary indexes.
#[derive(Debug, Clone, Default)]
pub struct TableDescriptor {
    pub name: String,
    /// Raw `SHOW CREATE TABLE` text.
    pub ddl: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Secondary indexes; PRIMARY is filtered out at read time.
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDescriptor {
    /// Name with original case.
    pub name: String,
    /// Full MySQL type expression, e.g. `bigint(20) unsigned`.
    pub type_expr: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: String,
}

impl ColumnDescriptor {
    /// Lowercased base type without length or modifiers, e.g. `bigint`.
    pub fn base_type(&self) -> String {
        self.type_expr
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn is_unsigned(&self) -> bool {
        self.type_expr.to_lowercase().contains("unsigned")
    }
}

/// Secondary index metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    /// Columns in index order.
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A view and its `VIEW_DEFINITION` body.
#[derive(Debug, Clone, Default)]
pub struct ViewDescriptor {
    pub name: String,
    pub definition: String,
}

/// A stored function and its `SHOW CREATE FUNCTION` text.
#[derive(Debug, Clone, Default)]
pub struct FunctionDescriptor {
    pub name: String,
    pub definition: String,
}

/// A MySQL account and the grant strings the server reports for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDescriptor {
    pub login: String,
    pub host: String,
    pub grants: Vec<String>,
}

/// One row of `mysql.tables_priv`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablePrivilegeDescriptor {
    pub host: String,
    pub db: String,
    pub user: String,
    pub table: String,
    /// Comma-separated privilege set, e.g. `Select,Insert`.
    pub privileges: String,
}

/// Timing and object count for one executed phase.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub objects: usize,
}

impl Stage {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Row-count mismatch found by post-load validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_type() {
        let col = ColumnDescriptor {
            name: "id".into(),
            type_expr: "bigint(20) unsigned".into(),
            ..Default::default()
        };
        assert_eq!(col.base_type(), "bigint");
        assert!(col.is_unsigned());

        let col = ColumnDescriptor {
            name: "n".into(),
            type_expr: "TEXT".into(),
            ..Default::default()
        };
        assert_eq!(col.base_type(), "text");
        assert!(!col.is_unsigned());
    }

    #[test]
    fn test_stage_duration() {
        let start = Local::now();
        let stage = Stage {
            name: "Data".into(),
            started_at: start,
            finished_at: start + chrono::Duration::milliseconds(1500),
            objects: 3,
        };
        assert!((stage.duration_secs() - 1.5).abs() < f64::EPSILON);
    }
}
