//! Seams between the engine and the two databases.
//!
//! - [`SourceCatalog`]: reads metadata and pages of rows from MySQL
//! - [`TargetExecutor`]: runs DDL, checks, and opens transactions on PostgreSQL
//! - [`TargetTransaction`]: one open transaction used for a single load batch
//!
//! The scheduler and the data pipeline only see these traits, so both can be
//! driven by in-memory doubles in tests.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{
    ColumnDescriptor, FunctionDescriptor, TableDescriptor, TablePrivilegeDescriptor,
    UserDescriptor, ViewDescriptor,
};
use super::value::{PkValue, Row};

/// Read metadata and rows from the source database.
///
/// Identifiers sent to the source are wrapped in backticks by implementations.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Name of the source database, used to strip qualifiers from view bodies.
    fn database(&self) -> &str;

    /// List base tables with raw DDL, columns and secondary indexes.
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>>;

    /// List views with their definition bodies.
    async fn list_views(&self) -> Result<Vec<ViewDescriptor>>;

    /// Exact row count of a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// First column of the primary key; error if the table has none.
    async fn primary_key(&self, table: &str) -> Result<String>;

    /// Columns in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Fetch up to `limit` rows with `pk > last`, ordered by `pk`.
    /// `last = None` fetches the first page.
    async fn stream_by_keyset(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        pk: &str,
        last: Option<&PkValue>,
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Fetch up to `limit` rows starting at `offset`.
    async fn stream_by_offset(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Stored functions with their `SHOW CREATE FUNCTION` text.
    async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>>;

    /// Accounts other than built-in system accounts, grants not yet loaded.
    async fn list_users(&self) -> Result<Vec<UserDescriptor>>;

    /// Grant strings reported for one account.
    async fn list_user_grants(&self, login: &str, host: &str) -> Result<Vec<String>>;

    /// Rows of `mysql.tables_priv`.
    async fn list_table_privileges(&self) -> Result<Vec<TablePrivilegeDescriptor>>;
}

/// Result of one bulk load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkInsertOutcome {
    pub inserted: u64,
    /// Primary-key value of the last row scanned, or `MAX(pk)` when no row
    /// produced one.
    pub last_pk: Option<PkValue>,
}

/// Execute statements against the target database.
#[async_trait]
pub trait TargetExecutor: Send + Sync {
    /// Run a DDL statement. "already exists" and duplicate-key failures are
    /// logged and treated as success.
    async fn exec_ddl(&self, sql: &str) -> Result<()>;

    /// Whether a table with this exact name exists in the target schema.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Open a transaction on a dedicated pooled connection.
    async fn begin_tx(&self) -> Result<Box<dyn TargetTransaction>>;

    /// Exact row count of a target table.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Grant table privileges; a missing role is logged and skipped.
    async fn grant(&self, user: &str, table: &str, privileges: &[String]) -> Result<()>;
}

/// An open target transaction.
#[async_trait]
pub trait TargetTransaction: Send {
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Load `rows` into `table`, flushing every `batch_size` rows.
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        batch_size: usize,
        pk: Option<&str>,
    ) -> Result<BulkInsertOutcome>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
