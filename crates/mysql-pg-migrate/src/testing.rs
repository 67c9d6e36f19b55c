//! In-memory doubles for the catalog and executor seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{
    BulkInsertOutcome, ColumnDescriptor, FunctionDescriptor, PkValue, Row, SourceCatalog,
    SqlValue, TableDescriptor, TablePrivilegeDescriptor, TargetExecutor, TargetTransaction,
    UserDescriptor, ViewDescriptor,
};
use crate::error::{MigrateError, Result};

pub fn column(name: &str, type_expr: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        type_expr: type_expr.to_string(),
        nullable: true,
        default: None,
        comment: String::new(),
    }
}

/// Table `name (id int primary key, val varchar)` holding `rows` rows with
/// ids `1..=rows`.
pub fn simple_table(name: &str, rows: i64) -> (TableDescriptor, Vec<Row>) {
    let table = TableDescriptor {
        name: name.to_string(),
        ddl: format!(
            "CREATE TABLE `{}` (\n  `id` int NOT NULL,\n  `val` varchar(20) DEFAULT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB",
            name
        ),
        columns: vec![column("id", "int"), column("val", "varchar(20)")],
        indexes: Vec::new(),
    };
    let data = (1..=rows)
        .map(|i| vec![SqlValue::Int(i), SqlValue::Text(format!("v{}", i))])
        .collect();
    (table, data)
}

#[derive(Default)]
pub struct MockSource {
    pub database: String,
    pub tables: Vec<TableDescriptor>,
    pub rows: HashMap<String, Vec<Row>>,
    pub primary_keys: HashMap<String, String>,
    pub views: Vec<ViewDescriptor>,
    pub functions: Vec<FunctionDescriptor>,
    pub users: Vec<UserDescriptor>,
    pub grants: HashMap<String, Vec<String>>,
    pub table_privileges: Vec<TablePrivilegeDescriptor>,
    /// (table, limit) of every page fetch.
    pub fetches: Mutex<Vec<(String, usize)>>,
    /// Cursor passed to every keyset fetch.
    pub cursors: Mutex<Vec<Option<PkValue>>>,
}

impl MockSource {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..Default::default()
        }
    }

    /// Add a table keyed on its first column.
    pub fn with_table(mut self, table: TableDescriptor, rows: Vec<Row>) -> Self {
        if let Some(first) = table.columns.first() {
            self.primary_keys.insert(table.name.clone(), first.name.clone());
        }
        self.rows.insert(table.name.clone(), rows);
        self.tables.push(table);
        self
    }

    /// Add a table with no primary key.
    pub fn with_heap_table(mut self, table: TableDescriptor, rows: Vec<Row>) -> Self {
        self.rows.insert(table.name.clone(), rows);
        self.tables.push(table);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    fn table(&self, name: &str) -> Result<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrateError::Catalog(format!("no table {}", name)))
    }
}

#[async_trait]
impl SourceCatalog for MockSource {
    fn database(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        Ok(self.tables.clone())
    }

    async fn list_views(&self) -> Result<Vec<ViewDescriptor>> {
        Ok(self.views.clone())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.rows.get(table).map(|r| r.len() as i64).unwrap_or(0))
    }

    async fn primary_key(&self, table: &str) -> Result<String> {
        self.primary_keys
            .get(table)
            .cloned()
            .ok_or_else(|| MigrateError::Catalog(format!("table {} has no primary key", table)))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn stream_by_keyset(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        pk: &str,
        last: Option<&PkValue>,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.fetches.lock().unwrap().push((table.to_string(), limit));
        self.cursors.lock().unwrap().push(last.cloned());
        let idx = columns
            .iter()
            .position(|c| c.name == pk)
            .ok_or_else(|| MigrateError::Catalog(format!("no column {}", pk)))?;
        let rows = self.rows.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|r| match last {
                None => true,
                Some(last) => PkValue::from_value(&r[idx]).is_some_and(|v| &v > last),
            })
            .take(limit)
            .collect())
    }

    async fn stream_by_offset(
        &self,
        table: &str,
        _columns: &[ColumnDescriptor],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.fetches.lock().unwrap().push((table.to_string(), limit));
        let rows = self.rows.get(table).cloned().unwrap_or_default();
        Ok(rows.into_iter().skip(offset as usize).take(limit).collect())
    }

    async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>> {
        Ok(self.functions.clone())
    }

    async fn list_users(&self) -> Result<Vec<UserDescriptor>> {
        Ok(self.users.clone())
    }

    async fn list_user_grants(&self, login: &str, host: &str) -> Result<Vec<String>> {
        Ok(self
            .grants
            .get(&format!("{}@{}", login, host))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_table_privileges(&self) -> Result<Vec<TablePrivilegeDescriptor>> {
        Ok(self.table_privileges.clone())
    }
}

/// Everything the mock target has seen.
#[derive(Debug, Default)]
pub struct TargetLog {
    pub ddl: Vec<String>,
    pub tx_statements: Vec<String>,
    pub grants: Vec<String>,
    pub loads: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Committed row counts per table.
    pub committed: HashMap<String, i64>,
    pub load_columns: Vec<Vec<String>>,
}

#[derive(Default)]
pub struct MockTarget {
    pub log: Arc<Mutex<TargetLog>>,
    pub existing_tables: HashSet<String>,
    /// Loads into this table fail.
    pub fail_load: Option<String>,
    /// DDL containing this text fails.
    pub fail_ddl: Option<String>,
    /// Roles unknown to the target.
    pub missing_roles: HashSet<String>,
    /// Rows silently dropped from every load, to provoke count mismatches.
    pub drop_rows: usize,
    /// Time every DDL statement takes.
    pub ddl_delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    /// Highest number of DDL statements seen running at once.
    pub max_in_flight: AtomicUsize,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ddl(&self) -> Vec<String> {
        self.log.lock().unwrap().ddl.clone()
    }

    pub fn committed(&self, table: &str) -> i64 {
        self.log
            .lock()
            .unwrap()
            .committed
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TargetExecutor for MockTarget {
    async fn exec_ddl(&self, sql: &str) -> Result<()> {
        if let Some(needle) = &self.fail_ddl {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::execute(sql, "syntax error"));
            }
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.ddl_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.lock().unwrap().ddl.push(sql.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.existing_tables.contains(name))
    }

    async fn begin_tx(&self) -> Result<Box<dyn TargetTransaction>> {
        Ok(Box::new(MockTransaction {
            log: self.log.clone(),
            fail_load: self.fail_load.clone(),
            drop_rows: self.drop_rows,
            pending: HashMap::new(),
        }))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        Ok(self.committed(table))
    }

    async fn grant(&self, user: &str, table: &str, privileges: &[String]) -> Result<()> {
        if self.missing_roles.contains(user) {
            return Ok(());
        }
        let mut log = self.log.lock().unwrap();
        for p in privileges {
            log.grants.push(crate::dialect::grant_table_sql(p, table, user));
        }
        Ok(())
    }
}

pub struct MockTransaction {
    log: Arc<Mutex<TargetLog>>,
    fail_load: Option<String>,
    drop_rows: usize,
    pending: HashMap<String, i64>,
}

#[async_trait]
impl TargetTransaction for MockTransaction {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if let Some(table) = sql.strip_prefix("TRUNCATE TABLE ") {
            log.committed.remove(table.trim_matches('"'));
        }
        log.tx_statements.push(sql.to_string());
        Ok(())
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        _batch_size: usize,
        pk: Option<&str>,
    ) -> Result<BulkInsertOutcome> {
        {
            let mut log = self.log.lock().unwrap();
            log.loads += 1;
            log.load_columns.push(columns.to_vec());
        }
        if self.fail_load.as_deref() == Some(table) {
            return Err(MigrateError::load(table, "invalid input syntax"));
        }
        let inserted = rows.len().saturating_sub(self.drop_rows) as u64;
        *self.pending.entry(table.to_string()).or_default() += inserted as i64;
        let last_pk = pk
            .and_then(|pk| columns.iter().position(|c| c == pk))
            .and_then(|i| rows.last().and_then(|r| r.get(i)))
            .and_then(PkValue::from_value);
        Ok(BulkInsertOutcome { inserted, last_pk })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.commits += 1;
        for (table, n) in &self.pending {
            *log.committed.entry(table.clone()).or_default() += n;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
