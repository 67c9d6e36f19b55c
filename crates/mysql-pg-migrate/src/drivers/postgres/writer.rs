//! PostgreSQL target executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, CopyInSink, NoTls};
use tracing::{debug, info, warn};

use super::copy::{copy_statement, encode_copy_rows, insert_statement, rows_per_insert};
use super::tls::{make_tls, SslMode};
use crate::config::PostgresConfig;
use crate::core::identifier::quote_pg;
use crate::core::{BulkInsertOutcome, PkValue, Row, SqlValue, TargetExecutor, TargetTransaction};
use crate::dialect::grant_table_sql;
use crate::error::{MigrateError, Result};

const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const COPY_SAVEPOINT: &str = "mig_copy";

/// SQLSTATEs for objects that already exist: duplicate_table,
/// duplicate_object, unique_violation, duplicate_schema, duplicate_function.
const ALREADY_EXISTS_CODES: &[&str] = &["42P07", "42710", "23505", "42P06", "42723"];

/// undefined_object, raised by GRANT for an unknown role.
const UNDEFINED_OBJECT: &str = "42704";

/// PostgreSQL implementation of [`TargetExecutor`].
pub struct PostgresExecutor {
    pool: Pool,
    /// Set after the first failed COPY; every later load uses INSERT.
    copy_disabled: Arc<AtomicBool>,
}

impl PostgresExecutor {
    /// Open the target pool and check connectivity.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.username);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match make_tls(SslMode::parse(&config.ssl_mode)?)? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(mgr)
            .max_size(config.get_max_conns())
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let executor = Self {
            pool,
            copy_disabled: Arc::new(AtomicBool::new(false)),
        };
        executor.test_connection().await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(executor)
    }

    /// Run a trivial query to check the connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::connection("postgresql", e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("postgresql", pg_error_message(&e)))?;
        Ok(())
    }

    pub async fn server_version(&self) -> Result<String> {
        let client = self.client().await?;
        let row = client.query_one("SHOW server_version", &[]).await?;
        Ok(row.get::<_, String>(0))
    }

    pub fn close(&self) {
        self.pool.close();
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }
}

#[async_trait]
impl TargetExecutor for PostgresExecutor {
    async fn exec_ddl(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        match client.batch_execute(sql).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let (code, message) = error_parts(&e);
                if is_already_exists(code.as_deref(), &message) {
                    info!("Object already exists, skipping: {}", message);
                    Ok(())
                } else {
                    Err(MigrateError::execute(sql, message))
                }
            }
        }
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&name],
            )
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn begin_tx(&self) -> Result<Box<dyn TargetTransaction>> {
        let client = self.client().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
            copy_disabled: self.copy_disabled.clone(),
        }))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", quote_pg(table));
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn grant(&self, user: &str, table: &str, privileges: &[String]) -> Result<()> {
        let client = self.client().await?;
        for privilege in privileges {
            let sql = grant_table_sql(privilege, table, user);
            if let Err(e) = client.batch_execute(&sql).await {
                let (code, message) = error_parts(&e);
                if is_missing_role(code.as_deref(), &message) {
                    warn!("Skipping grants on {} for {}: {}", table, user, message);
                    return Ok(());
                }
                return Err(MigrateError::execute(sql, message));
            }
            debug!("{}", sql);
        }
        Ok(())
    }
}

/// One open transaction holding a pooled connection.
///
/// Dropping it without commit or rollback detaches the connection from the
/// pool so the open transaction dies with it.
pub struct PgTransaction {
    client: Option<Object>,
    copy_disabled: Arc<AtomicBool>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::Internal("transaction already finished".to_string()))
    }

    async fn load_chunk(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        let load_err = |e: tokio_postgres::Error| MigrateError::load(table, pg_error_message(&e));

        if !self.copy_disabled.load(Ordering::Acquire) {
            let client = self.client()?;
            client
                .batch_execute(&format!("SAVEPOINT {}", COPY_SAVEPOINT))
                .await
                .map_err(load_err)?;

            match copy_rows(client, table, columns, rows).await {
                Ok(n) => {
                    client
                        .batch_execute(&format!("RELEASE SAVEPOINT {}", COPY_SAVEPOINT))
                        .await
                        .map_err(load_err)?;
                    return Ok(n);
                }
                Err(e) => {
                    client
                        .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", COPY_SAVEPOINT))
                        .await
                        .map_err(load_err)?;
                    if !self.copy_disabled.swap(true, Ordering::AcqRel) {
                        warn!(
                            "COPY into {} failed ({}); using INSERT for the rest of the run",
                            table,
                            pg_error_message(&e)
                        );
                    }
                }
            }
        }

        self.insert_rows(table, columns, rows).await
    }

    async fn insert_rows(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        let client = self.client()?;
        let load_err = |e: tokio_postgres::Error| MigrateError::load(table, pg_error_message(&e));

        let types = column_types(client, table, columns).await.map_err(load_err)?;
        let mut inserted = 0u64;
        for group in rows.chunks(rows_per_insert(columns.len())) {
            let sql = insert_statement(table, columns, &types, group.len());
            let values: Vec<Option<String>> = group
                .iter()
                .flat_map(|row| row.iter().map(SqlValue::to_pg_text))
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            inserted += client.execute(sql.as_str(), &params).await.map_err(load_err)?;
        }
        Ok(inserted)
    }

    async fn max_pk(&self, table: &str, pk: &str) -> Result<Option<PkValue>> {
        let client = self.client()?;
        let sql = format!("SELECT MAX({})::text FROM {}", quote_pg(pk), quote_pg(table));
        let row = client
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| MigrateError::load(table, pg_error_message(&e)))?;
        Ok(row.get::<_, Option<String>>(0).map(parse_pk_text))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        let client = self.client.take().ok_or_else(|| {
            MigrateError::Internal("transaction already finished".to_string())
        })?;
        if let Err(e) = client.batch_execute(statement).await {
            let _ = Object::take(client);
            return Err(MigrateError::execute(statement, pg_error_message(&e)));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetTransaction for PgTransaction {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| MigrateError::execute(sql, pg_error_message(&e)))
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        batch_size: usize,
        pk: Option<&str>,
    ) -> Result<BulkInsertOutcome> {
        let mut inserted = 0u64;
        for chunk in rows.chunks(batch_size.max(1)) {
            inserted += self.load_chunk(table, columns, chunk).await?;
        }

        let pk_index = pk.and_then(|pk| columns.iter().position(|c| c == pk));
        let mut last_pk = pk_index
            .and_then(|i| rows.last().and_then(|row| row.get(i)))
            .and_then(PkValue::from_value);
        if last_pk.is_none() {
            if let Some(pk) = pk {
                last_pk = self.max_pk(table, pk).await?;
            }
        }

        Ok(BulkInsertOutcome { inserted, last_pk })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            debug!("Discarding connection with an unfinished transaction");
            let _ = Object::take(client);
        }
    }
}

async fn copy_rows(
    client: &Client,
    table: &str,
    columns: &[String],
    rows: &[Row],
) -> std::result::Result<u64, tokio_postgres::Error> {
    let sql = copy_statement(table, columns);
    let sink: CopyInSink<Bytes> = client.copy_in(sql.as_str()).await?;
    tokio::pin!(sink);
    sink.send(encode_copy_rows(rows).freeze()).await?;
    sink.finish().await
}

/// `format_type` of each column in `columns` order.
async fn column_types(
    client: &Client,
    table: &str,
    columns: &[String],
) -> std::result::Result<Vec<String>, tokio_postgres::Error> {
    let regclass = quote_pg(table);
    let rows = client
        .query(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
             FROM pg_attribute a \
             WHERE a.attrelid = $1::text::regclass AND a.attnum > 0 AND NOT a.attisdropped",
            &[&regclass],
        )
        .await?;
    let types: HashMap<String, String> = rows
        .iter()
        .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
        .collect();
    Ok(columns
        .iter()
        .map(|c| types.get(c).cloned().unwrap_or_else(|| "text".to_string()))
        .collect())
}

/// `MAX(pk)::text` back into a cursor; bytea comes back as `\x` hex.
fn parse_pk_text(s: String) -> PkValue {
    if let Ok(i) = s.parse::<i64>() {
        return PkValue::Int(i);
    }
    let decoded = s.strip_prefix("\\x").map(hex::decode);
    match decoded {
        Some(Ok(bytes)) => PkValue::Bytes(bytes),
        _ => PkValue::Text(s),
    }
}

/// SQLSTATE (if the server sent one) and a readable message.
fn error_parts(e: &tokio_postgres::Error) -> (Option<String>, String) {
    match e.as_db_error() {
        Some(db) => (Some(db.code().code().to_string()), db.message().to_string()),
        None => (None, e.to_string()),
    }
}

fn pg_error_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

pub(crate) fn is_already_exists(code: Option<&str>, message: &str) -> bool {
    if code.is_some_and(|c| ALREADY_EXISTS_CODES.contains(&c)) {
        return true;
    }
    message.contains("already exists")
        || message.contains("duplicate key value violates unique constraint")
}

pub(crate) fn is_missing_role(code: Option<&str>, message: &str) -> bool {
    let lower = message.to_lowercase();
    let names_role = lower.contains("role");
    (code == Some(UNDEFINED_OBJECT) && names_role)
        || (names_role && lower.contains("does not exist"))
}
