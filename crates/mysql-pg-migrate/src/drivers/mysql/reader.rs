//! MySQL catalog reader and row streamer.
//!
//! Implements [`SourceCatalog`] on top of an SQLx MySQL pool. Metadata is
//! read with `SHOW` statements so the raw DDL, full column comments and
//! index layout come back exactly as the server reports them.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row, ValueRef};
use tracing::{debug, info, warn};

use crate::config::MysqlConfig;
use crate::core::identifier::quote_mysql;
use crate::core::schema::{
    ColumnDescriptor, FunctionDescriptor, IndexDescriptor, TableDescriptor,
    TablePrivilegeDescriptor, UserDescriptor, ViewDescriptor,
};
use crate::core::traits::SourceCatalog;
use crate::core::value::{PkValue, Row as ValueRow, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for each per-table metadata query.
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Tables described concurrently by `list_tables`.
const METADATA_CONCURRENCY: usize = 20;

/// Parse the `mysql.ssl_mode` setting.
pub fn parse_ssl_mode(mode: &str) -> Result<MySqlSslMode> {
    match mode.to_lowercase().as_str() {
        "disabled" | "disable" => Ok(MySqlSslMode::Disabled),
        "preferred" | "" => Ok(MySqlSslMode::Preferred),
        "required" | "require" => Ok(MySqlSslMode::Required),
        other => Err(MigrateError::Config(format!(
            "Invalid mysql.ssl_mode '{}'. Valid values: disabled, preferred, required",
            other
        ))),
    }
}

/// Escape a value for a MySQL string literal.
fn mysql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn catalog_err(context: &'static str) -> impl Fn(sqlx::Error) -> MigrateError {
    move |e| MigrateError::Catalog(format!("{}: {}", context, e))
}

/// Text column that some servers report as binary (information_schema,
/// `SHOW` output under certain collations).
fn get_text(row: &MySqlRow, idx: usize) -> Option<String> {
    let is_null = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return None;
    }
    row.try_get::<String, _>(idx)
        .or_else(|_| row.try_get_unchecked::<String, _>(idx))
        .ok()
        .or_else(|| {
            row.try_get_unchecked::<Vec<u8>, _>(idx)
                .ok()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
        })
}

fn get_integer(row: &MySqlRow, idx: usize) -> Option<i64> {
    row.try_get::<i64, _>(idx)
        .ok()
        .or_else(|| row.try_get::<u64, _>(idx).ok().map(|v| v as i64))
        .or_else(|| get_text(row, idx).and_then(|s| s.trim().parse().ok()))
}

/// MySQL implementation of [`SourceCatalog`].
pub struct MysqlCatalog {
    pool: MySqlPool,
    database: String,
}

impl MysqlCatalog {
    /// Open the source pool and check connectivity.
    pub async fn new(config: &MysqlConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .ssl_mode(parse_ssl_mode(&config.ssl_mode)?);

        let max_open = config.get_max_open_conns();
        let pool = MySqlPoolOptions::new()
            .max_connections(max_open)
            .min_connections(config.get_max_idle_conns().min(max_open))
            .max_lifetime(Duration::from_secs(config.get_conn_max_lifetime()))
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;

        let catalog = Self {
            pool,
            database: config.database.clone(),
        };
        catalog.test_connection().await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(catalog)
    }

    /// Run a trivial query to check the connection.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;
        Ok(())
    }

    /// Server version string, used by the connection test mode.
    pub async fn server_version(&self) -> Result<String> {
        let row = sqlx::query("SELECT VERSION()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;
        Ok(get_text(&row, 0).unwrap_or_default())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err("listing MySQL tables"))?;

        Ok(rows.iter().filter_map(|r| get_text(r, 0)).collect())
    }

    async fn describe_table(&self, name: String) -> Result<TableDescriptor> {
        let ddl = with_deadline(&name, "CREATE TABLE", self.show_create_table(&name)).await?;
        let columns = with_deadline(&name, "columns", self.columns(&name)).await?;
        let indexes = with_deadline(&name, "indexes", self.indexes(&name)).await?;
        Ok(TableDescriptor {
            name,
            ddl,
            columns,
            indexes,
        })
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", quote_mysql(table));
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(catalog_err("reading CREATE TABLE"))?;
        get_text(&row, 1)
            .ok_or_else(|| MigrateError::Catalog(format!("empty CREATE TABLE for {}", table)))
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let sql = format!("SHOW INDEX FROM {}", quote_mysql(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(catalog_err("reading indexes"))?;

        // Rows arrive grouped by key name and ordered by Seq_in_index.
        let mut indexes: Vec<IndexDescriptor> = Vec::new();
        for row in &rows {
            let Some(key_name) = get_text(row, 2) else {
                continue;
            };
            if key_name == "PRIMARY" {
                continue;
            }
            // Functional index parts have no column name.
            let Some(column) = get_text(row, 4) else {
                continue;
            };
            let unique = get_integer(row, 1) == Some(0);

            match indexes.iter_mut().find(|i| i.name == key_name) {
                Some(existing) => existing.columns.push(column),
                None => indexes.push(IndexDescriptor {
                    name: key_name,
                    table: table.to_string(),
                    columns: vec![column],
                    unique,
                }),
            }
        }

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        query: sqlx::query::Query<'_, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    ) -> Result<Vec<ValueRow>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::load(table, e))?;
        rows.iter().map(|r| decode_row(table, r, columns)).collect()
    }
}

/// Run one metadata query under its own deadline.
async fn with_deadline<T>(
    table: &str,
    what: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(METADATA_TIMEOUT, work)
        .await
        .map_err(|_| {
            MigrateError::Catalog(format!(
                "timed out after {}s reading {} for table {}",
                METADATA_TIMEOUT.as_secs(),
                what,
                table
            ))
        })?
}

/// Select expression for one column. YEAR is widened to an integer and
/// temporal types come back as text so zero dates and TIME values beyond
/// 24 hours survive decoding.
fn select_expr(col: &ColumnDescriptor) -> String {
    let name = quote_mysql(&col.name);
    match col.base_type().as_str() {
        "year" => format!("CAST({0} AS SIGNED) AS {0}", name),
        "date" | "datetime" | "timestamp" | "time" => format!("CAST({0} AS CHAR) AS {0}", name),
        _ => name,
    }
}

fn select_list(columns: &[ColumnDescriptor]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    columns
        .iter()
        .map(select_expr)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode one row using the declared column types.
fn decode_row(table: &str, row: &MySqlRow, columns: &[ColumnDescriptor]) -> Result<ValueRow> {
    (0..row.len())
        .map(|i| match columns.get(i) {
            Some(col) => decode_value(table, row, i, col),
            None => Ok(get_text(row, i).map_or(SqlValue::Null, SqlValue::Text)),
        })
        .collect()
}

fn bad_value(table: &str, col: &ColumnDescriptor, e: impl std::fmt::Display) -> MigrateError {
    MigrateError::load(
        table,
        format!("cannot decode column {} ({}): {}", col.name, col.type_expr, e),
    )
}

fn decoded<T>(
    table: &str,
    col: &ColumnDescriptor,
    value: std::result::Result<T, sqlx::Error>,
) -> Result<T> {
    value.map_err(|e| bad_value(table, col, e))
}

fn row_text(row: &MySqlRow, i: usize) -> std::result::Result<String, sqlx::Error> {
    row.try_get::<String, _>(i)
        .or_else(|_| row.try_get_unchecked::<String, _>(i))
}

/// `0000-00-00` style values have no PostgreSQL counterpart.
fn is_zero_date(s: &str) -> bool {
    s.starts_with("0000-00-00")
}

/// Parse the text form of a DATE, DATETIME, TIMESTAMP or TIME column.
fn parse_temporal(base: &str, s: String) -> std::result::Result<SqlValue, chrono::ParseError> {
    if is_zero_date(&s) {
        return Ok(SqlValue::Null);
    }
    Ok(match base {
        "date" => SqlValue::Date(chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")?),
        "time" => match chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f") {
            Ok(t) => SqlValue::Time(t),
            // Negative or beyond 24h; the target decides.
            Err(_) => SqlValue::Text(s),
        },
        _ => SqlValue::DateTime(chrono::NaiveDateTime::parse_from_str(
            &s,
            "%Y-%m-%d %H:%M:%S%.f",
        )?),
    })
}

fn decode_value(table: &str, row: &MySqlRow, i: usize, col: &ColumnDescriptor) -> Result<SqlValue> {
    if decoded(table, col, row.try_get_raw(i))?.is_null() {
        return Ok(SqlValue::Null);
    }

    let lower = col.type_expr.to_lowercase();
    let base = col.base_type();
    let value = match base.as_str() {
        "tinyint" if lower.starts_with("tinyint(1)") => SqlValue::Bool(decoded(
            table,
            col,
            row.try_get::<bool, _>(i)
                .or_else(|_| row.try_get::<i64, _>(i).map(|v| v != 0)),
        )?),
        "bool" | "boolean" => SqlValue::Bool(decoded(table, col, row.try_get::<bool, _>(i))?),
        "bit" if lower == "bit" || lower.starts_with("bit(1)") => {
            let bytes = decoded(table, col, row.try_get_unchecked::<Vec<u8>, _>(i))?;
            SqlValue::Bool(bytes.iter().any(|b| *b != 0))
        }
        "year" => SqlValue::Int(decoded(table, col, row.try_get::<i64, _>(i))?),
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
            if col.is_unsigned() {
                SqlValue::UInt(decoded(table, col, row.try_get::<u64, _>(i))?)
            } else {
                SqlValue::Int(decoded(table, col, row.try_get::<i64, _>(i))?)
            }
        }
        "float" => SqlValue::F32(decoded(table, col, row.try_get::<f32, _>(i))?),
        "double" | "real" => SqlValue::F64(decoded(table, col, row.try_get::<f64, _>(i))?),
        // DECIMAL(65,30) does not fit rust_decimal; keep the exact text.
        "decimal" | "numeric" | "dec" | "fixed" => match row.try_get::<rust_decimal::Decimal, _>(i) {
            Ok(d) => SqlValue::Decimal(d),
            Err(_) => SqlValue::Text(decoded(table, col, row_text(row, i))?),
        },
        "date" | "datetime" | "timestamp" | "time" => {
            let text = decoded(table, col, row_text(row, i))?;
            parse_temporal(base.as_str(), text).map_err(|e| bad_value(table, col, e))?
        }
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit"
        | "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring"
        | "multipolygon" | "geometrycollection" | "geomcollection" => {
            SqlValue::Bytes(decoded(table, col, row.try_get_unchecked::<Vec<u8>, _>(i))?)
        }
        // Text, enum, set, json and anything unknown.
        _ => SqlValue::Text(decoded(table, col, row_text(row, i))?),
    };
    Ok(value)
}

#[async_trait]
impl SourceCatalog for MysqlCatalog {
    fn database(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        let names = self.table_names().await?;
        let tables: Vec<TableDescriptor> = stream::iter(names)
            .map(|name| self.describe_table(name))
            .buffered(METADATA_CONCURRENCY)
            .try_collect()
            .await?;

        info!(
            "Read {} tables from MySQL database '{}'",
            tables.len(),
            self.database
        );
        Ok(tables)
    }

    async fn list_views(&self) -> Result<Vec<ViewDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                   CAST(VIEW_DEFINITION AS CHAR) AS VIEW_DEFINITION
            FROM INFORMATION_SCHEMA.VIEWS
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err("listing MySQL views"))?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(ViewDescriptor {
                    name: get_text(r, 0)?,
                    definition: get_text(r, 1).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_mysql(table));
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(catalog_err("counting source rows"))?;
        get_integer(&row, 0)
            .ok_or_else(|| MigrateError::Catalog(format!("bad row count for {}", table)))
    }

    async fn primary_key(&self, table: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            LIMIT 1
            "#,
        )
        .bind(&self.database)
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(catalog_err("reading primary key"))?;

        row.as_ref()
            .and_then(|r| get_text(r, 0))
            .ok_or_else(|| MigrateError::Catalog(format!("table {} has no primary key", table)))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let sql = format!("SHOW FULL COLUMNS FROM {}", quote_mysql(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(catalog_err("reading columns"))?;

        // Field, Type, Collation, Null, Key, Default, Extra, Privileges, Comment
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(ColumnDescriptor {
                    name: get_text(r, 0)?,
                    type_expr: get_text(r, 1).unwrap_or_default(),
                    nullable: get_text(r, 3).is_some_and(|n| n.eq_ignore_ascii_case("YES")),
                    default: get_text(r, 5),
                    comment: get_text(r, 8).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn stream_by_keyset(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        pk: &str,
        last: Option<&PkValue>,
        limit: usize,
    ) -> Result<Vec<ValueRow>> {
        // Qualified so ORDER BY does not resolve to a CAST alias.
        let pk_col = format!("{}.{}", quote_mysql(table), quote_mysql(pk));
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ?",
            select_list(columns),
            quote_mysql(table),
            if last.is_some() {
                format!(" WHERE {} > ?", pk_col)
            } else {
                String::new()
            },
            pk_col
        );

        let mut query = sqlx::query(&sql);
        if let Some(last) = last {
            query = match last {
                PkValue::Int(v) => query.bind(*v),
                PkValue::UInt(v) => query.bind(*v),
                PkValue::Text(v) => query.bind(v.clone()),
                PkValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        query = query.bind(limit as u64);
        self.fetch_rows(table, columns, query).await
    }

    async fn stream_by_offset(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ValueRow>> {
        let sql = format!(
            "SELECT {} FROM {} LIMIT ? OFFSET ?",
            select_list(columns),
            quote_mysql(table)
        );
        let query = sqlx::query(&sql).bind(limit as u64).bind(offset);
        self.fetch_rows(table, columns, query).await
    }

    async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(ROUTINE_NAME AS CHAR(255)) AS ROUTINE_NAME
            FROM INFORMATION_SCHEMA.ROUTINES
            WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'FUNCTION'
            ORDER BY ROUTINE_NAME
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err("listing MySQL functions"))?;

        let mut functions = Vec::with_capacity(rows.len());
        for name in rows.iter().filter_map(|r| get_text(r, 0)) {
            let sql = format!("SHOW CREATE FUNCTION {}", quote_mysql(&name));
            let row = sqlx::query(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(catalog_err("reading CREATE FUNCTION"))?;
            // Function, sql_mode, Create Function, ...
            match get_text(&row, 2) {
                Some(definition) => functions.push(FunctionDescriptor { name, definition }),
                None => warn!(
                    "No definition visible for function {}; the account may lack privileges",
                    name
                ),
            }
        }
        Ok(functions)
    }

    async fn list_users(&self) -> Result<Vec<UserDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(User AS CHAR(255)) AS User, CAST(Host AS CHAR(255)) AS Host
            FROM mysql.user
            WHERE User <> '' AND User NOT LIKE 'mysql.%'
            ORDER BY User, Host
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err("listing MySQL users"))?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(UserDescriptor {
                    login: get_text(r, 0)?,
                    host: get_text(r, 1).unwrap_or_else(|| "%".to_string()),
                    grants: Vec::new(),
                })
            })
            .collect())
    }

    async fn list_user_grants(&self, login: &str, host: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SHOW GRANTS FOR {}@{}",
            mysql_literal(login),
            mysql_literal(host)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(catalog_err("reading grants"))?;
        Ok(rows.iter().filter_map(|r| get_text(r, 0)).collect())
    }

    async fn list_table_privileges(&self) -> Result<Vec<TablePrivilegeDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(Host AS CHAR(255)) AS Host,
                   CAST(Db AS CHAR(255)) AS Db,
                   CAST(User AS CHAR(255)) AS User,
                   CAST(Table_name AS CHAR(255)) AS Table_name,
                   CAST(Table_priv AS CHAR(255)) AS Table_priv
            FROM mysql.tables_priv
            WHERE Db = ?
            ORDER BY User, Table_name
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(catalog_err("listing table privileges"))?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(TablePrivilegeDescriptor {
                    host: get_text(r, 0).unwrap_or_default(),
                    db: get_text(r, 1).unwrap_or_default(),
                    user: get_text(r, 2)?,
                    table: get_text(r, 3)?,
                    privileges: get_text(r, 4).unwrap_or_default(),
                })
            })
            .collect())
    }
}
