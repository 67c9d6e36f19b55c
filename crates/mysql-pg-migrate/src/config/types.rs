//! Configuration type definitions.
//!
//! Every key is optional in the YAML file. Numeric limits and pool sizes are
//! `Option<T>` so that "not set" can be told apart from "explicitly set";
//! [`Config::apply_defaults`] fills the gaps after load.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_OPEN_CONNS: u32 = 50;
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 20;
pub const DEFAULT_CONN_MAX_LIFETIME: u64 = 3600;
pub const DEFAULT_MAX_CONNS: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_MAX_DDL_PER_BATCH: usize = 10;
pub const DEFAULT_MAX_FUNCTIONS_PER_BATCH: usize = 5;
pub const DEFAULT_MAX_INDEXES_PER_BATCH: usize = 20;
pub const DEFAULT_MAX_USERS_PER_BATCH: usize = 10;
pub const DEFAULT_MAX_ROWS_PER_BATCH: usize = 1000;
pub const DEFAULT_BATCH_INSERT_SIZE: usize = 10_000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    #[serde(default)]
    pub mysql: MysqlConfig,

    /// Target database configuration (PostgreSQL).
    #[serde(default)]
    pub postgresql: PostgresConfig,

    /// What to migrate and how hard to push.
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Logging and display behavior.
    #[serde(default)]
    pub run: RunConfig,
}

/// Source database (MySQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub database: String,

    /// Only check the connection, then exit.
    #[serde(default)]
    pub test_only: bool,

    #[serde(default)]
    pub max_open_conns: Option<u32>,

    /// Connections kept warm in the pool.
    #[serde(default)]
    pub max_idle_conns: Option<u32>,

    /// Maximum connection lifetime in seconds.
    #[serde(default)]
    pub conn_max_lifetime: Option<u64>,

    /// TLS mode: disabled, preferred or required (default: preferred).
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mysql_port(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            test_only: false,
            max_open_conns: None,
            max_idle_conns: None,
            conn_max_lifetime: None,
            ssl_mode: default_preferred(),
        }
    }
}

impl MysqlConfig {
    pub fn get_max_open_conns(&self) -> u32 {
        self.max_open_conns.unwrap_or(DEFAULT_MAX_OPEN_CONNS)
    }

    pub fn get_max_idle_conns(&self) -> u32 {
        self.max_idle_conns.unwrap_or(DEFAULT_MAX_IDLE_CONNS)
    }

    pub fn get_conn_max_lifetime(&self) -> u64 {
        self.conn_max_lifetime.unwrap_or(DEFAULT_CONN_MAX_LIFETIME)
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub database: String,

    /// Only check the connection, then exit.
    #[serde(default)]
    pub test_only: bool,

    #[serde(default)]
    pub max_conns: Option<usize>,

    /// Schema that receives grants (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_pg_port(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            test_only: false,
            max_conns: None,
            schema: default_public_schema(),
            ssl_mode: default_disable(),
        }
    }
}

impl PostgresConfig {
    pub fn get_max_conns(&self) -> usize {
        self.max_conns.unwrap_or(DEFAULT_MAX_CONNS)
    }
}

/// `conversion` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub options: ConversionOptions,

    #[serde(default)]
    pub limits: ConversionLimits,
}

/// Phase toggles and table selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionOptions {
    #[serde(default)]
    pub tableddl: bool,
    #[serde(default)]
    pub data: bool,
    #[serde(default)]
    pub indexes: bool,
    #[serde(default)]
    pub functions: bool,
    #[serde(default)]
    pub users: bool,
    /// Emit the per-user grant statements in the Users phase.
    #[serde(default)]
    pub grant: bool,
    #[serde(default)]
    pub table_privileges: bool,
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub skip_existing_tables: bool,
    #[serde(default)]
    pub use_table_list: bool,
    #[serde(default)]
    pub table_list: Vec<String>,
    #[serde(default)]
    pub exclude_use_table_list: bool,
    #[serde(default)]
    pub exclude_table_list: Vec<String>,
    #[serde(default)]
    pub lowercase_columns: bool,
    #[serde(default)]
    pub validate_data: bool,
    #[serde(default)]
    pub truncate_before_sync: bool,
}

/// Concurrency and batching limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionLimits {
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Advisory only; not enforced.
    #[serde(default)]
    pub bandwidth_mbps: Option<u64>,
    #[serde(default)]
    pub max_ddl_per_batch: Option<usize>,
    #[serde(default)]
    pub max_functions_per_batch: Option<usize>,
    #[serde(default)]
    pub max_indexes_per_batch: Option<usize>,
    #[serde(default)]
    pub max_users_per_batch: Option<usize>,
    #[serde(default)]
    pub max_rows_per_batch: Option<usize>,
    #[serde(default)]
    pub batch_insert_size: Option<usize>,
}

impl ConversionLimits {
    pub fn get_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn get_max_ddl_per_batch(&self) -> usize {
        self.max_ddl_per_batch.unwrap_or(DEFAULT_MAX_DDL_PER_BATCH)
    }

    pub fn get_max_functions_per_batch(&self) -> usize {
        self.max_functions_per_batch
            .unwrap_or(DEFAULT_MAX_FUNCTIONS_PER_BATCH)
    }

    pub fn get_max_indexes_per_batch(&self) -> usize {
        self.max_indexes_per_batch
            .unwrap_or(DEFAULT_MAX_INDEXES_PER_BATCH)
    }

    pub fn get_max_users_per_batch(&self) -> usize {
        self.max_users_per_batch.unwrap_or(DEFAULT_MAX_USERS_PER_BATCH)
    }

    pub fn get_max_rows_per_batch(&self) -> usize {
        self.max_rows_per_batch.unwrap_or(DEFAULT_MAX_ROWS_PER_BATCH)
    }

    pub fn get_batch_insert_size(&self) -> usize {
        self.batch_insert_size.unwrap_or(DEFAULT_BATCH_INSERT_SIZE)
    }
}

/// `run` section: logging sinks and progress display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_true")]
    pub show_progress: bool,

    #[serde(default = "default_error_log_path")]
    pub error_log_path: String,

    #[serde(default)]
    pub enable_file_logging: bool,

    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,

    #[serde(default = "default_true")]
    pub show_console_logs: bool,

    /// Show debug-level entries on the console too.
    #[serde(default)]
    pub show_log_in_console: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            error_log_path: default_error_log_path(),
            enable_file_logging: false,
            log_file_path: default_log_file_path(),
            show_console_logs: true,
            show_log_in_console: false,
        }
    }
}

impl Config {
    /// Fill every unset limit and pool size with its default.
    pub fn apply_defaults(mut self) -> Self {
        let m = &mut self.mysql;
        m.max_open_conns = Some(m.get_max_open_conns());
        m.max_idle_conns = Some(m.get_max_idle_conns());
        m.conn_max_lifetime = Some(m.get_conn_max_lifetime());

        let p = &mut self.postgresql;
        p.max_conns = Some(p.get_max_conns());

        let l = &mut self.conversion.limits;
        l.concurrency = Some(l.get_concurrency());
        l.max_ddl_per_batch = Some(l.get_max_ddl_per_batch());
        l.max_functions_per_batch = Some(l.get_max_functions_per_batch());
        l.max_indexes_per_batch = Some(l.get_max_indexes_per_batch());
        l.max_users_per_batch = Some(l.get_max_users_per_batch());
        l.max_rows_per_batch = Some(l.get_max_rows_per_batch());
        l.batch_insert_size = Some(l.get_batch_insert_size());
        self
    }

    /// Shorthand for `conversion.options`.
    pub fn options(&self) -> &ConversionOptions {
        &self.conversion.options
    }

    /// Shorthand for `conversion.limits`.
    pub fn limits(&self) -> &ConversionLimits {
        &self.conversion.limits
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_true() -> bool {
    true
}

fn default_error_log_path() -> String {
    "mig_error.log".to_string()
}

fn default_log_file_path() -> String {
    "mig.log".to_string()
}
