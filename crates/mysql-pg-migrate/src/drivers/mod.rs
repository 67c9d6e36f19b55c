//! Database drivers behind the core seams.
//!
//! - [`mysql`]: [`SourceCatalog`](crate::core::SourceCatalog) over sqlx
//! - [`postgres`]: [`TargetExecutor`](crate::core::TargetExecutor) over
//!   deadpool-postgres

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlCatalog;
pub use postgres::{PgTransaction, PostgresExecutor, SslMode};
