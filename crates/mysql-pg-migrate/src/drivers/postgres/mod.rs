//! PostgreSQL target driver.
//!
//! - [`PostgresExecutor`]: DDL execution, existence checks, grants
//! - [`PgTransaction`]: one load transaction (text COPY with an INSERT fallback)

mod copy;
mod tls;
mod writer;

pub use tls::SslMode;
pub use writer::{PgTransaction, PostgresExecutor};
