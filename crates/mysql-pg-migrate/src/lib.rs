//! # mysql-pg-migrate
//!
//! Offline MySQL to PostgreSQL migration library.
//!
//! A run reads the MySQL catalog once and then executes the enabled phases
//! in a fixed order:
//!
//! - **TableDDL**: `CREATE TABLE` translated to PostgreSQL, with comments
//! - **Data**: keyset-paged reads, `COPY` loads, one transaction per chunk
//! - **Indexes**: secondary indexes as `CREATE INDEX IF NOT EXISTS`
//! - **Views** and **Functions**: bodies rewritten to PostgreSQL SQL
//! - **Users** and **TablePrivileges**: roles and grants
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let summary = orchestrator.run().await?;
//!     println!("{}", mysql_pg_migrate::report::render_summary(&summary));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{MigrateError, Result};
pub use orchestrator::{test_connections, Orchestrator, Phase};
pub use report::MigrationSummary;
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
