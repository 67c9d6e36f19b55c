//! MySQL source driver.
//!
//! - [`MysqlCatalog`]: catalog reader and row streamer
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;

pub use reader::{parse_ssl_mode, MysqlCatalog};
