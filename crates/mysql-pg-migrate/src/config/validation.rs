//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.mysql.host.is_empty() {
        return Err(MigrateError::Config("mysql.host is required".into()));
    }
    if config.mysql.username.is_empty() {
        return Err(MigrateError::Config("mysql.username is required".into()));
    }
    if config.mysql.database.is_empty() {
        return Err(MigrateError::Config("mysql.database is required".into()));
    }
    match config.mysql.ssl_mode.to_lowercase().as_str() {
        "disabled" | "preferred" | "required" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "mysql.ssl_mode must be disabled, preferred or required, got '{}'",
                other
            )))
        }
    }

    // Target validation
    if config.postgresql.host.is_empty() {
        return Err(MigrateError::Config("postgresql.host is required".into()));
    }
    if config.postgresql.username.is_empty() {
        return Err(MigrateError::Config(
            "postgresql.username is required".into(),
        ));
    }
    if config.postgresql.database.is_empty() {
        return Err(MigrateError::Config(
            "postgresql.database is required".into(),
        ));
    }

    let limits = config.limits();
    let checks = [
        ("concurrency", limits.concurrency),
        ("max_ddl_per_batch", limits.max_ddl_per_batch),
        ("max_functions_per_batch", limits.max_functions_per_batch),
        ("max_indexes_per_batch", limits.max_indexes_per_batch),
        ("max_users_per_batch", limits.max_users_per_batch),
        ("max_rows_per_batch", limits.max_rows_per_batch),
        ("batch_insert_size", limits.batch_insert_size),
    ];
    for (name, value) in checks {
        if let Some(0) = value {
            return Err(MigrateError::Config(format!(
                "conversion.limits.{} must be at least 1",
                name
            )));
        }
    }
    if let Some(0) = config.mysql.max_open_conns {
        return Err(MigrateError::Config(
            "mysql.max_open_conns must be at least 1".into(),
        ));
    }
    if let Some(0) = config.postgresql.max_conns {
        return Err(MigrateError::Config(
            "postgresql.max_conns must be at least 1".into(),
        ));
    }

    let options = config.options();
    if options.use_table_list && options.table_list.is_empty() {
        return Err(MigrateError::Config(
            "conversion.options.use_table_list is set but table_list is empty".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MysqlConfig, PostgresConfig};

    fn valid_config() -> Config {
        Config {
            mysql: MysqlConfig {
                host: "localhost".to_string(),
                username: "root".to_string(),
                password: "password".to_string(),
                database: "source_db".to_string(),
                ..Default::default()
            },
            postgresql: PostgresConfig {
                host: "localhost".to_string(),
                username: "postgres".to_string(),
                password: "password".to_string(),
                database: "target_db".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
        .apply_defaults()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.mysql.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("mysql.host"));
    }

    #[test]
    fn test_missing_source_user() {
        let mut config = valid_config();
        config.mysql.username = String::new();
        assert!(validate(&config).unwrap_err().to_string().contains("mysql.username"));
    }

    #[test]
    fn test_missing_source_database() {
        let mut config = valid_config();
        config.mysql.database = String::new();
        assert!(validate(&config).unwrap_err().to_string().contains("mysql.database"));
    }

    #[test]
    fn test_missing_target_fields() {
        let mut config = valid_config();
        config.postgresql.host = String::new();
        assert!(validate(&config).unwrap_err().to_string().contains("postgresql.host"));

        let mut config = valid_config();
        config.postgresql.username = String::new();
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("postgresql.username"));

        let mut config = valid_config();
        config.postgresql.database = String::new();
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("postgresql.database"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = valid_config();
        config.conversion.limits.concurrency = Some(0);
        assert!(validate(&config).unwrap_err().to_string().contains("concurrency"));

        let mut config = valid_config();
        config.conversion.limits.batch_insert_size = Some(0);
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("batch_insert_size"));
    }

    #[test]
    fn test_table_list_required_when_enabled() {
        let mut config = valid_config();
        config.conversion.options.use_table_list = true;
        assert!(validate(&config).is_err());

        config.conversion.options.table_list = vec!["users".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_mysql_ssl_mode() {
        let mut config = valid_config();
        config.mysql.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }
}
