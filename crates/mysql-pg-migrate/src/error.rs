//! Error types for the migration engine.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// TCP/auth failure against either database
    #[error("Connection error ({side}): {message}")]
    Connection { side: String, message: String },

    /// Source metadata could not be read
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A MySQL artifact could not be translated
    #[error("Translation failed for {object}: {message}")]
    Translate { object: String, message: String },

    /// Target rejected a DDL statement
    #[error("Execution failed: {message}\n  Statement: {statement}")]
    Execute { statement: String, message: String },

    /// Data insert or transaction failed for a table
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// Invariant broken inside the engine
    #[error("Internal error: {0}")]
    Internal(String),

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MigrateError {
    /// Create a Connection error for `mysql` or `postgresql`.
    pub fn connection(side: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            side: side.into(),
            message: message.to_string(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Translate error
    pub fn translate(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Translate {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create an Execute error
    pub fn execute(statement: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Execute {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a Load error
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::Connection { .. }
                | MigrateError::Yaml(_)
                | MigrateError::Io(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Io(_) => 1,
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => 2,
            _ => 3,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::connection("mysql", "refused").exit_code(), 2);
        assert_eq!(MigrateError::load("t", "boom").exit_code(), 3);
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(MigrateError::Config("x".into()).is_fatal());
        assert!(MigrateError::connection("postgresql", "auth").is_fatal());
        assert!(!MigrateError::translate("t", "bad").is_fatal());
        assert!(!MigrateError::execute("CREATE", "boom").is_fatal());
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::load("users", "COPY failed");
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Load failed for table users: COPY failed"));
    }
}
