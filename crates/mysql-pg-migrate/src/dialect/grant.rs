//! Users and privileges.
//!
//! MySQL accounts are `login@host`; PostgreSQL roles have no host part, so
//! every host of a login maps onto the same role and role creation is
//! guarded by a `pg_roles` check.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::scan::split_top_level;
use crate::core::identifier::{quote_pg, unquote};
use crate::core::UserDescriptor;
use crate::error::{MigrateError, Result};

static RE_GRANT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*GRANT\s+(.+?)\s+ON\s+(?:(?:TABLE|FUNCTION|PROCEDURE)\s+)?(\S+)\s+TO\s+")
        .unwrap()
});

/// Table-level privileges PostgreSQL understands.
const TABLE_PRIVILEGES: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "REFERENCES", "TRIGGER"];

/// Data privileges expanded to every table of the schema on `*.*` / `db.*`.
const SCHEMA_PRIVILEGES: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE"];

/// Built-in accounts such as `mysql.sys` are never migrated.
pub fn is_system_account(login: &str) -> bool {
    login.starts_with("mysql.")
}

/// PostgreSQL role name for a MySQL login.
pub fn role_name(login: &str) -> String {
    login.replace('.', "_")
}

/// Idempotent role creation block.
pub fn create_role_sql(role: &str) -> String {
    format!(
        "DO $$ BEGIN IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname='{}') THEN CREATE USER {}; END IF; END $$;",
        role.replace('\'', "''"),
        quote_pg(role)
    )
}

/// Statements for one user: the role block followed by its grants.
///
/// Returns no statements for system accounts.
pub fn translate_user(user: &UserDescriptor, database: &str, schema: &str) -> Result<Vec<String>> {
    if is_system_account(&user.login) {
        return Ok(Vec::new());
    }
    if user.login.trim().is_empty() {
        return Err(MigrateError::translate("user", "empty login"));
    }
    let role = role_name(&user.login);
    let mut out = vec![create_role_sql(&role)];
    for grant in &user.grants {
        out.extend(translate_grant(grant, &role, database, schema));
    }
    Ok(out)
}

/// Translate one `SHOW GRANTS` line. Unsupported privileges and objects
/// produce no statements.
pub fn translate_grant(grant: &str, role: &str, database: &str, schema: &str) -> Vec<String> {
    let Some(caps) = RE_GRANT.captures(grant) else {
        debug!("Ignoring grant without object: {}", grant);
        return Vec::new();
    };
    let privileges: Vec<String> = split_top_level(&caps[1], ',')
        .into_iter()
        .map(|p| p.trim().to_uppercase())
        .collect();
    let object = caps[2].replace('`', "");
    let (db_part, table_part) = object.split_once('.').unwrap_or(("*", object.as_str()));
    let role = quote_pg(role);
    let schema = quote_pg(schema);

    let all = privileges
        .iter()
        .any(|p| p == "ALL" || p == "ALL PRIVILEGES");

    if table_part == "*" {
        if all {
            return vec![
                format!("GRANT ALL PRIVILEGES ON DATABASE {} TO {};", quote_pg(database), role),
                format!("GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA {} TO {};", schema, role),
                format!("GRANT ALL PRIVILEGES ON ALL SEQUENCES IN SCHEMA {} TO {};", schema, role),
            ];
        }
        let kept: Vec<&str> = privileges
            .iter()
            .map(String::as_str)
            .filter(|p| SCHEMA_PRIVILEGES.contains(p))
            .collect();
        if kept.is_empty() {
            debug!("No schema-level privileges to translate in: {}", grant);
            return Vec::new();
        }
        return vec![format!(
            "GRANT {} ON ALL TABLES IN SCHEMA {} TO {};",
            kept.join(", "),
            schema,
            role
        )];
    }

    if db_part == "*" {
        return Vec::new();
    }
    let table = quote_pg(unquote(table_part));
    if all {
        return vec![format!("GRANT ALL PRIVILEGES ON {} TO {};", table, role)];
    }
    let kept: Vec<&str> = privileges
        .iter()
        .map(String::as_str)
        .filter(|p| TABLE_PRIVILEGES.contains(p))
        .collect();
    if kept.is_empty() {
        return Vec::new();
    }
    vec![format!("GRANT {} ON {} TO {};", kept.join(", "), table, role)]
}

/// Privileges from a `mysql.tables_priv.Table_priv` set string, e.g.
/// `Select,Insert,Index`, limited to the ones PostgreSQL supports on tables.
pub fn table_privileges(set: &str) -> Vec<String> {
    set.split(',')
        .map(|p| p.trim().to_uppercase())
        .filter(|p| TABLE_PRIVILEGES.contains(&p.as_str()))
        .collect()
}

/// `GRANT <priv> ON "<table>" TO "<role>"`.
pub fn grant_table_sql(privilege: &str, table: &str, role: &str) -> String {
    format!(
        "GRANT {} ON {} TO {}",
        privilege,
        quote_pg(table),
        quote_pg(role)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user(login: &str, grants: &[&str]) -> UserDescriptor {
        UserDescriptor {
            login: login.to_string(),
            host: "%".to_string(),
            grants: grants.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn test_all_privileges_on_everything() {
        let stmts = translate_user(
            &user("u", &["GRANT ALL PRIVILEGES ON *.* TO 'u'@'%'"]),
            "appdb",
            "public",
        )
        .unwrap();
        assert_eq!(
            stmts,
            vec![
                "DO $$ BEGIN IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname='u') THEN CREATE USER \"u\"; END IF; END $$;".to_string(),
                "GRANT ALL PRIVILEGES ON DATABASE \"appdb\" TO \"u\";".to_string(),
                "GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA \"public\" TO \"u\";".to_string(),
                "GRANT ALL PRIVILEGES ON ALL SEQUENCES IN SCHEMA \"public\" TO \"u\";".to_string(),
            ]
        );
    }

    #[test]
    fn test_database_wildcard_and_table_grants() {
        let role = "app_ro";
        assert_eq!(
            translate_grant("GRANT SELECT, INSERT ON `shop`.* TO `app.ro`@`10.%`", role, "db", "public"),
            vec!["GRANT SELECT, INSERT ON ALL TABLES IN SCHEMA \"public\" TO \"app_ro\";".to_string()]
        );
        assert_eq!(
            translate_grant("GRANT SELECT, UPDATE (`name`) ON `shop`.`orders` TO 'x'@'%'", role, "db", "public"),
            vec!["GRANT SELECT ON \"orders\" TO \"app_ro\";".to_string()]
        );
        assert!(translate_grant("GRANT USAGE ON *.* TO 'x'@'%'", role, "db", "public").is_empty());
    }

    #[test]
    fn test_system_accounts_and_role_names() {
        assert!(translate_user(&user("mysql.sys", &[]), "db", "public")
            .unwrap()
            .is_empty());
        assert_eq!(role_name("app.reader"), "app_reader");
        assert_eq!(
            create_role_sql("o'neil"),
            "DO $$ BEGIN IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname='o''neil') THEN CREATE USER \"o'neil\"; END IF; END $$;"
        );
    }

    #[test]
    fn test_table_privilege_set() {
        assert_eq!(
            table_privileges("Select,Insert,Index,Alter,Trigger"),
            vec!["SELECT", "INSERT", "TRIGGER"]
        );
        assert_eq!(
            grant_table_sql("SELECT", "Orders", "app_ro"),
            "GRANT SELECT ON \"Orders\" TO \"app_ro\""
        );
    }
}
