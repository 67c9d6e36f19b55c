//! `CREATE TABLE` translation.
//!
//! The column block is split on top-level commas rather than on newlines, so
//! both the pretty-printed `SHOW CREATE TABLE` output and single-line DDL
//! work. Only the first column of a composite primary key is kept.

use once_cell::sync::Lazy;
use regex::Regex;

use super::scan::{
    blank_quoted, first_open_paren, matching_paren, split_top_level, unescape_literal,
};
use super::typemap::translate_type_expr;
use super::TranslateOptions;
use crate::core::identifier::{quote_literal, quote_pg, unquote};
use crate::error::{MigrateError, Result};

static RE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*CREATE\s+(TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?").unwrap()
});
static RE_VERSION_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*!\d*\s*(.*?)\*/").unwrap());
static RE_TABLE_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bCOMMENT\s*=\s*'((?:[^'\\]|''|\\.)*)'").unwrap()
});
static RE_COLUMN_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\s+COMMENT\s+(?:'((?:[^'\\]|''|\\.)*)'|"((?:[^"\\]|""|\\.)*)")"#).unwrap()
});
static RE_PRIMARY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:CONSTRAINT\s+\S+\s+)?PRIMARY\s+KEY\b").unwrap());
static RE_INDEX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:UNIQUE|FULLTEXT|SPATIAL)\s+)?(?:KEY|INDEX)\b|^UNIQUE\b|^CONSTRAINT\b|^CHECK\b")
        .unwrap()
});
static RE_SKIP_ANYWHERE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bFOREIGN\s+KEY\b|\bUSING\s+(?:BTREE|HASH)\b|\b(?:engine|charset|collate|row_format)\s*=")
        .unwrap()
});
static RE_KNOWN_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:tinyint|smallint|mediumint|bigint|integer|int|decimal|numeric|float|double|real|bit|boolean|bool|varchar|char|varbinary|binary|tinytext|mediumtext|longtext|text|tinyblob|mediumblob|longblob|blob|jsonb|json|enum|set|datetime|timestamp|date|time|year|serial|geometry|point|linestring|polygon)\b",
    )
    .unwrap()
});

/// PostgreSQL statements produced from one MySQL `CREATE TABLE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDdl {
    /// Table name with original case.
    pub name: String,
    pub temporary: bool,
    pub create_sql: String,
    /// `COMMENT ON COLUMN` statements.
    pub column_comments: Vec<String>,
    pub table_comment: Option<String>,
    /// First primary-key column, after the case policy.
    pub primary_key: Option<String>,
    /// Emitted column names, after the case policy.
    pub columns: Vec<String>,
}

impl TableDdl {
    /// `COMMENT ON TABLE` statement for a non-empty table comment.
    pub fn table_comment_sql(&self) -> Option<String> {
        self.table_comment.as_ref().map(|c| {
            format!(
                "COMMENT ON TABLE {} IS {};",
                quote_pg(&self.name),
                quote_literal(c)
            )
        })
    }

    /// Every statement in execution order.
    pub fn statements(&self) -> Vec<String> {
        let mut out = vec![self.create_sql.clone()];
        out.extend(self.table_comment_sql());
        out.extend(self.column_comments.iter().cloned());
        out
    }
}

#[derive(Debug)]
enum Item {
    Column {
        name: String,
        type_expr: String,
        comment: Option<String>,
    },
    PrimaryKey(String),
    Skip,
}

/// Translate one MySQL `CREATE TABLE` statement.
pub fn translate_table(ddl: &str, opts: &TranslateOptions) -> Result<TableDdl> {
    let ddl = RE_VERSION_COMMENT.replace_all(ddl, "$1");
    let header = RE_HEADER
        .captures(&ddl)
        .ok_or_else(|| MigrateError::translate("table", "not a CREATE TABLE statement"))?;
    let temporary = header.get(1).is_some();
    let after_header = header.get(0).map_or(0, |m| m.end());

    let open = first_open_paren(&ddl[after_header..])
        .map(|p| after_header + p)
        .ok_or_else(|| MigrateError::translate("table", "missing column block"))?;
    let name = table_name(&ddl[after_header..open]);
    if name.is_empty() {
        return Err(MigrateError::translate("table", "missing table name"));
    }

    let close = matching_paren(&ddl, open)
        .or_else(|| ddl.rfind(')').filter(|c| *c > open))
        .ok_or_else(|| MigrateError::translate(&name, "unbalanced column block"))?;
    let body = &ddl[open + 1..close];
    let options = &ddl[close + 1..];

    let table_comment = RE_TABLE_COMMENT
        .captures(options)
        .and_then(|c| c.get(1))
        .map(|m| unescape_literal(m.as_str(), '\''))
        .filter(|c| !c.is_empty());

    let mut columns: Vec<(String, String)> = Vec::new();
    let mut comments: Vec<(String, String)> = Vec::new();
    let mut primary_key = None;

    for raw in split_top_level(body, ',') {
        match parse_item(raw.trim()) {
            Item::Column {
                name: col,
                type_expr,
                comment,
            } => {
                let col = opts.column_name(&col);
                if let Some(c) = comment.filter(|c| !c.is_empty()) {
                    comments.push((col.clone(), c));
                }
                columns.push((col, translate_type_expr(&type_expr)));
            }
            Item::PrimaryKey(pk) => {
                if primary_key.is_none() {
                    primary_key = Some(opts.column_name(&pk));
                }
            }
            Item::Skip => {}
        }
    }

    if columns.is_empty() {
        return Err(MigrateError::translate(&name, "no column definitions found"));
    }

    let mut lines: Vec<String> = columns
        .iter()
        .map(|(col, ty)| format!("  {} {}", quote_pg(col), ty))
        .collect();
    if let Some(pk) = &primary_key {
        lines.push(format!("  PRIMARY KEY ({})", quote_pg(pk)));
    }

    let create_sql = format!(
        "CREATE {}TABLE {} (\n{}\n)",
        if temporary { "TEMPORARY " } else { "" },
        quote_pg(&name),
        lines.join(",\n")
    );

    let column_comments = comments
        .iter()
        .map(|(col, text)| {
            format!(
                "COMMENT ON COLUMN {}.{} IS {};",
                quote_pg(&name),
                quote_pg(col),
                quote_literal(text)
            )
        })
        .collect();

    Ok(TableDdl {
        name,
        temporary,
        create_sql,
        column_comments,
        table_comment,
        primary_key,
        columns: columns.into_iter().map(|(c, _)| c).collect(),
    })
}

/// Last dot-separated part of the name, quotes stripped.
fn table_name(raw: &str) -> String {
    let parts = split_top_level(raw.trim(), '.');
    parts
        .last()
        .map(|p| unquote_ident(p))
        .unwrap_or_default()
}

fn unquote_ident(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.chars().next() {
        Some(q @ ('`' | '"')) if trimmed.len() >= 2 && trimmed.ends_with(q) => {
            trimmed[1..trimmed.len() - 1].replace(&format!("{q}{q}"), &q.to_string())
        }
        _ => unquote(trimmed).to_string(),
    }
}

fn parse_item(line: &str) -> Item {
    if line.is_empty() || line == ")" {
        return Item::Skip;
    }
    let blank = blank_quoted(line);

    if RE_PRIMARY_KEY.is_match(&blank) {
        return match primary_key_column(line) {
            Some(pk) => Item::PrimaryKey(pk),
            None => Item::Skip,
        };
    }
    if RE_INDEX_LINE.is_match(&blank) || RE_SKIP_ANYWHERE.is_match(&blank) {
        return Item::Skip;
    }

    let (name, rest) = split_column(line, &blank);
    let rest = rest.replace('`', "");

    let mut comment = None;
    let type_expr = match RE_COLUMN_COMMENT.captures(&rest) {
        Some(caps) => {
            comment = caps
                .get(1)
                .map(|m| unescape_literal(m.as_str(), '\''))
                .or_else(|| caps.get(2).map(|m| unescape_literal(m.as_str(), '"')));
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            format!("{}{}", &rest[..whole.start], &rest[whole.end..])
        }
        None => rest,
    };

    Item::Column {
        name,
        type_expr,
        comment,
    }
}

/// Split a column definition into (name, type expression).
fn split_column(line: &str, blank: &str) -> (String, String) {
    let first = line.chars().next().unwrap_or(' ');
    if first == '`' || first == '"' {
        // The blanked copy keeps quote characters, so the first quote after
        // position 0 that survives blanking is the closing one.
        if let Some(close) = blank[1..].find(first).map(|i| i + 1) {
            let name = unquote_ident(&line[..=close]);
            return (name, line[close + 1..].to_string());
        }
    }

    if let Some(m) = RE_KNOWN_TYPE.find_iter(blank).find(|m| m.start() > 0) {
        let name = line[..m.start()].trim();
        if !name.is_empty() {
            return (name.replace('`', ""), line[m.start()..].to_string());
        }
    }

    match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.replace('`', ""), rest.to_string()),
        None => (line.replace('`', ""), String::new()),
    }
}

fn primary_key_column(line: &str) -> Option<String> {
    let open = first_open_paren(line)?;
    let close = matching_paren(line, open)?;
    let first = split_top_level(&line[open + 1..close], ',')
        .first()?
        .trim()
        .to_string();
    // Drop prefix lengths (`col(10)`) and sort order.
    let first = match first_open_paren(&first) {
        Some(p) => first[..p].trim().to_string(),
        None => first,
    };
    let first = first
        .trim_end_matches(|c: char| c.is_whitespace())
        .trim_end_matches(" ASC")
        .trim_end_matches(" DESC")
        .trim_end_matches(" asc")
        .trim_end_matches(" desc");
    let name = unquote_ident(first);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn opts() -> TranslateOptions {
        TranslateOptions::default()
    }

    #[test]
    fn test_single_line_table_with_auto_increment() {
        let ddl = "CREATE TABLE t (id bigint(20) NOT NULL AUTO_INCREMENT, name varchar(50) COLLATE utf8mb4_unicode_ci, PRIMARY KEY(id)) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;";
        let out = translate_table(ddl, &opts()).unwrap();
        assert_eq!(
            out.create_sql,
            "CREATE TABLE \"t\" (\n  \"id\" BIGSERIAL NOT NULL,\n  \"name\" VARCHAR(50),\n  PRIMARY KEY (\"id\")\n)"
        );
        assert_eq!(out.primary_key.as_deref(), Some("id"));
        assert!(out.column_comments.is_empty());
        assert!(out.table_comment.is_none());
    }

    #[test]
    fn test_quoted_columns_with_comments() {
        let ddl = "CREATE TABLE slb_member (\"pool_id\" BIGINT comment '所属池id', \"net_card_id\" BIGINT comment \"网卡id\")";
        let out = translate_table(ddl, &opts()).unwrap();
        assert!(!out.create_sql.to_lowercase().contains("comment"));
        assert_eq!(
            out.create_sql,
            "CREATE TABLE \"slb_member\" (\n  \"pool_id\" BIGINT,\n  \"net_card_id\" BIGINT\n)"
        );
        assert_eq!(
            out.column_comments,
            vec![
                "COMMENT ON COLUMN \"slb_member\".\"pool_id\" IS '所属池id';".to_string(),
                "COMMENT ON COLUMN \"slb_member\".\"net_card_id\" IS '网卡id';".to_string(),
            ]
        );
    }

    #[test]
    fn test_show_create_table_output() {
        let ddl = r#"CREATE TABLE `orders` (
  `id` int(11) unsigned NOT NULL AUTO_INCREMENT,
  `user_id` bigint(20) NOT NULL COMMENT 'owner, see users(id)',
  `status` enum('new','paid','shipped') NOT NULL DEFAULT 'new',
  `total` decimal(10,2) NOT NULL DEFAULT '0.00',
  `is_gift` tinyint(1) NOT NULL DEFAULT '0',
  `note` text COLLATE utf8mb4_bin,
  `created_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP,
  `updated_at` datetime DEFAULT NULL ON UPDATE CURRENT_TIMESTAMP,
  PRIMARY KEY (`id`),
  UNIQUE KEY `uk_user` (`user_id`,`status`),
  KEY `idx_created` (`created_at`) USING BTREE,
  FULLTEXT KEY `ft_note` (`note`),
  CONSTRAINT `fk_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)
) ENGINE=InnoDB AUTO_INCREMENT=42 DEFAULT CHARSET=utf8mb4 COMMENT='customer orders'"#;
        let out = translate_table(ddl, &opts()).unwrap();
        assert_eq!(
            out.create_sql,
            "CREATE TABLE \"orders\" (\n  \"id\" SERIAL NOT NULL,\n  \"user_id\" BIGINT NOT NULL,\n  \"status\" VARCHAR(255) NOT NULL DEFAULT 'new',\n  \"total\" DECIMAL(10,2) NOT NULL DEFAULT '0.00',\n  \"is_gift\" BOOLEAN NOT NULL DEFAULT FALSE,\n  \"note\" TEXT,\n  \"created_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n  \"updated_at\" TIMESTAMP,\n  PRIMARY KEY (\"id\")\n)"
        );
        assert_eq!(out.columns.len(), 8);
        assert_eq!(out.table_comment.as_deref(), Some("customer orders"));
        assert_eq!(
            out.table_comment_sql().unwrap(),
            "COMMENT ON TABLE \"orders\" IS 'customer orders';"
        );
        assert_eq!(
            out.column_comments,
            vec!["COMMENT ON COLUMN \"orders\".\"user_id\" IS 'owner, see users(id)';".to_string()]
        );
        assert_eq!(out.statements().len(), 3);
    }

    #[test]
    fn test_temporary_table() {
        let out = translate_table("CREATE TEMPORARY TABLE tmp (a int)", &opts()).unwrap();
        assert!(out.temporary);
        assert_eq!(out.create_sql, "CREATE TEMPORARY TABLE \"tmp\" (\n  \"a\" INTEGER\n)");
    }

    #[test]
    fn test_lowercase_columns() {
        let opts = TranslateOptions {
            lowercase_columns: true,
        };
        let out = translate_table(
            "CREATE TABLE `Users` (`UserID` int NOT NULL, `EMail` varchar(100), PRIMARY KEY (`UserID`))",
            &opts,
        )
        .unwrap();
        assert_eq!(
            out.create_sql,
            "CREATE TABLE \"Users\" (\n  \"userid\" INTEGER NOT NULL,\n  \"email\" VARCHAR(100),\n  PRIMARY KEY (\"userid\")\n)"
        );
        assert_eq!(out.columns, vec!["userid", "email"]);
    }

    #[test]
    fn test_composite_primary_key_keeps_first_column() {
        let out = translate_table(
            "CREATE TABLE m (a int NOT NULL, b int NOT NULL, PRIMARY KEY (`a`,`b`))",
            &opts(),
        )
        .unwrap();
        assert_eq!(out.primary_key.as_deref(), Some("a"));
        assert!(out.create_sql.ends_with("PRIMARY KEY (\"a\")\n)"));
    }

    #[test]
    fn test_comment_with_parenthesis_and_quote() {
        let out = translate_table(
            "CREATE TABLE c (`x` int COMMENT 'a) b''s', `y` int)",
            &opts(),
        )
        .unwrap();
        assert_eq!(out.columns, vec!["x", "y"]);
        assert_eq!(
            out.column_comments[0],
            "COMMENT ON COLUMN \"c\".\"x\" IS 'a) b''s';"
        );
    }

    #[test]
    fn test_column_named_like_a_type() {
        let out = translate_table(
            "CREATE TABLE e (`date` date, `key` varchar(10), `time` time)",
            &opts(),
        )
        .unwrap();
        assert_eq!(out.columns, vec!["date", "key", "time"]);
        assert!(out.create_sql.contains("\"date\" DATE"));
        assert!(out.create_sql.contains("\"key\" VARCHAR(10)"));
    }

    #[test]
    fn test_identifier_with_embedded_quote_is_doubled() {
        let out = translate_table("CREATE TABLE q (`we\"ird` int)", &opts()).unwrap();
        assert!(out.create_sql.contains("\"we\"\"ird\" INTEGER"));
    }

    #[test]
    fn test_version_comment_is_unwrapped() {
        let out = translate_table(
            "CREATE TABLE v (`a` int /*!80023 INVISIBLE */, `b` int)",
            &opts(),
        )
        .unwrap();
        assert_eq!(out.columns, vec!["a", "b"]);
        assert!(out.create_sql.contains("\"a\" INTEGER,"));
    }

    #[test]
    fn test_rejects_non_table_ddl() {
        assert!(translate_table("CREATE VIEW v AS SELECT 1", &opts()).is_err());
        assert!(translate_table("CREATE TABLE t (KEY k (a))", &opts()).is_err());
    }
}
