//! Statement and payload builders for the two bulk-load paths.
//!
//! The primary path streams `COPY ... FROM STDIN` in text format, which lets
//! PostgreSQL parse each field with the column's own input function. The
//! fallback path is a parameterized multi-row `INSERT` whose placeholders are
//! cast through `text` to the column type.

use bytes::{BufMut, BytesMut};

use crate::core::identifier::quote_pg;
use crate::core::Row;

/// Highest bind parameter index the PostgreSQL protocol accepts.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// `\N` marks NULL in text COPY.
const COPY_NULL: &[u8] = b"\\N";

/// Escape one field for text COPY.
pub fn escape_copy_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

pub fn copy_statement(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_pg(c)).collect();
    format!(
        "COPY {} ({}) FROM STDIN",
        quote_pg(table),
        cols.join(", ")
    )
}

/// Encode rows as tab-separated COPY text, one line per row.
pub fn encode_copy_rows(rows: &[Row]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(rows.len() * 128);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.put_u8(b'\t');
            }
            match value.to_pg_text() {
                Some(text) => buf.put_slice(escape_copy_text(&text).as_bytes()),
                None => buf.put_slice(COPY_NULL),
            }
        }
        buf.put_u8(b'\n');
    }
    buf
}

/// Rows per `INSERT` so that the parameter count stays within the protocol
/// limit.
pub fn rows_per_insert(columns: usize) -> usize {
    if columns == 0 {
        return 1;
    }
    (MAX_BIND_PARAMS / columns).max(1)
}

/// `INSERT INTO "t" ("a", "b") VALUES ($1::text::integer, $2::text::text), ...`
///
/// `types` holds the `format_type` of each column; a missing entry falls back
/// to `text`.
pub fn insert_statement(table: &str, columns: &[String], types: &[String], rows: usize) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_pg(c)).collect();
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", quote_pg(table), cols.join(", "));

    let mut param = 1;
    for r in 0..rows {
        if r > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for c in 0..columns.len() {
            if c > 0 {
                sql.push_str(", ");
            }
            let ty = types.get(c).map(String::as_str).unwrap_or("text");
            sql.push_str(&format!("${}::text::{}", param, ty));
            param += 1;
        }
        sql.push(')');
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_copy_text() {
        assert_eq!(escape_copy_text("plain"), "plain");
        assert_eq!(escape_copy_text("a\tb\nc\rd"), "a\\tb\\nc\\rd");
        assert_eq!(escape_copy_text("C:\\dir"), "C:\\\\dir");
    }

    #[test]
    fn test_copy_statement_quotes_identifiers() {
        let cols = vec!["id".to_string(), "Full \"Name\"".to_string()];
        assert_eq!(
            copy_statement("users", &cols),
            "COPY \"users\" (\"id\", \"Full \"\"Name\"\"\") FROM STDIN"
        );
    }

    #[test]
    fn test_encode_copy_rows() {
        let rows = vec![
            vec![SqlValue::Int(1), SqlValue::Text("a\tb".into()), SqlValue::Null],
            vec![SqlValue::Int(2), SqlValue::Bytes(vec![0xde, 0xad]), SqlValue::Bool(true)],
        ];
        let buf = encode_copy_rows(&rows);
        assert_eq!(
            std::str::from_utf8(&buf).unwrap(),
            "1\ta\\tb\t\\N\n2\t\\\\xdead\tt\n"
        );
    }

    #[test]
    fn test_rows_per_insert() {
        assert_eq!(rows_per_insert(1), 65_535);
        assert_eq!(rows_per_insert(10), 6_553);
        assert_eq!(rows_per_insert(70_000), 1);
        assert_eq!(rows_per_insert(0), 1);
        assert!(rows_per_insert(7) * 7 <= MAX_BIND_PARAMS);
    }

    #[test]
    fn test_insert_statement() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let types = vec!["integer".to_string()];
        assert_eq!(
            insert_statement("t", &cols, &types, 2),
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES ($1::text::integer, $2::text::text), ($3::text::integer, $4::text::text)"
        );
    }
}
