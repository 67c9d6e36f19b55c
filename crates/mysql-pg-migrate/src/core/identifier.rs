//! Identifier and literal quoting.
//!
//! SQL identifiers cannot be bound as statement parameters, so every name
//! that reaches a dynamically built statement passes through here. Quoting
//! doubles the interior quote character, which keeps any name safe without
//! rejecting unusual but legal identifiers.

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const PG_MAX_IDENTIFIER_BYTES: usize = 63;

/// Quote a PostgreSQL identifier: wrap in `"` and double interior `"`.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL identifier: wrap in backticks and double interior backticks.
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal for either dialect: wrap in `'` and double interior `'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Cut `name` to at most `max` bytes without splitting a UTF-8 character.
pub fn truncate_bytes(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Strip one layer of surrounding quotes (`"`, `'` or backtick) if present.
pub fn unquote(name: &str) -> &str {
    let trimmed = name.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && matches!(first, b'"' | b'\'' | b'`') {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("users"), "\"users\"");
        assert_eq!(quote_pg("table\"name"), "\"table\"\"name\"");
        assert_eq!(quote_pg("所属"), "\"所属\"");
    }

    #[test]
    fn test_quote_mysql() {
        assert_eq!(quote_mysql("name"), "`name`");
        assert_eq!(quote_mysql("table`name"), "`table``name`");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundary() {
        assert_eq!(truncate_bytes("abcdef", 3), "abc");
        assert_eq!(truncate_bytes("abc", 10), "abc");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_bytes("aé", 2), "a");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"t\""), "t");
        assert_eq!(unquote("`t`"), "t");
        assert_eq!(unquote(" t "), "t");
        assert_eq!(unquote("\"t"), "\"t");
    }
}
