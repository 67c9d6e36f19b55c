//! Secondary index translation.

use super::TranslateOptions;
use crate::core::identifier::{quote_pg, truncate_bytes, PG_MAX_IDENTIFIER_BYTES};
use crate::core::IndexDescriptor;
use crate::error::{MigrateError, Result};

/// Placeholder column some schemas use for an implicit primary key.
const PRI_KEY_PLACEHOLDER: &str = "pri_key";

/// Target index name: `lower(<table>_<index>)` cut to 63 bytes, with any
/// trailing underscores left by the cut removed.
///
/// Indexes share the relation namespace with tables, so a cut that lands
/// on the table's own name is shortened further and given a suffix.
pub fn index_name(table: &str, index: &str) -> String {
    let full = format!("{}_{}", table, index).to_lowercase();
    let name = truncate_bytes(&full, PG_MAX_IDENTIFIER_BYTES).trim_end_matches('_');
    let relation = truncate_bytes(table, PG_MAX_IDENTIFIER_BYTES);
    if !name.is_empty() && name != relation {
        return name.to_string();
    }
    for suffix in ["_idx", "_ix"] {
        let stem = truncate_bytes(name, PG_MAX_IDENTIFIER_BYTES - suffix.len());
        let candidate = format!("{}{}", stem.trim_end_matches('_'), suffix);
        if candidate != relation {
            return candidate;
        }
    }
    format!("{}_i", truncate_bytes(name, PG_MAX_IDENTIFIER_BYTES - 2))
}

/// Build `CREATE [UNIQUE] INDEX IF NOT EXISTS ...`.
///
/// Returns an empty string when the index only covers the `pri_key`
/// placeholder column.
pub fn translate_index(index: &IndexDescriptor, opts: &TranslateOptions) -> Result<String> {
    if index.name.trim().is_empty() {
        return Err(MigrateError::translate(&index.table, "index name is empty"));
    }
    if index.table.trim().is_empty() {
        return Err(MigrateError::translate(&index.name, "index table is empty"));
    }
    if index.columns.is_empty() {
        return Err(MigrateError::translate(
            format!("{}.{}", index.table, index.name),
            "index has no columns",
        ));
    }
    if index.columns.len() == 1 && index.columns[0].eq_ignore_ascii_case(PRI_KEY_PLACEHOLDER) {
        return Ok(String::new());
    }

    let columns: Vec<String> = index
        .columns
        .iter()
        .map(|c| quote_pg(&opts.column_name(c)))
        .collect();

    Ok(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        quote_pg(&index_name(&index.table, &index.name)),
        quote_pg(&index.table),
        columns.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index(name: &str, table: &str, cols: &[&str], unique: bool) -> IndexDescriptor {
        IndexDescriptor {
            name: name.to_string(),
            table: table.to_string(),
            columns: cols.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }

    #[test]
    fn test_unique_index() {
        let sql = translate_index(
            &index("idx_a", "users", &["email"], true),
            &TranslateOptions::default(),
        )
        .unwrap();
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"users_idx_a\" ON \"users\" (\"email\");"
        );
    }

    #[test]
    fn test_pri_key_placeholder_is_empty() {
        let sql = translate_index(
            &index("pk", "users", &["pri_key"], true),
            &TranslateOptions::default(),
        )
        .unwrap();
        assert_eq!(sql, "");
    }

    #[test]
    fn test_multi_column_and_case_policy() {
        let idx = index("IX_Name", "People", &["LastName", "FirstName"], false);
        let kept = translate_index(&idx, &TranslateOptions::default()).unwrap();
        assert_eq!(
            kept,
            "CREATE INDEX IF NOT EXISTS \"people_ix_name\" ON \"People\" (\"LastName\", \"FirstName\");"
        );
        let lowered = translate_index(
            &idx,
            &TranslateOptions {
                lowercase_columns: true,
            },
        )
        .unwrap();
        assert!(lowered.ends_with("(\"lastname\", \"firstname\");"));
    }

    #[test]
    fn test_long_name_truncated_on_underscore() {
        let name = index_name(&"t".repeat(40), &"i".repeat(40));
        assert_eq!(name.len(), PG_MAX_IDENTIFIER_BYTES);
        assert!(name.starts_with(&format!("{}_", "t".repeat(40))));
    }

    #[test]
    fn test_cut_never_lands_on_table_name() {
        // 62 bytes of table plus "_" fills the limit and the cut drops the "_"
        let table = "a".repeat(62);
        let name = index_name(&table, "idx");
        assert_ne!(name, table);
        assert_eq!(name, format!("{}_idx", "a".repeat(59)));
        assert!(name.len() <= PG_MAX_IDENTIFIER_BYTES);

        let sql = translate_index(
            &index("idx", &table, &["a"], false),
            &TranslateOptions::default(),
        )
        .unwrap();
        assert!(sql.contains(&format!("\"{}_idx\" ON \"{}\"", "a".repeat(59), table)));

        // a table already ending in the suffix falls through to the next one
        let tricky = format!("{}_idx", "b".repeat(59));
        let name = index_name(&tricky, "k");
        assert_ne!(name, tricky);
        assert_eq!(name, format!("{}_ix", "b".repeat(59)));
    }

    #[test]
    fn test_multibyte_name_truncation() {
        let name = index_name(&"表".repeat(30), "idx");
        assert!(name.len() <= PG_MAX_IDENTIFIER_BYTES);
        assert!(name.chars().all(|c| c == '表'));
    }

    #[test]
    fn test_empty_fields_are_errors() {
        let opts = TranslateOptions::default();
        assert!(translate_index(&index("", "users", &["a"], false), &opts).is_err());
        assert!(translate_index(&index("i", "", &["a"], false), &opts).is_err());
        assert!(translate_index(&index("i", "users", &[], false), &opts).is_err());
    }
}
