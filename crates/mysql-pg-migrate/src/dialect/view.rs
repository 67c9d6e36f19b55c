//! View definition translation.
//!
//! The body comes from `INFORMATION_SCHEMA.VIEWS.VIEW_DEFINITION`, which MySQL
//! normalizes to fully qualified, backtick-quoted identifiers. Rewrites run
//! in a fixed order over that text and the result is lowercased outside
//! string literals.

use once_cell::sync::Lazy;
use regex::Regex;

use super::functions::rewrite_functions;
use super::scan::{
    find_top_level_keyword, first_open_paren, map_unquoted, matching_paren, rewrite_calls,
    split_top_level,
};
use super::TranslateOptions;
use crate::core::identifier::quote_pg;
use crate::core::ViewDescriptor;
use crate::error::{MigrateError, Result};

const IDENT: &str = r#"(?:"[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

static RE_COLUMN_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^{IDENT}(?:\.{IDENT})?$")).unwrap());
static RE_QUOTED_COLUMN_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"[^"]+"(?:\."[^"]+")?$"#).unwrap());
static RE_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static RE_LIMIT_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blimit\s+(\d+)\s*,\s*(\d+)").unwrap());
static RE_INTRODUCER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b_(?:utf8mb4|utf8mb3|utf8|latin1|binary|ascii)\s*$").unwrap()
});
static RE_COLLATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+collate\s+\w+").unwrap());
static RE_JOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\bjoin\s+({IDENT}(?:\.{IDENT})?)(?:\s+(?:as\s+)?({IDENT}))?\s+on\b\s*"
    ))
    .unwrap()
});
static RE_EQUALITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({IDENT}(?:\.{IDENT})?)(\s*=\s*)({IDENT}(?:\.{IDENT})?)"
    ))
    .unwrap()
});
const JOIN_CONDITION_END: &[&str] = &[
    "join", "left", "right", "inner", "cross", "where", "group", "order", "limit", "having",
    "union",
];

/// Translate one view into `CREATE OR REPLACE VIEW ...;`.
pub fn translate_view(
    view: &ViewDescriptor,
    database: &str,
    opts: &TranslateOptions,
) -> Result<String> {
    if view.name.trim().is_empty() {
        return Err(MigrateError::translate("view", "view name is empty"));
    }
    let body = view.definition.trim().trim_end_matches(';').trim();
    if body.is_empty() {
        return Err(MigrateError::translate(&view.name, "view definition is empty"));
    }

    let body = translate_expression(body, database);
    Ok(format!(
        "CREATE OR REPLACE VIEW {} AS {};",
        quote_pg(&view.name),
        lowercase_sql(&body, opts)
    ))
}

/// Apply the MySQL to PostgreSQL expression rewrites to a query or
/// expression, without changing letter case.
pub fn translate_expression(body: &str, database: &str) -> String {
    let mut out = map_unquoted(body, &['\''], |seg| {
        let seg = seg.replace('`', "\"");
        let seg = RE_INTRODUCER.replace(&seg, "");
        RE_COLLATE.replace_all(&seg, "").into_owned()
    });

    out = strip_database(&out, database);

    out = rewrite_calls(&out, "ifnull", &|args: &[&str]| {
        Some(format!("coalesce({})", args.join(",")))
    });
    out = rewrite_calls(&out, "group_concat", &|args: &[&str]| {
        Some(group_concat(&args.join(",")))
    });
    out = rewrite_calls(&out, "if", &|args: &[&str]| {
        (args.len() == 3).then(|| {
            format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                args[0].trim(),
                args[1].trim(),
                args[2].trim()
            )
        })
    });
    out = rewrite_calls(&out, "convert", &|args: &[&str]| convert(args));
    out = rewrite_calls(&out, "cast", &|args: &[&str]| {
        if args.len() != 1 {
            return None;
        }
        let inner = args[0];
        let at = find_top_level_keyword(inner, "as")?;
        Some(format!(
            "CAST({} AS {})",
            inner[..at].trim(),
            cast_type(inner[at + 2..].trim())
        ))
    });
    out = map_unquoted(&out, &['\''], |seg| {
        RE_LIMIT_OFFSET
            .replace_all(seg, "LIMIT $2 OFFSET $1")
            .into_owned()
    });
    out = rewrite_calls(&out, "concat", &|args: &[&str]| {
        (!args.is_empty()).then(|| {
            let parts: Vec<&str> = args.iter().map(|a| a.trim()).collect();
            format!("({})", parts.join(" || "))
        })
    });
    out = cast_join_conditions(&out);
    out = rewrite_calls(&out, "sum", &|args: &[&str]| {
        let arg = args.first()?.trim();
        (args.len() == 1 && RE_COLUMN_REF.is_match(arg) && !arg.ends_with("::numeric"))
            .then(|| format!("sum({}::numeric)", arg))
    });
    out = rewrite_calls(&out, "coalesce", &|args: &[&str]| {
        if args.len() != 2 {
            return None;
        }
        let (col, default) = (args[0].trim(), args[1].trim());
        (RE_QUOTED_COLUMN_REF.is_match(col) && RE_INTEGER.is_match(default))
            .then(|| format!("coalesce({}::numeric,{})", col, args[1]))
    });
    rewrite_functions(&out)
}

/// Lowercase everything outside string literals. Double-quoted identifiers
/// keep their case unless `lowercase_columns` is set.
pub fn lowercase_sql(sql: &str, opts: &TranslateOptions) -> String {
    let quotes: &[char] = if opts.lowercase_columns {
        &['\'']
    } else {
        &['\'', '"']
    };
    map_unquoted(sql, quotes, |seg| seg.to_lowercase())
}

/// Remove `"db".` and `db.` qualifiers that name the source database.
fn strip_database(sql: &str, database: &str) -> String {
    if database.is_empty() {
        return sql.to_string();
    }
    let escaped = regex::escape(database);
    let quoted = format!(r#"(?i)"{}"\s*\.\s*"#, escaped);
    let bare = format!(r#"(?i)(^|[^\w.$"])\b{}\s*\.\s*"#, escaped);
    let (Ok(quoted), Ok(bare)) = (Regex::new(&quoted), Regex::new(&bare)) else {
        return sql.to_string();
    };
    map_unquoted(sql, &['\''], |seg| {
        let seg = quoted.replace_all(seg, "");
        bare.replace_all(&seg, "$1").into_owned()
    })
}

/// `GROUP_CONCAT([DISTINCT] x [ORDER BY ...] [SEPARATOR 's'])` to `string_agg`.
///
/// PostgreSQL rejects `DISTINCT` together with an `ORDER BY` on other
/// expressions, so the ordering is dropped when `DISTINCT` is present.
fn group_concat(inner: &str) -> String {
    let mut rest = inner.trim();
    let mut separator = "','".to_string();
    if let Some(at) = find_top_level_keyword(rest, "separator") {
        let sep = rest[at + "separator".len()..].trim();
        if !sep.is_empty() {
            separator = sep.to_string();
        }
        rest = rest[..at].trim();
    }

    let mut order_by = None;
    if let Some(at) = find_top_level_keyword(rest, "order") {
        order_by = Some(rest[at..].trim().to_string());
        rest = rest[..at].trim();
    }

    let distinct = find_top_level_keyword(rest, "distinct") == Some(0);
    if distinct {
        rest = rest["distinct".len()..].trim();
    }

    let parts: Vec<&str> = split_top_level(rest, ',').into_iter().map(str::trim).collect();
    let expr = if parts.len() > 1 {
        format!("({})", parts.join(" || "))
    } else {
        rest.to_string()
    };

    let mut out = format!(
        "string_agg({}CAST({} AS text), {}",
        if distinct { "DISTINCT " } else { "" },
        expr,
        separator
    );
    if let (Some(order), false) = (order_by, distinct) {
        out.push(' ');
        out.push_str(&order);
    }
    out.push(')');
    out
}

fn convert(args: &[&str]) -> Option<String> {
    match args {
        [expr, ty] => Some(format!("CAST({} AS {})", expr.trim(), cast_type(ty.trim()))),
        [inner] => {
            let at = find_top_level_keyword(inner, "using")?;
            Some(inner[..at].trim().to_string())
        }
        _ => None,
    }
}

/// MySQL cast target type to its PostgreSQL spelling.
fn cast_type(ty: &str) -> String {
    let lower = ty.to_lowercase();
    let base = lower
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    let args = first_open_paren(ty)
        .and_then(|open| matching_paren(ty, open).map(|close| &ty[open + 1..close]));
    match base {
        "char" | "nchar" | "varchar" => match args {
            Some(n) if base != "char" => format!("varchar({})", n.trim()),
            _ => "text".to_string(),
        },
        "signed" | "unsigned" => "bigint".to_string(),
        "decimal" => match args {
            Some(a) => format!("numeric({})", a.replace(' ', "")),
            None => "numeric".to_string(),
        },
        "datetime" => "timestamp".to_string(),
        "binary" => "bytea".to_string(),
        "json" => "jsonb".to_string(),
        "double" | "real" => "double precision".to_string(),
        "float" => "real".to_string(),
        _ => ty.to_string(),
    }
}

/// Cast the two sides of `a = b` inside `JOIN ... ON` conditions to text.
/// Sides without a table qualifier are qualified with the joined table's
/// alias.
fn cast_join_conditions(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pos = 0;
    for caps in RE_JOIN.captures_iter(sql) {
        let (Some(whole), Some(table)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() < pos {
            continue;
        }
        let alias = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_else(|| table.as_str().rsplit('.').next().unwrap_or_default());

        let cond_start = whole.end();
        let cond_end = if sql[cond_start..].starts_with('(') {
            matching_paren(sql, cond_start).map_or(sql.len(), |c| c + 1)
        } else {
            JOIN_CONDITION_END
                .iter()
                .filter_map(|kw| find_top_level_keyword(&sql[cond_start..], kw))
                .min()
                .map_or(sql.len(), |p| cond_start + p)
        };

        out.push_str(&sql[pos..cond_start]);
        out.push_str(&cast_equalities(&sql[cond_start..cond_end], alias));
        pos = cond_end;
    }
    out.push_str(&sql[pos..]);
    out
}

fn cast_equalities(cond: &str, alias: &str) -> String {
    map_unquoted(cond, &['\''], |seg| {
        RE_EQUALITY
            .replace_all(seg, |caps: &regex::Captures| {
                let side = |s: &str| {
                    if s.contains('.') {
                        format!("{}::text", s)
                    } else {
                        format!("{}.{}::text", alias, s)
                    }
                };
                format!("{}{}{}", side(&caps[1]), &caps[2], side(&caps[3]))
            })
            .into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn view(name: &str, body: &str) -> ViewDescriptor {
        ViewDescriptor {
            name: name.to_string(),
            definition: body.to_string(),
        }
    }

    fn translate(body: &str) -> String {
        translate_view(&view("v", body), "db", &TranslateOptions::default()).unwrap()
    }

    #[test]
    fn test_ifnull_and_if() {
        let sql = translate("select ifnull(a,0) from db.t where if(a=1,'x','y')");
        assert_eq!(
            sql,
            "CREATE OR REPLACE VIEW \"v\" AS select coalesce(a,0) from t where case when a=1 then 'x' else 'y' end;"
        );
    }

    #[test]
    fn test_mysql_normalized_definition() {
        let body = "select `db`.`Orders`.`Id` AS `Id`,`db`.`Orders`.`Total` AS `Total` from `db`.`Orders`";
        assert_eq!(
            translate(body),
            "CREATE OR REPLACE VIEW \"v\" AS select \"Orders\".\"Id\" as \"Id\",\"Orders\".\"Total\" as \"Total\" from \"Orders\";"
        );
        let lowered = translate_view(
            &view("V", body),
            "db",
            &TranslateOptions {
                lowercase_columns: true,
            },
        )
        .unwrap();
        assert!(lowered.starts_with("CREATE OR REPLACE VIEW \"V\" AS select \"orders\".\"id\""));
    }

    #[test]
    fn test_group_concat() {
        assert_eq!(
            translate_expression("GROUP_CONCAT(DISTINCT name ORDER BY name SEPARATOR ';')", ""),
            "string_agg(DISTINCT CAST(name AS text), ';')"
        );
        assert_eq!(
            translate_expression("group_concat(name order by id desc)", ""),
            "string_agg(CAST(name AS text), ',' order by id desc)"
        );
        assert_eq!(
            translate_expression("group_concat(a, b)", ""),
            "string_agg(CAST((a || b) AS text), ',')"
        );
    }

    #[test]
    fn test_convert_and_cast() {
        assert_eq!(translate_expression("convert(x, signed)", ""), "CAST(x AS bigint)");
        assert_eq!(
            translate_expression("convert(name using utf8mb4)", ""),
            "name"
        );
        assert_eq!(
            translate_expression("cast(x as char charset utf8mb4)", ""),
            "CAST(x AS text)"
        );
        assert_eq!(
            translate_expression("cast(p as decimal(10, 2))", ""),
            "CAST(p AS numeric(10,2))"
        );
    }

    #[test]
    fn test_limit_and_concat() {
        assert_eq!(
            translate_expression("select concat(a, '-', concat(b, c)) from t limit 5, 10", ""),
            "select (a || '-' || (b || c)) from t LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            translate_expression("select 'limit 1,2'", ""),
            "select 'limit 1,2'"
        );
    }

    #[test]
    fn test_sum_and_coalesce_casts() {
        assert_eq!(
            translate_expression("sum(\"t\".\"amount\")", ""),
            "sum(\"t\".\"amount\"::numeric)"
        );
        assert_eq!(translate_expression("sum(1)", ""), "sum(1)");
        assert_eq!(
            translate_expression("ifnull(\"qty\",0)", ""),
            "coalesce(\"qty\"::numeric,0)"
        );
        assert_eq!(translate_expression("coalesce(a,0)", ""), "coalesce(a,0)");
    }

    #[test]
    fn test_join_condition_casts() {
        assert_eq!(
            translate_expression(
                "select * from \"a\" join \"b\" on((\"a\".\"id\" = \"b\".\"a_id\")) where x = y",
                ""
            ),
            "select * from \"a\" join \"b\" on((\"a\".\"id\"::text = \"b\".\"a_id\"::text)) where x = y"
        );
        assert_eq!(
            translate_expression("select * from a join b bb on a.id = ref where 1", ""),
            "select * from a join b bb on a.id::text = bb.ref::text where 1"
        );
    }

    #[test]
    fn test_charset_introducer_and_collate() {
        assert_eq!(
            translate_expression("where name = _utf8mb4'x' collate utf8mb4_bin", ""),
            "where name = 'x'"
        );
    }

    #[test]
    fn test_database_qualifier_only_for_source_db() {
        assert_eq!(
            translate_expression("select other.t.a, db.t.b, \"DB\".\"t\".c from t", "db"),
            "select other.t.a, t.b, \"t\".c from t"
        );
    }

    #[test]
    fn test_trailing_semicolon_and_empty_body() {
        assert!(translate("select 1;").ends_with("AS select 1;"));
        assert!(translate_view(&view("v", "  ; "), "db", &TranslateOptions::default()).is_err());
    }
}
