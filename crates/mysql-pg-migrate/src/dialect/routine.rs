//! Stored function translation.
//!
//! Only functions whose body is a single `RETURN <expr>` have a direct SQL
//! function equivalent. Procedural bodies are reported as translation
//! errors and skipped by the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use super::scan::{find_top_level_keyword, matching_paren, split_top_level};
use super::typemap::translate_type_expr;
use super::view::{lowercase_sql, translate_expression};
use super::TranslateOptions;
use crate::core::identifier::{quote_pg, unquote};
use crate::core::FunctionDescriptor;
use crate::error::{MigrateError, Result};

static RE_FUNCTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*CREATE\s+(?:DEFINER\s*=\s*(?:`[^`]*`|'[^']*'|\S+?)@(?:`[^`]*`|'[^']*'|\S+)\s+)?(?:AGGREGATE\s+)?FUNCTION\s+(?:IF\s+NOT\s+EXISTS\s+)?((?:`[^`]+`|[\w$]+)(?:\.(?:`[^`]+`|[\w$]+))?)\s*\(",
    )
    .unwrap()
});
static RE_RETURNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^\s*RETURNS\s+").unwrap());
static RE_PARAM_MODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:IN|OUT|INOUT)\s+").unwrap());
static RE_NOT_DETERMINISTIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNOT\s+DETERMINISTIC\b").unwrap());
static RE_DETERMINISTIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bDETERMINISTIC\b").unwrap());

/// Keywords that may follow the return type and precede the body.
const CHARACTERISTICS: &[&str] = &[
    "deterministic",
    "not",
    "no",
    "reads",
    "contains",
    "modifies",
    "sql",
    "comment",
    "language",
    "return",
    "begin",
];

/// Translate a `SHOW CREATE FUNCTION` statement into a PostgreSQL SQL function.
pub fn translate_function(func: &FunctionDescriptor, opts: &TranslateOptions) -> Result<String> {
    let ddl = func.definition.trim();
    let header = RE_FUNCTION_HEADER
        .captures(ddl)
        .ok_or_else(|| MigrateError::translate(&func.name, "not a CREATE FUNCTION statement"))?;
    let open = header.get(0).map_or(0, |m| m.end() - 1);
    let close = matching_paren(ddl, open)
        .ok_or_else(|| MigrateError::translate(&func.name, "unbalanced parameter list"))?;

    let params = translate_params(&ddl[open + 1..close], &func.name)?;

    let after_params = &ddl[close + 1..];
    let returns = RE_RETURNS
        .find(after_params)
        .ok_or_else(|| MigrateError::translate(&func.name, "missing RETURNS clause"))?;
    let tail = &after_params[returns.end()..];

    let type_end = CHARACTERISTICS
        .iter()
        .filter_map(|kw| find_top_level_keyword(tail, kw))
        .min()
        .unwrap_or(tail.len());
    let return_type = translate_type_expr(tail[..type_end].trim());
    let characteristics_and_body = &tail[type_end..];

    let body_at = find_top_level_keyword(characteristics_and_body, "return");
    let begin_at = find_top_level_keyword(characteristics_and_body, "begin");
    let expr = match (body_at, begin_at) {
        (Some(r), b) if b.map_or(true, |b| r < b) => characteristics_and_body[r + "return".len()..]
            .trim()
            .trim_end_matches(';')
            .trim(),
        _ => {
            return Err(MigrateError::translate(
                &func.name,
                "procedural function body is not supported",
            ))
        }
    };
    if expr.is_empty() {
        return Err(MigrateError::translate(&func.name, "empty RETURN expression"));
    }

    let characteristics = &characteristics_and_body[..body_at.unwrap_or(0)];
    let immutable = RE_DETERMINISTIC.is_match(characteristics)
        && !RE_NOT_DETERMINISTIC.is_match(characteristics);

    let expr = lowercase_sql(&translate_expression(expr, ""), opts);
    Ok(format!(
        "CREATE OR REPLACE FUNCTION {}({}) RETURNS {} AS $$ SELECT {} $$ LANGUAGE sql{};",
        quote_pg(&func.name),
        params.join(", "),
        return_type,
        expr,
        if immutable { " IMMUTABLE" } else { "" }
    ))
}

fn translate_params(list: &str, function: &str) -> Result<Vec<String>> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(list, ',')
        .into_iter()
        .map(|raw| {
            let raw = RE_PARAM_MODE.replace(raw.trim(), "");
            let (name, ty) = raw
                .split_once(char::is_whitespace)
                .ok_or_else(|| MigrateError::translate(function, format!("bad parameter '{raw}'")))?;
            Ok(format!(
                "{} {}",
                quote_pg(&unquote(name).to_lowercase()),
                translate_type_expr(ty)
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn func(name: &str, definition: &str) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            definition: definition.to_string(),
        }
    }

    #[test]
    fn test_single_return_function() {
        let f = func(
            "add_tax",
            "CREATE DEFINER=`root`@`%` FUNCTION `add_tax`(`Price` decimal(10,2), rate INT) RETURNS decimal(10,2)\n    DETERMINISTIC\nRETURN Price * (1 + rate / 100)",
        );
        assert_eq!(
            translate_function(&f, &TranslateOptions::default()).unwrap(),
            "CREATE OR REPLACE FUNCTION \"add_tax\"(\"price\" DECIMAL(10,2), \"rate\" INTEGER) RETURNS DECIMAL(10,2) AS $$ SELECT price * (1 + rate / 100) $$ LANGUAGE sql IMMUTABLE;"
        );
    }

    #[test]
    fn test_expression_rewrites_apply() {
        let f = func(
            "label",
            "CREATE FUNCTION label(x int) RETURNS varchar(20) CHARSET utf8mb4\n    NOT DETERMINISTIC\n    READS SQL DATA\nRETURN IFNULL(CONCAT('n', x), 'none');",
        );
        assert_eq!(
            translate_function(&f, &TranslateOptions::default()).unwrap(),
            "CREATE OR REPLACE FUNCTION \"label\"(\"x\" INTEGER) RETURNS VARCHAR(20) AS $$ SELECT coalesce(('n' || x), 'none') $$ LANGUAGE sql;"
        );
    }

    #[test]
    fn test_no_parameters() {
        let f = func("one", "CREATE FUNCTION one() RETURNS int RETURN 1");
        assert_eq!(
            translate_function(&f, &TranslateOptions::default()).unwrap(),
            "CREATE OR REPLACE FUNCTION \"one\"() RETURNS INTEGER AS $$ SELECT 1 $$ LANGUAGE sql;"
        );
    }

    #[test]
    fn test_procedural_body_is_rejected() {
        let f = func(
            "loop_fn",
            "CREATE FUNCTION loop_fn(n INT) RETURNS INT\nBEGIN\n  DECLARE i INT DEFAULT 0;\n  RETURN i;\nEND",
        );
        let err = translate_function(&f, &TranslateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("procedural"));
    }

    #[test]
    fn test_not_a_function() {
        let f = func("p", "CREATE PROCEDURE p() BEGIN END");
        assert!(translate_function(&f, &TranslateOptions::default()).is_err());
    }
}
