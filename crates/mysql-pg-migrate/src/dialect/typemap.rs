//! MySQL column type expression to PostgreSQL.
//!
//! Works on the text after the column name, e.g.
//! `bigint(20) unsigned NOT NULL AUTO_INCREMENT`, and returns the PostgreSQL
//! type followed by the surviving attributes (`NOT NULL`, `DEFAULT ...`).

use once_cell::sync::Lazy;
use regex::Regex;

use super::scan::{map_unquoted, matching_paren, squash_unquoted, squash_whitespace};

static RE_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\b(?:CHARACTER\s+SET|CHARSET)\s*=?\s*\w+").unwrap()
});
static RE_COLLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bCOLLATE\s*=?\s*\w+").unwrap());
static RE_ON_UPDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\bON\s+UPDATE\s+CURRENT_TIMESTAMP(?:\s*\(\s*\d*\s*\))?").unwrap()
});
static RE_UNSIGNED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(?:UNSIGNED|SIGNED|ZEROFILL)\b").unwrap());
static RE_AUTO_INCREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bAUTO_INCREMENT\b").unwrap());
static RE_CURRENT_TS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcurrent_timestamp(?:\s*(\(\s*\d*\s*\)))?(?:\s*\(\s*\d*\s*\))?").unwrap()
});
static RE_DEFAULT_NULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bDEFAULT\s+NULL\b").unwrap());
static RE_ZERO_DATE_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bDEFAULT\s+'0000-00-00[^']*'").unwrap());
static RE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:not\s+null|default|null)\b").unwrap());
static RE_BOOL_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDEFAULT\s+(?:b?'([01])'|([01]))(?:\s|$)").unwrap());
static RE_BIT_DEFAULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDEFAULT\s+b'([01]+)'").unwrap());
static RE_MYSQL_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\b(?:INVISIBLE|VISIBLE|COLUMN_FORMAT\s+\w+|STORAGE\s+(?:DISK|MEMORY)|SRID\s+\d+)\b")
        .unwrap()
});

/// Leading type token of a type expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeToken<'a> {
    /// Lowercased base name, `double precision` kept as two words.
    pub base: String,
    /// Text inside the parentheses right after the base, if any.
    pub args: Option<&'a str>,
    /// Everything after the token.
    pub rest: &'a str,
}

/// Split `expr` into its leading type token and the remainder.
pub fn split_type(expr: &str) -> TypeToken<'_> {
    let expr = expr.trim_start();
    let word_end = expr
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(expr.len());
    let mut base = expr[..word_end].to_lowercase();
    let mut pos = word_end;

    if base == "double" {
        let after = &expr[pos..];
        let trimmed = after.trim_start();
        if trimmed
            .get(..9)
            .is_some_and(|w| w.eq_ignore_ascii_case("precision"))
        {
            base = "double precision".to_string();
            pos += after.len() - trimmed.len() + 9;
        }
    }

    let after = &expr[pos..];
    let trimmed = after.trim_start();
    if trimmed.starts_with('(') {
        let open = pos + (after.len() - trimmed.len());
        if let Some(close) = matching_paren(expr, open) {
            return TypeToken {
                base,
                args: Some(&expr[open + 1..close]),
                rest: &expr[close + 1..],
            };
        }
    }

    TypeToken {
        base,
        args: None,
        rest: &expr[pos..],
    }
}

fn is_integer_base(base: &str) -> bool {
    matches!(
        base,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "serial"
    )
}

/// Map a base type and its arguments to the PostgreSQL type name.
pub fn map_base_type(base: &str, args: Option<&str>, auto_increment: bool) -> String {
    let args = args.map(str::trim).filter(|a| !a.is_empty());

    if auto_increment && is_integer_base(base) {
        return if base == "bigint" || base == "serial" {
            "BIGSERIAL".to_string()
        } else {
            "SERIAL".to_string()
        };
    }

    match base {
        "tinyint" if args == Some("1") => "BOOLEAN".to_string(),
        "bit" if args.is_none() || args == Some("1") => "BOOLEAN".to_string(),
        "bool" | "boolean" => "BOOLEAN".to_string(),
        "tinyint" | "smallint" => "SMALLINT".to_string(),
        "mediumint" | "int" | "integer" => "INTEGER".to_string(),
        "bigint" => "BIGINT".to_string(),
        "serial" => "BIGSERIAL".to_string(),
        "decimal" | "numeric" | "dec" | "fixed" => match args {
            Some(a) => format!("DECIMAL({})", a.replace(' ', "")),
            None => "DECIMAL".to_string(),
        },
        "float" => "REAL".to_string(),
        "double" | "double precision" | "real" => "DOUBLE PRECISION".to_string(),
        "char" | "nchar" => match args {
            Some(a) => format!("CHAR({})", a),
            None => "CHAR".to_string(),
        },
        "varchar" | "nvarchar" => match args {
            Some("0") => "VARCHAR(1)".to_string(),
            Some(a) => format!("VARCHAR({})", a),
            None => "VARCHAR".to_string(),
        },
        "text" | "tinytext" | "mediumtext" | "longtext" => "TEXT".to_string(),
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            "BYTEA".to_string()
        }
        "datetime" | "timestamp" => "TIMESTAMP".to_string(),
        "date" => "DATE".to_string(),
        "time" => match args {
            Some(a) => format!("TIME({})", a),
            None => "TIME".to_string(),
        },
        "year" => "INTEGER".to_string(),
        "json" => "JSON".to_string(),
        "jsonb" => "JSONB".to_string(),
        "enum" | "set" => "VARCHAR(255)".to_string(),
        // Values arrive as raw bytes.
        "bit" | "geometry" | "point" | "linestring" | "polygon" | "multipoint"
        | "multilinestring" | "multipolygon" | "geometrycollection" | "geomcollection" => {
            "BYTEA".to_string()
        }
        other => match args {
            Some(a) => format!("{}({})", other.to_uppercase(), a),
            None => other.to_uppercase(),
        },
    }
}

/// `b'101'` bit literal as hex bytes, left-padded to whole bytes.
fn bits_to_hex(bits: &str) -> String {
    let pad = (8 - bits.len() % 8) % 8;
    let padded = format!("{}{}", "0".repeat(pad), bits);
    padded
        .as_bytes()
        .chunks(8)
        .map(|byte| {
            let value = byte
                .iter()
                .fold(0u8, |acc, b| (acc << 1) | u8::from(*b == b'1'));
            format!("{:02x}", value)
        })
        .collect()
}

/// Translate a full column type expression (comment already removed).
pub fn translate_type_expr(expr: &str) -> String {
    let cleaned = map_unquoted(expr, &['\'', '"'], |seg| {
        let seg = RE_CHARSET.replace_all(seg, "");
        let seg = RE_COLLATE.replace_all(&seg, "");
        let seg = RE_ON_UPDATE.replace_all(&seg, "");
        let seg = RE_UNSIGNED.replace_all(&seg, "");
        let seg = RE_MYSQL_ONLY.replace_all(&seg, "");
        seg.into_owned()
    });

    let mut auto_increment = false;
    let cleaned = map_unquoted(&cleaned, &['\'', '"'], |seg| {
        if RE_AUTO_INCREMENT.is_match(seg) {
            auto_increment = true;
        }
        RE_AUTO_INCREMENT.replace_all(seg, "").into_owned()
    });

    let token = split_type(&cleaned);
    let mapped = map_base_type(&token.base, token.args, auto_increment);

    let rest = RE_ZERO_DATE_DEFAULT.replace_all(token.rest, "");
    let rest = map_unquoted(&rest, &['\'', '"'], |seg| {
        let seg = RE_DEFAULT_NULL.replace_all(seg, "");
        let seg = RE_CURRENT_TS.replace_all(&seg, |caps: &regex::Captures| match caps.get(1) {
            Some(p) => format!("CURRENT_TIMESTAMP{}", p.as_str().replace(' ', "")),
            None => "CURRENT_TIMESTAMP".to_string(),
        });
        let seg = RE_KEYWORDS.replace_all(&seg, |caps: &regex::Captures| {
            squash_whitespace(&caps[0]).to_uppercase()
        });
        seg.into_owned()
    });

    let rest = if mapped == "BOOLEAN" {
        RE_BOOL_DEFAULT
            .replace_all(&rest, |caps: &regex::Captures| {
                let bit = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                let value = if bit == Some("1") { "TRUE" } else { "FALSE" };
                let trailing = if caps[0].ends_with(char::is_whitespace) { " " } else { "" };
                format!("DEFAULT {}{}", value, trailing)
            })
            .into_owned()
    } else if mapped == "BYTEA" {
        RE_BIT_DEFAULT
            .replace_all(&rest, |caps: &regex::Captures| {
                format!("DEFAULT '\\x{}'", bits_to_hex(&caps[1]))
            })
            .into_owned()
    } else {
        rest
    };

    squash_unquoted(&format!("{} {}", mapped, rest))
}
