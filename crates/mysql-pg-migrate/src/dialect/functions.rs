//! MySQL built-in function calls rewritten to PostgreSQL equivalents.
//!
//! Used by view bodies and single-expression stored functions. Calls are
//! rewritten innermost first; string literals are never touched.

use once_cell::sync::Lazy;
use regex::Regex;

use super::scan::{quoted_ranges, rewrite_calls, unescape_literal};
use crate::core::identifier::quote_literal;

/// Calls that only change name and keep their argument list.
const RENAMES: &[(&str, &str)] = &[
    ("json_object", "json_build_object"),
    ("json_array", "json_build_array"),
    ("sysdate", "clock_timestamp"),
    ("from_unixtime", "to_timestamp"),
    ("lcase", "lower"),
    ("ucase", "upper"),
    ("rand", "random"),
    ("truncate", "trunc"),
    ("database", "current_database"),
    ("schema", "current_schema"),
    ("connection_id", "pg_backend_pid"),
    ("last_insert_id", "lastval"),
];

/// Zero-argument calls that become bare SQL keywords.
const KEYWORD_CALLS: &[(&str, &str)] = &[
    ("curdate", "current_date"),
    ("current_date", "current_date"),
    ("curtime", "current_time"),
    ("current_time", "current_time"),
    ("utc_timestamp", "(now() at time zone 'utc')"),
    ("user", "current_user"),
    ("current_user", "current_user"),
    ("session_user", "session_user"),
    ("system_user", "session_user"),
];

/// Calls that take one date/time argument and extract a field.
const EXTRACTS: &[(&str, &str)] = &[
    ("year", "year"),
    ("month", "month"),
    ("day", "day"),
    ("dayofmonth", "day"),
    ("hour", "hour"),
    ("minute", "minute"),
    ("second", "second"),
    ("quarter", "quarter"),
    ("dayofyear", "doy"),
    ("week", "week"),
];

static RE_INTERVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*interval\s+(.+?)\s+(microsecond|second|minute|hour|day|week|month|quarter|year)\s*$")
        .unwrap()
});

fn arg<'a>(args: &[&'a str], i: usize) -> &'a str {
    args.get(i).map_or("", |a| a.trim())
}

/// Rewrite every known MySQL function call in `expr`.
pub fn rewrite_functions(expr: &str) -> String {
    let mut out = expr.to_string();

    for (from, to) in RENAMES {
        out = rewrite_calls(&out, from, &|args: &[&str]| {
            Some(format!("{}({})", to, args.join(",")))
        });
    }
    for (from, to) in KEYWORD_CALLS {
        out = rewrite_calls(&out, from, &|args: &[&str]| {
            args.is_empty().then(|| to.to_string())
        });
    }
    for (from, field) in EXTRACTS {
        out = rewrite_calls(&out, from, &|args: &[&str]| {
            (args.len() == 1).then(|| format!("extract({} from {})", field, arg(args, 0)))
        });
    }

    // JSON
    out = rewrite_calls(&out, "json_extract", &|args: &[&str]| {
        (args.len() == 2).then(|| {
            format!(
                "jsonb_path_query_first(cast({} as jsonb), cast({} as jsonpath))",
                arg(args, 0),
                arg(args, 1)
            )
        })
    });
    out = rewrite_calls(&out, "json_unquote", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("({} #>> '{{}}')", arg(args, 0)))
    });
    out = rewrite_calls(&out, "json_length", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("jsonb_array_length(cast({} as jsonb))", arg(args, 0)))
    });
    out = rewrite_calls(&out, "json_contains", &|args: &[&str]| {
        (args.len() == 2).then(|| {
            format!(
                "(cast({} as jsonb) @> cast({} as jsonb))",
                arg(args, 0),
                arg(args, 1)
            )
        })
    });

    // Date arithmetic
    out = rewrite_calls(&out, "date_add", &|args: &[&str]| date_arith(args, "+"));
    out = rewrite_calls(&out, "adddate", &|args: &[&str]| date_arith(args, "+"));
    out = rewrite_calls(&out, "date_sub", &|args: &[&str]| date_arith(args, "-"));
    out = rewrite_calls(&out, "subdate", &|args: &[&str]| date_arith(args, "-"));
    out = rewrite_calls(&out, "datediff", &|args: &[&str]| {
        (args.len() == 2).then(|| {
            format!(
                "(cast({} as date) - cast({} as date))",
                arg(args, 0),
                arg(args, 1)
            )
        })
    });
    out = rewrite_calls(&out, "timestampdiff", &|args: &[&str]| {
        if args.len() != 3 {
            return None;
        }
        timestampdiff(arg(args, 0), arg(args, 1), arg(args, 2))
    });
    out = rewrite_calls(&out, "date_format", &|args: &[&str]| {
        if args.len() != 2 {
            return None;
        }
        let fmt = literal_body(arg(args, 1))?;
        Some(format!(
            "to_char({}, {})",
            arg(args, 0),
            quote_literal(&convert_date_format(&fmt))
        ))
    });
    out = rewrite_calls(&out, "unix_timestamp", &|args: &[&str]| match args.len() {
        0 => Some("extract(epoch from now())".to_string()),
        1 => Some(format!("extract(epoch from {})", arg(args, 0))),
        _ => None,
    });
    out = rewrite_calls(&out, "date", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("cast({} as date)", arg(args, 0)))
    });

    // Time
    out = rewrite_calls(&out, "sec_to_time", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("make_interval(secs => {})", arg(args, 0)))
    });
    out = rewrite_calls(&out, "time_to_sec", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("extract(epoch from cast({} as interval))", arg(args, 0)))
    });

    // Crypto
    out = rewrite_calls(&out, "sha1", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("encode(digest({}, 'sha1'), 'hex')", arg(args, 0)))
    });
    out = rewrite_calls(&out, "sha", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("encode(digest({}, 'sha1'), 'hex')", arg(args, 0)))
    });
    out = rewrite_calls(&out, "sha2", &|args: &[&str]| {
        if args.len() != 2 {
            return None;
        }
        let func = match arg(args, 1) {
            "224" => "sha224",
            "0" | "256" => "sha256",
            "384" => "sha384",
            "512" => "sha512",
            _ => return None,
        };
        Some(format!(
            "encode({}(convert_to({}, 'UTF8')), 'hex')",
            func,
            arg(args, 0)
        ))
    });

    // UUID
    out = rewrite_calls(&out, "uuid", &|args: &[&str]| {
        args.is_empty().then(|| "cast(gen_random_uuid() as text)".to_string())
    });

    // Network
    out = rewrite_calls(&out, "inet_aton", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("(cast({} as inet) - '0.0.0.0'::inet)", arg(args, 0)))
    });
    out = rewrite_calls(&out, "inet_ntoa", &|args: &[&str]| {
        (args.len() == 1).then(|| format!("host('0.0.0.0'::inet + {})", arg(args, 0)))
    });

    // Strings
    out = rewrite_calls(&out, "locate", &|args: &[&str]| {
        (args.len() == 2).then(|| format!("strpos({}, {})", arg(args, 1), arg(args, 0)))
    });
    out = rewrite_calls(&out, "instr", &|args: &[&str]| {
        (args.len() == 2).then(|| format!("strpos({}, {})", arg(args, 0), arg(args, 1)))
    });

    out
}

fn date_arith(args: &[&str], op: &str) -> Option<String> {
    if args.len() != 2 {
        return None;
    }
    let caps = RE_INTERVAL.captures(arg(args, 1))?;
    let amount = caps.get(1)?.as_str().trim();
    let unit = caps.get(2)?.as_str().to_lowercase();
    let amount = literal_body(amount).unwrap_or_else(|| amount.to_string());
    if amount.parse::<f64>().is_ok() {
        Some(format!(
            "({} {} interval '{} {}')",
            arg(args, 0),
            op,
            amount,
            unit
        ))
    } else {
        Some(format!(
            "({} {} ({}) * interval '1 {}')",
            arg(args, 0),
            op,
            amount,
            unit
        ))
    }
}

fn timestampdiff(unit: &str, from: &str, to: &str) -> Option<String> {
    let seconds = format!("extract(epoch from (cast({to} as timestamp) - cast({from} as timestamp)))");
    let divisor = match unit.to_lowercase().as_str() {
        "second" => 1,
        "minute" => 60,
        "hour" => 3600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => {
            return Some(format!(
                "(extract(year from age({to}, {from})) * 12 + extract(month from age({to}, {from})))"
            ))
        }
        "year" => return Some(format!("extract(year from age({to}, {from}))")),
        _ => return None,
    };
    Some(format!("trunc({seconds} / {divisor})"))
}

/// Body of a single-quoted literal, unescaped.
fn literal_body(arg: &str) -> Option<String> {
    let arg = arg.trim();
    let ranges = quoted_ranges(arg, &['\'']);
    match ranges.as_slice() {
        [r] if r.start == 0 && r.end == arg.len() && arg.len() >= 2 => {
            Some(unescape_literal(&arg[1..arg.len() - 1], '\''))
        }
        _ => None,
    }
}

/// Convert a MySQL `DATE_FORMAT` pattern to a PostgreSQL `to_char` pattern.
///
/// Literal text is wrapped in double quotes so `to_char` does not read it
/// as template patterns.
pub fn convert_date_format(fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len() * 2);
    let mut literal = String::new();
    let flush = |out: &mut String, literal: &mut String| {
        if literal.is_empty() {
            return;
        }
        if literal.chars().any(|c| c.is_alphabetic() || c == '"') {
            out.push('"');
            out.push_str(&literal.replace('"', "\\\""));
            out.push('"');
        } else {
            out.push_str(literal);
        }
        literal.clear();
    };

    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let Some(spec) = chars.next() else {
            literal.push('%');
            break;
        };
        let pattern = match spec {
            'Y' => "YYYY",
            'y' => "YY",
            'm' => "MM",
            'c' => "FMMM",
            'd' => "DD",
            'e' => "FMDD",
            'H' => "HH24",
            'k' => "FMHH24",
            'h' | 'I' => "HH12",
            'l' => "FMHH12",
            'i' => "MI",
            's' | 'S' => "SS",
            'f' => "US",
            'p' => "AM",
            'M' => "FMMonth",
            'b' => "Mon",
            'W' => "FMDay",
            'a' => "Dy",
            'j' => "DDD",
            'T' => "HH24:MI:SS",
            'r' => "HH12:MI:SS AM",
            'D' => "FMDDth",
            'u' | 'v' => "IW",
            'x' => "IYYY",
            other => {
                literal.push(other);
                continue;
            }
        };
        flush(&mut out, &mut literal);
        out.push_str(pattern);
    }
    flush(&mut out, &mut literal);
    out
}
