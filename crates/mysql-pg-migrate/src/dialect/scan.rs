//! Quote- and parenthesis-aware text scanning shared by the translators.
//!
//! MySQL artifacts come back from the server as text. Everything here walks
//! that text once, skipping quoted runs (`'...'`, `"..."`, `` `...` ``) so
//! that commas, parentheses and keywords inside literals never count.

use std::ops::Range;

/// Byte ranges of quoted runs (including the quotes) for the given quote chars.
///
/// A quote char doubled inside a run is an escaped quote. Inside single
/// quotes a backslash escapes the next character.
pub fn quoted_ranges(s: &str, quotes: &[char]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if !quotes.contains(&c) {
            continue;
        }
        let mut end = s.len();
        while let Some((i, d)) = chars.next() {
            if c == '\'' && d == '\\' {
                chars.next();
                continue;
            }
            if d == c {
                if matches!(chars.peek(), Some((_, n)) if *n == c) {
                    chars.next();
                    continue;
                }
                end = i + d.len_utf8();
                break;
            }
        }
        ranges.push(start..end);
    }
    ranges
}

const ALL_QUOTES: [char; 3] = ['\'', '"', '`'];

fn in_ranges(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Copy of `s` with the contents of every quoted run replaced by spaces.
///
/// Byte offsets are preserved, so positions found in the blanked text are
/// valid in the original.
pub fn blank_quoted(s: &str) -> String {
    let ranges = quoted_ranges(s, &ALL_QUOTES);
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        let inside = ranges
            .iter()
            .any(|r| i > r.start && i + c.len_utf8() < r.end);
        if inside {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    out
}

/// Index of the `)` matching the `(` at byte `open`, skipping quoted runs.
pub fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let ranges = quoted_ranges(s, &ALL_QUOTES);
    let mut depth = 0usize;
    for (i, c) in s[open..].char_indices() {
        let pos = open + i;
        if in_ranges(&ranges, pos) {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// First `(` outside quoted runs.
pub fn first_open_paren(s: &str) -> Option<usize> {
    let ranges = quoted_ranges(s, &ALL_QUOTES);
    s.char_indices()
        .find(|(i, c)| *c == '(' && !in_ranges(&ranges, *i))
        .map(|(i, _)| i)
}

/// Split on `sep` at parenthesis depth zero, outside quoted runs.
///
/// Pieces are returned untrimmed.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let ranges = quoted_ranges(s, &ALL_QUOTES);
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if in_ranges(&ranges, i) {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte position of keyword `kw` (case-insensitive, whole word) at depth
/// zero and outside quoted runs.
pub fn find_top_level_keyword(s: &str, kw: &str) -> Option<usize> {
    let ranges = quoted_ranges(s, &ALL_QUOTES);
    let lower = s.to_ascii_lowercase();
    let kw = kw.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut depth = 0i32;
    for (i, c) in lower.char_indices() {
        if in_ranges(&ranges, i) {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth != 0 || !lower[i..].starts_with(&kw) {
            continue;
        }
        let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
        let end = i + kw.len();
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return Some(i);
        }
    }
    None
}

/// Apply `f` to every stretch of `s` outside the given quote kinds, copying
/// quoted runs through untouched.
pub fn map_unquoted<F>(s: &str, quotes: &[char], mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let ranges = quoted_ranges(s, quotes);
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    for r in ranges {
        out.push_str(&f(&s[pos..r.start]));
        out.push_str(&s[r.clone()]);
        pos = r.end;
    }
    out.push_str(&f(&s[pos..]));
    out
}

/// Rewrite every call `name(args)` (case-insensitive, whole word) outside
/// quoted literals.
///
/// Calls nested in the arguments are rewritten first. `f` receives the
/// untrimmed top-level arguments and returns the replacement, or `None` to
/// keep the call as it is.
pub fn rewrite_calls<F>(s: &str, name: &str, f: &F) -> String
where
    F: Fn(&[&str]) -> Option<String>,
{
    let ranges = quoted_ranges(s, &['\'']);
    let lower = s.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    let mut search = 0;

    while let Some(found) = lower[search..].find(&name) {
        let start = search + found;
        search = start + name.len();
        if in_ranges(&ranges, start) {
            continue;
        }
        if start > 0 && (is_word_byte(bytes[start - 1]) || bytes[start - 1] == b'.') {
            continue;
        }
        let mut open = start + name.len();
        while open < bytes.len() && bytes[open].is_ascii_whitespace() {
            open += 1;
        }
        if open >= bytes.len() || bytes[open] != b'(' {
            continue;
        }
        let Some(close) = matching_paren(s, open) else {
            break;
        };

        let inner = rewrite_calls(&s[open + 1..close], &name, f);
        let args: Vec<&str> = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top_level(&inner, ',')
        };

        out.push_str(&s[pos..start]);
        match f(&args) {
            Some(replacement) => out.push_str(&replacement),
            None => {
                out.push_str(&s[start..open + 1]);
                out.push_str(&inner);
                out.push(')');
            }
        }
        pos = close + 1;
        search = pos;
    }

    out.push_str(&s[pos..]);
    out
}

/// Collapse runs of whitespace to one space and trim.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace runs outside quoted runs and trim the result.
pub fn squash_unquoted(s: &str) -> String {
    let collapsed = map_unquoted(s, &['\'', '"'], |seg| {
        let mut out = String::with_capacity(seg.len());
        let mut in_space = false;
        for c in seg.chars() {
            if c.is_whitespace() {
                if !in_space {
                    out.push(' ');
                }
                in_space = true;
            } else {
                out.push(c);
                in_space = false;
            }
        }
        out
    });
    collapsed.trim().to_string()
}

/// Undo MySQL string-literal escaping for the body of a quoted literal.
pub fn unescape_literal(body: &str, quote: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_ranges_handles_doubling_and_backslash() {
        let s = "a 'it''s' b 'x\\'y' c";
        let ranges = quoted_ranges(s, &['\'']);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&s[ranges[0].clone()], "'it''s'");
        assert_eq!(&s[ranges[1].clone()], "'x\\'y'");
    }

    #[test]
    fn test_matching_paren_skips_literals() {
        let s = "f(a, ')', (b))";
        assert_eq!(matching_paren(s, 1), Some(s.len() - 1));
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level("a, f(b, c), 'd,e'", ',');
        assert_eq!(parts, vec!["a", " f(b, c)", " 'd,e'"]);
    }

    #[test]
    fn test_blank_quoted_preserves_length() {
        let s = "x COMMENT '所属' y";
        let blanked = blank_quoted(s);
        assert_eq!(blanked.len(), s.len());
        assert!(blanked.starts_with("x COMMENT '"));
        assert!(!blanked.contains('所'));
    }

    #[test]
    fn test_find_top_level_keyword() {
        let s = "a order by (separator) separator ';'";
        assert_eq!(find_top_level_keyword(s, "separator"), Some(23));
        assert_eq!(find_top_level_keyword("'separator'", "separator"), None);
    }

    #[test]
    fn test_rewrite_calls_nested() {
        let out = rewrite_calls("IFNULL(ifnull(a, 1), 'ifnull(x)')", "ifnull", &|args| {
            Some(format!("coalesce({})", args.join(",")))
        });
        assert_eq!(out, "coalesce(coalesce(a, 1), 'ifnull(x)')");
    }

    #[test]
    fn test_rewrite_calls_respects_word_boundary() {
        let out = rewrite_calls("myif(a) if (b,c,d)", "if", &|args| {
            Some(format!("<{}>", args.len()))
        });
        assert_eq!(out, "myif(a) <3>");
    }

    #[test]
    fn test_map_unquoted() {
        let out = map_unquoted("a 'b' c", &['\''], |seg| seg.to_uppercase());
        assert_eq!(out, "A 'b' C");
    }

    #[test]
    fn test_squash_unquoted() {
        assert_eq!(squash_unquoted("  a   b 'x   y'  c "), "a b 'x   y' c");
    }

    #[test]
    fn test_unescape_literal() {
        assert_eq!(unescape_literal("it''s", '\''), "it's");
        assert_eq!(unescape_literal("a\\'b", '\''), "a'b");
        assert_eq!(unescape_literal("say \"\"hi\"\"", '"'), "say \"hi\"");
    }
}
