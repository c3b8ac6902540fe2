//! String escape (§4.E): safe encoding of string payloads for embedding in
//! a double-quoted literal.
//!
//! Grounded on the teacher's own `son.rs::format_string` escape routine,
//! extended to the exact ten code-point classes §4.E names (the teacher
//! escapes *any* control character generically; ours must match a fixed,
//! invertible set so `unescape` can be exact).

/// Encode `raw` as the body of a double-quoted literal (quotes not
/// included). Only the ten handled code-point classes are replaced; every
/// other code point passes through unchanged.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\u{c}' => out.push_str("\\f"),
            '<' => out.push_str("\\x3C"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Quote `raw` as a full double-quoted string literal.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    out.push_str(&escape(raw));
    out.push('"');
    out
}

/// Invert [`escape`]: decode the ten handled escape sequences back to their
/// source code point. Any other backslash sequence (e.g. `\x41`, not one of
/// the ten) is left as-is — this function is only ever applied to text this
/// crate itself produced.
pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('"') => {
                out.push('"');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('b') => {
                out.push('\u{8}');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('f') => {
                out.push('\u{c}');
                chars.next();
            }
            Some('x') => {
                chars.next();
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push('x');
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') => {
                chars.next();
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_script_closing_tag() {
        let escaped = escape("<script></script>");
        assert!(!escaped.contains('<'));
        assert_eq!(escaped, "\\x3Cscript>\\x3C/script>");
    }

    #[test]
    fn round_trips_all_ten_classes() {
        let raw = "\"\\\n\r\u{8}\t\u{c}<\u{2028}\u{2029}plain";
        assert_eq!(unescape(&escape(raw)), raw);
    }

    #[test]
    fn quote_wraps_in_double_quotes() {
        assert_eq!(quote("hi"), "\"hi\"");
    }

    #[test]
    fn plain_text_passes_through() {
        let raw = "just a normal sentence, nothing to see here";
        assert_eq!(escape(raw), raw);
    }
}
