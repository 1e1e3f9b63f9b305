use anyhow::*;
use lazy_static::lazy_static;
use regex_lite::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

fn escape(s: &str, quote: char) -> String {
    let mut r = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\u{8}' => r.push_str("\\b"),
            '\n' => r.push_str("\\n"),
            '\t' => r.push_str("\\t"),
            '\u{c}' => r.push_str("\\f"),
            '\r' => r.push_str("\\r"),
            '\\' => r.push_str("\\\\"),
            c if c == quote => {
                r.push('\\');
                r.push(c);
            }
            c if (c as u32) < 0x20 => r.push_str(&format!("\\u{:04x}", c as u32)),
            c => r.push(c),
        }
    }
    r
}

/// Double-quote a string for the textual IR.
pub fn escape_str(s: &str) -> String {
    format!("\"{}\"", escape(s, '"'))
}

/// Render a name, back-quoting it if it is not a plain identifier.
pub fn escape_id(s: &str) -> String {
    if is_identifier(s) {
        s.to_owned()
    } else {
        format!("`{}`", escape(s, '`'))
    }
}

/// Inverse of the escaping above, on the text between the quotes.
pub fn unescape(s: &str) -> Result<String> {
    let mut r = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            r.push(c);
            continue;
        }
        match chars.next() {
            Some('b') => r.push('\u{8}'),
            Some('n') => r.push('\n'),
            Some('t') => r.push('\t'),
            Some('f') => r.push('\u{c}'),
            Some('r') => r.push('\r'),
            Some('u') => {
                let code = chars.by_ref().take(4).collect::<String>();
                let c = u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .with_context(|| anyhow!("invalid unicode escape `\\u{}`", code))?;
                r.push(c);
            }
            Some(c) => r.push(c),
            None => bail!("dangling escape at the end of `{}`", s),
        }
    }
    Ok(r)
}

/// Read back a name produced by [`escape_id`].
pub fn unescape_id(s: &str) -> Result<String> {
    if let Some(inner) = s.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        unescape(inner)
    } else {
        Ok(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() -> Result<()> {
        assert_eq!(escape_id("AggOp"), "AggOp");
        assert_eq!(escape_id("+"), "`+`");
        assert_eq!(escape_id("a`b"), "`a\\`b`");
        assert_eq!(unescape_id("`a\\`b`")?, "a`b");
        assert_eq!(unescape_id("__cse_1")?, "__cse_1");
        Ok(())
    }

    #[test]
    fn strings() -> Result<()> {
        let s = "say \"hi\"\n\tand\\go";
        let e = escape_str(s);
        assert_eq!(e, "\"say \\\"hi\\\"\\n\\tand\\\\go\"");
        assert_eq!(unescape(&e[1..e.len() - 1])?, s);
        Ok(())
    }
}
