//! Escaping rules for IRCv3 message tag values.

use std::borrow::Cow;

/// Escapes a tag value for the wire. The reverse of [`unescape`].
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => escaped.push_str("\\:"),
            ' ' => escaped.push_str("\\s"),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Unescapes a tag value coming off the wire in a single pass.
///
/// Returns a borrowed value when no escape sequence occurs, which is the
/// common case for twitch tags. A backslash before an unknown character
/// keeps the character, a trailing lone backslash is dropped.
pub fn unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('\\') {
        return Cow::Borrowed(value);
    }
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(other) => other,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    Cow::Owned(unescaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_all_specials() {
        assert_eq!(escape("a;b c\\d\re\nf"), "a\\:b\\sc\\\\d\\re\\nf");
    }

    #[test]
    fn test_unescape_all_specials() {
        assert_eq!(unescape("a\\:b\\sc\\\\d\\re\\nf"), "a;b c\\d\re\nf");
    }

    #[test]
    fn test_unescape_borrows_clean_values() {
        match unescape("no_specials_here") {
            Cow::Borrowed(s) => assert_eq!(s, "no_specials_here"),
            Cow::Owned(_) => panic!("clean value should not allocate"),
        }
    }

    #[test]
    fn test_unescape_unknown_escape_keeps_char() {
        assert_eq!(unescape("a\\xb"), "axb");
    }

    #[test]
    fn test_unescape_drops_trailing_backslash() {
        assert_eq!(unescape("oops\\"), "oops");
    }

    #[test]
    fn test_roundtrip() {
        for original in &["simple", "with space", "semi;colon", "back\\slash", "\r\n"] {
            assert_eq!(unescape(&escape(original)), *original);
        }
    }
}
