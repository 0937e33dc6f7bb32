//! Credential line parser
//!
//! Dump lines look like `user@domain<sep>secret`, where `<sep>` is whichever
//! of `;`, `,`, `:` or `|` the dump author happened to use. Detection is
//! priority ordered: the first delimiter in that list that occurs *anywhere*
//! in the line wins, even if it only appears inside the secret.
//!
//! # Known data-fidelity risk
//!
//! `alice@example.com:pa;ss` splits on `;` (higher priority than `:`), giving
//! user `alice@example.com:pa` and secret `ss`. The order is kept for
//! compatibility with databases loaded by earlier runs.

use crate::error::ParseError;

/// Field delimiter, in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    Semicolon,
    Comma,
    Colon,
    Pipe,
}

impl Delimiter {
    /// All delimiters, highest priority first
    pub const PRIORITY: [Delimiter; 4] = [
        Delimiter::Semicolon,
        Delimiter::Comma,
        Delimiter::Colon,
        Delimiter::Pipe,
    ];

    /// The delimiter character
    pub const fn as_char(self) -> char {
        match self {
            Delimiter::Semicolon => ';',
            Delimiter::Comma => ',',
            Delimiter::Colon => ':',
            Delimiter::Pipe => '|',
        }
    }

    /// Highest-priority delimiter present in `line`
    pub fn detect(line: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|d| line.contains(d.as_char()))
    }
}

/// One normalized record, borrowing from its source line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential<'a> {
    pub domain: &'a str,
    pub user: &'a str,
    pub secret: &'a str,
}

/// Parse one raw line (terminator included or not) into a credential
pub fn parse_line(line: &str) -> Result<Credential<'_>, ParseError> {
    let delimiter = Delimiter::detect(line).ok_or_else(|| ParseError::NoSeparator {
        line: line.to_string(),
    })?;

    // detect() guarantees the delimiter is present
    let (identity, rest) = line
        .split_once(delimiter.as_char())
        .ok_or_else(|| ParseError::NoSeparator {
            line: line.to_string(),
        })?;

    // Only the first two '@' segments are kept; "a@b@c" gives domain "b"
    let mut parts = identity.split('@');
    let user = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    let secret = rest.strip_suffix('\n').unwrap_or(rest);
    let secret = secret.strip_suffix('\r').unwrap_or(secret);

    Ok(Credential {
        domain,
        user,
        secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_semicolon() {
        let rec = parse_line("alice@example.com;hunter2\n").unwrap();
        assert_eq!(rec.user, "alice");
        assert_eq!(rec.domain, "example.com");
        assert_eq!(rec.secret, "hunter2");
    }

    #[test]
    fn test_parse_bare_user_crlf() {
        let rec = parse_line("bob:secret\r\n").unwrap();
        assert_eq!(rec.user, "bob");
        assert_eq!(rec.domain, "");
        assert_eq!(rec.secret, "secret");
    }

    #[test]
    fn test_no_separator() {
        let err = parse_line("nodupe").unwrap_err();
        assert_eq!(
            err,
            ParseError::NoSeparator {
                line: "nodupe".into()
            }
        );
        assert!(parse_line("\n").is_err());
        assert!(parse_line("").is_err());
    }

    #[test]
    fn test_priority_order() {
        // ';' beats ':' even when it only appears in the secret
        let rec = parse_line("alice@example.com:pa;ss").unwrap();
        assert_eq!(rec.user, "alice");
        assert_eq!(rec.domain, "example.com:pa");
        assert_eq!(rec.secret, "ss");

        let rec = parse_line("u@d|p,q").unwrap();
        assert_eq!(rec.domain, "d|p");
        assert_eq!(rec.secret, "q");

        let rec = parse_line("u@d|p").unwrap();
        assert_eq!(rec.domain, "d");
        assert_eq!(rec.secret, "p");
    }

    #[test]
    fn test_detect_each_delimiter() {
        for d in Delimiter::PRIORITY {
            let line = format!("user{}pw", d.as_char());
            assert_eq!(Delimiter::detect(&line), Some(d));
            let rec = parse_line(&line).unwrap();
            assert_eq!(rec.user, "user");
            assert_eq!(rec.secret, "pw");
        }
        assert_eq!(Delimiter::detect("plain"), None);
    }

    #[test]
    fn test_splits_on_first_occurrence_only() {
        let rec = parse_line("user:pass:with:colons\n").unwrap();
        assert_eq!(rec.user, "user");
        assert_eq!(rec.secret, "pass:with:colons");
    }

    #[test]
    fn test_multiple_at_keeps_second_segment() {
        let rec = parse_line("a@b@c;pw").unwrap();
        assert_eq!(rec.user, "a");
        assert_eq!(rec.domain, "b");
    }

    #[test]
    fn test_empty_secret_accepted() {
        let rec = parse_line("user@host;\n").unwrap();
        assert_eq!(rec.secret, "");
        let rec = parse_line(";").unwrap();
        assert_eq!(rec.user, "");
        assert_eq!(rec.domain, "");
        assert_eq!(rec.secret, "");
    }

    #[test]
    fn test_strip_order_lf_then_cr() {
        // A lone CR is stripped once
        assert_eq!(parse_line("u;p\r").unwrap().secret, "p");
        // No trailing LF here, so only the CR goes
        assert_eq!(parse_line("u;p\n\r").unwrap().secret, "p\n");
        // Only one CR is removed
        assert_eq!(parse_line("u;p\r\r\n").unwrap().secret, "p\r");
    }
}
