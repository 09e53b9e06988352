//! Incremental connection-string parsing.
//!
//! Connection strings look like
//! `scheme [":" ["//" host [":" port]] ["/"] [tail]]`. Each backend owns the
//! meaning of its fields, so parsing is done step by step on a shared
//! [`UriCursor`]: a backend probes for its scheme, then pulls out only what it
//! understands. A failed probe never moves the cursor, so the next backend
//! sees the string untouched.

use bitflags::bitflags;
use tracing::trace;

use crate::error::{BusError, Result};

bitflags! {
    /// Matching mode for [`UriCursor::take`].
    ///
    /// The empty set is an exact literal match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MatchFlags: u8 {
        /// Capture the longest run of characters drawn from the pattern.
        const CHARS = 0x01;
        /// Capture the longest run of characters *not* in the pattern.
        const UNMATCH_CHARS = 0x02;
        /// Report the outcome without moving the cursor.
        const PRESERVE = 0x10;
    }
}

impl MatchFlags {
    pub const EXACT: Self = Self::empty();
}

/// Read position into an immutable connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UriCursor<'a> {
    uri: &'a str,
    pos: usize,
}

/// Fields of the shared `["//" host [":" port]] ["/"] [tail]` grammar.
///
/// Empty host or port fields are reported as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Endpoint<'a> {
    pub host: Option<&'a str>,
    pub port: Option<&'a str>,
    pub tail: &'a str,
}

impl<'a> UriCursor<'a> {
    pub const fn new(uri: &'a str) -> Self {
        Self { uri, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Everything not consumed yet.
    pub fn rest(&self) -> &'a str {
        &self.uri[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.uri.len()
    }

    /// Match `pattern` at the cursor according to `flags`.
    ///
    /// In exact mode, returns the matched text or `None` with the cursor
    /// untouched. The character-class modes always succeed and may return an
    /// empty run. The cursor advances past the returned text unless
    /// [`MatchFlags::PRESERVE`] is set.
    pub fn take(&mut self, pattern: &str, flags: MatchFlags) -> Option<&'a str> {
        let rest = self.rest();
        let len = if flags.contains(MatchFlags::UNMATCH_CHARS) {
            run_len(rest, |c| !pattern.contains(c))
        } else if flags.contains(MatchFlags::CHARS) {
            run_len(rest, |c| pattern.contains(c))
        } else if rest.starts_with(pattern) {
            pattern.len()
        } else {
            return None;
        };

        let matched = &rest[..len];
        if !flags.contains(MatchFlags::PRESERVE) {
            self.pos += len;
        }
        Some(matched)
    }

    /// Like [`take`](Self::take), copying the match into a bounded buffer.
    ///
    /// Text beyond the buffer capacity is dropped silently; the cursor still
    /// moves past the whole match and the full match length is returned.
    pub fn capture<const N: usize>(
        &mut self,
        out: &mut heapless::String<N>,
        pattern: &str,
        flags: MatchFlags,
    ) -> Option<usize> {
        let matched = self.take(pattern, flags)?;
        out.clear();
        for c in matched.chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        Some(matched.len())
    }

    /// Consume `literal` if it is next.
    pub fn exact(&mut self, literal: &str) -> bool {
        self.take(literal, MatchFlags::EXACT).is_some()
    }

    /// Consume a field ending at any of `delimiters` or at end of string.
    pub fn until(&mut self, delimiters: &str) -> &'a str {
        self.take(delimiters, MatchFlags::UNMATCH_CHARS).unwrap_or_default()
    }

    /// Consume a numeric field ending at any of `delimiters`.
    ///
    /// An empty field is `Ok(None)`. A malformed one is
    /// [`BusError::InvalidUri`] and leaves the cursor where it was.
    pub fn integer(&mut self, base: u32, delimiters: &str) -> Result<Option<i64>> {
        check_base(base)?;
        let start = self.pos;
        let field = self.until(delimiters);
        if field.is_empty() {
            return Ok(None);
        }
        match parse_integer(field, base) {
            Ok(n) => Ok(Some(n)),
            Err(err) => {
                self.pos = start;
                Err(err)
            }
        }
    }

    /// Consume `name` as the scheme, with its `:` terminator if present.
    ///
    /// The scheme must be followed by `:` or the end of the string, so a
    /// backend named `foo` does not claim `foobar:`.
    pub fn scheme(&mut self, name: &str) -> bool {
        let start = self.pos;
        if !self.exact(name) {
            return false;
        }
        if self.is_empty() || self.exact(":") {
            trace!(scheme = name, "scheme matched");
            return true;
        }
        self.pos = start;
        false
    }

    /// Parse `["//" host [":" port]] ["/"] [tail]` up to the end.
    pub fn endpoint(&mut self) -> Endpoint<'a> {
        let mut endpoint = Endpoint::default();
        if self.exact("//") {
            endpoint.host = non_empty(self.until(":/"));
            if self.exact(":") {
                endpoint.port = non_empty(self.until("/"));
            }
        }
        self.exact("/");
        endpoint.tail = self.rest();
        self.pos = self.uri.len();
        endpoint
    }
}

fn run_len(s: &str, mut accept: impl FnMut(char) -> bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| !accept(c))
        .map_or(s.len(), |(i, _)| i)
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn check_base(base: u32) -> Result<()> {
    if (2..=36).contains(&base) {
        Ok(())
    } else {
        Err(BusError::InvalidArgument)
    }
}

/// Parse a whole field as an integer in `base`.
///
/// Accepts an optional sign and, for base 16, an optional `0x` prefix. Any
/// character left over after the digits makes the field malformed. A base
/// outside 2..=36 is [`BusError::InvalidArgument`].
pub fn parse_integer(field: &str, base: u32) -> Result<i64> {
    check_base(base)?;
    let (negative, digits) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };
    let digits = match base {
        16 => digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits),
        _ => digits,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(base)) {
        return Err(BusError::InvalidUri);
    }
    let magnitude =
        i64::from_str_radix(digits, base).map_err(|_| BusError::InvalidUri)?;
    Ok(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_exact_probes_leave_cursor_in_place() {
        let mut cursor = UriCursor::new("libmpsse://0403:6014");
        for candidate in ["pigpiod", "sim", "libmpssex", "libmpsse:/x"] {
            let before = cursor.position();
            assert_eq!(cursor.take(candidate, MatchFlags::EXACT), None);
            assert_eq!(cursor.position(), before);
        }
        assert_eq!(cursor.take("libmpsse", MatchFlags::EXACT), Some("libmpsse"));
        assert_eq!(cursor.rest(), "://0403:6014");
    }

    #[test]
    fn preserve_never_moves() {
        let mut cursor = UriCursor::new("abc:def");
        let peek = MatchFlags::EXACT | MatchFlags::PRESERVE;
        assert_eq!(cursor.take("abc", peek), Some("abc"));
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.take("xyz", peek), None);
        assert_eq!(cursor.position(), 0);
        let run = MatchFlags::UNMATCH_CHARS | MatchFlags::PRESERVE;
        assert_eq!(cursor.take(":", run), Some("abc"));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn character_classes() {
        let mut cursor = UriCursor::new("0403:6014/x");
        assert_eq!(cursor.take("0123456789", MatchFlags::CHARS), Some("0403"));
        assert_eq!(cursor.take("0123456789", MatchFlags::CHARS), Some(""));
        assert!(cursor.exact(":"));
        assert_eq!(cursor.take("/", MatchFlags::UNMATCH_CHARS), Some("6014"));
        assert_eq!(cursor.rest(), "/x");
    }

    #[test]
    fn capture_truncates_but_consumes_whole_run() {
        let mut cursor = UriCursor::new("123456:rest");
        let mut buf = heapless::String::<4>::new();
        let n = cursor.capture(&mut buf, ":", MatchFlags::UNMATCH_CHARS);
        assert_eq!(n, Some(6));
        assert_eq!(buf.as_str(), "1234");
        assert_eq!(cursor.rest(), ":rest");

        assert_eq!(cursor.capture(&mut buf, "/", MatchFlags::EXACT), None);
        assert_eq!(cursor.rest(), ":rest");
    }

    #[test]
    fn scheme_requires_terminator() {
        let mut cursor = UriCursor::new("pigpiodx:1");
        assert!(!cursor.scheme("pigpiod"));
        assert_eq!(cursor.position(), 0);

        let mut cursor = UriCursor::new("pigpiod");
        assert!(cursor.scheme("pigpiod"));
        assert!(cursor.is_empty());

        let mut cursor = UriCursor::new("pigpiod:7");
        assert!(cursor.scheme("pigpiod"));
        assert_eq!(cursor.rest(), "7");
    }

    #[test]
    fn endpoint_with_authority() {
        let mut cursor = UriCursor::new("backendA://host:1234/3");
        assert!(cursor.scheme("backendA"));
        let ep = cursor.endpoint();
        assert_eq!(ep.host, Some("host"));
        assert_eq!(ep.port, Some("1234"));
        assert_eq!(ep.tail, "3");
        assert!(cursor.is_empty());
    }

    #[test]
    fn endpoint_without_authority() {
        let mut cursor = UriCursor::new("backendA:5");
        assert!(cursor.scheme("backendA"));
        assert_eq!(
            cursor.endpoint(),
            Endpoint { host: None, port: None, tail: "5" }
        );

        let mut cursor = UriCursor::new("x://:8888");
        assert!(cursor.scheme("x"));
        assert_eq!(
            cursor.endpoint(),
            Endpoint { host: None, port: Some("8888"), tail: "" }
        );
    }

    #[test]
    fn integers() {
        assert_eq!(parse_integer("1234", 10), Ok(1234));
        assert_eq!(parse_integer("-7", 10), Ok(-7));
        assert_eq!(parse_integer("0x48", 16), Ok(0x48));
        assert_eq!(parse_integer("6014", 16), Ok(0x6014));
        assert_eq!(parse_integer("abc", 10), Err(BusError::InvalidUri));
        assert_eq!(parse_integer("12z", 10), Err(BusError::InvalidUri));
        assert_eq!(parse_integer("", 10), Err(BusError::InvalidUri));
        assert_eq!(parse_integer("-", 10), Err(BusError::InvalidUri));
    }

    #[test]
    fn integer_field_rolls_back_on_error() {
        let mut cursor = UriCursor::new("12,zz,");
        assert_eq!(cursor.integer(16, ","), Ok(Some(0x12)));
        assert!(cursor.exact(","));
        let before = cursor.position();
        assert_eq!(cursor.integer(16, ","), Err(BusError::InvalidUri));
        assert_eq!(cursor.position(), before);
        cursor.until(",");
        assert!(cursor.exact(","));
        assert_eq!(cursor.integer(16, ","), Ok(None));
    }

    #[test]
    fn unsupported_bases_are_rejected() {
        assert_eq!(parse_integer("12", 37), Err(BusError::InvalidArgument));
        assert_eq!(parse_integer("1", 1), Err(BusError::InvalidArgument));
        assert_eq!(parse_integer("1", 0), Err(BusError::InvalidArgument));
        assert_eq!(parse_integer("z", 36), Ok(35));
        assert_eq!(parse_integer("101", 2), Ok(5));

        let mut cursor = UriCursor::new("a1,");
        assert_eq!(cursor.integer(40, ","), Err(BusError::InvalidArgument));
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.integer(16, ","), Ok(Some(0xa1)));
    }
}
