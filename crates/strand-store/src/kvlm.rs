//! Key-value list with message: the shared payload layout of commits and tags.
//!
//! ```text
//! key SP value LF
//! key SP first line LF SP continuation LF
//! LF
//! message...
//! ```
//!
//! Continuation lines start with a single space, which is stripped on read
//! and re-inserted after every newline on write, so values round-trip
//! byte-for-byte.

use crate::error::{StoreError, StoreResult};

/// Ordered header fields followed by a free-text message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Kvlm {
    /// Header fields in their on-disk order. Keys may repeat.
    pub fields: Vec<(String, String)>,
    /// Everything after the blank line.
    pub message: String,
}

impl Kvlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header field.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a payload.
    pub fn parse(raw: &[u8]) -> StoreResult<Self> {
        let mut kvlm = Self::new();
        let mut pos = 0;

        loop {
            if pos >= raw.len() {
                return Err(StoreError::malformed(
                    "header block is not terminated by a blank line",
                ));
            }
            if raw[pos] == b'\n' {
                kvlm.message = utf8(&raw[pos + 1..], "message")?;
                return Ok(kvlm);
            }

            let line_end = find(raw, pos, b'\n').unwrap_or(raw.len());
            let space = find(raw, pos, b' ')
                .filter(|&s| s < line_end)
                .ok_or_else(|| StoreError::malformed("header line without a value"))?;
            if space == pos {
                return Err(StoreError::malformed("continuation line without a header"));
            }
            let key = utf8(&raw[pos..space], "header key")?;

            // The value runs until a newline that is not followed by a space.
            let mut end = line_end;
            while end + 1 < raw.len() && raw[end + 1] == b' ' {
                end = find(raw, end + 1, b'\n').unwrap_or(raw.len());
            }
            if end >= raw.len() {
                return Err(StoreError::malformed(format!(
                    "header {key:?} runs to the end of the object"
                )));
            }

            let value = utf8(&raw[space + 1..end], "header value")?.replace("\n ", "\n");
            kvlm.fields.push((key, value));
            pos = end + 1;
        }
    }

    /// Encode to payload bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.fields {
            out.extend_from_slice(key.as_bytes());
            out.push(b' ');
            out.extend_from_slice(value.replace('\n', "\n ").as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(self.message.as_bytes());
        out
    }
}

fn find(raw: &[u8], from: usize, needle: u8) -> Option<usize> {
    raw[from..]
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn utf8(bytes: &[u8], what: &str) -> StoreResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| StoreError::malformed(format!("{what} is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SIGNED: &[u8] = b"tree 29ff16c9c14e2652b22f8b78bb08a5a07930c147\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n \n iQIzBAABCAAdFiEExwXquOM8bWb4Q2zVGxM2FxoLkGQFAlsEjZQACgkQGxM2FxoL\n -----END PGP SIGNATURE-----\n\
\n\
Create first draft\n";

    #[test]
    fn parses_continuation_lines() {
        let kvlm = Kvlm::parse(SIGNED).unwrap();
        assert_eq!(kvlm.fields.len(), 2);
        let sig = kvlm.get("gpgsig").unwrap();
        assert!(sig.starts_with("-----BEGIN PGP SIGNATURE-----\n\niQIz"));
        assert!(sig.ends_with("\n-----END PGP SIGNATURE-----"));
        assert_eq!(kvlm.message, "Create first draft\n");
    }

    #[test]
    fn continuation_roundtrip_is_byte_identical() {
        let kvlm = Kvlm::parse(SIGNED).unwrap();
        assert_eq!(kvlm.serialize(), SIGNED.to_vec());
    }

    #[test]
    fn duplicate_keys_keep_order() {
        let raw = b"parent a\nparent b\nparent c\n\nmsg";
        let kvlm = Kvlm::parse(raw).unwrap();
        assert_eq!(kvlm.get_all("parent").collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(kvlm.get("parent"), Some("a"));
    }

    #[test]
    fn empty_message_is_allowed() {
        let kvlm = Kvlm::parse(b"k v\n\n").unwrap();
        assert_eq!(kvlm.message, "");
    }

    #[test]
    fn message_may_contain_blank_lines() {
        let raw = b"k v\n\nsubject\n\nbody\n";
        let kvlm = Kvlm::parse(raw).unwrap();
        assert_eq!(kvlm.message, "subject\n\nbody\n");
        assert_eq!(kvlm.serialize(), raw.to_vec());
    }

    #[test]
    fn missing_blank_line_is_malformed() {
        assert!(matches!(Kvlm::parse(b"k v\n"), Err(StoreError::MalformedObject { .. })));
        assert!(matches!(Kvlm::parse(b"k v"), Err(StoreError::MalformedObject { .. })));
    }

    #[test]
    fn leading_continuation_is_malformed() {
        assert!(Kvlm::parse(b" orphan\n\n").is_err());
    }

    #[test]
    fn key_without_value_is_malformed() {
        assert!(Kvlm::parse(b"novalue\n\n").is_err());
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        assert!(Kvlm::parse(b"k \xff\n\n").is_err());
    }

    proptest! {
        #[test]
        fn multiline_values_roundtrip(
            lines in proptest::collection::vec("[a-zA-Z0-9 <>@.+-]{0,12}", 1..5),
            message in "[a-z \n]{0,40}",
        ) {
            let mut kvlm = Kvlm::new();
            kvlm.push("tree", "x");
            kvlm.push("note", lines.join("\n"));
            kvlm.message = message;
            let bytes = kvlm.serialize();
            let parsed = Kvlm::parse(&bytes).unwrap();
            prop_assert_eq!(&parsed, &kvlm);
            prop_assert_eq!(parsed.serialize(), bytes);
        }
    }
}
