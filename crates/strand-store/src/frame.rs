//! The framing envelope: `<type> SP <decimal length> NUL <payload>`.

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectKind;

/// Build the framed bytes for a payload.
pub fn encode(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = strand_types::hasher::header(kind.name(), payload.len());
    out.extend_from_slice(payload);
    out
}

/// Split framed bytes into the header's type name and the payload.
///
/// The declared length must equal the number of bytes after the NUL exactly.
/// The type name is returned unchecked so the caller can report unknown types
/// separately from framing damage.
pub fn decode(raw: &[u8]) -> StoreResult<(&str, &[u8])> {
    let space = raw
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| StoreError::malformed("missing space in object header"))?;
    let nul = raw[space..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| space + p)
        .ok_or_else(|| StoreError::malformed("unterminated object header"))?;

    let type_name = std::str::from_utf8(&raw[..space])
        .map_err(|_| StoreError::malformed("object type is not ASCII"))?;

    let len_field = &raw[space + 1..nul];
    if len_field.is_empty() || !len_field.iter().all(u8::is_ascii_digit) {
        return Err(StoreError::malformed(format!(
            "object length {:?} is not a decimal number",
            String::from_utf8_lossy(len_field)
        )));
    }
    // Digits only, so this is valid UTF-8; overflow is the remaining failure.
    let declared: usize = std::str::from_utf8(len_field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::malformed("object length overflows"))?;

    let payload = &raw[nul + 1..];
    if declared != payload.len() {
        return Err(StoreError::malformed(format!(
            "bad length: header declares {declared} bytes, payload has {}",
            payload.len()
        )));
    }
    Ok((type_name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_blob() {
        assert_eq!(encode(ObjectKind::Blob, b"hello\n"), b"blob 6\0hello\n".to_vec());
    }

    #[test]
    fn decode_splits_header() {
        let (name, payload) = decode(b"commit 3\0abc").unwrap();
        assert_eq!(name, "commit");
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn decode_allows_nul_in_payload() {
        let (_, payload) = decode(b"blob 3\0a\0b").unwrap();
        assert_eq!(payload, b"a\0b");
    }

    #[test]
    fn decode_rejects_short_payload() {
        let err = decode(b"blob 10\0hello").unwrap_err();
        match err {
            StoreError::MalformedObject { reason, .. } => {
                assert!(reason.contains("10"), "{reason}");
                assert!(reason.contains('5'), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_rejects_long_payload() {
        assert!(matches!(decode(b"blob 1\0hello"), Err(StoreError::MalformedObject { .. })));
    }

    #[test]
    fn decode_rejects_missing_nul() {
        assert!(matches!(decode(b"blob 5hello"), Err(StoreError::MalformedObject { .. })));
    }

    #[test]
    fn decode_rejects_non_decimal_length() {
        assert!(matches!(decode(b"blob -1\0"), Err(StoreError::MalformedObject { .. })));
        assert!(matches!(decode(b"blob \0"), Err(StoreError::MalformedObject { .. })));
    }

    #[test]
    fn decode_returns_unknown_type_names_verbatim() {
        let (name, _) = decode(b"widget 0\0").unwrap();
        assert_eq!(name, "widget");
    }
}
