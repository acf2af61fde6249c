//! Half-open byte-string key ranges.

use crate::core::error::{GranaryError, GranaryResult};
use serde::{Deserialize, Serialize};

/// First key of the system keyspace. User data lives strictly below it.
pub const SYSTEM_KEYSPACE_BEGIN: &[u8] = b"\xff";

/// A half-open key range `[begin, end)` with `begin < end`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    begin: Vec<u8>,
    end: Vec<u8>,
}

impl KeyRange {
    /// Create a range, rejecting empty or inverted bounds.
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> GranaryResult<Self> {
        let begin = begin.into();
        let end = end.into();
        if begin >= end {
            return Err(GranaryError::invalid_range(format!(
                "begin {} must sort before end {}",
                printable(&begin),
                printable(&end)
            )));
        }
        Ok(Self { begin, end })
    }

    /// Range of every key starting with `prefix`.
    ///
    /// Fails if the prefix has no successor (empty or all `0xff`).
    pub fn prefix_range(prefix: &[u8]) -> GranaryResult<Self> {
        let end = strinc(prefix).ok_or_else(|| {
            GranaryError::invalid_range(format!("prefix {} has no successor", printable(prefix)))
        })?;
        Self::new(prefix.to_vec(), end)
    }

    /// The whole user (non-system) keyspace.
    pub fn normal_keys() -> Self {
        Self {
            begin: Vec::new(),
            end: SYSTEM_KEYSPACE_BEGIN.to_vec(),
        }
    }

    /// Inclusive lower bound.
    pub fn begin(&self) -> &[u8] {
        &self.begin
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> &[u8] {
        &self.end
    }

    /// Decompose into `(begin, end)`.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.begin, self.end)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    /// Check if `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &KeyRange) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Check if the two ranges share at least one key.
    pub fn intersects(&self, other: &KeyRange) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    /// Intersection of the two ranges, if non-empty.
    pub fn intersection(&self, other: &KeyRange) -> Option<KeyRange> {
        let begin = std::cmp::max(&self.begin, &other.begin);
        let end = std::cmp::min(&self.end, &other.end);
        (begin < end).then(|| KeyRange {
            begin: begin.clone(),
            end: end.clone(),
        })
    }

    /// Prepend `prefix` to both bounds.
    pub fn with_prefix(&self, prefix: &[u8]) -> KeyRange {
        let mut begin = prefix.to_vec();
        begin.extend_from_slice(&self.begin);
        let mut end = prefix.to_vec();
        end.extend_from_slice(&self.end);
        KeyRange { begin, end }
    }

    /// Remove `prefix` from both bounds.
    ///
    /// The range is first clamped to `[prefix, strinc(prefix))`. An end at
    /// the tenant boundary `strinc(prefix)` maps to `\xff`, the end of the
    /// normal keyspace. Returns `None` when nothing of the range lies under
    /// the prefix.
    pub fn strip_prefix(&self, prefix: &[u8]) -> Option<KeyRange> {
        if prefix.is_empty() {
            return Some(self.clone());
        }
        let space = KeyRange::prefix_range(prefix).ok()?;
        let clamped = self.intersection(&space)?;
        let begin = clamped.begin[prefix.len()..].to_vec();
        let end = if clamped.end == space.end {
            SYSTEM_KEYSPACE_BEGIN.to_vec()
        } else {
            clamped.end[prefix.len()..].to_vec()
        };
        KeyRange::new(begin, end).ok()
    }

    /// Check if the range lies in the user keyspace.
    pub fn is_normal(&self) -> bool {
        self.end.as_slice() <= SYSTEM_KEYSPACE_BEGIN
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} - {})", printable(&self.begin), printable(&self.end))
    }
}

/// Smallest key greater than every key prefixed by `key`.
///
/// Trailing `0xff` bytes are dropped and the last remaining byte is
/// incremented. Returns `None` for keys made only of `0xff`.
pub fn strinc(key: &[u8]) -> Option<Vec<u8>> {
    let last = key.iter().rposition(|b| *b != 0xff)?;
    let mut out = key[..=last].to_vec();
    out[last] += 1;
    Some(out)
}

/// Immediate successor of `key` in byte order.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(0);
    out
}

/// Render a key with non-printable bytes escaped as `\xNN`.
pub fn printable(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if (0x20..0x7f).contains(&b) && b != b'\\' {
            out.push(b as char);
        } else if b == b'\\' {
            out.push_str("\\\\");
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

/// Parse the escaped form produced by [`printable`].
pub fn parse_printable(text: &str) -> GranaryResult<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            Some(b'x') => {
                let hex = text.get(i + 2..i + 4).ok_or_else(|| {
                    GranaryError::invalid_request(format!("truncated escape in {:?}", text))
                })?;
                let value = u8::from_str_radix(hex, 16).map_err(|_| {
                    GranaryError::invalid_request(format!("bad escape \\x{} in {:?}", hex, text))
                })?;
                out.push(value);
                i += 4;
            }
            _ => {
                return Err(GranaryError::invalid_request(format!(
                    "dangling backslash in {:?}",
                    text
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strinc_drops_trailing_ff() {
        assert_eq!(strinc(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(strinc(b"a\xff\xff"), Some(b"b".to_vec()));
        assert_eq!(strinc(b"\xff"), None);
        assert_eq!(strinc(b""), None);
    }

    #[test]
    fn printable_escapes() {
        let key = b"R_\x00\xff\\z".to_vec();
        let text = printable(&key);
        assert_eq!(text, "R_\\x00\\xff\\\\z");
        assert_eq!(parse_printable(&text).unwrap(), key);
    }

    #[test]
    fn strip_prefix_clamps_to_tenant_space() {
        let prefix = b"\x00\x00\x00\x01";
        let inner = KeyRange::new(b"a".to_vec(), b"b".to_vec()).unwrap();
        let absolute = inner.with_prefix(prefix);
        assert_eq!(absolute.strip_prefix(prefix), Some(inner));

        let wide = KeyRange::new(b"\x00\x00\x00\x01m".to_vec(), b"\x00\x00\x00\x05".to_vec())
            .unwrap();
        let stripped = wide.strip_prefix(prefix).unwrap();
        assert_eq!(stripped.begin(), b"m");
        assert_eq!(stripped.end(), SYSTEM_KEYSPACE_BEGIN);
    }
}
