//! Canonical byte encoding for hashed and signed fields.
//!
//! Two logically identical entries must always encode to the same bytes, on
//! any platform and with any serde_json feature set. The layout is therefore
//! spelled out here instead of borrowing a library's default JSON output.
//!
//! Layout:
//!   domain tag          u64 BE length + UTF-8 bytes
//!   then per field, in the caller's fixed order, one of:
//!     0x00                      absent
//!     0x01 len:u64be bytes      string
//!     0x02 u64be                unsigned integer
//!     0x03 len:u64be bytes      canonical JSON text
//!     0x04 len:u64be bytes      RFC 3339 timestamp, microseconds, `Z`
//!
//! Canonical JSON: no whitespace, object keys sorted by byte order, strings
//! escaped as serde_json escapes them, numbers printed as serde_json prints
//! them. Nesting deeper than `MAX_JSON_DEPTH` is rejected.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;

use attest_contracts::error::{AttestError, AttestResult};

/// Maximum nesting depth of a JSON payload that can be hashed.
pub const MAX_JSON_DEPTH: usize = 64;

const TAG_NULL: u8 = 0x00;
const TAG_STR: u8 = 0x01;
const TAG_U64: u8 = 0x02;
const TAG_JSON: u8 = 0x03;
const TAG_TIMESTAMP: u8 = 0x04;

/// Truncate a timestamp to the precision the encoding commits to.
///
/// Entries store the truncated value so the hash is computed over exactly
/// what is persisted.
pub fn canonical_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Incremental builder for a canonical byte string.
#[derive(Debug)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    /// Start an encoding under `domain`, which separates hash inputs from
    /// signature inputs.
    pub fn new(domain: &str) -> Self {
        let mut enc = Self { buf: Vec::with_capacity(256) };
        enc.put_len_prefixed(domain.as_bytes());
        enc
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.push(TAG_U64);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.buf.push(TAG_STR);
        self.put_len_prefixed(value.as_bytes());
        self
    }

    pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => self.str(s),
            None => self.null(),
        }
    }

    pub fn timestamp(&mut self, ts: &DateTime<Utc>) -> &mut Self {
        let text = ts.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.buf.push(TAG_TIMESTAMP);
        self.put_len_prefixed(text.as_bytes());
        self
    }

    pub fn opt_json(&mut self, value: Option<&Value>) -> AttestResult<&mut Self> {
        match value {
            Some(v) => {
                let text = canonical_json(v)?;
                self.buf.push(TAG_JSON);
                self.put_len_prefixed(text.as_bytes());
                Ok(self)
            }
            None => Ok(self.null()),
        }
    }

    pub fn null(&mut self) -> &mut Self {
        self.buf.push(TAG_NULL);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn put_len_prefixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }
}

/// Render `value` as canonical JSON text.
pub fn canonical_json(value: &Value) -> AttestResult<String> {
    let mut out = String::new();
    write_json(&mut out, value, 0)?;
    Ok(out)
}

fn write_json(out: &mut String, value: &Value, depth: usize) -> AttestResult<()> {
    if depth > MAX_JSON_DEPTH {
        return Err(AttestError::Serialization {
            reason: format!("payload nesting exceeds {} levels", MAX_JSON_DEPTH),
        });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_json(out, item, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Map iteration order depends on serde_json features; sort here.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_json_string(out, key)?;
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_json(out, v, depth + 1)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_json_string(out: &mut String, s: &str) -> AttestResult<()> {
    let escaped = serde_json::to_string(s).map_err(|e| AttestError::Serialization {
        reason: format!("string is not representable as JSON: {}", e),
    })?;
    out.push_str(&escaped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn object_keys_are_sorted() {
        let value = json!({ "zeta": 1, "alpha": { "b": true, "a": null } });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"alpha":{"a":null,"b":true},"zeta":1}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!(["quote \" and newline \n"]);
        assert_eq!(canonical_json(&value).unwrap(), r#"["quote \" and newline \n"]"#);
    }

    #[test]
    fn absent_and_json_null_encode_differently() {
        let mut absent = CanonicalEncoder::new("t");
        absent.opt_json(None).unwrap();

        let mut null = CanonicalEncoder::new("t");
        null.opt_json(Some(&Value::Null)).unwrap();

        assert_ne!(absent.finish(), null.finish());
    }

    #[test]
    fn absent_string_differs_from_empty_string() {
        let mut absent = CanonicalEncoder::new("t");
        absent.opt_str(None);

        let mut empty = CanonicalEncoder::new("t");
        empty.opt_str(Some(""));

        assert_ne!(absent.finish(), empty.finish());
    }

    #[test]
    fn length_prefix_prevents_field_shifting() {
        let mut a = CanonicalEncoder::new("t");
        a.str("ab").str("c");

        let mut b = CanonicalEncoder::new("t");
        b.str("a").str("bc");

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn domain_separates_encodings() {
        let mut a = CanonicalEncoder::new("attest/entry/v1");
        a.str("x");
        let mut b = CanonicalEncoder::new("attest/signature/v1");
        b.str("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut value = json!(0);
        for _ in 0..(MAX_JSON_DEPTH + 2) {
            value = json!([value]);
        }
        let err = canonical_json(&value).unwrap_err();
        assert!(matches!(err, AttestError::Serialization { .. }));
    }

    #[test]
    fn timestamp_truncates_to_microseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let truncated = canonical_timestamp(ts);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_456_000);

        let mut a = CanonicalEncoder::new("t");
        a.timestamp(&ts);
        let mut b = CanonicalEncoder::new("t");
        b.timestamp(&truncated);
        assert_eq!(a.finish(), b.finish());
    }
}
