//! Canonical, deterministic JSON encoding.
//!
//! Rust's `HashMap` has no stable iteration order, so serializing a struct
//! that embeds one directly (as `serde_json::to_vec` does) can produce a
//! different byte string on every run even for identical data. Block and
//! transaction ids must be reproducible across independently built nodes, so
//! every hashed or wire-transmitted value here is first converted to a
//! `serde_json::Value` — whose object type is a `BTreeMap` unless the
//! `preserve_order` feature is enabled, which this workspace does not use —
//! and only then serialized to bytes. That indirection is what makes the
//! encoding canonical.

use serde::Serialize;
use serde_json::Value;
use shared::Result;

/// Encodes `value` as canonical JSON bytes: any map-typed field comes out
/// with its keys in sorted order, giving a stable encoding independent of
/// `HashMap` iteration order.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&as_value)?)
}

/// Like [`canonical_bytes`], but first removes the named top-level fields.
/// Used to hash a block's identity without its derived `balances` and
/// `next_nonce` tables, which are recomputable state rather than identity.
pub fn canonical_bytes_excluding<T: Serialize>(value: &T, exclude: &[&str]) -> Result<Vec<u8>> {
    let mut as_value = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut as_value {
        for field in exclude {
            map.remove(*field);
        }
    }
    Ok(serde_json::to_vec(&as_value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Sample {
        balances: HashMap<String, u32>,
        name: String,
    }

    #[test]
    fn encoding_is_stable_regardless_of_insertion_order() {
        let mut a = HashMap::new();
        a.insert("zeta".to_string(), 1u32);
        a.insert("alpha".to_string(), 2u32);
        let sample_a = Sample {
            balances: a,
            name: "x".to_string(),
        };

        let mut b = HashMap::new();
        b.insert("alpha".to_string(), 2u32);
        b.insert("zeta".to_string(), 1u32);
        let sample_b = Sample {
            balances: b,
            name: "x".to_string(),
        };

        assert_eq!(
            canonical_bytes(&sample_a).unwrap(),
            canonical_bytes(&sample_b).unwrap()
        );
    }

    #[test]
    fn excluding_removes_the_named_field() {
        let mut balances = HashMap::new();
        balances.insert("alice".to_string(), 10u32);
        let sample = Sample {
            balances,
            name: "x".to_string(),
        };

        let bytes = canonical_bytes_excluding(&sample, &["balances"]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("alice"));
        assert!(text.contains("\"name\""));
    }
}
