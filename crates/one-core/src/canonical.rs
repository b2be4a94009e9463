// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic, byte-exact stringification of [`Value`] trees.
//!
//! The canonical string of a value is identical across runs and platforms
//! for semantically equal inputs: record keys are emitted sorted, bags and
//! sets are sorted by each element's own canonical string, and map entries
//! by their full `[key, value]` rendering. Collection insertion order never
//! leaks into the output.

use crate::value::Value;
use one_error::{ErrorKind, OneError, Result, codes};

/// Maximum nesting depth before canonicalization fails.
///
/// The owned tree cannot form reference cycles, so the depth guard is what
/// remains of the source's circle detection; it reports the offending path
/// the same way.
pub const MAX_DEPTH: usize = 64;

/// Render a finite float exactly the way JSON serialization does.
///
/// # Errors
///
/// Fails with the canonicalization code for NaN and infinities, which have
/// no canonical rendering.
pub fn canonical_number(n: f64) -> Result<String> {
    match serde_json::Number::from_f64(n) {
        Some(num) => Ok(num.to_string()),
        None => Err(OneError::new(
            ErrorKind::Canonicalization,
            codes::O2M_CNV1,
            format!("non-finite number has no canonical form: {n}"),
        )),
    }
}

/// Produce the canonical string of a value.
///
/// # Errors
///
/// Fails with the canonicalization code when the tree nests deeper than
/// [`MAX_DEPTH`] or contains a non-finite number.
///
/// # Examples
///
/// ```
/// use one_core::{canonical_string, Value};
///
/// let a = Value::Set(vec![Value::from("b"), Value::from("a")]);
/// let b = Value::Set(vec![Value::from("a"), Value::from("b")]);
/// assert_eq!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());
/// ```
pub fn canonical_string(value: &Value) -> Result<String> {
    let mut path = Vec::new();
    stringify(value, &mut path)
}

fn stringify(value: &Value, path: &mut Vec<String>) -> Result<String> {
    if path.len() > MAX_DEPTH {
        return Err(OneError::new(
            ErrorKind::Canonicalization,
            codes::O2M_CNV1,
            format!("value nests deeper than {MAX_DEPTH} at {}", path.join(".")),
        ));
    }
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Number(n) => canonical_number(*n),
        Value::String(s) => Ok(escape_json_string(s)),
        Value::Reference(link) => Ok(escape_json_string(&link.hash.to_string())),
        Value::List(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                parts.push(stringify(item, path)?);
                path.pop();
            }
            Ok(format!("[{}]", parts.join(",")))
        }
        Value::Bag(items) | Value::Set(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                parts.push(stringify(item, path)?);
                path.pop();
            }
            // Sorting by the element's own canonical form makes the output
            // insertion-order-independent.
            parts.sort();
            Ok(format!("[{}]", parts.join(",")))
        }
        Value::Map(entries) => {
            let mut parts = Vec::with_capacity(entries.len());
            for (i, (k, v)) in entries.iter().enumerate() {
                path.push(i.to_string());
                let pair = format!("[{},{}]", stringify(k, path)?, stringify(v, path)?);
                path.pop();
                parts.push(pair);
            }
            parts.sort();
            Ok(format!("[{}]", parts.join(",")))
        }
        Value::Record(fields) => {
            let mut sorted: Vec<&(String, Value)> = fields.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let mut parts = Vec::with_capacity(sorted.len());
            for (key, v) in sorted {
                // Null-valued properties are omitted, mirroring the
                // undefined-property rule of the source model.
                if matches!(v, Value::Null) {
                    continue;
                }
                path.push(key.clone());
                parts.push(format!("{}:{}", escape_json_string(key), stringify(v, path)?));
                path.pop();
            }
            Ok(format!("{{{}}}", parts.join(",")))
        }
    }
}

fn escape_json_string(s: &str) -> String {
    // serde_json's escaping of a bare string is the canonical rendering.
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::value::RefLink;

    #[test]
    fn scalars() {
        assert_eq!(canonical_string(&Value::Null).unwrap(), "null");
        assert_eq!(canonical_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(canonical_string(&Value::Integer(-7)).unwrap(), "-7");
        assert_eq!(canonical_string(&Value::from("a\"b")).unwrap(), r#""a\"b""#);
    }

    #[test]
    fn numbers_render_like_json() {
        assert_eq!(canonical_string(&Value::Number(1.5)).unwrap(), "1.5");
        assert_eq!(canonical_string(&Value::Number(1e21)).unwrap(), "1e21");
        assert!(canonical_string(&Value::Number(f64::NAN)).is_err());
        assert!(canonical_string(&Value::Number(f64::INFINITY)).is_err());
    }

    #[test]
    fn record_keys_sorted_and_nulls_dropped() {
        let v = Value::Record(vec![
            ("b".into(), Value::Integer(2)),
            ("a".into(), Value::Integer(1)),
            ("c".into(), Value::Null),
        ]);
        assert_eq!(canonical_string(&v).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn list_order_preserved() {
        let v = Value::List(vec![Value::Integer(2), Value::Integer(1)]);
        assert_eq!(canonical_string(&v).unwrap(), "[2,1]");
    }

    #[test]
    fn set_and_bag_are_insertion_order_independent() {
        let a = Value::Set(vec![Value::Integer(2), Value::Integer(1)]);
        let b = Value::Set(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());

        let a = Value::Bag(vec![Value::from("z"), Value::from("a")]);
        let b = Value::Bag(vec![Value::from("a"), Value::from("z")]);
        assert_eq!(canonical_string(&a).unwrap(), "[\"a\",\"z\"]");
        assert_eq!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());
    }

    #[test]
    fn map_entries_sorted_by_pair_rendering() {
        let a = Value::Map(vec![
            (Value::from("b"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let b = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("b"), Value::Integer(2)),
        ]);
        assert_eq!(canonical_string(&a).unwrap(), r#"[["a",1],["b",2]]"#);
        assert_eq!(canonical_string(&a).unwrap(), canonical_string(&b).unwrap());
    }

    #[test]
    fn references_render_as_their_hex() {
        let h = Hash::digest(b"t");
        let v = Value::Reference(RefLink::obj(h));
        assert_eq!(canonical_string(&v).unwrap(), format!("\"{h}\""));
    }

    #[test]
    fn depth_guard_reports_path() {
        let mut v = Value::Integer(0);
        for _ in 0..(MAX_DEPTH + 2) {
            v = Value::List(vec![v]);
        }
        let err = canonical_string(&v).unwrap_err();
        assert_eq!(err.code(), "O2M-CNV1");
        assert!(err.to_string().contains("deeper"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn set_canonicalization_ignores_insertion_order(items in proptest::collection::vec(any::<i64>(), 0..32)) {
                let forward = Value::Set(items.iter().copied().map(Value::Integer).collect());
                let reversed = Value::Set(items.iter().rev().copied().map(Value::Integer).collect());
                prop_assert_eq!(
                    canonical_string(&forward).unwrap(),
                    canonical_string(&reversed).unwrap()
                );
            }

            #[test]
            fn record_canonicalization_ignores_key_order(entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)) {
                let forward: Vec<(String, Value)> =
                    entries.iter().map(|(k, v)| (k.clone(), Value::Integer(*v))).collect();
                let mut backward = forward.clone();
                backward.reverse();
                prop_assert_eq!(
                    canonical_string(&Value::Record(forward)).unwrap(),
                    canonical_string(&Value::Record(backward)).unwrap()
                );
            }
        }
    }
}
