//! Cache key construction.
//!
//! Every cache key in the process is produced by [`build_key`]. Keys have the
//! shape `{namespace}:{entity}:{selector_1}:...:{selector_n}:{version}` and are
//! reproduced bit-exact by external tooling, so the format here is a contract.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// String selectors longer than this are replaced by a digest.
pub const MAX_SELECTOR_LEN: usize = 64;

const DIGEST_PREFIX: char = '#';
const DIGEST_HEX_LEN: usize = 16;

/// A single selector component of a cache key.
///
/// Only primitives are representable; position in the selector list is
/// significant and fixed per call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorPart {
    Str(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
    /// Truncated SHA-256 of free text, rendered as `#<hex>`.
    Digest(String),
}

impl SelectorPart {
    /// Hash free text (search strings, query strings) into a bounded selector.
    pub fn hashed(text: &str) -> Self {
        Self::Digest(digest_hex(text))
    }

    /// Render this selector as a single key segment.
    pub fn segment(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            SelectorPart::Str(value) if value.len() > MAX_SELECTOR_LEN => {
                out.push(DIGEST_PREFIX);
                out.push_str(&digest_hex(value));
            }
            SelectorPart::Str(value) => escape_into(value, out),
            SelectorPart::Int(value) => out.push_str(&value.to_string()),
            SelectorPart::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            SelectorPart::Uuid(value) => out.push_str(&value.to_string()),
            SelectorPart::Digest(hex) => {
                out.push(DIGEST_PREFIX);
                out.push_str(hex);
            }
        }
    }
}

impl From<&str> for SelectorPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SelectorPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for SelectorPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SelectorPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for SelectorPart {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Raised when a dynamic value cannot be used as a selector.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("selector must be a string, integer or boolean, got {kind}")]
pub struct InvalidSelectorError {
    pub kind: &'static str,
}

impl TryFrom<&Value> for SelectorPart {
    type Error = InvalidSelectorError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Self::Str(text.clone())),
            Value::Bool(flag) => Ok(Self::Bool(*flag)),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .ok_or(InvalidSelectorError { kind: "float" }),
            Value::Null => Err(InvalidSelectorError { kind: "null" }),
            Value::Array(_) => Err(InvalidSelectorError { kind: "array" }),
            Value::Object(_) => Err(InvalidSelectorError { kind: "object" }),
        }
    }
}

/// Convert a list of dynamic values into selectors, failing on the first
/// non-primitive. Used for selectors supplied at runtime, such as the
/// `purge --extra-owner` values.
pub fn selectors_from_values(values: &[Value]) -> Result<Vec<SelectorPart>, InvalidSelectorError> {
    values.iter().map(SelectorPart::try_from).collect()
}

/// A fully rendered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build a deterministic cache key.
///
/// `namespace`, `entity` and `version` are escaped like string selectors, so a
/// caller cannot smuggle separators or glob characters into a key.
pub fn build_key(
    namespace: &str,
    entity: &str,
    selector_parts: &[SelectorPart],
    version: &str,
) -> CacheKey {
    let mut out = String::with_capacity(namespace.len() + entity.len() + version.len() + 16);
    escape_into(namespace, &mut out);
    out.push(KEY_SEPARATOR);
    escape_into(entity, &mut out);
    for part in selector_parts {
        out.push(KEY_SEPARATOR);
        part.render(&mut out);
    }
    out.push(KEY_SEPARATOR);
    escape_into(version, &mut out);
    CacheKey(out)
}

/// Escape one key segment.
///
/// `%` and the characters that are either the separator or meaningful to
/// Redis glob matching are percent-encoded; everything else is kept verbatim
/// for readability in monitoring tools.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    escape_into(segment, &mut out);
    out
}

fn escape_into(segment: &str, out: &mut String) {
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '*' => out.push_str("%2A"),
            '?' => out.push_str("%3F"),
            '[' => out.push_str("%5B"),
            ']' => out.push_str("%5D"),
            '\\' => out.push_str("%5C"),
            '#' => out.push_str("%23"),
            other => out.push(other),
        }
    }
}

fn digest_hex(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    let mut encoded = hex::encode(hash);
    encoded.truncate(DIGEST_HEX_LEN);
    encoded
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_colon_delimited_with_version_last() {
        let key = build_key(
            "dish",
            "list",
            &[SelectorPart::Int(7), SelectorPart::Bool(true)],
            "v1",
        );
        assert_eq!(key.as_str(), "dish:list:7:true:v1");
    }

    #[test]
    fn detail_key_without_selectors() {
        let key = build_key("dish", "42", &[], "v1");
        assert_eq!(key.as_str(), "dish:42:v1");
    }

    #[test]
    fn selector_order_is_significant() {
        let a = build_key("dish", "list", &[1_i64.into(), 2_i64.into()], "v1");
        let b = build_key("dish", "list", &[2_i64.into(), 1_i64.into()], "v1");
        assert_ne!(a, b);
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let key = build_key("route", "dishes.index", &["a:b*c".into()], "v1");
        assert_eq!(key.as_str(), "route:dishes.index:a%3Ab%2Ac:v1");
    }

    #[test]
    fn long_selectors_are_hashed() {
        let long = "x".repeat(MAX_SELECTOR_LEN + 1);
        let key = build_key("dish", "search", &[long.clone().into()], "v1");
        let selector = key.as_str().split(':').nth(2).expect("selector segment");
        assert!(selector.starts_with('#'));
        assert_eq!(selector.len(), DIGEST_HEX_LEN + 1);
        assert_eq!(
            key,
            build_key("dish", "search", &[SelectorPart::hashed(&long)], "v1")
        );
    }

    #[test]
    fn hashed_selector_never_collides_with_literal_hash_text() {
        let hashed = SelectorPart::hashed("page=2");
        let SelectorPart::Digest(hex) = &hashed else {
            panic!("hashed selector should be a digest");
        };
        let literal = SelectorPart::Str(format!("#{hex}"));
        assert_ne!(
            build_key("route", "h", &[hashed], "v1"),
            build_key("route", "h", &[literal], "v1")
        );
    }

    #[test]
    fn non_primitive_values_are_rejected() {
        assert_eq!(
            SelectorPart::try_from(&json!({"id": 1})),
            Err(InvalidSelectorError { kind: "object" })
        );
        assert_eq!(
            SelectorPart::try_from(&json!([1, 2])),
            Err(InvalidSelectorError { kind: "array" })
        );
        assert_eq!(
            SelectorPart::try_from(&Value::Null),
            Err(InvalidSelectorError { kind: "null" })
        );
        assert_eq!(
            SelectorPart::try_from(&json!(1.5)),
            Err(InvalidSelectorError { kind: "float" })
        );
    }

    #[test]
    fn primitive_values_convert() {
        let parts = selectors_from_values(&[json!("a"), json!(3), json!(false)])
            .expect("primitives should convert");
        assert_eq!(
            parts,
            vec![
                SelectorPart::Str("a".into()),
                SelectorPart::Int(3),
                SelectorPart::Bool(false)
            ]
        );
    }

    proptest! {
        #[test]
        fn build_key_is_deterministic(parts in proptest::collection::vec(".*", 0..6)) {
            let parts: Vec<SelectorPart> = parts.into_iter().map(SelectorPart::from).collect();
            prop_assert_eq!(
                build_key("ns", "entity", &parts, "v1"),
                build_key("ns", "entity", &parts, "v1")
            );
        }

        #[test]
        fn distinct_string_selectors_never_collide(
            left in proptest::collection::vec("[a-z:%*#]{0,8}", 0..4),
            right in proptest::collection::vec("[a-z:%*#]{0,8}", 0..4),
        ) {
            prop_assume!(left != right);
            let left: Vec<SelectorPart> = left.into_iter().map(SelectorPart::from).collect();
            let right: Vec<SelectorPart> = right.into_iter().map(SelectorPart::from).collect();
            prop_assert_ne!(
                build_key("ns", "entity", &left, "v1"),
                build_key("ns", "entity", &right, "v1")
            );
        }

        #[test]
        fn distinct_integer_selectors_never_collide(
            left in proptest::collection::vec(any::<i64>(), 0..4),
            right in proptest::collection::vec(any::<i64>(), 0..4),
        ) {
            prop_assume!(left != right);
            let left: Vec<SelectorPart> = left.into_iter().map(SelectorPart::from).collect();
            let right: Vec<SelectorPart> = right.into_iter().map(SelectorPart::from).collect();
            prop_assert_ne!(
                build_key("ns", "entity", &left, "v1"),
                build_key("ns", "entity", &right, "v1")
            );
        }
    }
}
