use sha2::{Digest, Sha256};

use crate::common::Value;

/// Lowercase hex SHA-256 of a string.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generate the dedup hash for a campaign's criteria
///
/// Hashes the canonical serialization, so two criteria documents that differ
/// only in key order or number formatting produce the same hash.
pub fn criteria_hash(criteria: &Value) -> String {
    sha256_hex(&criteria.canonical())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vectors() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_criteria_hash_uses_canonical_form() {
        let criteria: Value =
            serde_json::from_str(r#"{"tags":["a","b"],"age":{"min":18,"max":40}}"#).unwrap();

        assert_eq!(
            criteria_hash(&criteria),
            "40eaa1f2954bcd4916f3122623be246aed40dd1302a0473daec8b8a41c26e022"
        );
    }

    #[test]
    fn test_reordered_criteria_same_hash() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"c":2,"d":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":{"d":3,"c":2},"a":1.0}"#).unwrap();

        assert_eq!(criteria_hash(&a), criteria_hash(&b));
    }

    #[test]
    fn test_different_criteria_different_hash() {
        let a: Value = serde_json::from_str(r#"{"a":1}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":2}"#).unwrap();

        assert_ne!(criteria_hash(&a), criteria_hash(&b));
    }
}
