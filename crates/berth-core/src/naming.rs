//! Deterministic cluster resource names.
//!
//! Cluster objects (deployment, build cache volume, ingresses) are named from
//! the parts that identify them. The readable prefix is a sanitised join of
//! the parts; a short SHA-256 suffix keeps names that sanitise or truncate to
//! the same prefix distinct.

use sha2::{Digest, Sha256};

use crate::types::MAX_NAME_LEN;

/// Hex characters of the digest kept as suffix.
const SUFFIX_LEN: usize = 10;

/// Map identifying parts to a DNS-label-safe resource name (≤ 63 chars).
pub fn resource_name(parts: &[&str]) -> String {
    let digest = Sha256::digest(parts.join("/").as_bytes());
    let suffix = &hex::encode(digest)[..SUFFIX_LEN];

    let mut prefix: String = parts
        .join("-")
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() { c } else { '-' }
        })
        .collect();

    // Room for "-" + suffix.
    prefix.truncate(MAX_NAME_LEN - SUFFIX_LEN - 1);
    let prefix = prefix.trim_matches('-');

    if prefix.is_empty() {
        format!("r-{suffix}")
    } else {
        format!("{prefix}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(resource_name(&["ns", "app"]), resource_name(&["ns", "app"]));
    }

    #[test]
    fn distinguishes_part_boundaries() {
        // Both join to "a-b-c" but must not collide.
        assert_ne!(resource_name(&["a-b", "c"]), resource_name(&["a", "b-c"]));
    }

    #[test]
    fn bounded_length_and_charset() {
        let long = "x".repeat(63);
        let name = resource_name(&[&long, &long, "My.Route/api"]);
        assert!(name.len() <= 63);
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert!(!name.starts_with('-'));
    }

    #[test]
    fn readable_prefix() {
        let name = resource_name(&["workspace", "app1"]);
        assert!(name.starts_with("workspace-app1-"));
        assert_eq!(name.len(), "workspace-app1-".len() + SUFFIX_LEN);
    }
}
