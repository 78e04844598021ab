//! Content-derived artefact identifiers.
//!
//! The identifier is the dedup key for the whole pipeline: the same logical
//! feed entry must map to the same identifier no matter when or how often it
//! is observed, and a change to any identity field must produce a different
//! identifier. Name-based UUID v5 over a fixed concatenation gives both.

use uuid::Uuid;

/// Derive the deterministic artefact identifier for a feed entry.
///
/// Hashes `"{title}-{link}-{description}-{published}"` with UUID v5 in the
/// DNS namespace. Callers substitute the empty string for missing fields;
/// absence is still part of the deterministic input.
pub fn derive_artefact_id(title: &str, link: &str, description: &str, published: &str) -> String {
    let name = format!("{}-{}-{}-{}", title, link, description, published);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_inputs_same_id() {
        let a = derive_artefact_id("Title", "https://example.com/a", "Body", "2024-01-01T00:00:00Z");
        let b = derive_artefact_id("Title", "https://example.com/a", "Body", "2024-01-01T00:00:00Z");
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_value_is_stable() {
        // Pinned so a dependency bump cannot silently re-key existing artefacts.
        let id = derive_artefact_id("t", "l", "d", "p");
        assert_eq!(id, Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"t-l-d-p").to_string());
    }

    #[test]
    fn test_each_field_changes_id() {
        let base = derive_artefact_id("t", "l", "d", "p");
        assert_ne!(base, derive_artefact_id("T", "l", "d", "p"));
        assert_ne!(base, derive_artefact_id("t", "L", "d", "p"));
        assert_ne!(base, derive_artefact_id("t", "l", "D", "p"));
        assert_ne!(base, derive_artefact_id("t", "l", "d", "P"));
    }

    #[test]
    fn test_empty_fields_allowed() {
        let a = derive_artefact_id("", "", "", "");
        let b = derive_artefact_id("", "", "", "");
        assert_eq!(a, b);
        assert_ne!(a, derive_artefact_id("x", "", "", ""));
    }

    proptest! {
        #[test]
        fn prop_deterministic(t in ".*", l in ".*", d in ".*", p in ".*") {
            prop_assert_eq!(
                derive_artefact_id(&t, &l, &d, &p),
                derive_artefact_id(&t, &l, &d, &p)
            );
        }

        #[test]
        fn prop_title_sensitivity(t in "[a-z]{1,20}", l in "[a-z]{1,20}") {
            // Distinct titles under the same link must not collide.
            let other = format!("{}x", t);
            prop_assert_ne!(
                derive_artefact_id(&t, &l, "", ""),
                derive_artefact_id(&other, &l, "", "")
            );
        }
    }
}
