//! Dotted version comparison.

use tracing::warn;

/// Parse `1.2.3` into integer segments. A leading `v` is ignored.
fn segments(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Whether `latest` is strictly newer than `current`.
///
/// Segments are compared numerically after padding the shorter version
/// with zeros, so `1.2` equals `1.2.0`. If either side is not purely
/// numeric (`1.2.0rc1`, `dev`), an update is assumed to be available.
pub fn compare_versions(current: &str, latest: &str) -> bool {
    let (Some(mut current_parts), Some(mut latest_parts)) = (segments(current), segments(latest))
    else {
        warn!(current, latest, "Version parsing failed, assuming update available");
        return true;
    };

    let len = current_parts.len().max(latest_parts.len());
    current_parts.resize(len, 0);
    latest_parts.resize(len, 0);

    latest_parts > current_parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_patch() {
        assert!(compare_versions("1.2.3", "1.2.4"));
        assert!(!compare_versions("1.2.4", "1.2.3"));
    }

    #[test]
    fn test_first_differing_segment_decides() {
        assert!(compare_versions("1.9.9", "2.0.0"));
        assert!(!compare_versions("2.0.0", "1.99.99"));
        assert!(compare_versions("1.2.10", "1.10.0"));
    }

    #[test]
    fn test_zero_padding() {
        assert!(!compare_versions("1.2", "1.2.0"));
        assert!(!compare_versions("1.2.0", "1.2"));
        assert!(compare_versions("1.2", "1.2.1"));
    }

    #[test]
    fn test_equal_is_not_update() {
        assert!(!compare_versions("0.4.0", "0.4.0"));
    }

    #[test]
    fn test_v_prefix_ignored() {
        assert!(!compare_versions("v1.0.0", "1.0.0"));
    }

    #[test]
    fn test_unparsable_assumes_update() {
        assert!(compare_versions("1.0.0", "1.1.0rc1"));
        assert!(compare_versions("dev", "1.0.0"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn version() -> impl Strategy<Value = Vec<u64>> {
            proptest::collection::vec(0u64..50, 1..5)
        }

        fn render(parts: &[u64]) -> String {
            parts
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(".")
        }

        proptest! {
            #[test]
            fn never_newer_than_itself(v in version()) {
                let s = render(&v);
                prop_assert!(!compare_versions(&s, &s));
            }

            #[test]
            fn antisymmetric(a in version(), b in version()) {
                let (a, b) = (render(&a), render(&b));
                prop_assert!(!(compare_versions(&a, &b) && compare_versions(&b, &a)));
            }
        }
    }
}
