//! Allocation bucketing
//!
//! Maps a point in [0, 1) onto the cumulative allocation ranges of an
//! experiment's variants. The deterministic point comes from SHA-256 so the
//! same (experiment, subject) pair lands in the same bucket on every host and
//! across restarts.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::experiment::Variant;

/// Bits of the digest prefix used for the point. 53 bits is the f64 mantissa
/// width, so the conversion is exact and the result is strictly below 1.0.
const POINT_BITS: u32 = 53;

/// Deterministic point in [0, 1) for an (experiment, subject) pair.
///
/// Hashes `"<experiment_id>:<subject_id>"` and normalises the leading
/// 53 bits of the digest.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hash_point(experiment_id: &str, subject_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update(b":");
    hasher.update(subject_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bits = u64::from_be_bytes(prefix) >> (64 - POINT_BITS);
    bits as f64 / (1u64 << POINT_BITS) as f64
}

/// Uniform random point in [0, 1).
#[must_use]
pub fn random_point() -> f64 {
    rand::thread_rng().gen::<f64>()
}

/// Select the variant whose cumulative allocation range contains `point`.
///
/// Floating-point rounding can leave the cumulative sum slightly below 1.0;
/// points falling past the last boundary go to the last variant. Returns
/// `None` only for an empty slice.
#[must_use]
pub fn select_variant(variants: &[Variant], point: f64) -> Option<&Variant> {
    let mut cumulative = 0.0;
    for variant in variants {
        cumulative += variant.allocation();
        if point < cumulative {
            return Some(variant);
        }
    }
    variants.last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants() -> Vec<Variant> {
        vec![
            Variant::new("a", "A", 0.2),
            Variant::new("b", "B", 0.3),
            Variant::new("c", "C", 0.5),
        ]
    }

    #[test]
    fn test_hash_point_is_stable() {
        let first = hash_point("exp-1", "user-42");
        let second = hash_point("exp-1", "user-42");
        assert!((first - second).abs() < f64::EPSILON);
        assert!((0.0..1.0).contains(&first));
    }

    #[test]
    fn test_hash_point_depends_on_experiment() {
        let points: Vec<f64> = (0..20).map(|i| hash_point(&format!("exp-{i}"), "user-1")).collect();
        let distinct = points
            .iter()
            .filter(|p| (**p - points[0]).abs() > f64::EPSILON)
            .count();
        assert!(distinct > 0);
    }

    #[test]
    fn test_hash_point_matches_joined_string() {
        // Equivalent to hashing the joined "<experiment>:<subject>" string
        let digest = Sha256::digest(b"exp-1:user-42");
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        #[allow(clippy::cast_precision_loss)]
        let expected = (u64::from_be_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64;
        assert!((hash_point("exp-1", "user-42") - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_select_boundaries() {
        let variants = variants();
        assert_eq!(select_variant(&variants, 0.0).unwrap().id(), "a");
        assert_eq!(select_variant(&variants, 0.19).unwrap().id(), "a");
        assert_eq!(select_variant(&variants, 0.2).unwrap().id(), "b");
        assert_eq!(select_variant(&variants, 0.49).unwrap().id(), "b");
        assert_eq!(select_variant(&variants, 0.5).unwrap().id(), "c");
        assert_eq!(select_variant(&variants, 0.999_999).unwrap().id(), "c");
    }

    #[test]
    fn test_select_overflow_falls_back_to_last() {
        // Sum is 0.9995, inside the tolerance but short of 1.0
        let variants = vec![Variant::new("a", "A", 0.4995), Variant::new("b", "B", 0.5)];
        assert_eq!(select_variant(&variants, 0.9998).unwrap().id(), "b");
    }

    #[test]
    fn test_select_empty() {
        assert!(select_variant(&[], 0.5).is_none());
    }

    #[test]
    fn test_random_point_range() {
        for _ in 0..1000 {
            let p = random_point();
            assert!((0.0..1.0).contains(&p));
        }
    }
}
