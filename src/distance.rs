use crate::hash_code::HashCode;
use serde::{Deserialize, Serialize};
use space::Metric;

/// The data type representing the distance between two hash codes.
pub type DistanceUnit = u64;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
/// The Hamming distance metric.
///
/// Codes of different lengths are infinitely far apart.
pub struct HammingDistance;

impl Metric<HashCode> for HammingDistance {
    type Unit = DistanceUnit;
    fn distance(&self, a: &HashCode, b: &HashCode) -> Self::Unit {
        a.hamming_distance(b)
            .map(DistanceUnit::from)
            .unwrap_or(DistanceUnit::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_is_a_metric() {
        let codes: Vec<HashCode> = [0b1010u64, 0b0110, 0b1111, 0b0000]
            .iter()
            .map(|x| HashCode::from_u64(*x, 4).unwrap())
            .collect();
        for a in &codes {
            assert_eq!(HammingDistance.distance(a, a), 0);
            for b in &codes {
                assert_eq!(HammingDistance.distance(a, b), HammingDistance.distance(b, a));
                for c in &codes {
                    assert!(
                        HammingDistance.distance(a, c)
                            <= HammingDistance.distance(a, b) + HammingDistance.distance(b, c)
                    );
                }
            }
        }
        assert_eq!(HammingDistance.distance(&codes[0], &codes[1]), 2);
    }

    #[test]
    fn codes_of_different_lengths_are_infinitely_far_apart() {
        let a = HashCode::from_bits([true, false]);
        let b = HashCode::from_bits([true, false, true]);
        assert_eq!(HammingDistance.distance(&a, &b), DistanceUnit::MAX);
    }
}
