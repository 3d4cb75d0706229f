use crate::{DescriptorPrecision, ItqError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A fixed-dimension real-valued feature vector, keyed by an opaque identifier.
pub struct DescriptorVector {
    /// The identifier of the descriptor in its source.
    pub id: String,
    /// The components of the descriptor.
    pub components: Vec<DescriptorPrecision>,
}

impl DescriptorVector {
    /// Construct a new descriptor.
    pub fn new(id: impl Into<String>, components: Vec<DescriptorPrecision>) -> Self {
        Self {
            id: id.into(),
            components,
        }
    }

    /// The number of components in the descriptor.
    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    /// Whether or not every component is finite.
    pub fn is_finite(&self) -> bool {
        self.components.iter().all(|x| x.is_finite())
    }

    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id).then_with(|| {
            let lhs = self.components.iter().map(|x| x.to_bits());
            let rhs = other.components.iter().map(|x| x.to_bits());
            lhs.cmp(rhs)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The descriptors assembled for one fitting run.
///
/// A corpus is validated on construction: every vector has the same dimension and only finite components.
/// Vectors are kept in a canonical order (by identifier, then by component bits), so the order in which extraction workers delivered them has no bearing on fitting.
pub struct TrainingCorpus {
    vectors: Vec<DescriptorVector>,
    dimension: usize,
}

impl TrainingCorpus {
    /// Validate and assemble a training corpus.
    ///
    /// # Arguments
    ///
    /// * `vectors` - The descriptors making up the corpus, in any order.
    ///
    /// # Returns
    ///
    /// A corpus, or a validation error naming the first offending descriptor.
    pub fn new(mut vectors: Vec<DescriptorVector>) -> Result<Self> {
        let dimension = vectors.first().map(|x| x.dimension()).unwrap_or_default();
        for vector in vectors.iter() {
            if vector.dimension() != dimension {
                return Err(ItqError::Validation(format!(
                    "descriptor '{}' has {} dimensions, expected {}",
                    vector.id,
                    vector.dimension(),
                    dimension
                )));
            }
            if !vector.is_finite() {
                return Err(ItqError::Validation(format!(
                    "descriptor '{}' contains non-finite values",
                    vector.id
                )));
            }
        }
        vectors.sort_unstable_by(|a, b| a.canonical_cmp(b));
        Ok(Self { vectors, dimension })
    }

    /// The number of descriptors in the corpus.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether or not the corpus holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The dimension shared by every descriptor in the corpus; zero for an empty corpus.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The descriptors in canonical order.
    pub fn vectors(&self) -> &[DescriptorVector] {
        &self.vectors
    }
}
