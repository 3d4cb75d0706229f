use crate::descriptor::{DescriptorVector, TrainingCorpus};
use crate::hash_code::HashCode;
use crate::itq::{self, model::normalize_l2, ItqModel, ItqParams};
use crate::{DescriptorPrecision, ItqError, Result};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use simsimd::SpatialSimilarity;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
/// A `d`-dimensional hyperplane through the origin; a hyperplane is a generalisation of a line (which has one dimension) or plane (which has two dimensions).
///
/// It is defined when the dot product of a normal vector and some other vector equals zero.
pub struct Hyperplane {
    /// The vector normal to the hyperplane.
    pub coefficients: Vec<DescriptorPrecision>,
}

impl Hyperplane {
    /// Calculates if a point is 'above' the hyperplane.
    ///
    /// A point is 'above' a hyperplane when it is pointing in the same direction as the hyperplane's normal vector.
    /// Points lying on the hyperplane count as above it.
    ///
    /// # Arguments
    ///
    /// * `point` - The point which may be above, on, or below the hyperplane. Must have as many dimensions as the hyperplane.
    ///
    /// # Returns
    ///
    /// If the given point is above the hyperplane.
    pub fn point_is_above(&self, point: &[DescriptorPrecision]) -> bool {
        DescriptorPrecision::dot(&self.coefficients, point).unwrap_or_default() >= 0.0
    }
}

/// A locality-sensitive hash function backed by a fitted ITQ model.
///
/// Bit `i` of a descriptor's code is set when the centred descriptor lies above the hyperplane whose normal is column `i` of `P·R`.
/// Encoding is pure, so one functor may be shared by any number of threads.
#[derive(Debug, Clone)]
pub struct ItqFunctor {
    model: ItqModel,
    hyperplanes: Vec<Hyperplane>,
}

impl ItqFunctor {
    /// Wrap a fitted model.
    pub fn new(model: ItqModel) -> Self {
        let combined = model.projection() * model.rotation();
        let hyperplanes = combined
            .column_iter()
            .map(|column| Hyperplane {
                coefficients: column.iter().copied().collect(),
            })
            .collect();
        Self { model, hyperplanes }
    }

    /// Fit a model over a corpus and wrap it.
    ///
    /// # Arguments
    ///
    /// * `corpus` - The training corpus.
    ///
    /// * `params` - The fitting parameters.
    pub fn fit(corpus: &TrainingCorpus, params: &ItqParams) -> Result<Self> {
        Ok(Self::new(itq::fit(corpus, params)?))
    }

    /// Load a saved model and wrap it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ItqModel::load(path)?))
    }

    /// Save the wrapped model.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.model.save(path)
    }

    /// The wrapped model.
    pub fn model(&self) -> &ItqModel {
        &self.model
    }

    /// The number of bits in each hash code.
    pub fn bit_length(&self) -> usize {
        self.model.bit_length()
    }

    /// Hash a descriptor.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - The descriptor to hash.
    ///
    /// # Returns
    ///
    /// A code of [`ItqFunctor::bit_length`] bits, or a validation error naming the descriptor.
    pub fn encode(&self, descriptor: &DescriptorVector) -> Result<HashCode> {
        self.encode_components(&descriptor.components)
            .map_err(|e| match e {
                ItqError::Validation(msg) => {
                    ItqError::Validation(format!("descriptor '{}': {msg}", descriptor.id))
                }
                e => e,
            })
    }

    /// Hash the components of a descriptor.
    ///
    /// # Arguments
    ///
    /// * `components` - The components to hash; there must be exactly as many as the model's dimension, all finite.
    ///
    /// # Returns
    ///
    /// A code of [`ItqFunctor::bit_length`] bits.
    pub fn encode_components(&self, components: &[DescriptorPrecision]) -> Result<HashCode> {
        let dimension = self.model.dimension();
        if components.len() != dimension {
            return Err(ItqError::Validation(format!(
                "expected {dimension} components, got {}",
                components.len()
            )));
        }
        if !components.iter().all(|x| x.is_finite()) {
            return Err(ItqError::Validation(
                "cannot hash non-finite components".to_owned(),
            ));
        }
        let mut centered = components.to_vec();
        if self.model.normalize() {
            normalize_l2(&mut centered);
        }
        centered
            .iter_mut()
            .zip(self.model.mean().iter())
            .for_each(|(x, mean)| *x -= mean);
        Ok(HashCode::from_bits(
            self.hyperplanes.iter().map(|x| x.point_is_above(&centered)),
        ))
    }

    /// Hash many descriptors in parallel.
    ///
    /// # Returns
    ///
    /// One code per descriptor, in the order given, or the first validation error encountered.
    pub fn encode_batch(&self, descriptors: &[DescriptorVector]) -> Result<Vec<HashCode>> {
        descriptors.par_iter().map(|x| self.encode(x)).collect()
    }
}
