use nalgebra::{DMatrix, DVector};

/// How far `MᵀM` may stray from the identity for `M` to count as orthonormal.
pub const ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
/// A fitted ITQ model.
///
/// A descriptor `x` hashes to `sign((x − μ)·P·R)`, one bit per column of `P·R`.
/// Models are only created by fitting or loading, and are never modified afterwards.
pub struct ItqModel {
    mean: DVector<f64>,
    projection: DMatrix<f64>,
    rotation: DMatrix<f64>,
    normalize: bool,
}

impl ItqModel {
    pub(crate) fn new(
        mean: DVector<f64>,
        projection: DMatrix<f64>,
        rotation: DMatrix<f64>,
        normalize: bool,
    ) -> Self {
        Self {
            mean,
            projection,
            rotation,
            normalize,
        }
    }

    /// The dimension `d` of the descriptors the model hashes.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// The number of bits `k` in each hash code.
    pub fn bit_length(&self) -> usize {
        self.rotation.nrows()
    }

    /// The mean `μ` of the training corpus.
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// The `d×k` projection `P` onto the principal components of the training corpus.
    pub fn projection(&self) -> &DMatrix<f64> {
        &self.projection
    }

    /// The learned `k×k` rotation `R`.
    pub fn rotation(&self) -> &DMatrix<f64> {
        &self.rotation
    }

    /// Whether descriptors are scaled to unit length before hashing.
    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// `‖RᵀR − I‖`; zero for an exactly orthogonal rotation.
    pub fn orthogonality_error(&self) -> f64 {
        orthonormality_error(&self.rotation)
    }

    /// Check the shapes, values, and orthogonality of the model's parts.
    ///
    /// # Returns
    ///
    /// A description of the first inconsistency found, if any.
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        let (d, k) = (self.dimension(), self.bit_length());
        if k == 0 || k > d {
            return Err(format!("bit length {k} is not between 1 and {d}"));
        }
        if self.projection.shape() != (d, k) {
            return Err(format!(
                "projection is {:?}, expected ({d}, {k})",
                self.projection.shape()
            ));
        }
        if self.rotation.shape() != (k, k) {
            return Err(format!("rotation is {:?}, expected ({k}, {k})", self.rotation.shape()));
        }
        let finite = self.mean.iter().all(|x| x.is_finite())
            && self.projection.iter().all(|x| x.is_finite())
            && self.rotation.iter().all(|x| x.is_finite());
        if !finite {
            return Err("model contains non-finite values".to_owned());
        }
        let rotation_error = self.orthogonality_error();
        if rotation_error >= ORTHOGONALITY_TOLERANCE {
            return Err(format!("rotation is not orthogonal (‖RᵀR − I‖ = {rotation_error:e})"));
        }
        let projection_error = orthonormality_error(&self.projection);
        if projection_error >= ORTHOGONALITY_TOLERANCE {
            return Err(format!(
                "projection columns are not orthonormal (‖PᵀP − I‖ = {projection_error:e})"
            ));
        }
        Ok(())
    }
}

fn orthonormality_error(m: &DMatrix<f64>) -> f64 {
    (m.transpose() * m - DMatrix::identity(m.ncols(), m.ncols())).norm()
}

/// Scale a vector to unit Euclidean length. The zero vector is left as it is.
pub(crate) fn normalize_l2(components: &mut [f64]) {
    let norm = components.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        components.iter_mut().for_each(|x| *x /= norm);
    }
}
