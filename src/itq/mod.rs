//! Iterative Quantization.
//!
//! ITQ centres the corpus, reduces it to `k` dimensions with principal component analysis, then learns an orthogonal rotation of the reduced space which minimises the error of snapping every point to the nearest vertex of the `{-1, +1}^k` hypercube.
//! The rotation is found by alternating minimisation: binarise the rotated points, then solve the orthogonal Procrustes problem aligning the points with their binarisation.
//!
//! See Gong & Lazebnik (2011), "Iterative Quantization: A Procrustean Approach to Learning Binary Codes".

/// The fitted model.
pub mod model;
/// Saving and loading fitted models.
pub mod persistence;

use crate::descriptor::TrainingCorpus;
use crate::{ItqError, Result};
pub use model::ItqModel;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The default number of rotation refinement iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// The default relative improvement in quantisation error below which refinement stops early.
pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 1e-7;

/// Eigenvalues this small relative to the largest are treated as zero when checking the rank of the covariance.
const RANK_TOLERANCE: f64 = 1e-10;

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_convergence_tolerance() -> f64 {
    DEFAULT_CONVERGENCE_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Parameters of an ITQ fitting run.
pub struct ItqParams {
    /// The number of bits in each hash code.
    pub bit_length: usize,
    /// The maximum number of rotation refinement iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// The seed for the initial random rotation. If absent, a seed is drawn at random and logged.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Whether descriptors are scaled to unit length before hashing.
    #[serde(default)]
    pub normalize: bool,
    /// Refinement stops once an iteration improves the quantisation error by no more than this fraction.
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,
}

impl ItqParams {
    /// Parameters for `bit_length`-bit codes, with every other parameter at its default.
    pub fn new(bit_length: usize) -> Self {
        Self {
            bit_length,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            random_seed: None,
            normalize: false,
            convergence_tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
        }
    }

    /// Set the seed of the initial random rotation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Set the maximum number of refinement iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Check the parameters are usable, independent of any corpus.
    pub fn validate(&self) -> Result<()> {
        if self.bit_length == 0 {
            return Err(ItqError::Configuration(
                "bit_length must be a positive integer".to_owned(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ItqError::Configuration(
                "max_iterations must be a positive integer".to_owned(),
            ));
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance >= 0.0) {
            return Err(ItqError::Configuration(
                "convergence_tolerance must be a non-negative number".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// How a fitting run converged.
pub struct ConvergenceTrace {
    /// The seed the initial rotation was drawn with.
    pub seed: u64,
    /// The quantisation error `‖V·R − B‖` after each iteration.
    pub quantization_errors: Vec<f64>,
}

impl ConvergenceTrace {
    /// The number of refinement iterations run.
    pub fn iterations(&self) -> usize {
        self.quantization_errors.len()
    }
}

/// Fit an ITQ model.
///
/// # Arguments
///
/// * `corpus` - The training corpus.
///
/// * `params` - The fitting parameters.
///
/// # Returns
///
/// The fitted model. Fitting is deterministic for a given corpus and seeded parameters.
pub fn fit(corpus: &TrainingCorpus, params: &ItqParams) -> Result<ItqModel> {
    fit_with_trace(corpus, params).map(|(model, _)| model)
}

/// Fit an ITQ model, recording the quantisation error of every iteration.
///
/// # Arguments
///
/// * `corpus` - The training corpus.
///
/// * `params` - The fitting parameters.
///
/// # Returns
///
/// The fitted model, and how it converged.
pub fn fit_with_trace(
    corpus: &TrainingCorpus,
    params: &ItqParams,
) -> Result<(ItqModel, ConvergenceTrace)> {
    params.validate()?;
    let (n, d, k) = (corpus.len(), corpus.dimension(), params.bit_length);
    if n == 0 {
        return Err(ItqError::InsufficientData(
            "the training corpus is empty".to_owned(),
        ));
    }
    if k > d {
        return Err(ItqError::Configuration(format!(
            "cannot produce {k}-bit codes from {d}-dimensional descriptors"
        )));
    }
    if n < k {
        return Err(ItqError::InsufficientData(format!(
            "{n} descriptors are too few to fit {k}-bit codes"
        )));
    }

    let mut data = Vec::with_capacity(n * d);
    for descriptor in corpus.vectors() {
        let mut components = descriptor.components.clone();
        if params.normalize {
            model::normalize_l2(&mut components);
        }
        data.extend(components);
    }
    let data = DMatrix::from_row_slice(n, d, &data);

    let mean = DVector::from_fn(d, |j, _| {
        (0..n).map(|i| data[(i, j)]).sum::<f64>() / n as f64
    });
    let centered = DMatrix::from_fn(n, d, |i, j| data[(i, j)] - mean[j]);
    let projection = principal_components(&centered, k)?;
    let projected = &centered * &projection;

    let seed = match params.random_seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random();
            info!(seed, "no random seed configured; drew one");
            seed
        }
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rotation = random_rotation(k, &mut rng)?;

    let mut quantization_errors: Vec<f64> = Vec::with_capacity(params.max_iterations);
    for iteration in 0..params.max_iterations {
        let binary = (&projected * &rotation).map(binarize);
        rotation = procrustes(&projected, &binary)?;
        let error = (&projected * &rotation - &binary).norm();
        debug!(iteration, error, "refined rotation");
        let converged = quantization_errors
            .last()
            .is_some_and(|&previous| previous - error <= params.convergence_tolerance * previous);
        quantization_errors.push(error);
        if converged {
            break;
        }
    }
    info!(
        descriptors = n,
        dimension = d,
        bit_length = k,
        iterations = quantization_errors.len(),
        error = quantization_errors.last().copied().unwrap_or_default(),
        "fitted ITQ model"
    );

    Ok((
        ItqModel::new(mean, projection, rotation, params.normalize),
        ConvergenceTrace {
            seed,
            quantization_errors,
        },
    ))
}

/// Binarise a projected value. Zero maps to `+1`, matching a set bit in a hash code.
pub(crate) fn binarize(value: f64) -> f64 {
    match value >= 0.0 {
        true => 1.0,
        false => -1.0,
    }
}

/// The top `k` principal directions of a centred `n×d` matrix, as the columns of a `d×k` matrix.
fn principal_components(centered: &DMatrix<f64>, k: usize) -> Result<DMatrix<f64>> {
    let (n, d) = centered.shape();
    let covariance = (centered.transpose() * centered) / (n.saturating_sub(1).max(1) as f64);
    let eigen = SymmetricEigen::new(covariance);

    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .total_cmp(&eigen.eigenvalues[a])
            .then(a.cmp(&b))
    });
    let largest = eigen.eigenvalues[order[0]];
    let smallest_kept = eigen.eigenvalues[order[k - 1]];
    if !(largest > 0.0) || smallest_kept <= largest * RANK_TOLERANCE {
        return Err(ItqError::InsufficientData(format!(
            "the covariance of the corpus has rank below {k}"
        )));
    }

    let mut projection = DMatrix::from_fn(d, k, |i, c| eigen.eigenvectors[(i, order[c])]);
    // Eigenvectors are only defined up to sign; make the largest-magnitude entry of each positive.
    for mut column in projection.column_iter_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, x| match x.abs() > best.abs() {
                true => x,
                false => best,
            });
        if pivot < 0.0 {
            column.neg_mut();
        }
    }
    Ok(projection)
}

/// A uniformly random `k×k` orthogonal matrix, from the SVD of a standard-normal matrix.
fn random_rotation(k: usize, rng: &mut impl Rng) -> Result<DMatrix<f64>> {
    let gaussian = DMatrix::from_fn(k, k, |_, _| rng.sample::<f64, _>(StandardNormal));
    gaussian
        .svd(true, false)
        .u
        .ok_or_else(|| ItqError::InsufficientData("could not orthogonalise the initial rotation".to_owned()))
}

/// The orthogonal `R` minimising `‖V·R − B‖`: with `VᵀB = UΣWᵀ`, `R = UWᵀ`.
fn procrustes(projected: &DMatrix<f64>, binary: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let svd = (projected.transpose() * binary).svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => Ok(u * v_t),
        _ => Err(ItqError::InsufficientData(
            "singular value decomposition failed while refining the rotation".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorVector;
    use crate::test_support::synthetic_corpus;

    fn identity_error(m: &DMatrix<f64>) -> f64 {
        (m.transpose() * m - DMatrix::identity(m.ncols(), m.ncols())).norm()
    }

    #[test]
    fn rotation_is_orthogonal() {
        let corpus = synthetic_corpus(200, 64, 1);
        let model = fit(&corpus, &ItqParams::new(16).with_seed(42)).unwrap();
        assert!(identity_error(model.rotation()) < 1e-9);
        assert!(identity_error(model.projection()) < 1e-9);
        assert_eq!(model.bit_length(), 16);
        assert_eq!(model.dimension(), 64);
    }

    #[test]
    fn fitting_is_deterministic() {
        let corpus = synthetic_corpus(150, 32, 2);
        let params = ItqParams::new(8).with_seed(7).with_max_iterations(20);
        let first = fit(&corpus, &params).unwrap();
        let second = fit(&corpus, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn quantization_error_never_increases() {
        let corpus = synthetic_corpus(300, 24, 3);
        let mut params = ItqParams::new(12).with_seed(11).with_max_iterations(40);
        params.convergence_tolerance = 0.0;
        let (_, trace) = fit_with_trace(&corpus, &params).unwrap();
        assert!(trace.iterations() >= 2);
        assert_eq!(trace.seed, 11);
        for pair in trace.quantization_errors.windows(2) {
            assert!(
                pair[1] <= pair[0] * (1.0 + 1e-12),
                "error rose from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn refinement_reduces_error_from_the_random_start() {
        let corpus = synthetic_corpus(300, 24, 4);
        let (_, trace) =
            fit_with_trace(&corpus, &ItqParams::new(12).with_seed(5).with_max_iterations(1))
                .unwrap();
        let (_, longer) =
            fit_with_trace(&corpus, &ItqParams::new(12).with_seed(5).with_max_iterations(30))
                .unwrap();
        assert!(longer.quantization_errors.last().unwrap() <= &trace.quantization_errors[0]);
    }

    #[test]
    fn early_stopping_respects_the_iteration_cap() {
        let corpus = synthetic_corpus(100, 16, 5);
        let (_, trace) =
            fit_with_trace(&corpus, &ItqParams::new(4).with_seed(1).with_max_iterations(3))
                .unwrap();
        assert!(trace.iterations() <= 3);
    }

    #[test]
    fn more_bits_than_dimensions_is_a_configuration_error() {
        let corpus = synthetic_corpus(100, 8, 6);
        let result = fit(&corpus, &ItqParams::new(9).with_seed(1));
        assert!(matches!(result, Err(ItqError::Configuration(_))));
    }

    #[test]
    fn fewer_descriptors_than_bits_is_insufficient_data() {
        let corpus = synthetic_corpus(5, 16, 7);
        let result = fit(&corpus, &ItqParams::new(8).with_seed(1));
        assert!(matches!(result, Err(ItqError::InsufficientData(_))));
    }

    #[test]
    fn empty_corpora_are_insufficient_data() {
        let corpus = TrainingCorpus::new(Vec::new()).unwrap();
        let result = fit(&corpus, &ItqParams::new(8).with_seed(1));
        assert!(matches!(result, Err(ItqError::InsufficientData(_))));
    }

    #[test]
    fn rank_deficient_covariance_is_insufficient_data() {
        // Every descriptor lies in a two-dimensional subspace of an eight-dimensional space.
        let vectors = (0..50)
            .map(|i| {
                let (a, b) = (i as f64, (i * i % 7) as f64);
                DescriptorVector::new(
                    format!("{i}"),
                    vec![a, b, a + b, a - b, 2.0 * a, 0.0, b, a],
                )
            })
            .collect();
        let corpus = TrainingCorpus::new(vectors).unwrap();
        let result = fit(&corpus, &ItqParams::new(4).with_seed(1));
        assert!(matches!(result, Err(ItqError::InsufficientData(_))));

        let identical = (0..20)
            .map(|i| DescriptorVector::new(format!("{i}"), vec![1.0; 4]))
            .collect();
        let corpus = TrainingCorpus::new(identical).unwrap();
        let result = fit(&corpus, &ItqParams::new(2).with_seed(1));
        assert!(matches!(result, Err(ItqError::InsufficientData(_))));
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        let corpus = synthetic_corpus(50, 8, 8);
        for params in [
            ItqParams::new(0),
            ItqParams::new(4).with_max_iterations(0),
            ItqParams {
                convergence_tolerance: -1.0,
                ..ItqParams::new(4)
            },
        ] {
            assert!(matches!(
                fit(&corpus, &params),
                Err(ItqError::Configuration(_))
            ));
        }
    }

    #[test]
    fn zero_binarises_to_plus_one() {
        assert_eq!(binarize(0.0), 1.0);
        assert_eq!(binarize(-0.0), 1.0);
        assert_eq!(binarize(1e-300), 1.0);
        assert_eq!(binarize(-1e-300), -1.0);
    }

    #[test]
    fn parameters_default_when_omitted() {
        let params: ItqParams = serde_json::from_str(r#"{ "bit_length": 32 }"#).unwrap();
        assert_eq!(params, ItqParams::new(32));
        assert!(serde_json::from_str::<ItqParams>("{}").is_err());
    }
}
