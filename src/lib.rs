#![warn(missing_docs)]
//! Iterative Quantization (ITQ) locality-sensitive hashing.
//!
//! Descriptors are pulled out of a [`source::DescriptorSource`] by a parallel extraction
//! pipeline, an ITQ model is fitted over the resulting corpus, and an [`functor::ItqFunctor`]
//! wraps the fitted model to turn any descriptor into a short binary [`hash_code::HashCode`].

/// Model training configuration.
pub mod config;
/// Descriptor vectors and training corpora.
pub mod descriptor;
/// Distance metrics over hash codes.
pub mod distance;
/// Error types.
pub mod error;
/// The hash functor wrapping a fitted model.
pub mod functor;
/// Fixed-length binary hash codes.
pub mod hash_code;
/// Iterative Quantization fitting and model persistence.
pub mod itq;
/// Parallel extraction of training corpora.
pub mod pipeline;
/// Descriptor storage backends.
pub mod source;
/// End-to-end model training.
pub mod train;

#[cfg(test)]
mod test_support;

/// The numeric precision of descriptor components.
pub type DescriptorPrecision = f64;

pub use error::{ItqError, Result};
