use crate::descriptor::{DescriptorVector, TrainingCorpus};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// `n` descriptors of dimension `d` with independent, unevenly scaled Gaussian components.
pub(crate) fn synthetic_vectors(n: usize, d: usize, seed: u64) -> Vec<DescriptorVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let components = (0..d)
                .map(|j| {
                    let noise: f64 = StandardNormal.sample(&mut rng);
                    noise * (1.0 + j as f64 / 8.0) + 0.5
                })
                .collect();
            DescriptorVector::new(format!("{i:04}"), components)
        })
        .collect()
}

pub(crate) fn synthetic_corpus(n: usize, d: usize, seed: u64) -> TrainingCorpus {
    TrainingCorpus::new(synthetic_vectors(n, d, seed)).unwrap()
}
