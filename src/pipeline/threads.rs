use crate::descriptor::DescriptorVector;
use crate::source::DescriptorSource;
use crate::{ItqError, Result};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

pub(crate) fn build_pool(worker_count: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|i| format!("itq-extract-{i}"))
        .build()
        .map_err(|e| ItqError::Worker(format!("could not start extraction threads: {e}")))
}

/// Fetch every identifier on the given pool.
///
/// Collecting into a `Result` stops handing out identifiers as soon as one fetch fails; descriptors already fetched are discarded.
pub(crate) fn fetch_all(
    pool: &ThreadPool,
    ids: &[String],
    source: &dyn DescriptorSource,
) -> Result<Vec<DescriptorVector>> {
    pool.install(|| {
        ids.par_iter()
            .map(|id| {
                let descriptor = source.fetch(id);
                if let Err(e) = &descriptor {
                    debug!(id = %id, error = %e, "fetch failed");
                }
                descriptor
            })
            .collect()
    })
}
