/// Extraction across isolated worker processes.
pub mod process;
/// Extraction across a pool of threads.
pub mod threads;

use crate::descriptor::TrainingCorpus;
use crate::source::DescriptorSource;
use crate::{ItqError, Result};
use process::ProcessPool;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// The default number of extraction workers.
pub const DEFAULT_WORKER_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// How descriptors are pulled out of a descriptor source.
pub struct ExtractionOptions {
    /// The number of workers fetching descriptors concurrently.
    pub worker_count: usize,
    /// Whether to fetch in isolated worker processes rather than in threads of this process.
    ///
    /// Process workers share nothing with each other, and suit fetches dominated by decoding cost; thread workers have lower overhead.
    pub use_process_workers: bool,
    /// The executable to launch as a worker process. Defaults to the current executable.
    #[serde(skip)]
    pub worker_program: Option<PathBuf>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            use_process_workers: true,
            worker_program: None,
        }
    }
}

/// A fixed-size pool of extraction workers, owned by its caller.
///
/// The first failing fetch aborts the whole extraction; no partial corpus is ever returned.
/// Dropping the pool shuts its workers down.
pub enum WorkerPool {
    /// Workers running as threads of this process, sharing the descriptor source.
    Threads(ThreadPool),
    /// Workers running as child processes, each opening the descriptor source on its own.
    Processes(ProcessPool),
}

impl WorkerPool {
    /// Create a worker pool.
    ///
    /// # Arguments
    ///
    /// * `options` - The size and kind of the pool.
    pub fn new(options: &ExtractionOptions) -> Result<Self> {
        if options.worker_count == 0 {
            return Err(ItqError::Configuration(
                "worker_count must be a positive integer".to_owned(),
            ));
        }
        Ok(match options.use_process_workers {
            true => Self::Processes(ProcessPool::new(
                options.worker_count,
                options.worker_program.clone(),
            )?),
            false => Self::Threads(threads::build_pool(options.worker_count)?),
        })
    }

    /// The number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        match self {
            WorkerPool::Threads(pool) => pool.current_num_threads(),
            WorkerPool::Processes(pool) => pool.worker_count(),
        }
    }

    /// Fetch descriptors from a source.
    ///
    /// # Arguments
    ///
    /// * `ids` - The identifiers of the descriptors to fetch.
    ///
    /// * `source` - The descriptor source.
    ///
    /// # Returns
    ///
    /// A training corpus holding one descriptor per identifier, or the first error encountered.
    pub fn extract(
        &self,
        ids: Vec<String>,
        source: &dyn DescriptorSource,
    ) -> Result<TrainingCorpus> {
        info!(
            descriptors = ids.len(),
            workers = self.worker_count(),
            processes = matches!(self, WorkerPool::Processes(_)),
            "extracting descriptors"
        );
        let vectors = match self {
            WorkerPool::Threads(pool) => threads::fetch_all(pool, &ids, source)?,
            WorkerPool::Processes(pool) => {
                let config = source.isolated_config().ok_or_else(|| {
                    ItqError::Configuration(
                        "this descriptor source cannot be opened by worker processes; disable use_process_workers"
                            .to_owned(),
                    )
                })?;
                pool.fetch_all(ids, &config)?
            }
        };
        TrainingCorpus::new(vectors)
    }
}

/// Fetch descriptors from a source into a training corpus.
///
/// # Arguments
///
/// * `ids` - The identifiers of the descriptors to fetch.
///
/// * `source` - The descriptor source.
///
/// * `options` - The size and kind of the worker pool.
///
/// # Returns
///
/// A training corpus holding one descriptor per identifier, in no particular order.
pub fn extract(
    ids: Vec<String>,
    source: &dyn DescriptorSource,
    options: &ExtractionOptions,
) -> Result<TrainingCorpus> {
    WorkerPool::new(options)?.extract(ids, source)
}

/// Read an identifier list.
///
/// Each line holds one identifier; surrounding whitespace is trimmed, and lines left blank after trimming are skipped.
///
/// # Arguments
///
/// * `reader` - The list to read.
///
/// # Returns
///
/// The identifiers, in the order they appear, duplicates included.
pub fn parse_identifier_list(reader: impl BufRead) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() {
            ids.push(id.to_owned());
        }
    }
    Ok(ids)
}

/// Decide which descriptors to train on.
///
/// # Arguments
///
/// * `list_path` - An identifier list to read. If absent, every identifier in the source is used.
///
/// * `source` - The descriptor source.
///
/// # Returns
///
/// The identifiers of the descriptors to extract.
pub fn resolve_ids(list_path: Option<&Path>, source: &dyn DescriptorSource) -> Result<Vec<String>> {
    match list_path {
        Some(path) => {
            if !path.is_file() {
                return Err(ItqError::Configuration(format!(
                    "identifier list {} does not exist",
                    path.display()
                )));
            }
            let ids = parse_identifier_list(BufReader::new(File::open(path)?))?;
            info!(path = %path.display(), count = ids.len(), "loaded identifiers from list file");
            Ok(ids)
        }
        None => {
            let ids = source.enumerate_ids()?;
            info!(count = ids.len(), "using every identifier in the descriptor source");
            Ok(ids)
        }
    }
}
