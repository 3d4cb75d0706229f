/// Descriptors stored one per file, compressed.
pub mod files;
/// Descriptors loaded from a JSON document.
pub mod json;
/// Descriptors stored in an LSM-tree keyspace.
pub mod keyspace;
/// Descriptors held in memory.
pub mod memory;

use crate::descriptor::DescriptorVector;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A key-value store mapping identifiers to fixed-dimension descriptors.
///
/// Implementations are read concurrently by extraction workers, and must not require mutable access to fetch.
pub trait DescriptorSource: Send + Sync {
    /// List every identifier held by the source.
    ///
    /// # Returns
    ///
    /// The identifiers of all stored descriptors.
    fn enumerate_ids(&self) -> Result<Vec<String>>;

    /// Fetch a single descriptor.
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier of the descriptor.
    ///
    /// # Returns
    ///
    /// The descriptor, or a lookup error if the identifier is unknown to the source.
    fn fetch(&self, id: &str) -> Result<DescriptorVector>;

    /// The number of descriptors held by the source.
    fn count(&self) -> Result<usize>;

    /// The configuration an isolated worker process can use to open this source on its own.
    ///
    /// # Returns
    ///
    /// `None` if the source cannot be shared with other processes.
    fn isolated_config(&self) -> Option<SourceConfig> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// The supported descriptor source backends, and how to open them.
pub enum SourceConfig {
    /// A JSON document mapping identifiers to component arrays.
    Json {
        /// The path of the JSON document.
        path: PathBuf,
    },
    /// A directory holding one compressed descriptor per file.
    Files {
        /// The directory containing the descriptors.
        directory: PathBuf,
    },
    /// A partition of an LSM-tree keyspace.
    Keyspace {
        /// The directory of the keyspace.
        path: PathBuf,
        /// The partition holding the descriptors.
        #[serde(default = "keyspace::default_partition")]
        partition: String,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Files {
            directory: PathBuf::from("descriptors"),
        }
    }
}

impl SourceConfig {
    /// The name of the backend selected by this configuration.
    pub fn backend_name(&self) -> &'static str {
        match self {
            SourceConfig::Json { .. } => "json",
            SourceConfig::Files { .. } => "files",
            SourceConfig::Keyspace { .. } => "keyspace",
        }
    }

    /// Open the configured backend.
    ///
    /// # Returns
    ///
    /// A descriptor source.
    pub fn open(&self) -> Result<Box<dyn DescriptorSource>> {
        Ok(match self {
            SourceConfig::Json { path } => Box::new(json::JsonSource::open(path)?),
            SourceConfig::Files { directory } => Box::new(files::FileSource::open(directory)?),
            SourceConfig::Keyspace { path, partition } => {
                Box::new(keyspace::KeyspaceSource::open(path, partition)?)
            }
        })
    }
}
