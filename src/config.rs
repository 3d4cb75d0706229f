use crate::itq::ItqParams;
use crate::pipeline::ExtractionOptions;
use crate::source::SourceConfig;
use crate::{ItqError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The bit length used by the default configuration.
pub const DEFAULT_BIT_LENGTH: usize = 256;

fn default_model_path() -> PathBuf {
    PathBuf::from("itq.model")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Everything needed to train and save a model.
pub struct TrainConfig {
    /// How the model is fitted. `itq.bit_length` must always be given.
    pub itq: ItqParams,
    /// A file listing the identifiers to train on, one per line. If absent, every descriptor in the source is used.
    #[serde(default)]
    pub identifier_list_path: Option<PathBuf>,
    /// Where the descriptors are stored.
    #[serde(default)]
    pub descriptor_source: SourceConfig,
    /// How descriptors are extracted.
    #[serde(default)]
    pub parallel: ExtractionOptions,
    /// Where the fitted model is saved.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            itq: ItqParams::new(DEFAULT_BIT_LENGTH),
            identifier_list_path: None,
            descriptor_source: SourceConfig::default(),
            parallel: ExtractionOptions::default(),
            model_path: default_model_path(),
        }
    }
}

impl TrainConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ItqError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ItqError::Configuration(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Check every option is usable.
    pub fn validate(&self) -> Result<()> {
        self.itq.validate()?;
        if self.parallel.worker_count == 0 {
            return Err(ItqError::Configuration(
                "parallel.worker_count must be a positive integer".to_owned(),
            ));
        }
        Ok(())
    }

    /// The configuration as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ItqError::Configuration(e.to_string()))
    }
}
