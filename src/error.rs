use std::fmt;
use thiserror::Error;

/// Errors raised while extracting descriptors, fitting a model, hashing, or persisting a model.
#[derive(Error, Debug)]
pub enum ItqError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Not enough data to fit a model of the requested size.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// An identifier could not be resolved by the descriptor source.
    #[error("descriptor not found: {id}")]
    Lookup {
        /// The identifier which could not be resolved.
        id: String,
    },

    /// A non-finite or dimension-mismatched vector.
    #[error("validation error: {0}")]
    Validation(String),

    /// A model failed to serialise, deserialise, or pass its consistency checks.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An extraction worker process crashed or broke protocol.
    #[error("worker error: {0}")]
    Worker(String),

    /// An I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A failure in the key-value storage engine.
    #[error(transparent)]
    Storage(#[from] fjall::Error),
}

/// Result type alias for ITQ operations.
pub type Result<T> = std::result::Result<T, ItqError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A stage of model training.
pub enum Stage {
    /// Pulling descriptors out of the descriptor source.
    Extraction,
    /// Fitting the model over the extracted corpus.
    Fitting,
    /// Writing the fitted model to disk.
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Fitting => write!(f, "fitting"),
            Stage::Persistence => write!(f, "persistence"),
        }
    }
}

/// A training run which failed, along with the stage it failed in.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct TrainingFailure {
    /// The stage in which training failed.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub source: ItqError,
}

impl TrainingFailure {
    pub(crate) fn at(stage: Stage) -> impl FnOnce(ItqError) -> Self {
        move |source| Self { stage, source }
    }
}
