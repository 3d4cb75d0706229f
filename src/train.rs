use crate::config::TrainConfig;
use crate::descriptor::TrainingCorpus;
use crate::error::{Stage, TrainingFailure};
use crate::functor::ItqFunctor;
use crate::itq::{self, ItqModel, ItqParams};
use crate::pipeline::{self, ExtractionOptions};
use crate::source::DescriptorSource;
use crate::Result;
use std::path::Path;
use tracing::info;

/// Something which fits a model over a training corpus.
pub trait Fitter {
    /// The fitted model.
    type Model;

    /// Fit a model.
    ///
    /// # Arguments
    ///
    /// * `corpus` - The training corpus.
    fn fit(&self, corpus: &TrainingCorpus) -> Result<Self::Model>;
}

impl Fitter for ItqParams {
    type Model = ItqModel;
    fn fit(&self, corpus: &TrainingCorpus) -> Result<ItqModel> {
        itq::fit(corpus, self)
    }
}

/// Extract a training corpus and fit a model over it.
///
/// Nothing is fitted unless every descriptor is extracted.
///
/// # Arguments
///
/// * `list_path` - A file listing the identifiers to train on. If absent, every descriptor in the source is used.
///
/// * `source` - The descriptor source.
///
/// * `options` - How descriptors are extracted.
///
/// * `fitter` - What to fit over the extracted corpus.
///
/// # Returns
///
/// The fitted model, or the error which stopped training along with the stage it occurred in.
pub fn train<F: Fitter>(
    list_path: Option<&Path>,
    source: &dyn DescriptorSource,
    options: &ExtractionOptions,
    fitter: &F,
) -> std::result::Result<F::Model, TrainingFailure> {
    let corpus = pipeline::resolve_ids(list_path, source)
        .and_then(|ids| pipeline::extract(ids, source, options))
        .map_err(TrainingFailure::at(Stage::Extraction))?;
    info!(
        descriptors = corpus.len(),
        dimension = corpus.dimension(),
        "extracted training corpus"
    );
    fitter
        .fit(&corpus)
        .map_err(TrainingFailure::at(Stage::Fitting))
}

/// Train a model as configured, then save it.
///
/// # Arguments
///
/// * `config` - The training configuration.
///
/// # Returns
///
/// A hash functor wrapping the saved model.
pub fn train_and_save(config: &TrainConfig) -> std::result::Result<ItqFunctor, TrainingFailure> {
    config
        .itq
        .validate()
        .map_err(TrainingFailure::at(Stage::Fitting))?;
    let source = config
        .descriptor_source
        .open()
        .map_err(TrainingFailure::at(Stage::Extraction))?;
    let model = train(
        config.identifier_list_path.as_deref(),
        source.as_ref(),
        &config.parallel,
        &config.itq,
    )?;
    let functor = ItqFunctor::new(model);
    functor
        .save(&config.model_path)
        .map_err(TrainingFailure::at(Stage::Persistence))?;
    Ok(functor)
}
