use itq::config::TrainConfig;
use itq::descriptor::{DescriptorVector, TrainingCorpus};
use itq::error::Stage;
use itq::functor::ItqFunctor;
use itq::itq::{fit, ItqParams};
use itq::pipeline::ExtractionOptions;
use itq::source::json::JsonSource;
use itq::source::SourceConfig;
use itq::ItqError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

fn descriptors(count: usize, dimension: usize, seed: u64) -> Vec<DescriptorVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let components = (0..dimension)
                .map(|j| {
                    let x: f64 = StandardNormal.sample(&mut rng);
                    x * (2.0 - j as f64 / dimension as f64)
                })
                .collect();
            DescriptorVector::new(format!("descriptor-{i:03}"), components)
        })
        .collect()
}

#[test]
fn fitting_is_reproducible_and_seed_dependent() {
    let vectors = descriptors(200, 64, 2024);
    let corpus = TrainingCorpus::new(vectors.clone()).unwrap();
    let params = ItqParams::new(16).with_max_iterations(10).with_seed(42);

    let first = ItqFunctor::new(fit(&corpus, &params).unwrap());
    let second = ItqFunctor::new(fit(&corpus, &params).unwrap());
    assert_eq!(first.bit_length(), 16);
    assert_eq!(first.model(), second.model());
    assert!(first.model().orthogonality_error() < 1e-6);

    let code = first.encode(&vectors[0]).unwrap();
    assert_eq!(code.len(), 16);
    assert_eq!(first.encode(&vectors[0]).unwrap(), code);
    assert_eq!(second.encode(&vectors[0]).unwrap(), code);

    let reseeded = ItqFunctor::fit(&corpus, &params.clone().with_seed(43)).unwrap();
    let first_codes = first.encode_batch(&vectors).unwrap();
    let reseeded_codes = reseeded.encode_batch(&vectors).unwrap();
    assert!(first_codes.iter().zip(&reseeded_codes).any(|(a, b)| a != b));
}

#[test]
fn bad_fitting_requests_fail_fast() {
    let corpus = TrainingCorpus::new(descriptors(40, 8, 1)).unwrap();
    assert!(matches!(
        fit(&corpus, &ItqParams::new(9)),
        Err(ItqError::Configuration(_))
    ));
    let small = TrainingCorpus::new(descriptors(5, 8, 1)).unwrap();
    assert!(matches!(
        fit(&small, &ItqParams::new(6)),
        Err(ItqError::InsufficientData(_))
    ));
}

#[test]
fn trained_models_hash_identically_after_reloading() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor_path = dir.path().join("descriptors.json");
    let vectors = descriptors(150, 24, 9);
    JsonSource::write(&descriptor_path, &vectors).unwrap();
    let list_path = dir.path().join("ids.txt");
    let listed: Vec<&str> = vectors.iter().take(120).map(|x| x.id.as_str()).collect();
    std::fs::write(&list_path, listed.join("\n")).unwrap();

    let config = TrainConfig {
        itq: ItqParams::new(12).with_seed(5),
        identifier_list_path: Some(list_path),
        descriptor_source: SourceConfig::Json {
            path: descriptor_path,
        },
        parallel: ExtractionOptions {
            worker_count: 4,
            use_process_workers: false,
            worker_program: None,
        },
        model_path: dir.path().join("itq.model"),
    };
    let trained = itq::train::train_and_save(&config).unwrap();
    let loaded = ItqFunctor::load(&config.model_path).unwrap();

    assert_eq!(loaded.model(), trained.model());
    assert_eq!(
        loaded.encode_batch(&vectors).unwrap(),
        trained.encode_batch(&vectors).unwrap()
    );
}

#[test]
fn missing_identifiers_fail_training_at_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor_path = dir.path().join("descriptors.json");
    JsonSource::write(&descriptor_path, &descriptors(30, 6, 4)).unwrap();
    let list_path = dir.path().join("ids.txt");
    std::fs::write(&list_path, "descriptor-001\ndescriptor-999\n").unwrap();

    let mut config = TrainConfig::default();
    config.itq = ItqParams::new(2).with_seed(1);
    config.identifier_list_path = Some(list_path);
    config.descriptor_source = SourceConfig::Json {
        path: descriptor_path,
    };
    config.parallel.use_process_workers = false;
    config.model_path = dir.path().join("itq.model");

    let failure = itq::train::train_and_save(&config).unwrap_err();
    assert_eq!(failure.stage, Stage::Extraction);
    assert!(matches!(failure.source, ItqError::Lookup { ref id } if id == "descriptor-999"));
    assert!(!config.model_path.exists());
}
