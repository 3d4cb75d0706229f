use super::ItqModel;
use crate::{ItqError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use tracing::info;

const MAGIC: [u8; 4] = *b"ITQM";
const FORMAT_VERSION: u32 = 1;

/// The on-disk form of a model. Matrices are stored row-major as full-precision floats.
#[derive(Serialize, Deserialize)]
struct ModelRecord {
    magic: [u8; 4],
    format_version: u32,
    dimension: u64,
    bit_length: u64,
    normalize: bool,
    mean: Vec<f64>,
    projection: Vec<f64>,
    rotation: Vec<f64>,
}

fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().as_slice().to_vec()
}

fn persistence_error(context: &str) -> impl FnOnce(String) -> ItqError + '_ {
    move |e| ItqError::Persistence(format!("{context}: {e}"))
}

impl ItqModel {
    /// Serialise the model.
    ///
    /// # Returns
    ///
    /// The model as LZ4-compressed bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = ModelRecord {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            dimension: self.dimension() as u64,
            bit_length: self.bit_length() as u64,
            normalize: self.normalize(),
            mean: self.mean().iter().copied().collect(),
            projection: row_major(self.projection()),
            rotation: row_major(self.rotation()),
        };
        let mut compressor = lz4_flex::frame::FrameEncoder::new(Vec::new());
        bincode::serde::encode_into_std_write(&record, &mut compressor, bincode::config::legacy())
            .map_err(|e| e.to_string())
            .map_err(persistence_error("could not encode model"))?;
        compressor
            .finish()
            .map_err(|e| e.to_string())
            .map_err(persistence_error("could not compress model"))
    }

    /// Deserialise a model, checking it is internally consistent.
    ///
    /// # Arguments
    ///
    /// * `bytes` - A model serialised with [`ItqModel::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut decompressor = lz4_flex::frame::FrameDecoder::new(Cursor::new(bytes));
        let record: ModelRecord =
            bincode::serde::decode_from_std_read(&mut decompressor, bincode::config::legacy())
                .map_err(|e| e.to_string())
                .map_err(persistence_error("could not decode model"))?;
        if record.magic != MAGIC {
            return Err(ItqError::Persistence("not an ITQ model".to_owned()));
        }
        if record.format_version != FORMAT_VERSION {
            return Err(ItqError::Persistence(format!(
                "unsupported model format version {}",
                record.format_version
            )));
        }
        let (d, k) = (record.dimension as usize, record.bit_length as usize);
        if record.mean.len() != d
            || Some(record.projection.len()) != d.checked_mul(k)
            || Some(record.rotation.len()) != k.checked_mul(k)
        {
            return Err(ItqError::Persistence(format!(
                "model parts do not match its declared shape (d = {d}, k = {k})"
            )));
        }
        let model = ItqModel::new(
            DVector::from_vec(record.mean),
            DMatrix::from_row_slice(d, k, &record.projection),
            DMatrix::from_row_slice(k, k, &record.rotation),
            record.normalize,
        );
        model
            .check_consistency()
            .map_err(persistence_error("inconsistent model"))?;
        Ok(model)
    }

    /// Save the model to disk.
    ///
    /// # Arguments
    ///
    /// * `path` - Where to write the model.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        info!(path = %path.display(), bytes = bytes.len(), "saved ITQ model");
        Ok(())
    }

    /// Load a model from disk.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of a saved model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ItqError::Persistence(format!("no model at {}", path.display()))
            }
            _ => e.into(),
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itq::{fit, ItqParams};
    use crate::test_support::synthetic_corpus;

    fn fitted() -> ItqModel {
        fit(
            &synthetic_corpus(120, 20, 9),
            &ItqParams::new(10).with_seed(3),
        )
        .unwrap()
    }

    #[test]
    fn models_round_trip_exactly() {
        let model = fitted();
        let restored = ItqModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn models_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itq.model");
        let model = fitted();
        model.save(&path).unwrap();
        assert_eq!(ItqModel::load(&path).unwrap(), model);
    }

    #[test]
    fn missing_files_are_persistence_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = ItqModel::load(dir.path().join("absent.model"));
        assert!(matches!(result, Err(ItqError::Persistence(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            ItqModel::from_bytes(b"definitely not a model"),
            Err(ItqError::Persistence(_))
        ));
    }

    fn encode_record(record: &ModelRecord) -> Vec<u8> {
        let mut compressor = lz4_flex::frame::FrameEncoder::new(Vec::new());
        bincode::serde::encode_into_std_write(record, &mut compressor, bincode::config::legacy())
            .unwrap();
        compressor.finish().unwrap()
    }

    fn record_of(model: &ItqModel) -> ModelRecord {
        ModelRecord {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            dimension: model.dimension() as u64,
            bit_length: model.bit_length() as u64,
            normalize: model.normalize(),
            mean: model.mean().iter().copied().collect(),
            projection: row_major(model.projection()),
            rotation: row_major(model.rotation()),
        }
    }

    #[test]
    fn non_orthogonal_rotations_are_rejected() {
        let mut record = record_of(&fitted());
        record.rotation[0] += 0.01;
        let result = ItqModel::from_bytes(&encode_record(&record));
        assert!(matches!(result, Err(ItqError::Persistence(msg)) if msg.contains("orthogonal")));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut record = record_of(&fitted());
        record.bit_length += 1;
        assert!(matches!(
            ItqModel::from_bytes(&encode_record(&record)),
            Err(ItqError::Persistence(_))
        ));

        let mut record = record_of(&fitted());
        record.magic = *b"NOPE";
        assert!(matches!(
            ItqModel::from_bytes(&encode_record(&record)),
            Err(ItqError::Persistence(msg)) if msg.contains("not an ITQ model")
        ));
    }
}
