use super::{DescriptorSource, SourceConfig};
use crate::descriptor::DescriptorVector;
use crate::{DescriptorPrecision, ItqError, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::warn;

const EXTENSION: &str = "lz4";

/// The longest identifier, in UTF-8 bytes, which can be stored.
///
/// Its hexadecimal file name, with the extension, stays under the 255-byte name limit of common file systems.
pub const MAX_IDENTIFIER_BYTES: usize = 125;

/// A descriptor source storing each descriptor in its own LZ4-compressed file.
///
/// File names are the hexadecimal encoding of the identifier's UTF-8 bytes, so any identifier of up to [`MAX_IDENTIFIER_BYTES`] bytes makes a valid file name.
/// Nothing is cached in memory; every fetch reads from disk, so the directory may be shared with other processes.
#[derive(Debug, Clone)]
pub struct FileSource {
    directory: PathBuf,
}

impl FileSource {
    /// Open an existing descriptor directory.
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory holding the descriptors.
    ///
    /// # Returns
    ///
    /// A descriptor source, or a configuration error if the directory does not exist.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(ItqError::Configuration(format!(
                "descriptor directory {} does not exist",
                directory.display()
            )));
        }
        Ok(Self { directory })
    }

    /// Open a descriptor directory, creating it if it does not already exist.
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory to hold the descriptors.
    pub fn create(directory: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(directory.as_ref())?;
        Self::open(directory)
    }

    fn descriptor_path(&self, id: &str) -> Option<PathBuf> {
        (id.len() <= MAX_IDENTIFIER_BYTES).then(|| {
            self.directory
                .join(format!("{}.{}", hex::encode(id), EXTENSION))
        })
    }

    /// Save a descriptor to disk, replacing any descriptor with the same identifier.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - The descriptor to save.
    pub fn insert(&self, descriptor: &DescriptorVector) -> Result<()> {
        let path = self.descriptor_path(&descriptor.id).ok_or_else(|| {
            ItqError::Validation(format!(
                "identifier '{}' is longer than {MAX_IDENTIFIER_BYTES} bytes",
                descriptor.id
            ))
        })?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let buf = BufWriter::new(file);
        let mut compressor = lz4_flex::frame::FrameEncoder::new(buf);
        bincode::serde::encode_into_std_write(
            &descriptor.components,
            &mut compressor,
            bincode::config::legacy(),
        )
        .map_err(|e| ItqError::Io(io::Error::other(e.to_string())))?;
        let buf = compressor.finish().map_err(io::Error::from)?;
        buf.into_inner().map_err(io::IntoInnerError::into_error)?;
        Ok(())
    }
}

impl DescriptorSource for FileSource {
    fn enumerate_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|x| x.to_str()) != Some(EXTENSION) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|x| x.to_str())
                .and_then(|x| hex::decode(x).ok())
                .and_then(|x| String::from_utf8(x).ok())
            {
                Some(id) => ids.push(id),
                None => warn!(path = %path.display(), "skipping unrecognised file in descriptor directory"),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<DescriptorVector> {
        let Some(path) = self.descriptor_path(id) else {
            return Err(ItqError::Lookup { id: id.to_owned() });
        };
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ItqError::Lookup { id: id.to_owned() })
            }
            Err(e) => return Err(e.into()),
        };
        let buf = BufReader::new(file);
        let mut decompressor = lz4_flex::frame::FrameDecoder::new(buf);
        let components: Vec<DescriptorPrecision> =
            bincode::serde::decode_from_std_read(&mut decompressor, bincode::config::legacy())
                .map_err(|e| {
                    ItqError::Validation(format!("descriptor '{id}' could not be decoded: {e}"))
                })?;
        Ok(DescriptorVector::new(id, components))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.enumerate_ids()?.len())
    }

    fn isolated_config(&self) -> Option<SourceConfig> {
        Some(SourceConfig::Files {
            directory: self.directory.clone(),
        })
    }
}
