use super::{DescriptorSource, SourceConfig};
use crate::descriptor::DescriptorVector;
use crate::{DescriptorPrecision, ItqError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A descriptor source read from a JSON document of the form `{ "<id>": [<component>, ...] }`.
///
/// The whole document is loaded into memory when the source is opened.
#[derive(Debug)]
pub struct JsonSource {
    path: PathBuf,
    descriptors: BTreeMap<String, Vec<DescriptorPrecision>>,
}

impl JsonSource {
    /// Load a JSON descriptor document.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path)?);
        let descriptors = serde_json::from_reader(reader).map_err(|e| {
            ItqError::Configuration(format!(
                "could not read descriptors from {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { path, descriptors })
    }

    /// Write descriptors to a JSON document which can later be opened as a source.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the document to create.
    ///
    /// * `descriptors` - The descriptors to write.
    pub fn write<'a>(
        path: impl AsRef<Path>,
        descriptors: impl IntoIterator<Item = &'a DescriptorVector>,
    ) -> Result<()> {
        let map: BTreeMap<&str, &Vec<DescriptorPrecision>> = descriptors
            .into_iter()
            .map(|x| (x.id.as_str(), &x.components))
            .collect();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &map)
            .map_err(|e| ItqError::Io(std::io::Error::other(e)))?;
        writer.flush()?;
        Ok(())
    }
}

impl DescriptorSource for JsonSource {
    fn enumerate_ids(&self) -> Result<Vec<String>> {
        Ok(self.descriptors.keys().cloned().collect())
    }

    fn fetch(&self, id: &str) -> Result<DescriptorVector> {
        self.descriptors
            .get(id)
            .map(|x| DescriptorVector::new(id, x.clone()))
            .ok_or_else(|| ItqError::Lookup { id: id.to_owned() })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.descriptors.len())
    }

    fn isolated_config(&self) -> Option<SourceConfig> {
        Some(SourceConfig::Json {
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_documents_can_be_opened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptors.json");
        let descriptors = vec![
            DescriptorVector::new("x", vec![0.1, -2.5]),
            DescriptorVector::new("y", vec![1.0 / 3.0, 7.0]),
        ];
        JsonSource::write(&path, &descriptors).unwrap();

        let source = JsonSource::open(&path).unwrap();
        assert_eq!(source.count().unwrap(), 2);
        assert_eq!(source.enumerate_ids().unwrap(), vec!["x", "y"]);
        assert_eq!(source.fetch("y").unwrap(), descriptors[1]);
        assert!(matches!(source.fetch("z"), Err(ItqError::Lookup { .. })));
        assert_eq!(
            source.isolated_config(),
            Some(SourceConfig::Json { path })
        );
    }

    #[test]
    fn malformed_documents_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptors.json");
        std::fs::write(&path, r#"{ "x": "not a vector" }"#).unwrap();
        assert!(matches!(
            JsonSource::open(&path),
            Err(ItqError::Configuration(_))
        ));
    }
}
