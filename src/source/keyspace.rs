use super::DescriptorSource;
use crate::descriptor::DescriptorVector;
use crate::{DescriptorPrecision, ItqError, Result};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;

pub(crate) fn default_partition() -> String {
    "descriptors".to_owned()
}

/// A descriptor source backed by a partition of an LSM-tree keyspace.
///
/// Keys are the identifiers' bytes; values are the descriptors' components.
/// A keyspace is owned by a single process, so this source cannot be handed to isolated worker processes.
#[derive(Clone)]
pub struct KeyspaceSource {
    keyspace: Keyspace,
    descriptors: PartitionHandle,
}

impl KeyspaceSource {
    /// Open a keyspace partition, creating either if they do not already exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The directory of the keyspace.
    ///
    /// * `partition` - The name of the partition holding the descriptors.
    pub fn open(path: impl AsRef<Path>, partition: &str) -> Result<Self> {
        let keyspace = fjall::Config::new(path).open()?;
        let descriptors = keyspace.open_partition(partition, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            descriptors,
        })
    }

    /// Insert descriptors, replacing any with the same identifiers, and flush them to disk.
    ///
    /// # Arguments
    ///
    /// * `descriptors` - The descriptors to insert.
    pub fn insert<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a DescriptorVector>,
    ) -> Result<()> {
        for descriptor in descriptors {
            let value =
                bincode::serde::encode_to_vec(&descriptor.components, bincode::config::legacy())
                    .map_err(|e| ItqError::Validation(e.to_string()))?;
            self.descriptors.insert(descriptor.id.as_bytes(), value)?;
        }
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

impl DescriptorSource for KeyspaceSource {
    fn enumerate_ids(&self) -> Result<Vec<String>> {
        self.descriptors
            .iter()
            .map(|kv| -> Result<String> {
                let (k, _) = kv?;
                String::from_utf8(k.to_vec()).map_err(|_| {
                    ItqError::Validation("keyspace holds a non UTF-8 identifier".to_owned())
                })
            })
            .collect()
    }

    fn fetch(&self, id: &str) -> Result<DescriptorVector> {
        let value = self
            .descriptors
            .get(id.as_bytes())?
            .ok_or_else(|| ItqError::Lookup { id: id.to_owned() })?;
        let (components, _): (Vec<DescriptorPrecision>, usize) =
            bincode::serde::decode_from_slice(&value, bincode::config::legacy()).map_err(|e| {
                ItqError::Validation(format!("descriptor '{id}' could not be decoded: {e}"))
            })?;
        Ok(DescriptorVector::new(id, components))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.descriptors.len()?)
    }
}
