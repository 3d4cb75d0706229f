use super::DescriptorSource;
use crate::descriptor::DescriptorVector;
use crate::{DescriptorPrecision, ItqError, Result};
use dashmap::DashMap;

#[derive(Debug, Default)]
/// A descriptor source held entirely in memory.
///
/// Descriptors may be inserted concurrently through a shared reference.
pub struct MemorySource {
    descriptors: DashMap<String, Vec<DescriptorPrecision>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any descriptor with the same identifier.
    pub fn insert(&self, descriptor: DescriptorVector) {
        self.descriptors
            .insert(descriptor.id, descriptor.components);
    }
}

impl FromIterator<DescriptorVector> for MemorySource {
    fn from_iter<T: IntoIterator<Item = DescriptorVector>>(iter: T) -> Self {
        let source = Self::new();
        for descriptor in iter {
            source.insert(descriptor);
        }
        source
    }
}

impl DescriptorSource for MemorySource {
    fn enumerate_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.descriptors.iter().map(|x| x.key().clone()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> Result<DescriptorVector> {
        self.descriptors
            .get(id)
            .map(|x| DescriptorVector::new(id, x.value().clone()))
            .ok_or_else(|| ItqError::Lookup { id: id.to_owned() })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.descriptors.len())
    }
}
