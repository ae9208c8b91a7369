//! In-memory registry of built index structures
//!
//! One registry holds every structure built for every dataset, keyed by
//! (dataset, structure type). Callers reach a structure through the
//! registry instead of through globals, so tests and embedders can run
//! several isolated engine instances side by side.

use std::collections::HashMap;

use thiserror::Error;

use super::{AnyIndex, StructureType};

/// Registry lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No structure of this type is registered for the dataset
    #[error("no {structure} structure registered for dataset '{dataset}'")]
    StructureNotFound {
        /// Dataset name used in the lookup
        dataset: String,
        /// Structure type tag used in the lookup
        structure: &'static str,
    },
}

/// Holds built index structures, keyed by dataset and structure type.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    indexes: HashMap<(String, StructureType), AnyIndex>,
}

impl StructureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a structure for a dataset, replacing any previous
    /// structure of the same type.
    pub fn register(&mut self, dataset: &str, index: AnyIndex) -> Option<AnyIndex> {
        self.indexes
            .insert((dataset.to_string(), index.structure_type()), index)
    }

    /// Looks up a structure.
    pub fn get(&self, dataset: &str, structure: StructureType) -> Result<&AnyIndex, RegistryError> {
        self.indexes
            .get(&(dataset.to_string(), structure))
            .ok_or_else(|| RegistryError::StructureNotFound {
                dataset: dataset.to_string(),
                structure: structure.as_str(),
            })
    }

    /// Looks up a structure for mutation (bulk-load phase).
    pub fn get_mut(
        &mut self,
        dataset: &str,
        structure: StructureType,
    ) -> Result<&mut AnyIndex, RegistryError> {
        self.indexes
            .get_mut(&(dataset.to_string(), structure))
            .ok_or_else(|| RegistryError::StructureNotFound {
                dataset: dataset.to_string(),
                structure: structure.as_str(),
            })
    }

    /// Removes and returns a structure, if registered.
    pub fn remove(&mut self, dataset: &str, structure: StructureType) -> Option<AnyIndex> {
        self.indexes.remove(&(dataset.to_string(), structure))
    }

    /// Structure types registered for a dataset, in [`StructureType::ALL`]
    /// order.
    pub fn structures_for(&self, dataset: &str) -> Vec<StructureType> {
        StructureType::ALL
            .into_iter()
            .filter(|&s| self.indexes.contains_key(&(dataset.to_string(), s)))
            .collect()
    }

    /// Every dataset with at least one registered structure, sorted.
    pub fn datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.keys().map(|(d, _)| d.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Total number of registered structures.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
