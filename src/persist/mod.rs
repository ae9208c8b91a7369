//! Durable storage for index structures
//!
//! Each saved index is one JSON artifact named
//! `{dataset}_{structure}_index.json` under the base directory. The
//! artifact is an envelope: format version, dataset, structure tag,
//! creation timestamp, a CRC32 over the canonical payload rendering,
//! and the flattened snapshot itself. A missing artifact and a corrupt
//! one are different conditions and surface as different errors.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::filter::RatingIndex;
use crate::hashmap::BucketMap;
use crate::observability::Logger;
use crate::prefix::{CharTrie, DigitTrie, PrefixIndex, SortedArrayIndex, TernarySearchTree};
use crate::tree::{AvlTree, BinarySearchTree, RedBlackTree};

pub mod errors;
pub mod registry;
pub mod snapshot;

use errors::{PersistError, PersistResult};
use snapshot::IndexSnapshot;

/// Envelope format version written into every artifact.
pub const FORMAT_VERSION: u32 = 1;

/// The eight persistable structure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    /// Unbalanced binary search tree
    Bst,
    /// AVL tree
    Avl,
    /// Red-Black tree
    RedBlack,
    /// Digit trie over rating keys
    DigitTrie,
    /// Character trie over name keys
    CharTrie,
    /// Ternary search tree over name keys
    Tst,
    /// Sorted-array name index
    SortedArray,
    /// Bucket hash map over rating keys
    HashMap,
}

impl StructureType {
    /// Every structure type, in a fixed order.
    pub const ALL: [StructureType; 8] = [
        StructureType::Bst,
        StructureType::Avl,
        StructureType::RedBlack,
        StructureType::DigitTrie,
        StructureType::CharTrie,
        StructureType::Tst,
        StructureType::SortedArray,
        StructureType::HashMap,
    ];

    /// The tag used in artifact names and envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::Bst => "bst",
            StructureType::Avl => "avl",
            StructureType::RedBlack => "red_black",
            StructureType::DigitTrie => "digit_trie",
            StructureType::CharTrie => "char_trie",
            StructureType::Tst => "tst",
            StructureType::SortedArray => "sorted_array",
            StructureType::HashMap => "hash_map",
        }
    }
}

impl std::fmt::Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Any index structure, behind one persistable surface.
///
/// The persistence layer and registry hold indexes through this enum so
/// they never depend on concrete node shapes.
#[derive(Debug)]
pub enum AnyIndex {
    /// Unbalanced binary search tree
    Bst(BinarySearchTree),
    /// AVL tree
    Avl(AvlTree),
    /// Red-Black tree
    RedBlack(RedBlackTree),
    /// Digit trie over rating keys
    DigitTrie(DigitTrie),
    /// Character trie over name keys
    CharTrie(CharTrie),
    /// Ternary search tree over name keys
    Tst(TernarySearchTree),
    /// Sorted-array name index
    SortedArray(SortedArrayIndex),
    /// Bucket hash map over rating keys
    HashMap(BucketMap),
}

impl AnyIndex {
    /// The structure type of the wrapped index.
    pub fn structure_type(&self) -> StructureType {
        match self {
            AnyIndex::Bst(_) => StructureType::Bst,
            AnyIndex::Avl(_) => StructureType::Avl,
            AnyIndex::RedBlack(_) => StructureType::RedBlack,
            AnyIndex::DigitTrie(_) => StructureType::DigitTrie,
            AnyIndex::CharTrie(_) => StructureType::CharTrie,
            AnyIndex::Tst(_) => StructureType::Tst,
            AnyIndex::SortedArray(_) => StructureType::SortedArray,
            AnyIndex::HashMap(_) => StructureType::HashMap,
        }
    }

    /// Number of stored records.
    pub fn get_size(&self) -> usize {
        match self {
            AnyIndex::Bst(index) => index.get_size(),
            AnyIndex::Avl(index) => index.get_size(),
            AnyIndex::RedBlack(index) => index.get_size(),
            AnyIndex::DigitTrie(index) => index.get_size(),
            AnyIndex::CharTrie(index) => index.get_size(),
            AnyIndex::Tst(index) => index.get_size(),
            AnyIndex::SortedArray(index) => index.get_size(),
            AnyIndex::HashMap(index) => index.get_size(),
        }
    }

    /// The rating-keyed query surface, when this structure has one.
    pub fn as_rating_index(&self) -> Option<&dyn RatingIndex> {
        match self {
            AnyIndex::Bst(index) => Some(index),
            AnyIndex::Avl(index) => Some(index),
            AnyIndex::RedBlack(index) => Some(index),
            AnyIndex::DigitTrie(index) => Some(index),
            AnyIndex::HashMap(index) => Some(index),
            AnyIndex::CharTrie(_) | AnyIndex::Tst(_) | AnyIndex::SortedArray(_) => None,
        }
    }

    /// The name-keyed prefix surface, when this structure has one.
    pub fn as_prefix_index(&self) -> Option<&dyn PrefixIndex> {
        match self {
            AnyIndex::CharTrie(index) => Some(index),
            AnyIndex::Tst(index) => Some(index),
            AnyIndex::SortedArray(index) => Some(index),
            _ => None,
        }
    }

    /// Flattens the wrapped index for persistence.
    pub fn to_snapshot(&self) -> PersistResult<IndexSnapshot> {
        Ok(match self {
            AnyIndex::Bst(index) => IndexSnapshot::Bst(index.to_snapshot()?),
            AnyIndex::Avl(index) => IndexSnapshot::Avl(index.to_snapshot()?),
            AnyIndex::RedBlack(index) => IndexSnapshot::RedBlack(index.to_snapshot()?),
            AnyIndex::DigitTrie(index) => IndexSnapshot::DigitTrie(index.to_snapshot()?),
            AnyIndex::CharTrie(index) => IndexSnapshot::CharTrie(index.to_snapshot()?),
            AnyIndex::Tst(index) => IndexSnapshot::Tst(index.to_snapshot()?),
            AnyIndex::SortedArray(index) => IndexSnapshot::SortedArray(index.to_snapshot()?),
            AnyIndex::HashMap(index) => IndexSnapshot::HashMap(index.to_snapshot()?),
        })
    }

    /// Rebuilds the concrete index from a validated snapshot.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> PersistResult<Self> {
        Ok(match snapshot {
            IndexSnapshot::Bst(s) => AnyIndex::Bst(BinarySearchTree::from_snapshot(s)?),
            IndexSnapshot::Avl(s) => AnyIndex::Avl(AvlTree::from_snapshot(s)?),
            IndexSnapshot::RedBlack(s) => AnyIndex::RedBlack(RedBlackTree::from_snapshot(s)?),
            IndexSnapshot::DigitTrie(s) => AnyIndex::DigitTrie(DigitTrie::from_snapshot(s)?),
            IndexSnapshot::CharTrie(s) => AnyIndex::CharTrie(CharTrie::from_snapshot(s)?),
            IndexSnapshot::Tst(s) => AnyIndex::Tst(TernarySearchTree::from_snapshot(s)?),
            IndexSnapshot::SortedArray(s) => {
                AnyIndex::SortedArray(SortedArrayIndex::from_snapshot(s)?)
            }
            IndexSnapshot::HashMap(s) => AnyIndex::HashMap(BucketMap::from_snapshot(s)?),
        })
    }
}

/// On-disk artifact envelope wrapping a flattened snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    /// Envelope format version
    pub format_version: u32,
    /// Dataset the index was built from
    pub dataset: String,
    /// Structure type tag
    pub structure_type: StructureType,
    /// RFC3339 creation timestamp
    pub created_at: String,
    /// CRC32 over the canonical payload rendering, `crc32:xxxxxxxx`
    pub checksum: String,
    /// The flattened index
    pub payload: IndexSnapshot,
}

/// One artifact found on disk by [`PersistenceManager::list_saved`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    /// Dataset name parsed from the artifact filename
    pub dataset: String,
    /// Structure type parsed from the artifact filename
    pub structure: StructureType,
    /// Full path to the artifact
    pub path: PathBuf,
}

/// Computes the envelope checksum over a canonical payload rendering.
///
/// The payload is re-serialized through `serde_json::Value`, whose maps
/// order keys deterministically, so the checksum is stable across
/// field-order differences in the file.
fn payload_checksum(payload: &IndexSnapshot) -> PersistResult<String> {
    let canonical = serde_json::to_value(payload)
        .map_err(|e| PersistError::Encode(e.to_string()))?
        .to_string();
    let mut hasher = Hasher::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("crc32:{:08x}", hasher.finalize()))
}

fn artifact_file_name(dataset: &str, structure: StructureType) -> String {
    format!("{}_{}_index.json", dataset, structure.as_str())
}

/// Parses `{dataset}_{structure}_index.json` back into its parts.
///
/// Matching is by structure-name suffix, so dataset names containing
/// underscores parse correctly.
fn parse_artifact_file_name(name: &str) -> Option<(String, StructureType)> {
    let stem = name.strip_suffix("_index.json")?;
    StructureType::ALL.iter().find_map(|&structure| {
        let dataset = stem.strip_suffix(structure.as_str())?;
        let dataset = dataset.strip_suffix('_')?;
        if dataset.is_empty() {
            return None;
        }
        Some((dataset.to_string(), structure))
    })
}

fn fsync_dir(path: &Path) -> PersistResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| PersistError::io(format!("open directory {}", path.display()), e))?;
    dir.sync_all()
        .map_err(|e| PersistError::io(format!("fsync directory {}", path.display()), e))
}

/// Saves and restores index artifacts under one base directory.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    base_dir: PathBuf,
}

impl PersistenceManager {
    /// Creates a manager rooted at `base_dir`. The directory is created
    /// on the first save, not here.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The directory artifacts are written into.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full path of the artifact for one (dataset, structure) pair.
    pub fn artifact_path(&self, dataset: &str, structure: StructureType) -> PathBuf {
        self.base_dir.join(artifact_file_name(dataset, structure))
    }

    /// Flattens an index and writes its artifact, fsyncing the file and
    /// the directory. Returns the artifact path.
    pub fn save(&self, dataset: &str, index: &AnyIndex) -> PersistResult<PathBuf> {
        let structure = index.structure_type();
        let payload = index.to_snapshot()?;
        let checksum = payload_checksum(&payload)?;

        let envelope = ArtifactEnvelope {
            format_version: FORMAT_VERSION,
            dataset: dataset.to_string(),
            structure_type: structure,
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            checksum,
            payload,
        };

        fs::create_dir_all(&self.base_dir).map_err(|e| {
            PersistError::io(format!("create directory {}", self.base_dir.display()), e)
        })?;

        let path = self.artifact_path(dataset, structure);
        let body = serde_json::to_string_pretty(&envelope)
            .map_err(|e| PersistError::Encode(e.to_string()))?;

        let mut file = File::create(&path)
            .map_err(|e| PersistError::io(format!("create {}", path.display()), e))?;
        file.write_all(body.as_bytes())
            .map_err(|e| PersistError::io(format!("write {}", path.display()), e))?;
        file.sync_all()
            .map_err(|e| PersistError::io(format!("fsync {}", path.display()), e))?;
        fsync_dir(&self.base_dir)?;

        Logger::info(
            "INDEX_SAVED",
            &[
                ("dataset", dataset),
                ("structure", structure.as_str()),
                ("records", &index.get_size().to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(path)
    }

    /// Loads one artifact and rebuilds its index.
    ///
    /// An absent artifact is [`PersistError::Missing`]; everything else
    /// that prevents a faithful rebuild (bad JSON, version or structure
    /// mismatch, checksum failure, invalid node graph) is
    /// [`PersistError::Corrupt`].
    pub fn load(&self, dataset: &str, structure: StructureType) -> PersistResult<AnyIndex> {
        let path = self.artifact_path(dataset, structure);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistError::Missing {
                    dataset: dataset.to_string(),
                    structure: structure.as_str(),
                });
            }
            Err(e) => return Err(PersistError::io(format!("read {}", path.display()), e)),
        };

        let envelope: ArtifactEnvelope = serde_json::from_str(&body).map_err(|e| {
            PersistError::corrupt(format!("artifact {} is not valid JSON: {}", path.display(), e))
        })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(PersistError::corrupt(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        if envelope.structure_type != structure {
            return Err(PersistError::corrupt(format!(
                "artifact declares structure {}, expected {}",
                envelope.structure_type, structure
            )));
        }
        let expected = payload_checksum(&envelope.payload)?;
        if envelope.checksum != expected {
            Logger::warn(
                "INDEX_CHECKSUM_MISMATCH",
                &[
                    ("dataset", dataset),
                    ("structure", structure.as_str()),
                    ("stored", &envelope.checksum),
                    ("computed", &expected),
                ],
            );
            return Err(PersistError::corrupt(format!(
                "checksum mismatch: stored {}, computed {}",
                envelope.checksum, expected
            )));
        }

        let index = AnyIndex::from_snapshot(envelope.payload)?;
        Logger::info(
            "INDEX_LOADED",
            &[
                ("dataset", dataset),
                ("structure", structure.as_str()),
                ("records", &index.get_size().to_string()),
            ],
        );
        Ok(index)
    }

    /// Loads several structures for one dataset, in the order given.
    /// Fails on the first missing or corrupt artifact.
    pub fn load_many(
        &self,
        dataset: &str,
        structures: &[StructureType],
    ) -> PersistResult<Vec<AnyIndex>> {
        structures
            .iter()
            .map(|&structure| self.load(dataset, structure))
            .collect()
    }

    /// Lists every artifact in the base directory whose name parses as
    /// `{dataset}_{structure}_index.json`. Other files are ignored. An
    /// absent base directory lists as empty.
    pub fn list_saved(&self) -> PersistResult<Vec<SavedArtifact>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistError::io(
                    format!("read directory {}", self.base_dir.display()),
                    e,
                ))
            }
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                PersistError::io(format!("read directory {}", self.base_dir.display()), e)
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((dataset, structure)) = parse_artifact_file_name(name) {
                artifacts.push(SavedArtifact {
                    dataset,
                    structure,
                    path,
                });
            }
        }

        artifacts.sort_by(|a, b| {
            (a.dataset.as_str(), a.structure.as_str())
                .cmp(&(b.dataset.as_str(), b.structure.as_str()))
        });
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_bst() -> AnyIndex {
        let mut tree = BinarySearchTree::new();
        for &r in &[5.0, 3.0, 3.0, 4.5, 1.0] {
            tree.insert(r, json!({"overall_rating": r})).unwrap();
        }
        AnyIndex::Bst(tree)
    }

    #[test]
    fn test_artifact_name_roundtrip() {
        let name = artifact_file_name("airlines", StructureType::RedBlack);
        assert_eq!(name, "airlines_red_black_index.json");
        assert_eq!(
            parse_artifact_file_name(&name),
            Some(("airlines".to_string(), StructureType::RedBlack))
        );
    }

    #[test]
    fn test_artifact_name_with_underscored_dataset() {
        let name = artifact_file_name("skytrax_2024", StructureType::Tst);
        assert_eq!(
            parse_artifact_file_name(&name),
            Some(("skytrax_2024".to_string(), StructureType::Tst))
        );
    }

    #[test]
    fn test_unrelated_file_names_ignored() {
        assert_eq!(parse_artifact_file_name("notes.txt"), None);
        assert_eq!(parse_artifact_file_name("_bst_index.json"), None);
        assert_eq!(parse_artifact_file_name("airlines_bogus_index.json"), None);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());

        let index = sample_bst();
        let path = manager.save("airlines", &index).unwrap();
        assert!(path.exists());

        let loaded = manager.load("airlines", StructureType::Bst).unwrap();
        assert_eq!(loaded.get_size(), 5);
        let rating_index = loaded.as_rating_index().unwrap();
        assert_eq!(rating_index.search(3.0).len(), 2);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        assert!(matches!(
            manager.load("airlines", StructureType::Avl),
            Err(PersistError::Missing { .. })
        ));
    }

    #[test]
    fn test_load_rejects_tampered_payload() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        let path = manager.save("airlines", &sample_bst()).unwrap();

        // Flip one rating inside the payload without updating the checksum
        let body = fs::read_to_string(&path).unwrap();
        let tampered = body.replacen("4.5", "9.9", 1);
        assert_ne!(body, tampered);
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            manager.load("airlines", StructureType::Bst),
            Err(PersistError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_rejects_non_json() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        let path = manager.artifact_path("airlines", StructureType::Bst);
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&path, b"not json at all").unwrap();

        assert!(matches!(
            manager.load("airlines", StructureType::Bst),
            Err(PersistError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_rejects_structure_mismatch() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        let saved = manager.save("airlines", &sample_bst()).unwrap();

        // Present a BST artifact under the AVL artifact name
        let avl_path = manager.artifact_path("airlines", StructureType::Avl);
        fs::copy(&saved, &avl_path).unwrap();

        assert!(matches!(
            manager.load("airlines", StructureType::Avl),
            Err(PersistError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_list_saved() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        assert!(manager.list_saved().unwrap().is_empty());

        manager.save("airlines", &sample_bst()).unwrap();
        let mut map = BucketMap::new();
        map.insert(4.5, json!({"overall_rating": 4.5})).unwrap();
        manager.save("airlines", &AnyIndex::HashMap(map)).unwrap();
        fs::write(dir.path().join("README.txt"), b"ignored").unwrap();

        let artifacts = manager.list_saved().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].structure, StructureType::Bst);
        assert_eq!(artifacts[1].structure, StructureType::HashMap);
        assert!(artifacts.iter().all(|a| a.dataset == "airlines"));
    }

    #[test]
    fn test_every_structure_roundtrips_through_any_index() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());

        let mut avl = AvlTree::new();
        avl.insert(4.5, json!({"overall_rating": 4.5})).unwrap();
        let mut rbt = RedBlackTree::new();
        rbt.insert(4.5, json!({"overall_rating": 4.5})).unwrap();
        let mut digit = DigitTrie::new();
        digit.insert(4.5, json!({"overall_rating": 4.5})).unwrap();
        let mut chars = CharTrie::new();
        chars.insert("delta", json!({"name": "delta"})).unwrap();
        let mut tst = TernarySearchTree::new();
        tst.insert("delta", json!({"name": "delta"})).unwrap();
        let mut sorted = SortedArrayIndex::new();
        sorted.insert("delta", json!({"name": "delta"})).unwrap();
        let mut map = BucketMap::new();
        map.insert(4.5, json!({"overall_rating": 4.5})).unwrap();

        let indexes = vec![
            sample_bst(),
            AnyIndex::Avl(avl),
            AnyIndex::RedBlack(rbt),
            AnyIndex::DigitTrie(digit),
            AnyIndex::CharTrie(chars),
            AnyIndex::Tst(tst),
            AnyIndex::SortedArray(sorted),
            AnyIndex::HashMap(map),
        ];

        for index in &indexes {
            manager.save("sample", index).unwrap();
        }
        for index in &indexes {
            let loaded = manager.load("sample", index.structure_type()).unwrap();
            assert_eq!(loaded.structure_type(), index.structure_type());
            assert_eq!(loaded.get_size(), index.get_size());
        }
        assert_eq!(manager.list_saved().unwrap().len(), 8);
    }

    #[test]
    fn test_load_many_stops_at_first_missing() {
        let dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(dir.path());
        manager.save("airlines", &sample_bst()).unwrap();

        let loaded = manager
            .load_many("airlines", &[StructureType::Bst])
            .unwrap();
        assert_eq!(loaded.len(), 1);

        assert!(matches!(
            manager.load_many("airlines", &[StructureType::Bst, StructureType::Avl]),
            Err(PersistError::Missing { .. })
        ));
    }
}
