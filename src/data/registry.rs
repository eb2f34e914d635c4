use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A registry that cannot be built. Raised before any backing file is touched.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("group '{group}' declares no features")]
    EmptyGroup { group: String },

    #[error("group '{group}' exposes feature '{feature}' more than once")]
    DuplicateFeature { group: String, feature: String },

    #[error("group '{group}' maps more than one feature to source key '{key}'")]
    DuplicateKey { group: String, key: String },

    #[error("group '{group}': rename entry '{feature}' is not one of its features")]
    DanglingRename { group: String, feature: String },

    #[error("group '{group}': {npz_keys} npz_keys but {output_keys} output_keys")]
    KeyCountMismatch {
        group: String,
        npz_keys: usize,
        output_keys: usize,
    },

    #[error("reading registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing registry file: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// FeatureTable – exposed name → source key, in canonical order
// ---------------------------------------------------------------------------

/// Ordered one-to-one mapping from exposed feature names to the key stored
/// in the backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
    entries: Vec<(String, String)>,
}

impl FeatureTable {
    /// Build a table from `(exposed, source_key)` pairs.
    pub fn new<I, A, B>(group: &str, pairs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(a, b)| (a.into(), b.into()))
            .collect();

        if entries.is_empty() {
            return Err(RegistryError::EmptyGroup {
                group: group.to_string(),
            });
        }

        let mut names = BTreeSet::new();
        let mut keys = BTreeSet::new();
        for (name, key) in &entries {
            if !names.insert(name.as_str()) {
                return Err(RegistryError::DuplicateFeature {
                    group: group.to_string(),
                    feature: name.clone(),
                });
            }
            if !keys.insert(key.as_str()) {
                return Err(RegistryError::DuplicateKey {
                    group: group.to_string(),
                    key: key.clone(),
                });
            }
        }

        Ok(FeatureTable { entries })
    }

    /// Table where every feature is stored under its own name.
    pub fn identity<I, S>(group: &str, names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            group,
            names.into_iter().map(|n| {
                let n = n.into();
                (n.clone(), n)
            }),
        )
    }

    /// Exposed names in canonical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Source key for an exposed name.
    pub fn key_for(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, k)| k.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key_for(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// GroupSpec – how one group of features is stored
// ---------------------------------------------------------------------------

/// Backing file and loading strategy for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// A pickled dict; features are looked up by key.
    Record { file: PathBuf, features: FeatureTable },
    /// An `.npz` archive of named arrays.
    Archive { file: PathBuf, features: FeatureTable },
}

impl GroupSpec {
    pub fn record<I, S>(group: &str, file: impl Into<PathBuf>, names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(GroupSpec::Record {
            file: file.into(),
            features: FeatureTable::identity(group, names)?,
        })
    }

    pub fn archive<I, A, B>(group: &str, file: impl Into<PathBuf>, pairs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Ok(GroupSpec::Archive {
            file: file.into(),
            features: FeatureTable::new(group, pairs)?,
        })
    }

    pub fn file(&self) -> &Path {
        match self {
            GroupSpec::Record { file, .. } | GroupSpec::Archive { file, .. } => file,
        }
    }

    pub fn features(&self) -> &FeatureTable {
        match self {
            GroupSpec::Record { features, .. } | GroupSpec::Archive { features, .. } => features,
        }
    }

    pub fn loader_name(&self) -> &'static str {
        match self {
            GroupSpec::Record { .. } => "pickle",
            GroupSpec::Archive { .. } => "numpy_npz",
        }
    }
}

// ---------------------------------------------------------------------------
// Registry – dataset → group → GroupSpec
// ---------------------------------------------------------------------------

/// Read-only catalogue of every dataset the resolver knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    datasets: BTreeMap<String, BTreeMap<String, GroupSpec>>,
}

impl Registry {
    /// The `Data4` survey layout.
    pub fn builtin() -> Self {
        // Static tables; the constructors only fail on duplicate or empty lists.
        let raw = GroupSpec::Record {
            file: PathBuf::from("Data4/transcription_areas.pkl"),
            features: static_table(&[
                ("word_name", "word_name"),
                ("area", "area"),
                ("slice", "slice"),
                ("slices", "slices"),
                ("coords", "coords"),
                ("initial", "initial"),
                ("final", "final"),
                ("tone", "tone"),
            ]),
        };
        let distances = GroupSpec::Archive {
            file: PathBuf::from("Data4/distance_matrices.npz"),
            features: static_table(&[
                ("initials_distance", "initials"),
                ("finals_distance", "finals"),
                ("tones_distance", "tones"),
                ("overall_distance", "overall"),
            ]),
        };
        let info = GroupSpec::Record {
            file: PathBuf::from("Data4/processed_info.pkl"),
            features: static_table(&[
                ("areas", "areas"),
                ("slice", "slice"),
                ("slices", "slices"),
                ("coords", "coords"),
                ("word_names", "word_names"),
            ]),
        };

        let groups = BTreeMap::from([
            ("raw".to_string(), raw),
            ("distance_matrices".to_string(), distances),
            ("info".to_string(), info),
        ]);
        Registry {
            datasets: BTreeMap::from([("Data4".to_string(), groups)]),
        }
    }

    /// Add (or replace) a group. Specs are validated on construction.
    pub fn with_group(mut self, dataset: &str, group: &str, spec: GroupSpec) -> Self {
        self.datasets
            .entry(dataset.to_string())
            .or_default()
            .insert(group.to_string(), spec);
        self
    }

    /// Load a registry description from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let raw: RegistryFile = serde_json::from_reader(reader)?;
        let mut registry = Registry::default();
        for (dataset, groups) in raw.datasets {
            let mut built = BTreeMap::new();
            for (group, cfg) in groups {
                let spec = cfg.into_spec(&group)?;
                built.insert(group, spec);
            }
            registry.datasets.insert(dataset, built);
        }
        Ok(registry)
    }

    pub fn dataset(&self, name: &str) -> Option<&BTreeMap<String, GroupSpec>> {
        self.datasets.get(name)
    }

    pub fn group(&self, dataset: &str, group: &str) -> Option<&GroupSpec> {
        self.datasets.get(dataset)?.get(group)
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn group_names(&self, dataset: &str) -> Vec<&str> {
        self.datasets
            .get(dataset)
            .map(|groups| groups.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

fn static_table(pairs: &[(&str, &str)]) -> FeatureTable {
    FeatureTable {
        entries: pairs
            .iter()
            .map(|(n, k)| (n.to_string(), k.to_string()))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// On-disk registry format
// ---------------------------------------------------------------------------

/// Registry JSON:
///
/// ```json
/// {
///   "datasets": {
///     "Data4": {
///       "raw": { "loader": "pickle", "file": "Data4/transcription_areas.pkl",
///                "pkl_keys": ["word_name", "initial"], "rename": { "initial": "initials" } },
///       "distance_matrices": { "loader": "numpy_npz", "file": "Data4/distance_matrices.npz",
///                "npz_keys": ["initials"], "output_keys": ["initials_distance"] }
///     }
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    datasets: BTreeMap<String, BTreeMap<String, GroupConfig>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loader", rename_all = "snake_case", deny_unknown_fields)]
enum GroupConfig {
    Pickle {
        file: PathBuf,
        pkl_keys: Vec<String>,
        /// Exposed name → key stored in the pickle, when they differ.
        #[serde(default)]
        rename: BTreeMap<String, String>,
    },
    NumpyNpz {
        file: PathBuf,
        npz_keys: Vec<String>,
        output_keys: Vec<String>,
    },
}

impl GroupConfig {
    fn into_spec(self, group: &str) -> Result<GroupSpec, RegistryError> {
        match self {
            GroupConfig::Pickle {
                file,
                pkl_keys,
                mut rename,
            } => {
                let pairs: Vec<(String, String)> = pkl_keys
                    .into_iter()
                    .map(|name| {
                        let key = rename.remove(&name).unwrap_or_else(|| name.clone());
                        (name, key)
                    })
                    .collect();
                if let Some(feature) = rename.into_keys().next() {
                    return Err(RegistryError::DanglingRename {
                        group: group.to_string(),
                        feature,
                    });
                }
                Ok(GroupSpec::Record {
                    file,
                    features: FeatureTable::new(group, pairs)?,
                })
            }
            GroupConfig::NumpyNpz {
                file,
                npz_keys,
                output_keys,
            } => {
                if npz_keys.len() != output_keys.len() {
                    return Err(RegistryError::KeyCountMismatch {
                        group: group.to_string(),
                        npz_keys: npz_keys.len(),
                        output_keys: output_keys.len(),
                    });
                }
                GroupSpec::archive(group, file, output_keys.into_iter().zip(npz_keys))
            }
        }
    }
}
