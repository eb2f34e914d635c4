use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use super::loader::{pickled_ndarray_shape, read_record, DecodeError, FileSource, NpzArchive};
use super::model::{dict_get, FeatureMap, FeatureValue};
use super::registry::{GroupSpec, Registry};

// ---------------------------------------------------------------------------
// Errors & diagnostics
// ---------------------------------------------------------------------------

/// Conditions that abort a resolution.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("dataset '{dataset}' has no group '{group}'")]
    UnknownGroup { dataset: String, group: String },

    #[error("dataset '{dataset}': {reason}")]
    AmbiguousOrMissingSelector { dataset: String, reason: String },

    #[error("no features to load from group '{group}' of dataset '{dataset}'")]
    NoFeaturesResolved { dataset: String, group: String },

    #[error("data file '{}' not found", .0.display())]
    BackingFileNotFound(PathBuf),

    #[error("error loading data file '{}': {source}", .path.display())]
    BackingFileCorrupt {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

/// Non-fatal findings reported next to a (possibly partial) result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Requested by the caller but not part of the group.
    Unavailable {
        feature: String,
        dataset: String,
        group: String,
    },
    /// Part of the group but absent from the backing file.
    MissingInFile {
        feature: String,
        key: String,
        path: PathBuf,
    },
    /// Present in the backing file, but stored in a form that cannot be read.
    Undecodable {
        feature: String,
        key: String,
        path: PathBuf,
        reason: String,
    },
    /// No effective feature could be loaded from the backing file.
    NothingLoaded { path: PathBuf },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Unavailable {
                feature,
                dataset,
                group,
            } => write!(
                f,
                "feature '{feature}' not available in group '{group}' of dataset '{dataset}', ignored"
            ),
            Diagnostic::MissingInFile { feature, key, path } => write!(
                f,
                "feature '{feature}' (key '{key}') not found in '{}'",
                path.display()
            ),
            Diagnostic::Undecodable {
                feature,
                key,
                path,
                reason,
            } => write!(
                f,
                "feature '{feature}' (key '{key}') in '{}' skipped: {reason}",
                path.display()
            ),
            Diagnostic::NothingLoaded { path } => {
                write!(f, "none of the requested features could be loaded from '{}'", path.display())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub dataset: String,
    pub group: Option<String>,
    /// `None` or empty-by-omission loads the whole group; `Some(vec![])` is
    /// an explicit empty selection.
    pub features: Option<Vec<String>>,
}

impl ResolutionRequest {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Group the features came from (relevant when it was inferred).
    pub group: String,
    pub features: FeatureMap,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FeatureResolver
// ---------------------------------------------------------------------------

/// Resolves requests against a registry and a source of backing files.
///
/// Stateless between calls: every `resolve` opens at most one handle and
/// drops it before returning.
pub struct FeatureResolver<'a> {
    registry: &'a Registry,
    files: &'a dyn FileSource,
}

impl<'a> FeatureResolver<'a> {
    pub fn new(registry: &'a Registry, files: &'a dyn FileSource) -> Self {
        Self { registry, files }
    }

    pub fn resolve(&self, request: &ResolutionRequest) -> Result<Resolution, ResolutionError> {
        let dataset = request.dataset.as_str();
        let groups = self
            .registry
            .dataset(dataset)
            .ok_or_else(|| ResolutionError::UnknownDataset(dataset.to_string()))?;

        let requested = request.features.as_deref();
        let (group_name, spec) = match request.group.as_deref() {
            Some(group) => {
                let spec = groups.get(group).ok_or_else(|| ResolutionError::UnknownGroup {
                    dataset: dataset.to_string(),
                    group: group.to_string(),
                })?;
                (group, spec)
            }
            None => infer_group(dataset, groups, requested)?,
        };

        let mut diagnostics = Vec::new();
        let effective = effective_features(spec, requested, |feature| {
            report(
                &mut diagnostics,
                Diagnostic::Unavailable {
                    feature: feature.to_string(),
                    dataset: dataset.to_string(),
                    group: group_name.to_string(),
                },
            )
        });
        if effective.is_empty() {
            return Err(ResolutionError::NoFeaturesResolved {
                dataset: dataset.to_string(),
                group: group_name.to_string(),
            });
        }

        let path = spec.file();
        log::info!(
            "loading {:?} from '{}' ({})",
            effective,
            path.display(),
            spec.loader_name()
        );

        let features = self.fetch(spec, &effective, &mut diagnostics)?;
        if features.is_empty() {
            report(
                &mut diagnostics,
                Diagnostic::NothingLoaded {
                    path: path.to_path_buf(),
                },
            );
        } else {
            log::info!("loaded {} feature(s) from '{}'", features.len(), path.display());
        }

        Ok(Resolution {
            group: group_name.to_string(),
            features,
            diagnostics,
        })
    }

    /// Open the backing file and pull out each effective feature.
    fn fetch(
        &self,
        spec: &GroupSpec,
        effective: &[&str],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<FeatureMap, ResolutionError> {
        let path = spec.file();
        let table = spec.features();
        let handle = self.files.open(path).map_err(|e| open_error(path, e))?;
        let corrupt = |source: DecodeError| ResolutionError::BackingFileCorrupt {
            path: path.to_path_buf(),
            source,
        };

        let mut loaded = IndexMap::with_capacity(effective.len());
        match spec {
            GroupSpec::Record { .. } => {
                let record = read_record(handle).map_err(corrupt)?;
                for &feature in effective {
                    let key = table.key_for(feature).unwrap_or(feature);
                    let Some(value) = dict_get(&record, key) else {
                        report(diagnostics, missing(feature, key, path));
                        continue;
                    };
                    match pickled_ndarray_shape(value) {
                        Some(shape) => report(
                            diagnostics,
                            undecodable(
                                feature,
                                key,
                                path,
                                format!("numpy array {shape:?} pickled without its element type"),
                            ),
                        ),
                        None => {
                            loaded.insert(feature.to_string(), FeatureValue::Record(value.clone()));
                        }
                    }
                }
            }
            GroupSpec::Archive { .. } => {
                let mut npz = NpzArchive::new(handle).map_err(corrupt)?;
                for &feature in effective {
                    let Some(key) = table.key_for(feature) else {
                        report(diagnostics, missing(feature, "<unmapped>", path));
                        continue;
                    };
                    match npz.read(key) {
                        Ok(Some(array)) => {
                            loaded.insert(feature.to_string(), FeatureValue::Array(array));
                        }
                        Ok(None) => report(diagnostics, missing(feature, key, path)),
                        Err(DecodeError::UnsupportedDtype { dtype, .. }) => report(
                            diagnostics,
                            undecodable(feature, key, path, format!("unsupported dtype {dtype}")),
                        ),
                        Err(e) => return Err(corrupt(e)),
                    }
                }
            }
        }
        Ok(loaded)
    }
}

/// Function-style entry point: `resolve(registry, files, "Data4", Some("raw"), None)`.
pub fn resolve(
    registry: &Registry,
    files: &dyn FileSource,
    dataset: &str,
    group: Option<&str>,
    features: Option<&[&str]>,
) -> Result<Resolution, ResolutionError> {
    let request = ResolutionRequest {
        dataset: dataset.to_string(),
        group: group.map(str::to_string),
        features: features.map(|f| f.iter().map(|s| s.to_string()).collect()),
    };
    FeatureResolver::new(registry, files).resolve(&request)
}

// -- helpers --

/// Without a group, use the one group exposing any of the requested names.
fn infer_group<'r>(
    dataset: &str,
    groups: &'r std::collections::BTreeMap<String, GroupSpec>,
    requested: Option<&[String]>,
) -> Result<(&'r str, &'r GroupSpec), ResolutionError> {
    let selector_error = |reason: String| ResolutionError::AmbiguousOrMissingSelector {
        dataset: dataset.to_string(),
        reason,
    };

    let requested = match requested {
        Some(r) if !r.is_empty() => r,
        _ => {
            return Err(selector_error(
                "neither a group nor a feature list was given".to_string(),
            ))
        }
    };

    let candidates: Vec<(&str, &GroupSpec)> = groups
        .iter()
        .filter(|(_, spec)| requested.iter().any(|f| spec.features().contains(f)))
        .map(|(name, spec)| (name.as_str(), spec))
        .collect();

    match candidates.as_slice() {
        [single] => Ok(*single),
        [] => Err(selector_error(format!(
            "no group provides any of {requested:?}"
        ))),
        many => {
            let names: Vec<&str> = many.iter().map(|(n, _)| *n).collect();
            Err(selector_error(format!(
                "features {requested:?} match several groups {names:?}; specify a group"
            )))
        }
    }
}

/// Requested ∩ available in the caller's order, or the whole group.
fn effective_features<'s>(
    spec: &'s GroupSpec,
    requested: Option<&'s [String]>,
    mut on_unavailable: impl FnMut(&str),
) -> Vec<&'s str> {
    let table = spec.features();
    match requested {
        None => table.names().collect(),
        Some(requested) => {
            let mut effective: Vec<&str> = Vec::with_capacity(requested.len());
            for name in requested {
                if !table.contains(name) {
                    on_unavailable(name);
                } else if !effective.contains(&name.as_str()) {
                    effective.push(name);
                }
            }
            effective
        }
    }
}

fn open_error(path: &Path, e: io::Error) -> ResolutionError {
    if e.kind() == io::ErrorKind::NotFound {
        ResolutionError::BackingFileNotFound(path.to_path_buf())
    } else {
        ResolutionError::BackingFileCorrupt {
            path: path.to_path_buf(),
            source: DecodeError::Io(e),
        }
    }
}

fn missing(feature: &str, key: &str, path: &Path) -> Diagnostic {
    Diagnostic::MissingInFile {
        feature: feature.to_string(),
        key: key.to_string(),
        path: path.to_path_buf(),
    }
}

fn undecodable(feature: &str, key: &str, path: &Path, reason: String) -> Diagnostic {
    Diagnostic::Undecodable {
        feature: feature.to_string(),
        key: key.to_string(),
        path: path.to_path_buf(),
        reason,
    }
}

fn report(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    log::warn!("{diagnostic}");
    diagnostics.push(diagnostic);
}
