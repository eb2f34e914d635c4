use std::collections::BTreeSet;
use std::path::PathBuf;

use dialect_lens::data::loader::LocalFiles;
use dialect_lens::data::model::{FeatureMap, FeatureValue};
use dialect_lens::data::registry::Registry;
use dialect_lens::data::resolver::{FeatureResolver, ResolutionRequest};
use dialect_lens::data::stats::{feature_counts, CategoryCount};

use crate::color::ColorMap;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Scatter,
}

/// A save requested from the menu, waiting for the next screenshot.
#[derive(Debug, Clone)]
pub struct PendingExport {
    pub path: PathBuf,
}

/// The full UI state, independent of rendering.
pub struct AppState {
    pub registry: Registry,
    pub files: LocalFiles,

    /// Dataset / group currently selected in the side panel.
    pub dataset: Option<String>,
    pub group: Option<String>,
    /// Features ticked in the side panel; empty means the whole group.
    pub selected_features: BTreeSet<String>,

    /// Result of the last successful load.
    pub loaded: FeatureMap,
    /// Diagnostics of the last load, shown in the side panel.
    pub diagnostics: Vec<String>,

    pub chart: ChartKind,
    /// Feature plotted as bars, or used to colour scatter points.
    pub category_feature: Option<String>,
    /// Feature holding `[n, 2]` points for the scatter chart.
    pub points_feature: Option<String>,

    /// Counts and colours for the current bar chart (cached).
    pub counts: Vec<CategoryCount>,
    pub color_map: Option<ColorMap>,

    pub chart_title: String,
    pub x_label: String,
    pub y_label: String,

    /// Name of the installed CJK font, if any.
    pub font_name: Option<String>,

    pub pending_export: Option<PendingExport>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        let registry = Registry::builtin();
        let dataset = registry.dataset_names().next().map(str::to_string);
        let group = dataset
            .as_deref()
            .and_then(|d| registry.group_names(d).first().map(|g| g.to_string()));
        Self {
            registry,
            files: LocalFiles::default(),
            dataset,
            group,
            selected_features: BTreeSet::new(),
            loaded: FeatureMap::default(),
            diagnostics: Vec::new(),
            chart: ChartKind::Bar,
            category_feature: None,
            points_feature: None,
            counts: Vec::new(),
            color_map: None,
            chart_title: "类别分布柱状图".to_string(),
            x_label: "类别".to_string(),
            y_label: "数量".to_string(),
            font_name: None,
            pending_export: None,
            status_message: None,
        }
    }
}

impl AppState {
    /// Swap in a new registry, keeping the selection when it still exists.
    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = registry;
        let dataset_ok = self
            .dataset
            .as_deref()
            .is_some_and(|d| self.registry.dataset(d).is_some());
        if !dataset_ok {
            self.dataset = self.registry.dataset_names().next().map(str::to_string);
        }
        self.select_dataset(self.dataset.clone());
    }

    pub fn select_dataset(&mut self, dataset: Option<String>) {
        let groups: Vec<String> = dataset
            .as_deref()
            .map(|d| self.registry.group_names(d).iter().map(|g| g.to_string()).collect())
            .unwrap_or_default();
        if !self.group.as_ref().is_some_and(|g| groups.contains(g)) {
            self.group = groups.first().cloned();
        }
        self.dataset = dataset;
        self.selected_features.clear();
    }

    pub fn select_group(&mut self, group: String) {
        self.group = Some(group);
        self.selected_features.clear();
    }

    /// Features declared by the selected group, in canonical order.
    pub fn available_features(&self) -> Vec<String> {
        match (self.dataset.as_deref(), self.group.as_deref()) {
            (Some(d), Some(g)) => self
                .registry
                .group(d, g)
                .map(|spec| spec.features().names().map(str::to_string).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn toggle_feature(&mut self, feature: &str) {
        if !self.selected_features.remove(feature) {
            self.selected_features.insert(feature.to_string());
        }
    }

    /// Resolve the current selection and ingest the result.
    pub fn load_selection(&mut self) {
        let Some(dataset) = self.dataset.clone() else {
            self.status_message = Some("Select a dataset first.".to_string());
            return;
        };
        let mut request = ResolutionRequest::new(dataset);
        request.group = self.group.clone();
        if !self.selected_features.is_empty() {
            // Keep the group's canonical order for the ticked subset.
            let ticked: Vec<String> = self
                .available_features()
                .into_iter()
                .filter(|f| self.selected_features.contains(f))
                .collect();
            request.features = Some(ticked);
        }

        let resolver = FeatureResolver::new(&self.registry, &self.files);
        match resolver.resolve(&request) {
            Ok(resolution) => {
                self.diagnostics = resolution.diagnostics.iter().map(|d| d.to_string()).collect();
                self.status_message = None;
                self.set_loaded(resolution.features);
            }
            Err(e) => {
                log::error!("Failed to load features: {e:#}");
                self.status_message = Some(format!("Error: {e}"));
                self.diagnostics.clear();
            }
        }
    }

    /// Ingest loaded features and pick sensible chart defaults.
    pub fn set_loaded(&mut self, loaded: FeatureMap) {
        self.loaded = loaded;

        let category = pick_feature(&self.loaded, self.category_feature.as_ref(), |v| {
            v.labels().is_some()
        });
        let points = pick_feature(&self.loaded, self.points_feature.as_ref(), |v| {
            v.points_2d().is_some()
        });

        self.category_feature = category;
        self.points_feature = points;
        self.rebuild_counts();
    }

    pub fn set_category_feature(&mut self, feature: String) {
        self.category_feature = Some(feature);
        self.rebuild_counts();
    }

    /// Recompute bar counts and colours from `category_feature`.
    pub fn rebuild_counts(&mut self) {
        self.counts = self
            .category_feature
            .as_ref()
            .and_then(|f| self.loaded.get(f))
            .and_then(feature_counts)
            .unwrap_or_default();
        self.color_map = if self.counts.is_empty() {
            None
        } else {
            Some(ColorMap::new(self.counts.iter().map(|c| c.category.as_str())))
        };
    }

    /// Labels of the category feature, used to colour scatter points.
    pub fn category_labels(&self) -> Option<Vec<String>> {
        self.category_feature
            .as_ref()
            .and_then(|f| self.loaded.get(f))
            .and_then(|v| v.labels())
    }
}

/// Keep the current choice if it still fits, else the first loaded feature that does.
fn pick_feature(
    loaded: &FeatureMap,
    current: Option<&String>,
    fits: impl Fn(&FeatureValue) -> bool,
) -> Option<String> {
    current
        .filter(|name| loaded.get(name.as_str()).is_some_and(&fits))
        .cloned()
        .or_else(|| loaded.iter().find(|(_, v)| fits(v)).map(|(k, _)| k.clone()))
}
