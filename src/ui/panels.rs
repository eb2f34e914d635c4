use std::path::PathBuf;

use anyhow::{Context, Result};
use dialect_lens::data::loader::LocalFiles;
use dialect_lens::data::registry::Registry;
use dialect_lens::data::stats::write_counts_csv;
use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::fonts::install_cjk_font;
use crate::state::{AppState, ChartKind, PendingExport};

// ---------------------------------------------------------------------------
// Left side panel – selection widgets
// ---------------------------------------------------------------------------

/// Render the left selection panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Features");
    ui.separator();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            selection(ui, state);
            ui.separator();
            chart_options(ui, state);

            if !state.diagnostics.is_empty() {
                ui.separator();
                egui::CollapsingHeader::new(
                    RichText::new(format!("Warnings ({})", state.diagnostics.len())).strong(),
                )
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    for d in &state.diagnostics {
                        ui.label(RichText::new(d).color(Color32::YELLOW));
                    }
                });
            }

            if !state.loaded.is_empty() {
                ui.separator();
                ui.strong("Loaded");
                loaded_table(ui, state);
            }
        });
}

/// Dataset / group pickers, feature checkboxes and the Load button.
fn selection(ui: &mut Ui, state: &mut AppState) {
    let datasets: Vec<String> = state.registry.dataset_names().map(str::to_string).collect();
    let current_dataset = state.dataset.clone().unwrap_or_default();
    ui.strong("Dataset");
    egui::ComboBox::from_id_salt("dataset")
        .selected_text(&current_dataset)
        .show_ui(ui, |ui: &mut Ui| {
            for ds in &datasets {
                if ui.selectable_label(current_dataset == *ds, ds).clicked() {
                    state.select_dataset(Some(ds.clone()));
                }
            }
        });

    let groups: Vec<String> = state
        .dataset
        .as_deref()
        .map(|d| state.registry.group_names(d).iter().map(|g| g.to_string()).collect())
        .unwrap_or_default();
    let current_group = state.group.clone().unwrap_or_default();
    ui.strong("Group");
    egui::ComboBox::from_id_salt("group")
        .selected_text(&current_group)
        .show_ui(ui, |ui: &mut Ui| {
            for g in &groups {
                if ui.selectable_label(current_group == *g, g).clicked() {
                    state.select_group(g.clone());
                }
            }
        });

    let available = state.available_features();
    let header = if state.selected_features.is_empty() {
        format!("Features  (all {})", available.len())
    } else {
        format!("Features  ({}/{})", state.selected_features.len(), available.len())
    };
    egui::CollapsingHeader::new(RichText::new(header).strong())
        .id_salt("features")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            for f in &available {
                let mut checked = state.selected_features.contains(f);
                if ui.checkbox(&mut checked, f).changed() {
                    state.toggle_feature(f);
                }
            }
        });

    if ui.button("Load").clicked() {
        state.load_selection();
    }
}

/// Chart kind, plotted features and text labels.
fn chart_options(ui: &mut Ui, state: &mut AppState) {
    ui.strong("Chart");
    ui.horizontal(|ui: &mut Ui| {
        ui.radio_value(&mut state.chart, ChartKind::Bar, "Category counts");
        ui.radio_value(&mut state.chart, ChartKind::Scatter, "2-D scatter");
    });

    let names: Vec<String> = state.loaded.keys().cloned().collect();

    let current = state.category_feature.clone().unwrap_or_default();
    ui.label("Categories");
    egui::ComboBox::from_id_salt("category_feature")
        .selected_text(&current)
        .show_ui(ui, |ui: &mut Ui| {
            for name in &names {
                if ui.selectable_label(current == *name, name).clicked() {
                    state.set_category_feature(name.clone());
                }
            }
        });

    if state.chart == ChartKind::Scatter {
        let current = state.points_feature.clone().unwrap_or_default();
        ui.label("Points");
        egui::ComboBox::from_id_salt("points_feature")
            .selected_text(&current)
            .show_ui(ui, |ui: &mut Ui| {
                for name in &names {
                    if ui.selectable_label(current == *name, name).clicked() {
                        state.points_feature = Some(name.clone());
                    }
                }
            });
    }

    egui::Grid::new("chart_labels").num_columns(2).show(ui, |ui: &mut Ui| {
        ui.label("Title");
        ui.text_edit_singleline(&mut state.chart_title);
        ui.end_row();
        ui.label("X label");
        ui.text_edit_singleline(&mut state.x_label);
        ui.end_row();
        ui.label("Y label");
        ui.text_edit_singleline(&mut state.y_label);
        ui.end_row();
    });
}

/// Name and shape of every loaded feature.
fn loaded_table(ui: &mut Ui, state: &AppState) {
    TableBuilder::new(ui)
        .striped(true)
        .vscroll(false)
        .column(Column::auto())
        .column(Column::remainder())
        .header(18.0, |mut header| {
            header.col(|ui| {
                ui.strong("Name");
            });
            header.col(|ui| {
                ui.strong("Value");
            });
        })
        .body(|mut body| {
            for (name, value) in &state.loaded {
                body.row(18.0, |mut row| {
                    row.col(|ui| {
                        ui.label(name);
                    });
                    row.col(|ui| {
                        ui.label(value.describe());
                    });
                });
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open data folder…").clicked() {
                open_data_folder(state);
                ui.close_menu();
            }
            if ui.button("Open registry…").clicked() {
                let result = open_registry(state);
                report(state, result);
                ui.close_menu();
            }
            if ui.button("Load CJK font…").clicked() {
                let result = load_font(ui.ctx(), state);
                report(state, result);
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Save chart as PNG…").clicked() {
                request_png_export(ui.ctx(), state);
                ui.close_menu();
            }
            if ui.button("Export counts as CSV…").clicked() {
                let result = export_counts(state);
                report(state, result);
                ui.close_menu();
            }
        });

        ui.separator();
        ui.label(format!("Data root: {}", state.files.root().display()));

        if !state.loaded.is_empty() {
            ui.separator();
            ui.label(format!("{} features loaded", state.loaded.len()));
        }

        if let Some(font) = &state.font_name {
            ui.separator();
            ui.label(format!("Font: {font}"));
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

fn report(state: &mut AppState, result: Result<()>) {
    if let Err(e) = result {
        log::error!("{e:#}");
        state.status_message = Some(format!("Error: {e:#}"));
    }
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_data_folder(state: &mut AppState) {
    if let Some(dir) = rfd::FileDialog::new()
        .set_title("Choose the folder containing the datasets")
        .pick_folder()
    {
        log::info!("Data root set to {}", dir.display());
        state.files = LocalFiles::new(dir);
        state.status_message = None;
    }
}

fn open_registry(state: &mut AppState) -> Result<()> {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Open dataset registry")
        .add_filter("JSON", &["json"])
        .pick_file()
    else {
        return Ok(());
    };
    let registry = Registry::load(&path)
        .with_context(|| format!("loading registry '{}'", path.display()))?;
    log::info!(
        "Loaded registry with datasets {:?}",
        registry.dataset_names().collect::<Vec<_>>()
    );
    state.set_registry(registry);
    state.status_message = None;
    Ok(())
}

fn load_font(ctx: &egui::Context, state: &mut AppState) -> Result<()> {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Choose a CJK font")
        .add_filter("Fonts", &["ttf", "otf", "ttc"])
        .pick_file()
    else {
        return Ok(());
    };
    match install_cjk_font(ctx, &path) {
        Ok(name) => {
            state.font_name = Some(name);
            state.status_message = None;
            Ok(())
        }
        Err(e) => {
            log::warn!("CJK font was not loaded; Chinese text will likely render as boxes");
            Err(e)
        }
    }
}

fn request_png_export(ctx: &egui::Context, state: &mut AppState) {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Save chart")
        .add_filter("PNG", &["png"])
        .set_file_name("chart.png")
        .save_file()
    else {
        return;
    };
    state.pending_export = Some(PendingExport {
        path: with_extension(path, "png"),
    });
    ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(egui::UserData::default()));
}

fn export_counts(state: &AppState) -> Result<()> {
    if state.counts.is_empty() {
        anyhow::bail!("no category counts to export");
    }
    let Some(path) = rfd::FileDialog::new()
        .set_title("Export counts")
        .add_filter("CSV", &["csv"])
        .set_file_name("counts.csv")
        .save_file()
    else {
        return Ok(());
    };
    let path = with_extension(path, "csv");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating '{}'", path.display()))?;
    write_counts_csv(file, &state.counts)?;
    log::info!("Wrote {} categories to {}", state.counts.len(), path.display());
    Ok(())
}

fn with_extension(mut path: PathBuf, ext: &str) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) != Some(ext) {
        path.set_extension(ext);
    }
    path
}
