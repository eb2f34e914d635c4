use eframe::egui::{Align2, Color32, Ui};
use dialect_lens::data::stats::scatter_series;
use egui_plot::{uniform_grid_spacer, Bar, BarChart, Legend, Plot, PlotPoint, Points, Text};

use crate::color::ColorMap;
use crate::state::{AppState, ChartKind};

// ---------------------------------------------------------------------------
// Chart (central panel)
// ---------------------------------------------------------------------------

/// Render the active chart in the central panel.
pub fn chart(ui: &mut Ui, state: &AppState) {
    if state.loaded.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Pick a group and press Load  (File → Open data folder… to change the root)");
        });
        return;
    }

    ui.vertical_centered(|ui: &mut Ui| {
        ui.heading(&state.chart_title);
    });

    match state.chart {
        ChartKind::Bar => category_bars(ui, state),
        ChartKind::Scatter => embedding_scatter(ui, state),
    }
}

/// Bars sorted by count, with the count printed above each bar.
fn category_bars(ui: &mut Ui, state: &AppState) {
    if state.counts.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.label("The selected feature is not a 1-D sequence of categories.");
        });
        return;
    }

    let bars: Vec<Bar> = state
        .counts
        .iter()
        .enumerate()
        .map(|(i, c)| {
            Bar::new(i as f64, c.count as f64)
                .name(&c.category)
                .fill(color_of(state.color_map.as_ref(), &c.category))
                .width(0.7)
        })
        .collect();

    let categories: Vec<String> = state.counts.iter().map(|c| c.category.clone()).collect();
    let label_offset = state.counts.first().map_or(0.5, |c| c.count as f64 * 0.01);

    Plot::new("category_plot")
        .x_axis_label(state.x_label.clone())
        .y_axis_label(state.y_label.clone())
        .x_grid_spacer(uniform_grid_spacer(|_| [1.0, 5.0, 10.0]))
        .x_axis_formatter(move |mark, _range| {
            let i = mark.value.round();
            if (mark.value - i).abs() > 1e-6 || i < 0.0 {
                return String::new();
            }
            categories.get(i as usize).cloned().unwrap_or_default()
        })
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars));
            for (i, c) in state.counts.iter().enumerate() {
                plot_ui.text(
                    Text::new(
                        PlotPoint::new(i as f64, c.count as f64 + label_offset),
                        c.count.to_string(),
                    )
                    .anchor(Align2::CENTER_BOTTOM),
                );
            }
        });
}

/// 2-D points, one series per category label when a category feature is set.
fn embedding_scatter(ui: &mut Ui, state: &AppState) {
    let points = state
        .points_feature
        .as_ref()
        .and_then(|f| state.loaded.get(f))
        .and_then(|v| v.points_2d());
    let Some(points) = points else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.label("No loaded feature holds 2-D points.");
        });
        return;
    };

    let labels = state.category_labels();
    let series = scatter_series(&points, labels.as_deref());

    Plot::new("embedding_plot")
        .legend(Legend::default())
        .x_axis_label(state.x_label.clone())
        .y_axis_label(state.y_label.clone())
        .data_aspect(1.0)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (name, pts) in series {
                let color = color_of(state.color_map.as_ref(), &name);
                plot_ui.points(Points::new(pts).name(&name).color(color).radius(3.0));
            }
        });
}

fn color_of(color_map: Option<&ColorMap>, category: &str) -> Color32 {
    color_map
        .map(|cm| cm.color_for(category))
        .unwrap_or(Color32::LIGHT_BLUE)
}
