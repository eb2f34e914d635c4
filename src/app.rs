use eframe::egui;

use crate::export::save_png;
use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DialectLensApp {
    pub state: AppState,
    /// Screen rect of the central panel, used to crop saved charts.
    chart_rect: Option<egui::Rect>,
}

impl eframe::App for DialectLensApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: dataset / feature selection ----
        egui::SidePanel::left("feature_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: chart ----
        let central = egui::CentralPanel::default().show(ctx, |ui| {
            plot::chart(ui, &self.state);
        });
        self.chart_rect = Some(central.response.rect);

        self.handle_screenshot(ctx);
    }
}

impl DialectLensApp {
    /// Finish a pending PNG export once the requested screenshot arrives.
    fn handle_screenshot(&mut self, ctx: &egui::Context) {
        let screenshot = ctx.input(|i| {
            i.events.iter().find_map(|e| match e {
                egui::Event::Screenshot { image, .. } => Some(image.clone()),
                _ => None,
            })
        });
        let Some(image) = screenshot else {
            return;
        };
        let Some(pending) = self.state.pending_export.take() else {
            return;
        };

        if let Err(e) = save_png(&image, self.chart_rect, ctx.pixels_per_point(), &pending.path) {
            log::error!("Failed to save chart: {e:#}");
            self.state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
