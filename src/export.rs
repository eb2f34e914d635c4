use std::path::Path;

use anyhow::{Context, Result};
use eframe::egui::{ColorImage, Rect};

// ---------------------------------------------------------------------------
// Chart export
// ---------------------------------------------------------------------------

/// Write a viewport screenshot to `path` as PNG, cropped to `region` (in points).
pub fn save_png(
    screenshot: &ColorImage,
    region: Option<Rect>,
    pixels_per_point: f32,
    path: &Path,
) -> Result<()> {
    let image = match region {
        Some(rect) => screenshot.region(&rect, Some(pixels_per_point)),
        None => screenshot.clone(),
    };
    let [width, height] = image.size;
    let rgba: Vec<u8> = image.pixels.iter().flat_map(|c| c.to_array()).collect();

    image::save_buffer_with_format(
        path,
        &rgba,
        width as u32,
        height as u32,
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("writing chart to '{}'", path.display()))?;

    log::info!("Saved {width}x{height} chart to {}", path.display());
    Ok(())
}
