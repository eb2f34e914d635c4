use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use eframe::egui::{self, FontData, FontDefinitions, FontFamily};

// ---------------------------------------------------------------------------
// CJK font support
// ---------------------------------------------------------------------------

/// TrueType, OpenType (CFF), legacy Apple TrueType and font collections.
const FONT_MAGICS: [&[u8; 4]; 4] = [b"\x00\x01\x00\x00", b"OTTO", b"true", b"ttcf"];

/// Check that `bytes` start like a font file egui can parse.
pub fn looks_like_font(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && FONT_MAGICS.iter().any(|m| &bytes[..4] == m.as_slice())
}

/// Read a font file and make it the preferred family for all text.
///
/// Returns the name the font was registered under. On error the context's
/// fonts are left untouched, so glyphs missing from the default font show
/// as boxes.
pub fn install_cjk_font(ctx: &egui::Context, path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading font file '{}'", path.display()))?;
    if !looks_like_font(&bytes) {
        bail!("'{}' is not a TrueType/OpenType font", path.display());
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cjk")
        .to_string();

    let mut fonts = FontDefinitions::default();
    fonts
        .font_data
        .insert(name.clone(), Arc::new(FontData::from_owned(bytes)));
    for family in [FontFamily::Proportional, FontFamily::Monospace] {
        fonts
            .families
            .entry(family)
            .or_default()
            .insert(0, name.clone());
    }
    ctx.set_fonts(fonts);

    log::info!("Font '{name}' loaded from {}", path.display());
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_magic_numbers() {
        assert!(looks_like_font(b"\x00\x01\x00\x00rest"));
        assert!(looks_like_font(b"OTTO...."));
        assert!(looks_like_font(b"ttcf...."));
        assert!(!looks_like_font(b"<html>"));
        assert!(!looks_like_font(b"OT"));
    }

    #[test]
    fn non_font_file_is_rejected_without_touching_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        let ctx = egui::Context::default();
        let err = install_cjk_font(&ctx, &path).unwrap_err();
        assert!(err.to_string().contains("fake.ttf"));

        let err = install_cjk_font(&ctx, &dir.path().join("missing.ttf")).unwrap_err();
        assert!(format!("{err:#}").contains("reading font file"));
    }
}
