use eframe::egui;
use std::fs;

const CJK_CANDIDATES: &[&str] = &[
    r"C:\Windows\Fonts\msyh.ttc",
    r"C:\Windows\Fonts\msyh.ttf",
    r"C:\Windows\Fonts\simsun.ttc",
    r"C:\Windows\Fonts\simhei.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
];

fn load_cjk() -> Option<(String, Vec<u8>)> {
    CJK_CANDIDATES
        .iter()
        .find_map(|path| fs::read(path).ok().map(|bytes| (path.to_string(), bytes)))
}

/// Phosphor icons plus the first system CJK face found, so Chinese results
/// don't render as boxes.
pub fn install(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();
    egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);

    match load_cjk() {
        Some((path, bytes)) => {
            fonts.font_data.insert("cjk".to_owned(), egui::FontData::from_owned(bytes));
            for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
                // after the default faces so Latin glyphs keep their look
                fonts.families.entry(family).or_default().push("cjk".to_owned());
            }
            log::info!("Loaded CJK font: {}", path);
        }
        None => log::warn!("No CJK font found; Chinese text may render as squares"),
    }
    ctx.set_fonts(fonts);
}
