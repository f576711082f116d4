use crate::events::CaptureKind;
use chrono::{DateTime, Local};
use eframe::egui;

const HEADER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn entry_header(kind: CaptureKind, at: DateTime<Local>) -> String {
    let suffix = match kind {
        CaptureKind::Region => " (region capture)",
        CaptureKind::FullScreen => "",
    };
    format!("--- {}{} ---\n", at.format(HEADER_TIME_FORMAT), suffix)
}

/// Append-only history of every translation this run.
#[derive(Debug, Default)]
pub struct LogPane {
    text: String,
}

impl LogPane {
    #[cfg(test)]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Starts a new entry. Keeps entries on their own lines even when the
    /// previous stream ended mid-line.
    pub fn begin_entry(&mut self, kind: CaptureKind, at: DateTime<Local>) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(&entry_header(kind, at));
    }

    pub fn append(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn append_whole(&mut self, kind: CaptureKind, at: DateTime<Local>, result: &str) {
        self.begin_entry(kind, at);
        self.text.push_str(result);
        self.text.push_str("\n\n");
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                let mut view = self.text.as_str();
                ui.add(
                    egui::TextEdit::multiline(&mut view)
                        .desired_rows(20)
                        .desired_width(f32::INFINITY),
                );
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn header_marks_region_captures() {
        assert_eq!(entry_header(CaptureKind::FullScreen, at()), "--- 2024-05-06 07:08:09 ---\n");
        assert_eq!(
            entry_header(CaptureKind::Region, at()),
            "--- 2024-05-06 07:08:09 (region capture) ---\n"
        );
    }

    #[test]
    fn streamed_entries_start_on_fresh_lines() {
        let mut pane = LogPane::default();
        pane.begin_entry(CaptureKind::FullScreen, at());
        for f in ["Hel", "lo, ", "world"] {
            pane.append(f);
        }
        pane.begin_entry(CaptureKind::Region, at());
        pane.append("second");
        assert_eq!(
            pane.text(),
            "--- 2024-05-06 07:08:09 ---\nHello, world\n--- 2024-05-06 07:08:09 (region capture) ---\nsecond"
        );
    }

    #[test]
    fn whole_result_ends_with_blank_line() {
        let mut pane = LogPane::default();
        pane.append_whole(CaptureKind::FullScreen, at(), "Good morning");
        pane.append_whole(CaptureKind::FullScreen, at(), "Bye");
        assert_eq!(
            pane.text(),
            "--- 2024-05-06 07:08:09 ---\nGood morning\n\n--- 2024-05-06 07:08:09 ---\nBye\n\n"
        );
        pane.clear();
        assert!(pane.is_empty());
    }
}
