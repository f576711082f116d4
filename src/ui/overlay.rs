use crate::capture::{RegionSelector, ScreenRect};
use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

/// How the drag surface ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    Committed(ScreenRect),
    Cancelled,
}

/// Pointer position in points (viewport-relative) to physical screen pixels.
pub fn to_screen(pos: Pos2, origin: Pos2, pixels_per_point: f32) -> (i32, i32) {
    let p = (origin + pos.to_vec2()) * pixels_per_point;
    (p.x.round() as i32, p.y.round() as i32)
}

fn to_points(rect: ScreenRect, origin: Pos2, pixels_per_point: f32) -> Rect {
    let min = Pos2::new(rect.left as f32, rect.top as f32) / pixels_per_point - origin.to_vec2();
    let max = Pos2::new(rect.right as f32, rect.bottom as f32) / pixels_per_point - origin.to_vec2();
    Rect::from_min_max(min, max)
}

/// One frame of input for the drag surface, in physical screen pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OverlayInput {
    pub cancel: bool,
    pub pointer: Option<(i32, i32)>,
    pub pressed: bool,
    pub down: bool,
    pub released: bool,
}

/// Full-screen, mostly transparent drag surface for region capture.
pub struct RegionOverlay {
    selector: RegionSelector,
    screen: Vec2,
}

impl RegionOverlay {
    pub fn new(screen: Vec2) -> Self {
        Self {
            selector: RegionSelector::default(),
            screen,
        }
    }

    /// Feeds one frame of input. Returns the outcome once the selection ends.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<OverlayOutcome> {
        let ppp = ctx.pixels_per_point();
        let builder = egui::ViewportBuilder::default()
            .with_title("Select region")
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top()
            .with_taskbar(false)
            .with_position(Pos2::ZERO)
            .with_inner_size(self.screen / ppp);

        ctx.show_viewport_immediate(
            egui::ViewportId::from_hash_of("region_overlay"),
            builder,
            |ctx, _class| {
                let origin = ctx.input(|i| i.viewport().inner_rect.map(|r| r.min).unwrap_or(Pos2::ZERO));
                let input = ctx.input(|i| OverlayInput {
                    cancel: i.key_pressed(egui::Key::Escape) || i.viewport().close_requested(),
                    pointer: i.pointer.interact_pos().map(|pos| to_screen(pos, origin, ppp)),
                    pressed: i.pointer.primary_pressed(),
                    down: i.pointer.primary_down(),
                    released: i.pointer.primary_released(),
                });
                self.feed(input);

                egui::CentralPanel::default()
                    .frame(egui::Frame::none().fill(Color32::from_black_alpha(77)))
                    .show(ctx, |ui| {
                        ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::Crosshair);
                        if let Some(rect) = self.selector.preview() {
                            ui.painter().rect(
                                to_points(rect, origin, ppp),
                                0.0,
                                Color32::from_white_alpha(24),
                                Stroke::new(2.0, Color32::from_rgb(230, 57, 70)),
                            );
                        }
                    });
            },
        );

        self.outcome()
    }

    pub fn feed(&mut self, input: OverlayInput) {
        if input.cancel {
            self.selector.cancel();
            return;
        }
        let Some(at) = input.pointer else { return };
        if input.pressed {
            self.selector.press(at);
        }
        if input.down {
            self.selector.drag(at);
        }
        if input.released {
            self.selector.release(at);
        }
    }

    /// The outcome once the selection ended.
    pub fn outcome(&self) -> Option<OverlayOutcome> {
        match self.selector {
            RegionSelector::Committed(rect) => Some(OverlayOutcome::Committed(rect)),
            RegionSelector::Cancelled => Some(OverlayOutcome::Cancelled),
            _ => None,
        }
    }
}
