use crate::events::CaptureKind;
use anyhow::Result;
use image::RgbaImage;
use std::time::Duration;

/// Regions must be strictly larger than this on both axes.
pub const MIN_REGION_SIDE: i32 = 10;

/// Time for the selection overlay, or a main window that was just
/// minimized, to disappear before pixels are grabbed.
pub const OVERLAY_SETTLE: Duration = Duration::from_millis(200);

/// Screen position (physical pixels) the popup is placed next to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Anchor {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    /// Builds the rectangle spanned by two corners in any order.
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn top_left(&self) -> Anchor {
        Anchor {
            x: self.left,
            y: self.top,
        }
    }
}

/// Drag-to-select state of the region overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionSelector {
    #[default]
    Idle,
    Dragging {
        start: (i32, i32),
        current: (i32, i32),
    },
    Committed(ScreenRect),
    Cancelled,
}

impl RegionSelector {
    pub fn press(&mut self, at: (i32, i32)) {
        if matches!(self, RegionSelector::Idle) {
            *self = RegionSelector::Dragging {
                start: at,
                current: at,
            };
        }
    }

    pub fn drag(&mut self, to: (i32, i32)) {
        if let RegionSelector::Dragging { current, .. } = self {
            *current = to;
        }
    }

    /// Finishes the drag. Too-small rectangles cancel.
    pub fn release(&mut self, at: (i32, i32)) {
        if let RegionSelector::Dragging { start, .. } = *self {
            let rect = ScreenRect::from_corners(start, at);
            *self = if rect.width() > MIN_REGION_SIDE && rect.height() > MIN_REGION_SIDE {
                RegionSelector::Committed(rect)
            } else {
                RegionSelector::Cancelled
            };
        }
    }

    /// Escape: valid from any unfinished state.
    pub fn cancel(&mut self) {
        if !self.is_finished() {
            *self = RegionSelector::Cancelled;
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RegionSelector::Committed(_) | RegionSelector::Cancelled)
    }

    /// Rectangle to draw while dragging.
    pub fn preview(&self) -> Option<ScreenRect> {
        match *self {
            RegionSelector::Dragging { start, current } => Some(ScreenRect::from_corners(start, current)),
            RegionSelector::Committed(rect) => Some(rect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub image: RgbaImage,
    pub anchor: Anchor,
    pub kind: CaptureKind,
}

/// What a worker task should capture before translating. A cancelled
/// region selection never becomes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureJob {
    /// `settle` waits for the main window, restored only to receive the
    /// hotkey, to be minimized again before the grab.
    FullScreen { settle: bool },
    Region(ScreenRect),
}

/// Access to screen pixels and the pointer.
pub trait ScreenGrabber: Send + Sync {
    fn grab_screen(&self) -> Result<RgbaImage>;
    fn grab_rect(&self, rect: ScreenRect) -> Result<RgbaImage>;
    fn cursor_position(&self) -> Result<Anchor>;
    fn screen_size(&self) -> Option<(i32, i32)>;
}

/// Full-screen capture anchored at the pointer.
pub fn capture_full_screen(grabber: &dyn ScreenGrabber) -> Result<CapturedImage> {
    let image = grabber.grab_screen()?;
    let anchor = grabber.cursor_position().unwrap_or_default();
    Ok(CapturedImage {
        image,
        anchor,
        kind: CaptureKind::FullScreen,
    })
}

/// Grabs a committed region after the overlay has had time to vanish.
pub async fn capture_region(grabber: &dyn ScreenGrabber, rect: ScreenRect) -> Result<CapturedImage> {
    tokio::time::sleep(OVERLAY_SETTLE).await;
    let image = grabber.grab_rect(rect)?;
    Ok(CapturedImage {
        image,
        anchor: rect.top_left(),
        kind: CaptureKind::Region,
    })
}

pub async fn run_capture(grabber: &dyn ScreenGrabber, job: CaptureJob) -> Result<CapturedImage> {
    match job {
        CaptureJob::FullScreen { settle } => {
            if settle {
                tokio::time::sleep(OVERLAY_SETTLE).await;
            }
            capture_full_screen(grabber)
        }
        CaptureJob::Region(rect) => capture_region(grabber, rect).await,
    }
}

#[cfg(windows)]
pub use gdi::GdiGrabber as SystemGrabber;
#[cfg(not(windows))]
pub use unsupported::UnsupportedGrabber as SystemGrabber;

#[cfg(windows)]
mod gdi {
    use super::{Anchor, ScreenGrabber, ScreenRect};
    use anyhow::{anyhow, bail, Result};
    use image::RgbaImage;
    use windows::Win32::Foundation::{HWND, POINT};
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
        ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    /// Screen grabs through a GDI `BitBlt` of the desktop DC.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct GdiGrabber;

    impl GdiGrabber {
        unsafe fn blit(&self, x: i32, y: i32, w: i32, h: i32) -> Result<RgbaImage> {
            if w <= 0 || h <= 0 {
                bail!("GDI: invalid capture size {}x{}", w, h);
            }
            let desktop = HWND(std::ptr::null_mut());
            let hdc_screen = GetDC(desktop);
            if hdc_screen.is_invalid() {
                bail!("GDI: failed to get the screen device context");
            }
            let hdc_mem = CreateCompatibleDC(hdc_screen);
            let hbitmap = CreateCompatibleBitmap(hdc_screen, w, h);
            let old = SelectObject(hdc_mem, hbitmap);

            let blitted = BitBlt(hdc_mem, 0, 0, w, h, hdc_screen, x, y, SRCCOPY);

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: w,
                    biHeight: -h, // top-down rows
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut buffer = vec![0u8; (w * h * 4) as usize];
            // GetDIBits needs the bitmap deselected first.
            SelectObject(hdc_mem, old);
            let lines = GetDIBits(
                hdc_screen,
                hbitmap,
                0,
                h as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            );

            let _ = DeleteObject(hbitmap);
            let _ = DeleteDC(hdc_mem);
            ReleaseDC(desktop, hdc_screen);

            blitted?;
            if lines == 0 {
                bail!("GDI: GetDIBits returned no rows");
            }
            // BGRA -> RGBA
            for px in buffer.chunks_exact_mut(4) {
                px.swap(0, 2);
                px[3] = 255;
            }
            RgbaImage::from_raw(w as u32, h as u32, buffer)
                .ok_or_else(|| anyhow!("GDI: pixel buffer has the wrong size"))
        }
    }

    impl ScreenGrabber for GdiGrabber {
        fn grab_screen(&self) -> Result<RgbaImage> {
            let (w, h) = self
                .screen_size()
                .ok_or_else(|| anyhow!("GDI: could not read the screen size"))?;
            unsafe { self.blit(0, 0, w, h) }
        }

        fn grab_rect(&self, rect: ScreenRect) -> Result<RgbaImage> {
            unsafe { self.blit(rect.left, rect.top, rect.width(), rect.height()) }
        }

        fn cursor_position(&self) -> Result<Anchor> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point)? };
            Ok(Anchor {
                x: point.x,
                y: point.y,
            })
        }

        fn screen_size(&self) -> Option<(i32, i32)> {
            let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            (w > 0 && h > 0).then_some((w, h))
        }
    }
}

#[cfg(not(windows))]
mod unsupported {
    use super::{Anchor, ScreenGrabber, ScreenRect};
    use anyhow::{bail, Result};
    use image::RgbaImage;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnsupportedGrabber;

    impl ScreenGrabber for UnsupportedGrabber {
        fn grab_screen(&self) -> Result<RgbaImage> {
            bail!("screen capture is only supported on Windows")
        }

        fn grab_rect(&self, _rect: ScreenRect) -> Result<RgbaImage> {
            bail!("screen capture is only supported on Windows")
        }

        fn cursor_position(&self) -> Result<Anchor> {
            bail!("pointer position is only available on Windows")
        }

        fn screen_size(&self) -> Option<(i32, i32)> {
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Hands out solid images and records the rectangles asked for.
    #[derive(Default)]
    pub(crate) struct FakeGrabber {
        pub grabbed: Mutex<Vec<ScreenRect>>,
    }

    impl ScreenGrabber for FakeGrabber {
        fn grab_screen(&self) -> Result<RgbaImage> {
            Ok(RgbaImage::from_pixel(64, 48, image::Rgba([255, 255, 255, 255])))
        }

        fn grab_rect(&self, rect: ScreenRect) -> Result<RgbaImage> {
            self.grabbed.lock().unwrap().push(rect);
            Ok(RgbaImage::new(rect.width() as u32, rect.height() as u32))
        }

        fn cursor_position(&self) -> Result<Anchor> {
            Ok(Anchor { x: 321, y: 123 })
        }

        fn screen_size(&self) -> Option<(i32, i32)> {
            Some((1920, 1080))
        }
    }

    fn drag(from: (i32, i32), to: (i32, i32)) -> RegionSelector {
        let mut selector = RegionSelector::default();
        selector.press(from);
        selector.drag(((from.0 + to.0) / 2, (from.1 + to.1) / 2));
        selector.release(to);
        selector
    }

    #[test]
    fn narrow_drag_cancels() {
        assert_eq!(drag((100, 100), (105, 150)), RegionSelector::Cancelled);
    }

    #[test]
    fn exactly_ten_pixels_is_still_too_small() {
        assert_eq!(drag((0, 0), (10, 50)), RegionSelector::Cancelled);
        assert!(matches!(drag((0, 0), (11, 11)), RegionSelector::Committed(_)));
    }

    #[test]
    fn anchor_is_top_left_from_any_starting_corner() {
        let corners = [(100, 200), (150, 200), (100, 250), (150, 250)];
        for start in corners {
            let end = (250 - start.0, 450 - start.1);
            match drag(start, end) {
                RegionSelector::Committed(rect) => {
                    assert_eq!(rect.width(), 50);
                    assert_eq!(rect.height(), 50);
                    assert_eq!(rect.top_left(), Anchor { x: 100, y: 200 });
                }
                other => panic!("expected commit from {start:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn escape_cancels_at_any_time() {
        let mut idle = RegionSelector::default();
        idle.cancel();
        assert_eq!(idle, RegionSelector::Cancelled);

        let mut dragging = RegionSelector::default();
        dragging.press((0, 0));
        dragging.drag((80, 80));
        dragging.cancel();
        assert_eq!(dragging, RegionSelector::Cancelled);
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut selector = RegionSelector::default();
        selector.release((40, 40));
        assert_eq!(selector, RegionSelector::Idle);
    }

    #[test]
    fn full_screen_capture_anchors_at_pointer() {
        let grabber = FakeGrabber::default();
        let shot = capture_full_screen(&grabber).unwrap();
        assert_eq!(shot.anchor, Anchor { x: 321, y: 123 });
        assert_eq!(shot.kind, CaptureKind::FullScreen);
        assert_eq!(shot.image.dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn region_capture_grabs_exactly_the_rectangle() {
        let grabber = FakeGrabber::default();
        let rect = ScreenRect::from_corners((300, 90), (240, 40));
        let shot = capture_region(&grabber, rect).await.unwrap();
        assert_eq!(shot.anchor, Anchor { x: 240, y: 40 });
        assert_eq!(shot.kind, CaptureKind::Region);
        assert_eq!(shot.image.dimensions(), (60, 50));
        assert_eq!(grabber.grabbed.lock().unwrap().as_slice(), &[rect]);
    }

    #[tokio::test]
    async fn settled_full_screen_capture_waits_first() {
        let grabber = FakeGrabber::default();
        let started = std::time::Instant::now();
        run_capture(&grabber, CaptureJob::FullScreen { settle: true }).await.unwrap();
        assert!(started.elapsed() >= OVERLAY_SETTLE);

        let started = std::time::Instant::now();
        run_capture(&grabber, CaptureJob::FullScreen { settle: false }).await.unwrap();
        assert!(started.elapsed() < OVERLAY_SETTLE);
    }
}
