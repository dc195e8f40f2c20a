use image::RgbImage;
use serde::{Deserialize, Serialize};

pub mod source;
pub mod window;

pub use source::{default_capture_backend, CaptureBackend, CaptureStatus, FrameSource};
pub use window::{default_window_service, NullWindowService, WindowHandle, WindowPattern, WindowService};

/// A captured client area: row-major, 8 bits per channel, no alpha.
pub type Frame = RgbImage;

/// Pixel rectangle relative to a frame's top-left corner.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, rounded down.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the box lies entirely inside a `width` x `height` container.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from(v: [u32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// Client area of a window in screen coordinates, `right`/`bottom` exclusive.
///
/// Serialized as `[left, top, right, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct ClientRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ClientRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

impl From<[i32; 4]> for ClientRect {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<ClientRect> for [i32; 4] {
    fn from(r: ClientRect) -> Self {
        [r.left, r.top, r.right, r.bottom]
    }
}

/// Crop a region from a frame using fractional coordinates.
/// Width and height never drop below one pixel.
pub fn crop_relative(frame: &Frame, x: f64, y: f64, w: f64, h: f64) -> Frame {
    let (fw, fh) = (frame.width() as f64, frame.height() as f64);
    let bbox = BoundingBox::new(
        (x * fw) as u32,
        (y * fh) as u32,
        ((w * fw) as u32).max(1),
        ((h * fh) as u32).max(1),
    );
    crop_absolute(frame, &bbox)
}

/// Crop a pixel region from a frame. The region is clamped to the frame bounds.
pub fn crop_absolute(frame: &Frame, bbox: &BoundingBox) -> Frame {
    let (w, h) = (frame.width(), frame.height());

    let x = bbox.x.min(w.saturating_sub(1));
    let y = bbox.y.min(h.saturating_sub(1));
    let rw = bbox.width.min(w.saturating_sub(x));
    let rh = bbox.height.min(h.saturating_sub(y));

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_relative() {
        let img = Frame::new(1920, 1080);
        let cropped = crop_relative(&img, 0.5, 0.5, 0.1, 0.1);
        assert_eq!(cropped.width(), 192);
        assert_eq!(cropped.height(), 108);
    }

    #[test]
    fn test_crop_relative_minimum_extent() {
        let img = Frame::new(100, 100);
        let cropped = crop_relative(&img, 0.2, 0.2, 0.0, 0.0);
        assert_eq!(cropped.dimensions(), (1, 1));
    }

    #[test]
    fn test_crop_absolute_clamps_to_frame() {
        let img = Frame::from_fn(50, 40, |x, y| image::Rgb([x as u8, y as u8, 0]));
        let cropped = crop_absolute(&img, &BoundingBox::new(40, 30, 100, 100));
        assert_eq!(cropped.dimensions(), (10, 10));
        assert_eq!(cropped.get_pixel(0, 0), &image::Rgb([40, 30, 0]));
    }

    #[test]
    fn test_client_rect_extent() {
        let rect = ClientRect::new(100, 50, 900, 650);
        assert_eq!((rect.width(), rect.height()), (800, 600));
        assert_eq!(ClientRect::new(10, 10, 5, 5).width(), 0);
    }
}
