use image::Rgb;

use crate::{BoundingBox, Frame};

/// Draw a rectangle outline of the given thickness, clipped to the frame.
pub fn draw_bbox(frame: &mut Frame, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = frame.dimensions();
    if bbox.width == 0 || bbox.height == 0 || bbox.x >= w || bbox.y >= h {
        return;
    }
    let right = bbox.right().min(w);
    let bottom = bbox.bottom().min(h);
    let t = thickness.max(1);

    for y in bbox.y..bottom {
        for x in bbox.x..right {
            let on_edge = x < bbox.x + t
                || y < bbox.y + t
                || x + t >= bbox.right()
                || y + t >= bbox.bottom();
            if on_edge {
                frame.put_pixel(x, y, color);
            }
        }
    }
}
