//! Region-of-interest resolution.
//!
//! Regions are declared either as fractions of the client area or as a fixed
//! pixel box placed relative to a corner of a detected anchor. Both resolve to a
//! [`BoundingBox`] that lies inside the container and is at least 1x1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BoundingBox, MatchResult};

/// Corner of an anchor's bounding box used as the origin of an anchored region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    fn point(self, bbox: &BoundingBox) -> (i64, i64) {
        let (left, top) = (bbox.x as i64, bbox.y as i64);
        let (right, bottom) = (left + bbox.width as i64, top + bbox.height as i64);
        match self {
            Corner::TopLeft => (left, top),
            Corner::TopRight => (right, top),
            Corner::BottomLeft => (left, bottom),
            Corner::BottomRight => (right, bottom),
        }
    }
}

/// Region given as fractions (each in `[0, 1]`) of the container size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRoi {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RelativeRoi {
    pub fn to_absolute(&self, container: (u32, u32)) -> BoundingBox {
        resolve_relative(container, self)
    }

    /// First field lying outside `[0, 1]`, if any.
    pub fn out_of_range(&self) -> Option<(&'static str, f64)> {
        [("x", self.x), ("y", self.y), ("w", self.w), ("h", self.h)]
            .into_iter()
            .find(|(_, v)| !(0.0..=1.0).contains(v))
    }
}

fn default_size() -> (u32, u32) {
    (50, 50)
}

/// Fixed-size pixel region offset from a corner of a named anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredRoi {
    pub anchor: String,
    #[serde(default)]
    pub offset_px: (i32, i32),
    #[serde(default = "default_size")]
    pub size_px: (u32, u32),
    #[serde(default)]
    pub anchor_corner: Corner,
}

impl AnchoredRoi {
    pub fn to_absolute(&self, anchor_bbox: &BoundingBox, container: (u32, u32)) -> BoundingBox {
        resolve_anchored(
            anchor_bbox,
            self.offset_px,
            self.size_px,
            self.anchor_corner,
            container,
        )
    }
}

/// A configured region: anchored if it names an anchor, relative otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Roi {
    Anchored(AnchoredRoi),
    Relative(RelativeRoi),
}

impl Roi {
    /// Resolve against the container and the anchors detected this frame.
    /// Anchored regions whose anchor is absent resolve to `None`.
    pub fn resolve(
        &self,
        container: (u32, u32),
        anchors: &BTreeMap<String, MatchResult>,
    ) -> Option<BoundingBox> {
        match self {
            Roi::Relative(rel) => Some(rel.to_absolute(container)),
            Roi::Anchored(anchored) => anchors
                .get(&anchored.anchor)
                .filter(|m| m.found)
                .map(|m| anchored.to_absolute(&m.bbox, container)),
        }
    }
}

/// `x = floor(fx * W)`, `w = max(1, floor(fw * W))`, likewise for y/h, then
/// clamped so the box stays inside the container.
pub fn resolve_relative(container: (u32, u32), roi: &RelativeRoi) -> BoundingBox {
    let (cw, ch) = container;
    let (x, w) = relative_span(roi.x, roi.w, cw);
    let (y, h) = relative_span(roi.y, roi.h, ch);
    BoundingBox::new(x, y, w, h)
}

fn relative_span(origin: f64, extent: f64, size: u32) -> (u32, u32) {
    let start = ((origin * size as f64).floor() as u32).min(size.saturating_sub(1));
    let len = ((extent * size as f64).floor() as u32)
        .min(size.saturating_sub(start))
        .max(1);
    (start, len)
}

/// Place a `size` box at `corner` of `anchor_bbox` plus `offset`, with the
/// origin clamped into the container and the extent trimmed to fit (minimum 1).
pub fn resolve_anchored(
    anchor_bbox: &BoundingBox,
    offset: (i32, i32),
    size: (u32, u32),
    corner: Corner,
    container: (u32, u32),
) -> BoundingBox {
    let (base_x, base_y) = corner.point(anchor_bbox);
    let (cw, ch) = (container.0 as i64, container.1 as i64);

    let x = (base_x + offset.0 as i64).clamp(0, (cw - 1).max(0));
    let y = (base_y + offset.1 as i64).clamp(0, (ch - 1).max(0));
    let w = (size.0 as i64).min(cw - x).max(1);
    let h = (size.1 as i64).min(ch - y).max(1);

    BoundingBox::new(x as u32, y as u32, w as u32, h as u32)
}
