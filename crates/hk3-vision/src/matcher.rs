use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::trace;

use crate::{BoundingBox, Frame};

/// Best placement of one template in one frame across a set of scales
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub found: bool,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub scale: f64,
}

impl MatchResult {
    /// Result reported when no scale produced a candidate.
    pub fn not_found() -> Self {
        Self {
            found: false,
            confidence: 0.0,
            bbox: BoundingBox::default(),
            scale: 1.0,
        }
    }
}

/// Find the best-matching scaled instance of `template` inside `frame`.
///
/// Each scale resizes the template with linear interpolation; scaled templates
/// larger than the frame are skipped. Candidates are compared by confidence and
/// the earliest scale in `scales` wins ties. `found` is `confidence >= threshold`.
///
/// Confidence is the zero-mean normalized cross-correlation
/// `sum(T' * I') / sqrt(sum(T'^2) * sum(I'^2))`, where `T'` and `I'` have their
/// per-channel means removed. It lies in `[-1, 1]` and is not clamped.
///
/// Correlation is undefined when the template or the window has no variance:
/// - both flat: `1 - max channel |mean(T) - mean(I)| / 255`, so a uniform
///   template matches a uniform region of the same color;
/// - only one flat: `0`.
pub fn match_template(frame: &Frame, template: &Frame, scales: &[f64], threshold: f64) -> MatchResult {
    let mut best: Option<MatchResult> = None;

    for &scale in scales {
        let Some(scaled) = scale_template(template, scale) else {
            trace!("Skipping degenerate scale {}", scale);
            continue;
        };
        if scaled.width() > frame.width() || scaled.height() > frame.height() {
            trace!(
                "Skipping scale {}: template {}x{} exceeds frame {}x{}",
                scale,
                scaled.width(),
                scaled.height(),
                frame.width(),
                frame.height()
            );
            continue;
        }
        let Some(candidate) = best_location(frame, &scaled) else {
            continue;
        };

        if best.map_or(true, |b| candidate.confidence > b.confidence) {
            best = Some(MatchResult {
                found: candidate.confidence >= threshold,
                confidence: candidate.confidence,
                bbox: BoundingBox::new(candidate.x, candidate.y, scaled.width(), scaled.height()),
                scale,
            });
        }
    }

    best.unwrap_or_else(MatchResult::not_found)
}

fn scale_template(template: &Frame, scale: f64) -> Option<Cow<'_, Frame>> {
    if !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    let (w, h) = template.dimensions();
    let sw = (w as f64 * scale).round() as u32;
    let sh = (h as f64 * scale).round() as u32;
    if sw == 0 || sh == 0 {
        return None;
    }
    if (sw, sh) == (w, h) {
        return Some(Cow::Borrowed(template));
    }
    Some(Cow::Owned(image::imageops::resize(
        template,
        sw,
        sh,
        FilterType::Triangle,
    )))
}

struct Candidate {
    confidence: f64,
    x: u32,
    y: u32,
}

/// Per-channel summed-area tables of intensities and squared intensities.
struct Integral {
    stride: usize,
    sums: Vec<[u64; 3]>,
    squares: Vec<[u64; 3]>,
}

impl Integral {
    fn new(frame: &Frame) -> Self {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let stride = w + 1;
        let mut sums = vec![[0u64; 3]; stride * (h + 1)];
        let mut squares = vec![[0u64; 3]; stride * (h + 1)];

        for (y, row) in frame.rows().enumerate() {
            let mut row_sum = [0u64; 3];
            let mut row_sq = [0u64; 3];
            for (x, px) in row.enumerate() {
                let (above, cell) = (y * stride + x + 1, (y + 1) * stride + x + 1);
                for c in 0..3 {
                    let v = px[c] as u64;
                    row_sum[c] += v;
                    row_sq[c] += v * v;
                    sums[cell][c] = sums[above][c] + row_sum[c];
                    squares[cell][c] = squares[above][c] + row_sq[c];
                }
            }
        }

        Self {
            stride,
            sums,
            squares,
        }
    }

    fn rect(table: &[[u64; 3]], stride: usize, x: usize, y: usize, w: usize, h: usize) -> [u64; 3] {
        let (tl, tr) = (y * stride + x, y * stride + x + w);
        let (bl, br) = ((y + h) * stride + x, (y + h) * stride + x + w);
        std::array::from_fn(|c| table[br][c] + table[tl][c] - table[tr][c] - table[bl][c])
    }

    /// Channel sums and squared sums over a window.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> ([u64; 3], [u64; 3]) {
        (
            Self::rect(&self.sums, self.stride, x, y, w, h),
            Self::rect(&self.squares, self.stride, x, y, w, h),
        )
    }
}

/// `n * sum(v^2) - sum(v)^2` summed over channels; zero iff every channel is constant.
fn scaled_variance(n: u64, sums: [u64; 3], squares: [u64; 3]) -> u128 {
    (0..3)
        .map(|c| n as u128 * squares[c] as u128 - (sums[c] as u128).pow(2))
        .sum()
}

fn flat_similarity(a: [f64; 3], b: [f64; 3]) -> f64 {
    let diff = (0..3).map(|c| (a[c] - b[c]).abs()).fold(0.0, f64::max);
    1.0 - diff / 255.0
}

/// Template with its channel means removed
struct Centered {
    width: usize,
    height: usize,
    pixels: u64,
    mean: [f64; 3],
    values: Vec<f64>,
    norm: f64,
    flat: bool,
}

impl Centered {
    fn new(template: &Frame) -> Self {
        let pixels = template.width() as u64 * template.height() as u64;
        let mut sums = [0u64; 3];
        let mut squares = [0u64; 3];
        for px in template.pixels() {
            for c in 0..3 {
                sums[c] += px[c] as u64;
                squares[c] += px[c] as u64 * px[c] as u64;
            }
        }
        let mean: [f64; 3] = std::array::from_fn(|c| sums[c] as f64 / pixels as f64);
        let values: Vec<f64> = template
            .as_raw()
            .chunks_exact(3)
            .flat_map(|px| (0..3).map(move |c| px[c] as f64 - mean[c]))
            .collect();
        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();

        Self {
            width: template.width() as usize,
            height: template.height() as usize,
            pixels,
            mean,
            values,
            norm,
            flat: scaled_variance(pixels, sums, squares) == 0,
        }
    }
}

struct Surface<'a> {
    frame: &'a Frame,
    template: Centered,
    integral: Integral,
    out_width: u32,
}

impl Surface<'_> {
    fn score(&self, x: u32, y: u32) -> f64 {
        let t = &self.template;
        let (x, y) = (x as usize, y as usize);

        let (sums, squares) = self.integral.window(x, y, t.width, t.height);
        let variance = scaled_variance(t.pixels, sums, squares);
        match (t.flat, variance == 0) {
            (true, true) => {
                let mean = std::array::from_fn(|c| sums[c] as f64 / t.pixels as f64);
                return flat_similarity(t.mean, mean);
            }
            (true, false) | (false, true) => return 0.0,
            (false, false) => {}
        }

        let fw = self.frame.width() as usize;
        let frame = self.frame.as_raw();
        let row_len = t.width * 3;

        // Centering the window is unnecessary: the template terms sum to zero.
        let mut cross = 0.0;
        for ty in 0..t.height {
            let fs = ((y + ty) * fw + x) * 3;
            let ts = ty * row_len;
            cross += frame[fs..fs + row_len]
                .iter()
                .zip(&t.values[ts..ts + row_len])
                .map(|(&a, &b)| a as f64 * b)
                .sum::<f64>();
        }

        let window_norm = (variance as f64 / t.pixels as f64).sqrt();
        cross / (t.norm * window_norm)
    }

    /// Highest score in row `y`, leftmost on ties.
    fn row_best(&self, y: u32) -> Option<(f64, u32)> {
        let mut best: Option<(f64, u32)> = None;
        for x in 0..self.out_width {
            let score = self.score(x, y);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, x));
            }
        }
        best
    }
}

/// Maximum of the correlation surface, first in row-major order on ties.
fn best_location(frame: &Frame, template: &Frame) -> Option<Candidate> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return None;
    }

    let surface = Surface {
        frame,
        template: Centered::new(template),
        integral: Integral::new(frame),
        out_width: fw - tw + 1,
    };
    let out_height = fh - th + 1;

    #[cfg(feature = "parallel")]
    let rows: Vec<Option<(f64, u32)>> = {
        use rayon::prelude::*;
        (0..out_height)
            .into_par_iter()
            .map(|y| surface.row_best(y))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Option<(f64, u32)>> = (0..out_height).map(|y| surface.row_best(y)).collect();

    let mut best: Option<Candidate> = None;
    for (y, row) in rows.into_iter().enumerate() {
        let Some((confidence, x)) = row else { continue };
        if best.as_ref().map_or(true, |b| confidence > b.confidence) {
            best = Some(Candidate {
                confidence,
                x,
                y: y as u32,
            });
        }
    }
    best
}
