//! 模板匹配（归一化相关系数，支持 alpha mask）

use std::ops::Range;

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::store::Marker;
use crate::core::video::frame::Frame;

/// Cells above this many hits are treated as over-detection.
const MAX_HITS: usize = 100;

/// Axis bound: absolute pixel index or fraction of the axis size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Absolute(u32),
    Relative(f64),
}

/// Slice bounds on one axis.
///
/// A relative `stop` is a fraction of the space after `start`; an absolute
/// `stop` following a relative `start` is a length rather than an index.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisRange {
    #[serde(default)]
    pub start: Option<Bound>,
    #[serde(default)]
    pub stop: Option<Bound>,
}

impl AxisRange {
    pub const FULL: AxisRange = AxisRange {
        start: None,
        stop: None,
    };

    pub fn new(start: Option<Bound>, stop: Option<Bound>) -> Self {
        Self { start, stop }
    }

    pub fn from_ratio(start: f64) -> Self {
        Self::new(Some(Bound::Relative(start)), None)
    }

    pub fn until_ratio(stop: f64) -> Self {
        Self::new(None, Some(Bound::Relative(stop)))
    }

    /// Bounds are clamped to `0..size`.
    pub fn resolve(&self, size: u32) -> Range<u32> {
        let start = match self.start {
            None => 0,
            Some(Bound::Absolute(n)) => n,
            Some(Bound::Relative(f)) => (size as f64 * f) as u32,
        }
        .min(size);
        let stop = match (self.start, self.stop) {
            (_, None) => size,
            (_, Some(Bound::Relative(f))) => {
                start.saturating_add((size.saturating_sub(start) as f64 * f) as u32)
            }
            (Some(Bound::Relative(_)), Some(Bound::Absolute(n))) => start.saturating_add(n),
            (_, Some(Bound::Absolute(n))) => n,
        };
        start..stop.clamp(start, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub x: AxisRange,
    #[serde(default)]
    pub y: AxisRange,
}

impl Region {
    pub fn new(x: AxisRange, y: AxisRange) -> Self {
        Self { x, y }
    }

    pub fn resolve(&self, width: u32, height: u32) -> (Range<u32>, Range<u32>) {
        (self.x.resolve(width), self.y.resolve(height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    #[default]
    Auto,
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Match on luma instead of averaging the three color planes.
    pub grayscale: bool,
    pub threshold: Threshold,
    pub region: Option<Region>,
}

impl MatchOptions {
    pub fn gray() -> Self {
        Self {
            grayscale: true,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Threshold::Fixed(threshold);
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerResult {
    pub marker: String,
    pub found: bool,
    /// Top-left corners of accepted matches in frame coordinates, empty unless found.
    pub coords: Vec<(u32, u32)>,
    pub threshold: f64,
    /// Lowest and highest accepted score.
    pub score_range: Option<(f32, f32)>,
}

impl MarkerResult {
    pub fn not_found(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            found: false,
            coords: Vec::new(),
            threshold: 0.0,
            score_range: None,
        }
    }

    pub fn found_at(marker: impl Into<String>, coords: Vec<(u32, u32)>) -> Self {
        Self {
            marker: marker.into(),
            found: true,
            coords,
            threshold: 0.0,
            score_range: None,
        }
    }
}

/// Threshold derived from marker size: 0.96 for small markers down to 0.80.
pub fn auto_threshold(width: u32, height: u32) -> f64 {
    let rate = |size: u32| (size.max(24).clamp(32, 256) - 32) as f64 / 224.0;
    let average = (rate(width) + rate(height)) / 2.0;
    0.96 - 0.16 * average.powf(2.5)
}

/// Score map of a template slid over an image, row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchSurface {
    pub width: u32,
    pub height: u32,
    pub scores: Vec<f32>,
}

impl MatchSurface {
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn all_finite(&self) -> bool {
        self.scores.iter().all(|s| s.is_finite())
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.scores[(y * self.width + x) as usize]
    }

    fn average(surfaces: &[MatchSurface]) -> MatchSurface {
        let Some(first) = surfaces.first() else {
            return MatchSurface::default();
        };
        let n = surfaces.len() as f32;
        let scores = (0..first.scores.len())
            .map(|i| surfaces.iter().map(|s| s.scores[i]).sum::<f32>() / n)
            .collect();
        MatchSurface {
            width: first.width,
            height: first.height,
            scores,
        }
    }
}

/// Normalized correlation coefficient of `template` over every window of `image`.
///
/// Only pixels with a non-zero mask value take part. Unmasked matching maps a
/// zero-variance window to 0; masked matching yields NaN there.
pub fn match_template(image: &GrayImage, template: &GrayImage, mask: Option<&GrayImage>) -> MatchSurface {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return MatchSurface::default();
    }

    // (dx, dy, template value) for every participating pixel, grouped by row
    let mut taps: Vec<Vec<(usize, f64)>> = vec![Vec::new(); th as usize];
    let mut t_sum = 0.0;
    let mut n = 0u64;
    for (x, y, px) in template.enumerate_pixels() {
        let included = mask.map(|m| m.get_pixel(x, y)[0] > 0).unwrap_or(true);
        if included {
            taps[y as usize].push((x as usize, px[0] as f64));
            t_sum += px[0] as f64;
            n += 1;
        }
    }

    let ow = iw - tw + 1;
    let oh = ih - th + 1;
    if n == 0 {
        return MatchSurface {
            width: ow,
            height: oh,
            scores: vec![f32::NAN; (ow * oh) as usize],
        };
    }

    let t_mean = t_sum / n as f64;
    let mut t_energy = 0.0;
    for row in taps.iter_mut() {
        for (_, v) in row.iter_mut() {
            *v -= t_mean;
            t_energy += *v * *v;
        }
    }

    let masked = mask.is_some();
    let stride = iw as usize;
    let pixels = image.as_raw();
    let mut scores = vec![0f32; (ow * oh) as usize];

    scores
        .par_chunks_mut(ow as usize)
        .enumerate()
        .for_each(|(y, row_out)| {
            for (x, out) in row_out.iter_mut().enumerate() {
                let mut sum = 0u64;
                let mut sum_sq = 0u64;
                let mut cross = 0.0f64;
                for (dy, row_taps) in taps.iter().enumerate() {
                    let base = (y + dy) * stride + x;
                    for &(dx, t) in row_taps {
                        let v = pixels[base + dx] as u64;
                        sum += v;
                        sum_sq += v * v;
                        cross += t * v as f64;
                    }
                }

                let spread = (n * sum_sq) as f64 - (sum * sum) as f64;
                let denom = (t_energy * spread / n as f64).sqrt();
                *out = if masked {
                    (cross / denom) as f32
                } else {
                    guarded_ratio(cross, denom) as f32
                };
            }
        });

    MatchSurface {
        width: ow,
        height: oh,
        scores,
    }
}

fn guarded_ratio(num: f64, denom: f64) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        num.signum()
    } else {
        0.0
    }
}

/// Runs one marker against a frame.
///
/// Non-finite scores or more than 100 hits make the result a miss.
pub fn detect(frame: &Frame, marker: &Marker, options: &MatchOptions) -> MarkerResult {
    let (x_range, y_range) = match &options.region {
        Some(region) => region.resolve(frame.width, frame.height),
        None => (0..frame.width, 0..frame.height),
    };
    let offset = (x_range.start.min(frame.width), y_range.start.min(frame.height));
    let area = frame.crop(x_range, y_range);

    let threshold = match options.threshold {
        Threshold::Auto => auto_threshold(marker.width(), marker.height()),
        Threshold::Fixed(t) => t,
    };

    let surface = if options.grayscale {
        match_template(&area.to_gray(), marker.gray(), marker.mask())
    } else {
        let mut surfaces = Vec::with_capacity(3);
        for channel in 0..3 {
            let surface = match_template(&area.channel(channel), marker.plane(channel), marker.mask());
            let finite = surface.all_finite();
            surfaces.push(surface);
            if !finite {
                break;
            }
        }
        MatchSurface::average(&surfaces)
    };

    let mut coords = Vec::new();
    let mut score_range: Option<(f32, f32)> = None;
    let mut non_finite = 0usize;
    for y in 0..surface.height {
        for x in 0..surface.width {
            let score = surface.get(x, y);
            if !score.is_finite() {
                non_finite += 1;
                continue;
            }
            if score as f64 >= threshold {
                coords.push((x + offset.0, y + offset.1));
                score_range = Some(match score_range {
                    Some((lo, hi)) => (lo.min(score), hi.max(score)),
                    None => (score, score),
                });
            }
        }
    }

    let invalid = non_finite > 0 || coords.len() > MAX_HITS;
    let found = !coords.is_empty() && !invalid;

    MarkerResult {
        marker: marker.name().to_string(),
        found,
        coords: if found { coords } else { Vec::new() },
        threshold,
        score_range: if found { score_range } else { None },
    }
}
