//! Pip counting: binarize a die image and count pip-sized white blobs.

use image::RgbaImage;
use serde::Serialize;
use std::fmt;

/// Fraction of the mean luminance used as the binarization threshold.
const THRESHOLD_FACTOR: f64 = 0.7;
/// Blob area bounds as fractions of the image area.
const MIN_PIP_AREA: f64 = 0.001;
const MAX_PIP_AREA: f64 = 0.05;

/// Raised when a raw count had to be clamped into 1..=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipWarning {
    /// No blobs found; assumed to be an undercount of a single pip.
    NoneFound,
    /// More blobs than a die face can show.
    TooMany(usize),
}

impl fmt::Display for PipWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipWarning::NoneFound => write!(f, "no pips found, assuming 1"),
            PipWarning::TooMany(n) => write!(f, "{n} pips found, clamping to 6"),
        }
    }
}

/// Two-level image: `true` is white.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<bool>,
}

impl BinaryImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.pixels[self.idx(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, white: bool) {
        let i = self.idx(x, y);
        self.pixels[i] = white;
    }

    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// ITU-R BT.601 luma, truncated to an integer level.
pub fn luminance(r: u8, g: u8, b: u8) -> u32 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u32
}

/// Threshold at 70% of the mean luminance: brighter pixels become white.
pub fn binarize(img: &RgbaImage) -> BinaryImage {
    let mut out = BinaryImage::new(img.width(), img.height());
    if out.area() == 0 {
        return out;
    }

    let total: f64 = img
        .pixels()
        .map(|p| luminance(p.0[0], p.0[1], p.0[2]) as f64)
        .sum();
    let threshold = (total / out.area() as f64 * THRESHOLD_FACTOR) as u32;

    for (x, y, p) in img.enumerate_pixels() {
        out.set(x, y, luminance(p.0[0], p.0[1], p.0[2]) > threshold);
    }
    out
}

/// Size of the 4-connected white component containing (x, y), marking it
/// visited.
fn flood_fill(bin: &BinaryImage, visited: &mut [bool], x: u32, y: u32) -> usize {
    let mut stack = vec![(x, y)];
    let mut size = 0;

    while let Some((x, y)) = stack.pop() {
        let i = bin.idx(x, y);
        if visited[i] || !bin.pixels[i] {
            continue;
        }
        visited[i] = true;
        size += 1;

        if x + 1 < bin.width {
            stack.push((x + 1, y));
        }
        if x > 0 {
            stack.push((x - 1, y));
        }
        if y + 1 < bin.height {
            stack.push((x, y + 1));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
    }
    size
}

/// Number of white components whose area is within the pip bounds.
pub fn count_components(bin: &BinaryImage) -> usize {
    let area = bin.area() as f64;
    let min = (area * MIN_PIP_AREA) as usize;
    let max = (area * MAX_PIP_AREA) as usize;

    let mut visited = vec![false; bin.area()];
    let mut count = 0;
    for y in 0..bin.height {
        for x in 0..bin.width {
            let i = bin.idx(x, y);
            if visited[i] || !bin.pixels[i] {
                continue;
            }
            let size = flood_fill(bin, &mut visited, x, y);
            if (min..=max).contains(&size) {
                count += 1;
            }
        }
    }
    count
}

/// Force a raw count into 1..=6, reporting whether it had to be changed.
pub fn clamp_pip_count(raw: usize) -> (u8, Option<PipWarning>) {
    match raw {
        0 => (1, Some(PipWarning::NoneFound)),
        1..=6 => (raw as u8, None),
        n => (6, Some(PipWarning::TooMany(n))),
    }
}

/// Raw (unclamped) pip count for one die image.
pub fn raw_pip_count(die: &RgbaImage) -> usize {
    count_components(&binarize(die))
}
