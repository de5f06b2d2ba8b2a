//! Die colour classification by hue.
//!
//! Samples a centred square of a die image and votes each bright,
//! saturated pixel into a red or orange bucket.

use image::RgbaImage;

use crate::types::DiceColor;

const RED_HUE_LOW: (f32, f32) = (0.0, 20.0);
const RED_HUE_HIGH: (f32, f32) = (340.0, 360.0);
const ORANGE_HUE: (f32, f32) = (20.0, 40.0);

/// Pixels at or below this saturation are ignored (greys, white pips).
const MIN_SATURATION: f32 = 0.3;
/// Pixels at or below this value are ignored (shadows, background).
const MIN_VALUE: f32 = 0.5;

/// Hue in degrees [0, 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    Hsv {
        hue: if hue >= 360.0 { hue - 360.0 } else { hue },
        saturation,
        value: max,
    }
}

fn in_range(hue: f32, (lo, hi): (f32, f32)) -> bool {
    hue >= lo && hue <= hi
}

pub fn is_red_hue(hue: f32) -> bool {
    in_range(hue, RED_HUE_LOW) || in_range(hue, RED_HUE_HIGH)
}

pub fn is_orange_hue(hue: f32) -> bool {
    in_range(hue, ORANGE_HUE)
}

/// Vote counts from one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorVotes {
    pub red: usize,
    pub orange: usize,
}

impl ColorVotes {
    /// The strictly larger bucket; ties (including 0:0) are `Unknown`.
    pub fn verdict(&self) -> DiceColor {
        use std::cmp::Ordering;
        match self.red.cmp(&self.orange) {
            Ordering::Greater => DiceColor::Red,
            Ordering::Less => DiceColor::Orange,
            Ordering::Equal => DiceColor::Unknown,
        }
    }
}

/// Count red and orange pixels in the central square of `die`, whose
/// half-side is a third of the shorter image dimension.
pub fn sample_votes(die: &RgbaImage) -> ColorVotes {
    let (w, h) = (die.width() as i64, die.height() as i64);
    let cx = w / 2;
    let cy = h / 2;
    let radius = w.min(h) / 3;

    let mut votes = ColorVotes::default();
    for x in (cx - radius)..=(cx + radius) {
        for y in (cy - radius)..=(cy + radius) {
            if x < 0 || x >= w || y < 0 || y >= h {
                continue;
            }
            let [r, g, b, _] = die.get_pixel(x as u32, y as u32).0;
            let hsv = rgb_to_hsv(r, g, b);
            if hsv.saturation <= MIN_SATURATION || hsv.value <= MIN_VALUE {
                continue;
            }
            // Hue 20° is claimed by red first.
            if is_red_hue(hsv.hue) {
                votes.red += 1;
            } else if is_orange_hue(hsv.hue) {
                votes.orange += 1;
            }
        }
    }
    votes
}

pub fn classify(die: &RgbaImage) -> DiceColor {
    sample_votes(die).verdict()
}
