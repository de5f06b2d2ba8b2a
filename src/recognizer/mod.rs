//! Dice recognizer: turns a cropped frame into a `DiceReading`.
//!
//! The frame holds two dice side by side. Each half is classified
//! independently by colour (red or orange) and pip count; the reading only
//! succeeds when exactly one half is red and the other orange.

pub mod color;
pub mod pips;

use image::{imageops, RgbaImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{DiceColor, DiceReading, RawFrame, RecognitionFailure};
use pips::PipWarning;

/// Analysis of one die half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DieAnalysis {
    pub color: DiceColor,
    pub raw_pips: usize,
    pub pips: u8,
    pub warning: Option<PipWarning>,
}

/// A successful reading plus any clamp warnings raised on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub reading: DiceReading,
    pub warnings: Vec<PipWarning>,
}

/// Stateless; safe to share across worker threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceRecognizer;

impl DiceRecognizer {
    pub fn new() -> Self {
        Self
    }

    /// Classify one die image.
    pub fn analyze_die(&self, die: &RgbaImage) -> DieAnalysis {
        let color = color::classify(die);
        let raw_pips = pips::raw_pip_count(die);
        let (pips, warning) = pips::clamp_pip_count(raw_pips);
        DieAnalysis {
            color,
            raw_pips,
            pips,
            warning,
        }
    }

    /// Read both dice from a frame already cropped to the dice region.
    pub fn recognize(&self, frame: &RawFrame) -> Result<Recognition, RecognitionFailure> {
        let (width, height) = (frame.width(), frame.height());
        let half = width / 2;
        if half == 0 || height == 0 {
            return Err(RecognitionFailure::FrameTooSmall { width, height });
        }

        // Halves live only for the duration of this call.
        let left_img = imageops::crop_imm(&frame.image, 0, 0, half, height).to_image();
        let right_img = imageops::crop_imm(&frame.image, half, 0, half, height).to_image();

        let left = self.analyze_die(&left_img);
        let right = self.analyze_die(&right_img);

        debug!(
            left_color = %left.color,
            left_pips = left.raw_pips,
            right_color = %right.color,
            right_pips = right.raw_pips,
            "Dice halves analysed"
        );

        let (red, orange) = match (left.color, right.color) {
            (DiceColor::Red, DiceColor::Orange) => (&left, &right),
            (DiceColor::Orange, DiceColor::Red) => (&right, &left),
            (a, b) if a == b && a.is_selectable() => {
                return Err(RecognitionFailure::SameColor(a));
            }
            (a, b) => {
                return Err(RecognitionFailure::Ambiguous { left: a, right: b });
            }
        };

        let mut warnings = Vec::new();
        for (label, die) in [("red", red), ("orange", orange)] {
            if let Some(w) = die.warning {
                warn!(die = label, raw = die.raw_pips, clamped = die.pips, "Pip count clamped: {w}");
                warnings.push(w);
            }
        }

        Ok(Recognition {
            reading: DiceReading {
                red_pips: red.pips,
                orange_pips: orange.pips,
                captured_at: frame.captured_at,
            },
            warnings,
        })
    }
}
