//! Mock device for integration testing.
//!
//! Provides a deterministic `FrameSource` + `GestureDispatcher` that serves
//! scripted dice frames, records every tap, and can be told to fail or
//! stall, all in-memory with no adb required.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use dicepilot::platforms::{FrameSource, GestureDispatcher};
use dicepilot::types::{GestureStep, RawFrame, Rect};

pub const RED: Rgba<u8> = Rgba([180, 20, 20, 255]);
pub const ORANGE: Rgba<u8> = Rgba([160, 90, 0, 255]);
const BACKGROUND: Rgba<u8> = Rgba([200, 200, 200, 255]);
const PIP: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Top-left corners of a 3x3 pip grid inside a 100x100 die.
const PIP_GRID: [(u32, u32); 9] = [
    (26, 26), (47, 26), (68, 26),
    (26, 47), (47, 47), (68, 47),
    (26, 68), (47, 68), (68, 68),
];

/// Capture region matching the frames this device produces.
pub const FRAME_REGION: Rect = Rect::new(0, 0, 200, 100);

/// What the next capture returns.
#[derive(Debug, Clone)]
pub enum Shot {
    Dice { left: (Rgba<u8>, usize), right: (Rgba<u8>, usize) },
    Fail(&'static str),
}

impl Shot {
    /// Red die on the left, orange on the right.
    pub fn roll(red: usize, orange: usize) -> Self {
        Shot::Dice { left: (RED, red), right: (ORANGE, orange) }
    }

    pub fn both_red(a: usize, b: usize) -> Self {
        Shot::Dice { left: (RED, a), right: (RED, b) }
    }
}

/// A scripted device. Captures beyond the end of the script fail.
#[derive(Default)]
pub struct MockDevice {
    shots: Mutex<VecDeque<Shot>>,
    captures: Mutex<usize>,
    taps: Mutex<Vec<GestureStep>>,
    /// If set, every tap returns this error.
    tap_error: Mutex<Option<String>>,
    /// Simulated gesture duration.
    tap_latency: Mutex<Duration>,
}

impl MockDevice {
    pub fn new(shots: impl IntoIterator<Item = Shot>) -> Self {
        Self {
            shots: Mutex::new(shots.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn push(&self, shot: Shot) {
        self.shots.lock().unwrap().push_back(shot);
    }

    /// Force all subsequent taps to fail.
    pub fn fail_taps(&self, msg: &str) {
        *self.tap_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn set_tap_latency(&self, latency: Duration) {
        *self.tap_latency.lock().unwrap() = latency;
    }

    pub fn captures(&self) -> usize {
        *self.captures.lock().unwrap()
    }

    pub fn taps(&self) -> Vec<GestureStep> {
        self.taps.lock().unwrap().clone()
    }
}

/// 200x100 frame with two 100x100 dice side by side.
pub fn render(left: (Rgba<u8>, usize), right: (Rgba<u8>, usize)) -> RgbaImage {
    let mut img = RgbaImage::new(200, 100);
    for (offset_x, (face, pips)) in [(0, left), (100, right)] {
        for y in 0..100 {
            for x in 0..100 {
                let inside = (20..80).contains(&x) && (20..80).contains(&y);
                img.put_pixel(offset_x + x, y, if inside { face } else { BACKGROUND });
            }
        }
        for &(px, py) in PIP_GRID.iter().take(pips) {
            for y in py..py + 6 {
                for x in px..px + 6 {
                    img.put_pixel(offset_x + x, y, PIP);
                }
            }
        }
    }
    img
}

#[async_trait]
impl FrameSource for MockDevice {
    async fn capture(&self, region: Rect) -> Result<RawFrame> {
        *self.captures.lock().unwrap() += 1;
        let shot = self.shots.lock().unwrap().pop_front();
        match shot {
            Some(Shot::Dice { left, right }) => Ok(RawFrame::new(render(left, right), region)),
            Some(Shot::Fail(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no frame available")),
        }
    }
}

#[async_trait]
impl GestureDispatcher for MockDevice {
    async fn tap(&self, step: GestureStep) -> Result<()> {
        let latency = *self.tap_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(msg) = self.tap_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        self.taps.lock().unwrap().push(step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicepilot::recognizer::DiceRecognizer;

    #[tokio::test]
    async fn test_mock_serves_script_in_order() {
        let device = MockDevice::new([Shot::roll(2, 5), Shot::Fail("blank screen")]);

        let frame = device.capture(FRAME_REGION).await.unwrap();
        let reading = DiceRecognizer::new().recognize(&frame).unwrap().reading;
        assert_eq!((reading.red_pips, reading.orange_pips), (2, 5));

        let err = device.capture(FRAME_REGION).await.unwrap_err();
        assert!(err.to_string().contains("blank screen"));
        assert!(device.capture(FRAME_REGION).await.is_err());
        assert_eq!(device.captures(), 3);
    }

    #[tokio::test]
    async fn test_mock_records_taps() {
        let device = MockDevice::default();
        device.tap(GestureStep { x: 1, y: 2, duration_ms: 100 }).await.unwrap();
        assert_eq!(device.taps().len(), 1);

        device.fail_taps("gesture cancelled");
        assert!(device.tap(GestureStep { x: 1, y: 2, duration_ms: 100 }).await.is_err());
        assert_eq!(device.taps().len(), 1);
    }
}
