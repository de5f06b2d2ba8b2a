//! Shared types for the DICEPILOT control loop.
//!
//! These types form the data model passed between the recognizer, the
//! betting engine, the action sequencer and the coordinator. They carry no
//! behaviour beyond small projections so that every component can depend on
//! them without circular references.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// Die colour, shared by the recognizer (which may produce `Unknown`) and
/// the engine (where `None` means no side has been picked yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiceColor {
    Red,
    Orange,
    #[default]
    None,
    Unknown,
}

impl DiceColor {
    /// Whether this colour can be wagered on.
    pub fn is_selectable(&self) -> bool {
        matches!(self, DiceColor::Red | DiceColor::Orange)
    }
}

impl fmt::Display for DiceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceColor::Red => write!(f, "RED"),
            DiceColor::Orange => write!(f, "ORANGE"),
            DiceColor::None => write!(f, "NONE"),
            DiceColor::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for DiceColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(DiceColor::Red),
            "orange" => Ok(DiceColor::Orange),
            "none" | "" => Ok(DiceColor::None),
            _ => Err(anyhow::anyhow!("Unknown dice color: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A screen coordinate in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Rectangular region of the screen (top-left corner plus size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a region from the two corners of a drag, in either direction.
    /// Fractional coordinates truncate; anything left of or above the
    /// screen origin clamps to 0.
    pub fn from_corners(start: (f32, f32), end: (f32, f32)) -> Self {
        let left = start.0.min(end.0).max(0.0) as u32;
        let top = start.1.min(end.1).max(0.0) as u32;
        let right = start.0.max(end.0).max(0.0) as u32;
        let bottom = start.1.max(end.1).max(0.0) as u32;
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the region lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Tap targets inside the game UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingRegion {
    pub red: Point,
    pub orange: Point,
    /// Draw selector. Recorded for completeness; draws are never wagered on.
    pub draw: Point,
    /// "Place bet" confirm button.
    pub confirm: Point,
}

impl BettingRegion {
    /// Selector coordinate for a wagerable colour.
    pub fn selector(&self, color: DiceColor) -> Option<Point> {
        match color {
            DiceColor::Red => Some(self.red),
            DiceColor::Orange => Some(self.orange),
            DiceColor::None | DiceColor::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Frames and readings
// ---------------------------------------------------------------------------

/// A captured pixel buffer and the region it was captured for.
///
/// Owned by the cycle that captured it and dropped once analysis ends.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: RgbaImage,
    pub region: Rect,
    pub captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(image: RgbaImage, region: Rect) -> Self {
        Self {
            image,
            region,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Cut the frame down to its region. The result's region is the full
    /// extent of the cropped image.
    pub fn crop_to_region(&self) -> Result<RawFrame, CaptureError> {
        let r = self.region;
        if r.is_empty() {
            return Err(CaptureError::EmptyRegion(r));
        }
        if !r.fits_within(self.width(), self.height()) {
            return Err(CaptureError::RegionOutOfBounds {
                region: r,
                width: self.width(),
                height: self.height(),
            });
        }
        let cropped = image::imageops::crop_imm(&self.image, r.x, r.y, r.width, r.height).to_image();
        Ok(RawFrame {
            image: cropped,
            region: Rect::new(0, 0, r.width, r.height),
            captured_at: self.captured_at,
        })
    }
}

/// Pip counts of both dice for one round. Both counts are always in 1..=6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceReading {
    pub red_pips: u8,
    pub orange_pips: u8,
    pub captured_at: DateTime<Utc>,
}

impl DiceReading {
    pub fn new(red_pips: u8, orange_pips: u8) -> Self {
        Self {
            red_pips: red_pips.clamp(1, 6),
            orange_pips: orange_pips.clamp(1, 6),
            captured_at: Utc::now(),
        }
    }

    pub fn is_draw(&self) -> bool {
        self.red_pips == self.orange_pips
    }

    /// Colour of the higher die, or `None` on a draw.
    pub fn winner(&self) -> DiceColor {
        use std::cmp::Ordering;
        match self.red_pips.cmp(&self.orange_pips) {
            Ordering::Greater => DiceColor::Red,
            Ordering::Less => DiceColor::Orange,
            Ordering::Equal => DiceColor::None,
        }
    }
}

impl fmt::Display for DiceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "red={} orange={}", self.red_pips, self.orange_pips)
    }
}

// ---------------------------------------------------------------------------
// Betting
// ---------------------------------------------------------------------------

/// Result of a single settled round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetOutcome {
    pub won: bool,
    pub is_draw: bool,
    pub amount: u64,
    pub profit: i64,
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match (self.won, self.is_draw) {
            (true, _) => "WIN",
            (false, true) => "DRAW",
            (false, false) => "LOSS",
        };
        write!(f, "{label} stake={} profit={:+}", self.amount, self.profit)
    }
}

/// The next wager to actuate. Built fresh for each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerInstruction {
    pub color: DiceColor,
    pub amount: u64,
    pub color_button: Point,
    pub bet_button: Point,
}

impl fmt::Display for WagerInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} (select {} confirm {})",
            self.color, self.amount, self.color_button, self.bet_button
        )
    }
}

/// A single synthetic tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureStep {
    pub x: i32,
    pub y: i32,
    pub duration_ms: u64,
}

impl GestureStep {
    pub fn at(point: Point, duration_ms: u64) -> Self {
        Self {
            x: point.x,
            y: point.y,
            duration_ms,
        }
    }
}

/// Martingale state, owned by the betting engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingState {
    pub base_bet: u64,
    pub current_bet: u64,
    pub loss_count: u32,
    pub max_loss_count: u32,
    pub selected_color: DiceColor,
    pub is_active: bool,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_profit: i64,
}

impl Default for BettingState {
    fn default() -> Self {
        Self {
            base_bet: 10,
            current_bet: 10,
            loss_count: 0,
            max_loss_count: 10,
            selected_color: DiceColor::None,
            is_active: false,
            total_wins: 0,
            total_losses: 0,
            total_profit: 0,
        }
    }
}

impl fmt::Display for BettingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | color={} | bet={} (base {}) | streak={}/{} | W{}/L{} | profit={:+} | win_rate={:.1}%",
            if self.is_active { "ACTIVE" } else { "IDLE" },
            self.selected_color,
            self.current_bet,
            self.base_bet,
            self.loss_count,
            self.max_loss_count,
            self.total_wins,
            self.total_losses,
            self.total_profit,
            self.win_rate(),
        )
    }
}

impl BettingState {
    /// Win rate as a percentage. Returns 0.0 before any round has settled.
    pub fn win_rate(&self) -> f64 {
        let rounds = self.rounds_settled();
        if rounds == 0 {
            0.0
        } else {
            (self.total_wins as f64 / rounds as f64) * 100.0
        }
    }

    pub fn rounds_settled(&self) -> u64 {
        self.total_wins + self.total_losses
    }

    /// Whether any round has been recorded since the last reset.
    pub fn has_history(&self) -> bool {
        self.rounds_settled() > 0 || self.total_profit != 0
    }
}

/// Lifecycle phase projected from `BettingState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    Active,
    Stopped,
}

impl From<&BettingState> for EnginePhase {
    fn from(state: &BettingState) -> Self {
        if state.is_active {
            EnginePhase::Active
        } else if state.has_history() {
            EnginePhase::Stopped
        } else {
            EnginePhase::Idle
        }
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "🟡 IDLE"),
            EnginePhase::Active => write!(f, "🟢 ACTIVE"),
            EnginePhase::Stopped => write!(f, "🔴 STOPPED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// The frame could not be turned into a reading. Skips the round.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionFailure {
    #[error("Frame too small to split: {width}x{height}")]
    FrameTooSmall { width: u32, height: u32 },

    #[error("Both dice classified as {0}")]
    SameColor(DiceColor),

    #[error("Could not classify dice colors (left: {left}, right: {right})")]
    Ambiguous { left: DiceColor, right: DiceColor },

    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

/// No usable frame for this tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture region is empty: {0}")]
    EmptyRegion(Rect),

    #[error("Capture region {region} exceeds frame {width}x{height}")]
    RegionOutOfBounds { region: Rect, width: u32, height: u32 },

    #[error("Frame source failed: {0}")]
    Source(String),
}

/// A gesture sequence was aborted. Steps already dispatched are not undone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuationError {
    #[error("Step {index} ({kind}) failed: {reason}")]
    StepFailed {
        index: usize,
        kind: String,
        reason: String,
    },

    #[error("Step {index} ({kind}) timed out after {timeout_ms}ms")]
    TimedOut {
        index: usize,
        kind: String,
        timeout_ms: u64,
    },

    #[error("Sequence cancelled after {completed} step(s)")]
    Cancelled { completed: usize },

    #[error("No selector for color {0}")]
    NoSelector(DiceColor),
}

/// Rejected control call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Select a color before starting")]
    NoColorSelected,

    #[error("Capture region is not configured")]
    NoCaptureRegion,

    #[error("Betting region is not configured")]
    NoBettingRegion,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Coordinator is not running")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
