//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! parts the control loop needs at runtime are projected into a
//! [`Settings`] snapshot; later changes arrive as [`SettingsUpdate`]s.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::{BettingRegion, ControlError, DiceColor, Point, Rect};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub betting: BettingConfig,
    #[serde(default)]
    pub regions: RegionsConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Start betting as soon as the loop is up (requires a colour and both
    /// regions).
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BettingConfig {
    pub base_bet: u64,
    pub max_loss_count: u32,
    #[serde(default)]
    pub selected_color: DiceColor,
    #[serde(default = "default_payout_coefficient")]
    pub payout_coefficient: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegionsConfig {
    pub capture: Option<Rect>,
    pub betting: Option<BettingRegion>,
}

/// One chip button in the stake selector.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChipButton {
    pub value: u64,
    pub x: i32,
    pub y: i32,
}

impl ChipButton {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorConfig {
    #[serde(default = "default_click_duration_ms")]
    pub click_duration_ms: u64,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_repeat_delay_ms")]
    pub repeat_delay_ms: u64,
    #[serde(default = "default_tap_timeout_ms")]
    pub tap_timeout_ms: u64,
    /// Chip ladder, ascending by value.
    #[serde(default = "default_chips")]
    pub chips: Vec<ChipButton>,
    /// The "x2" control used for stakes above the largest chip.
    #[serde(default = "default_double_button")]
    pub double: Point,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            click_duration_ms: default_click_duration_ms(),
            step_delay_ms: default_step_delay_ms(),
            repeat_delay_ms: default_repeat_delay_ms(),
            tap_timeout_ms: default_tap_timeout_ms(),
            chips: default_chips(),
            double: default_double_button(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    pub serial: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            serial: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

fn default_check_interval_ms() -> u64 {
    6000
}

fn default_payout_coefficient() -> f64 {
    2.28
}

fn default_click_duration_ms() -> u64 {
    100
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_repeat_delay_ms() -> u64 {
    200
}

fn default_tap_timeout_ms() -> u64 {
    5000
}

fn default_chips() -> Vec<ChipButton> {
    vec![
        ChipButton { value: 10, x: 100, y: 900 },
        ChipButton { value: 50, x: 200, y: 900 },
        ChipButton { value: 100, x: 300, y: 900 },
        ChipButton { value: 500, x: 400, y: 900 },
        ChipButton { value: 2500, x: 500, y: 900 },
    ]
}

fn default_double_button() -> Point {
    Point::new(600, 900)
}

fn default_adb_path() -> String {
    "adb".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.check_interval_ms == 0 {
            bail!("agent.check_interval_ms must be positive");
        }
        if self.betting.base_bet == 0 {
            bail!("betting.base_bet must be positive");
        }
        if self.betting.max_loss_count == 0 {
            bail!("betting.max_loss_count must be at least 1");
        }
        if self.betting.payout_coefficient <= 1.0 {
            bail!("betting.payout_coefficient must exceed 1.0");
        }
        if self.betting.selected_color == DiceColor::Unknown {
            bail!("betting.selected_color must be red, orange or none");
        }
        if self.actuator.chips.is_empty() {
            bail!("actuator.chips must list at least one chip");
        }
        if self.actuator.chips.windows(2).any(|w| w[0].value >= w[1].value) {
            bail!("actuator.chips must be sorted by ascending value");
        }
        if self.actuator.chips.iter().any(|c| c.value == 0) {
            bail!("actuator.chips values must be positive");
        }
        Ok(())
    }

    /// The runtime settings snapshot this configuration starts with.
    pub fn settings(&self) -> Settings {
        Settings {
            capture_region: self.regions.capture,
            betting_region: self.regions.betting,
            check_interval_ms: self.agent.check_interval_ms,
            max_loss_count: self.betting.max_loss_count,
            base_bet: self.betting.base_bet,
            selected_color: self.betting.selected_color,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

/// Read snapshot of everything the loop consults at cycle start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub capture_region: Option<Rect>,
    pub betting_region: Option<BettingRegion>,
    pub check_interval_ms: u64,
    pub max_loss_count: u32,
    pub base_bet: u64,
    pub selected_color: DiceColor,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_region: None,
            betting_region: None,
            check_interval_ms: default_check_interval_ms(),
            max_loss_count: 10,
            base_bet: 10,
            selected_color: DiceColor::None,
        }
    }
}

/// Partial settings change. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub capture_region: Option<Rect>,
    pub betting_region: Option<BettingRegion>,
    pub check_interval_ms: Option<u64>,
    pub max_loss_count: Option<u32>,
    pub base_bet: Option<u64>,
    pub selected_color: Option<DiceColor>,
}

impl SettingsUpdate {
    /// Reject an update before any of it is applied.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.check_interval_ms == Some(0) {
            return Err(ControlError::InvalidSetting("check_interval_ms must be positive".into()));
        }
        if self.base_bet == Some(0) {
            return Err(ControlError::InvalidSetting("base_bet must be positive".into()));
        }
        if self.max_loss_count == Some(0) {
            return Err(ControlError::InvalidSetting("max_loss_count must be at least 1".into()));
        }
        if self.selected_color == Some(DiceColor::Unknown) {
            return Err(ControlError::InvalidSetting("selected_color cannot be unknown".into()));
        }
        if self.capture_region.is_some_and(|r| r.is_empty()) {
            return Err(ControlError::InvalidSetting("capture_region is empty".into()));
        }
        Ok(())
    }
}

impl Settings {
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(r) = update.capture_region {
            self.capture_region = Some(r);
        }
        if let Some(b) = update.betting_region {
            self.betting_region = Some(b);
        }
        if let Some(ms) = update.check_interval_ms {
            self.check_interval_ms = ms;
        }
        if let Some(n) = update.max_loss_count {
            self.max_loss_count = n;
        }
        if let Some(bet) = update.base_bet {
            self.base_bet = bet;
        }
        if let Some(color) = update.selected_color {
            self.selected_color = color;
        }
    }

    /// Preconditions for starting the loop, other than the engine's own.
    pub fn check_ready(&self) -> Result<(Rect, BettingRegion), ControlError> {
        let capture = self.capture_region.ok_or(ControlError::NoCaptureRegion)?;
        let betting = self.betting_region.ok_or(ControlError::NoBettingRegion)?;
        Ok((capture, betting))
    }
}
