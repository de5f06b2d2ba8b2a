//! Wager executor.
//!
//! Replays a `WagerInstruction` as an ordered run of taps: pick the colour,
//! pick the stake, confirm. Each tap must succeed before the next one is
//! sent; the first failure aborts the run. Nothing is rolled back, so an
//! aborted run may leave a half-built bet slip in the target app.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ActuatorConfig, ChipButton};
use crate::platforms::GestureDispatcher;
use crate::types::{ActuationError, GestureStep, Point, WagerInstruction};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative stop signal, checked between steps only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    SelectColor,
    Chip(u64),
    Double,
    Confirm,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::SelectColor => write!(f, "select color"),
            StepKind::Chip(v) => write!(f, "chip {v}"),
            StepKind::Double => write!(f, "double"),
            StepKind::Confirm => write!(f, "confirm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub gesture: GestureStep,
    pub delay_after: Duration,
}

/// Timing and tap targets for the stake selector.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub click_duration_ms: u64,
    /// Pause between macro steps (colour → stake → confirm).
    pub step_delay: Duration,
    /// Pause between consecutive double taps.
    pub repeat_delay: Duration,
    pub tap_timeout: Duration,
    /// Ascending by value; never empty.
    pub chips: Vec<ChipButton>,
    pub double: Point,
}

impl From<&ActuatorConfig> for SequencerConfig {
    fn from(cfg: &ActuatorConfig) -> Self {
        Self {
            click_duration_ms: cfg.click_duration_ms,
            step_delay: Duration::from_millis(cfg.step_delay_ms),
            repeat_delay: Duration::from_millis(cfg.repeat_delay_ms),
            tap_timeout: Duration::from_millis(cfg.tap_timeout_ms),
            chips: cfg.chips.clone(),
            double: cfg.double,
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self::from(&ActuatorConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceReport {
    pub steps_completed: u64,
    pub chip: u64,
    pub doubles: u64,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct ActionSequencer {
    dispatcher: Arc<dyn GestureDispatcher>,
    config: SequencerConfig,
}

impl ActionSequencer {
    pub fn new(dispatcher: Arc<dyn GestureDispatcher>, config: SequencerConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Chip to tap for `amount` and how many doubles follow it: the smallest
    /// chip covering the amount, otherwise the largest chip doubled
    /// `floor(amount / largest) - 1` times.
    pub fn chip_for(&self, amount: u64) -> Option<(ChipButton, u64)> {
        if let Some(chip) = self.config.chips.iter().find(|c| amount <= c.value) {
            return Some((*chip, 0));
        }
        let largest = *self.config.chips.last()?;
        let doubles = (amount / largest.value).saturating_sub(1);
        Some((largest, doubles))
    }

    /// Ordered taps for an instruction, with the pause after each. Steps are
    /// produced on demand, so the double run is never materialised.
    pub fn plan(&self, instr: &WagerInstruction) -> Result<StepPlan, ActuationError> {
        if !instr.color.is_selectable() {
            return Err(ActuationError::NoSelector(instr.color));
        }
        let (chip, doubles) = self.chip_for(instr.amount).ok_or_else(|| ActuationError::StepFailed {
            index: 1,
            kind: "chip".into(),
            reason: "no chips configured".into(),
        })?;
        Ok(StepPlan {
            chip,
            doubles,
            color_button: instr.color_button,
            confirm_button: instr.bet_button,
            double: self.config.double,
            click_duration_ms: self.config.click_duration_ms,
            step_delay: self.config.step_delay,
            repeat_delay: self.config.repeat_delay,
            next: 0,
        })
    }

    /// Run the plan for `instr`, stopping at the first failed, timed-out or
    /// cancelled step.
    pub async fn execute(
        &self,
        instr: &WagerInstruction,
        cancel: &CancelFlag,
    ) -> Result<SequenceReport, ActuationError> {
        let plan = self.plan(instr)?;
        let (chip, doubles, total) = (plan.chip.value, plan.doubles, plan.total());

        info!(
            color = %instr.color,
            amount = instr.amount,
            chip,
            doubles,
            steps = total,
            "Executing wager"
        );

        for (index, step) in plan.enumerate() {
            if cancel.is_cancelled() {
                warn!(completed = index, "Wager sequence cancelled");
                return Err(ActuationError::Cancelled { completed: index });
            }

            let kind = step.kind.to_string();
            match tokio::time::timeout(self.config.tap_timeout, self.dispatcher.tap(step.gesture)).await {
                Err(_) => {
                    warn!(index, step = %kind, "Tap timed out");
                    return Err(ActuationError::TimedOut {
                        index,
                        kind,
                        timeout_ms: self.config.tap_timeout.as_millis() as u64,
                    });
                }
                Ok(Err(e)) => {
                    warn!(index, step = %kind, error = %e, "Tap failed; aborting sequence");
                    return Err(ActuationError::StepFailed {
                        index,
                        kind,
                        reason: format!("{e:#}"),
                    });
                }
                Ok(Ok(())) => {
                    debug!(index, step = %kind, x = step.gesture.x, y = step.gesture.y, "Tap ok");
                }
            }

            if !step.delay_after.is_zero() {
                tokio::time::sleep(step.delay_after).await;
            }
        }

        info!(amount = instr.amount, "Wager placed");
        Ok(SequenceReport {
            steps_completed: total,
            chip,
            doubles,
        })
    }
}

// ---------------------------------------------------------------------------
// Step plan
// ---------------------------------------------------------------------------

/// Colour, chip, `doubles` double taps, then confirm.
///
/// The pause after the last double is the double pause plus the macro-step
/// pause, so confirm always follows a full step delay.
#[derive(Debug, Clone)]
pub struct StepPlan {
    pub chip: ChipButton,
    pub doubles: u64,
    color_button: Point,
    confirm_button: Point,
    double: Point,
    click_duration_ms: u64,
    step_delay: Duration,
    repeat_delay: Duration,
    next: u64,
}

impl StepPlan {
    pub fn total(&self) -> u64 {
        self.doubles.saturating_add(3)
    }

    /// Steps not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.total() - self.next
    }
}

impl Iterator for StepPlan {
    type Item = PlannedStep;

    fn next(&mut self) -> Option<PlannedStep> {
        let i = self.next;
        if i >= self.total() {
            return None;
        }
        self.next += 1;

        let last_double = self.doubles.saturating_add(1);
        let (kind, point, delay_after) = match i {
            0 => (StepKind::SelectColor, self.color_button, self.step_delay),
            1 => (StepKind::Chip(self.chip.value), self.chip.point(), self.step_delay),
            i if i < last_double => (StepKind::Double, self.double, self.repeat_delay),
            i if i == last_double => (StepKind::Double, self.double, self.repeat_delay + self.step_delay),
            _ => (StepKind::Confirm, self.confirm_button, Duration::ZERO),
        };
        Some(PlannedStep {
            kind,
            gesture: GestureStep::at(point, self.click_duration_ms),
            delay_after,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
