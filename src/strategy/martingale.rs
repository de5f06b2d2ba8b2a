//! Martingale betting engine.
//!
//! Doubles the stake after every lost round, returns to the base stake on a
//! win, and switches itself off once the consecutive-loss cap is reached.
//! Only an explicit `start` switches it back on.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::types::{
    BetOutcome, BettingRegion, BettingState, ControlError, DiceColor, DiceReading, EnginePhase,
    WagerInstruction,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Total return per unit staked on a winning round.
pub const DEFAULT_PAYOUT: Decimal = dec!(2.28);

/// Everything one settled round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub outcome: BetOutcome,
    /// Next wager to place; `None` once the engine has stopped.
    pub instruction: Option<WagerInstruction>,
    /// This round tripped the loss cap.
    pub hit_loss_cap: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct BettingEngine {
    state: BettingState,
    payout: Decimal,
    last_reading: Option<DiceReading>,
}

impl Default for BettingEngine {
    fn default() -> Self {
        Self::new(BettingState::default())
    }
}

impl BettingEngine {
    pub fn new(state: BettingState) -> Self {
        Self {
            state,
            payout: DEFAULT_PAYOUT,
            last_reading: None,
        }
    }

    /// Fresh engine for the configured stake, cap and colour.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(BettingState {
            base_bet: settings.base_bet,
            current_bet: settings.base_bet,
            max_loss_count: settings.max_loss_count,
            selected_color: settings.selected_color,
            ..BettingState::default()
        })
    }

    /// Override the payout coefficient. Values that cannot be represented
    /// keep the default.
    pub fn with_payout(mut self, payout: f64) -> Self {
        self.payout = Decimal::from_f64(payout).unwrap_or(DEFAULT_PAYOUT);
        self
    }

    pub fn state(&self) -> &BettingState {
        &self.state
    }

    pub fn payout(&self) -> Decimal {
        self.payout
    }

    pub fn last_reading(&self) -> Option<&DiceReading> {
        self.last_reading.as_ref()
    }

    pub fn phase(&self) -> EnginePhase {
        EnginePhase::from(&self.state)
    }

    /// Begin a fresh martingale run at the base stake. A no-op while
    /// already active.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if !self.state.selected_color.is_selectable() {
            return Err(ControlError::NoColorSelected);
        }
        if self.state.is_active {
            debug!("Start requested while active; ignoring");
            return Ok(());
        }
        self.state.is_active = true;
        self.state.current_bet = self.state.base_bet;
        self.state.loss_count = 0;
        info!(
            color = %self.state.selected_color,
            base_bet = self.state.base_bet,
            max_loss_count = self.state.max_loss_count,
            "Betting started"
        );
        Ok(())
    }

    /// Switch off without touching stake or counters.
    pub fn stop(&mut self) {
        self.state.is_active = false;
        info!("Betting stopped");
    }

    /// Apply a partial settings change. A bet that is already in progress
    /// keeps its stake; the new base applies from the next win or start.
    pub fn update_settings(
        &mut self,
        base_bet: Option<u64>,
        max_loss_count: Option<u32>,
        selected_color: Option<DiceColor>,
    ) {
        if let Some(bet) = base_bet {
            self.state.base_bet = bet;
            if !self.state.is_active {
                self.state.current_bet = bet;
            }
        }
        if let Some(n) = max_loss_count {
            self.state.max_loss_count = n;
        }
        if let Some(color) = selected_color {
            self.state.selected_color = color;
        }
        debug!(state = %self.state, "Engine settings updated");
    }

    /// Zero the statistics and return to the base stake. Does not change
    /// whether the engine is active.
    pub fn reset_statistics(&mut self) {
        self.state.total_wins = 0;
        self.state.total_losses = 0;
        self.state.total_profit = 0;
        self.state.loss_count = 0;
        self.state.current_bet = self.state.base_bet;
        info!("Statistics reset");
    }

    /// Score a reading against the current stake without changing state.
    /// A draw loses for either colour.
    pub fn settle(&self, reading: &DiceReading) -> BetOutcome {
        let is_draw = reading.is_draw();
        let won = !is_draw && reading.winner() == self.state.selected_color;
        let amount = self.state.current_bet;
        let profit = if won {
            let gain = (Decimal::from(amount) * (self.payout - Decimal::ONE)).trunc();
            gain.to_i64().unwrap_or(i64::MAX)
        } else {
            -i64::try_from(amount).unwrap_or(i64::MAX)
        };
        BetOutcome {
            won,
            is_draw,
            amount,
            profit,
        }
    }

    /// Record one round. Returns `None` when the engine is not betting.
    pub fn on_reading(
        &mut self,
        reading: &DiceReading,
        region: &BettingRegion,
    ) -> Option<RoundResult> {
        self.last_reading = Some(reading.clone());

        if !self.state.is_active || !self.state.selected_color.is_selectable() {
            return None;
        }

        let outcome = self.settle(reading);
        let hit_loss_cap = self.apply(&outcome);

        info!(
            reading = %reading,
            outcome = %outcome,
            next_bet = self.state.current_bet,
            streak = self.state.loss_count,
            total_profit = self.state.total_profit,
            "Round settled"
        );

        Some(RoundResult {
            outcome,
            instruction: self.next_instruction(region),
            hit_loss_cap,
        })
    }

    /// The wager the engine wants placed next, if it is betting.
    pub fn next_instruction(&self, region: &BettingRegion) -> Option<WagerInstruction> {
        if !self.state.is_active {
            return None;
        }
        let color = self.state.selected_color;
        Some(WagerInstruction {
            color,
            amount: self.state.current_bet,
            color_button: region.selector(color)?,
            bet_button: region.confirm,
        })
    }

    /// Fold an outcome into the state in one step. Returns true when the
    /// loss cap was reached.
    fn apply(&mut self, outcome: &BetOutcome) -> bool {
        let s = &mut self.state;
        s.total_profit = s.total_profit.saturating_add(outcome.profit);

        if outcome.won {
            s.current_bet = s.base_bet;
            s.loss_count = 0;
            s.total_wins += 1;
            return false;
        }

        s.total_losses += 1;
        s.loss_count += 1;
        if s.loss_count >= s.max_loss_count {
            // Stake stays at its last doubled value.
            s.is_active = false;
            warn!(
                loss_count = s.loss_count,
                last_bet = s.current_bet,
                total_profit = s.total_profit,
                "Maximum loss count reached; betting stopped"
            );
            true
        } else {
            s.current_bet = s.current_bet.saturating_mul(2);
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
