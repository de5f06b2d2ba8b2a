//! Strategy: wager sizing and the betting state machine.

pub mod martingale;

pub use martingale::{BettingEngine, RoundResult, DEFAULT_PAYOUT};
