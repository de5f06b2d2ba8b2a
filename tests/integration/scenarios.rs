//! End-to-end runs of the capture loop against the mock device.
//!
//! Time is paused, so the 6s tick interval and the tap delays elapse
//! instantly while keeping their ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use dicepilot::config::{Settings, SettingsUpdate};
use dicepilot::engine::{
    ActionSequencer, Coordinator, CoordinatorHandle, LoopEvent, SequencerConfig, StopReason,
};
use dicepilot::strategy::BettingEngine;
use dicepilot::types::{BettingRegion, DiceColor, Point};

use crate::mock_device::{MockDevice, Shot, FRAME_REGION};

const TICK_MS: u64 = 6000;

fn betting_region() -> BettingRegion {
    BettingRegion {
        red: Point::new(180, 1650),
        orange: Point::new(900, 1650),
        draw: Point::new(540, 1650),
        confirm: Point::new(540, 2050),
    }
}

fn settings(color: DiceColor, base_bet: u64, max_loss_count: u32) -> Settings {
    Settings {
        capture_region: Some(FRAME_REGION),
        betting_region: Some(betting_region()),
        check_interval_ms: TICK_MS,
        max_loss_count,
        base_bet,
        selected_color: color,
    }
}

fn launch(device: &Arc<MockDevice>, settings: Settings) -> CoordinatorHandle {
    let sequencer = ActionSequencer::new(device.clone(), SequencerConfig::default());
    let engine = BettingEngine::from_settings(&settings);
    let (handle, _task) = Coordinator::spawn(device.clone(), sequencer, engine, settings);
    handle
}

/// Collect events up to and including the first one matching `until`.
async fn collect_until(
    rx: &mut broadcast::Receiver<LoopEvent>,
    until: impl Fn(&LoopEvent) -> bool,
) -> Vec<LoopEvent> {
    let mut seen = Vec::new();
    let wait = async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            let done = until(&event);
            seen.push(event);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("timed out waiting for event");
    seen
}

fn outcome_amounts(events: &[LoopEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Outcome { outcome, .. } => Some(outcome.amount),
            _ => None,
        })
        .collect()
}

fn wager_amounts(events: &[LoopEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            LoopEvent::WagerPlaced { instruction } => Some(instruction.amount),
            _ => None,
        })
        .collect()
}

fn is_outcome(e: &LoopEvent) -> bool {
    matches!(e, LoopEvent::Outcome { .. })
}

#[tokio::test(start_paused = true)]
async fn test_three_losses_hit_cap_and_halt_loop() {
    let device = Arc::new(MockDevice::new([
        Shot::roll(1, 6),
        Shot::roll(2, 4),
        Shot::roll(3, 5),
        Shot::roll(6, 1),
    ]));
    let handle = launch(&device, settings(DiceColor::Red, 10, 3));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let events = collect_until(&mut rx, |e| {
        matches!(e, LoopEvent::Stopped { reason: StopReason::LossCapReached })
    })
    .await;

    assert_eq!(outcome_amounts(&events), vec![10, 20, 40]);
    assert_eq!(wager_amounts(&events), vec![20, 40]);

    let state = handle.snapshot();
    assert!(!state.is_active);
    assert_eq!(state.current_bet, 40);
    assert_eq!(state.loss_count, 3);
    assert_eq!(state.total_losses, 3);
    assert_eq!(state.total_profit, -70);

    // The loop halts on its own; the fourth frame is never taken.
    tokio::time::sleep(Duration::from_millis(TICK_MS * 5)).await;
    assert_eq!(device.captures(), 3);
    assert_eq!(handle.snapshot().rounds_settled(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_same_color_frame_skips_round() {
    let device = Arc::new(MockDevice::new([Shot::both_red(2, 5), Shot::roll(5, 2)]));
    let handle = launch(&device, settings(DiceColor::Red, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let events = collect_until(&mut rx, is_outcome).await;
    assert!(matches!(events[0], LoopEvent::Started));
    assert!(matches!(events[1], LoopEvent::RecognitionFailed { .. }));
    assert!(matches!(events[2], LoopEvent::Reading { .. }));
    assert_eq!(outcome_amounts(&events), vec![10]);

    let state = handle.snapshot();
    assert_eq!(state.rounds_settled(), 1);
    assert_eq!(state.total_wins, 1);
    assert_eq!(state.total_profit, 12);
}

#[tokio::test(start_paused = true)]
async fn test_capture_failure_is_not_fatal() {
    let device = Arc::new(MockDevice::new([Shot::Fail("virtual display gone"), Shot::roll(4, 4)]));
    let handle = launch(&device, settings(DiceColor::Orange, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let events = collect_until(&mut rx, is_outcome).await;
    match &events[1] {
        LoopEvent::CaptureFailed { reason } => assert!(reason.contains("virtual display gone")),
        other => panic!("unexpected event: {other:?}"),
    }

    // A draw loses for orange too.
    let state = handle.snapshot();
    assert_eq!(state.total_losses, 1);
    assert_eq!(state.current_bet, 20);
    assert_eq!(device.captures(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_actuation_failure_keeps_round_and_loop() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 3), Shot::roll(4, 2)]));
    device.fail_taps("accessibility service disconnected");
    let handle = launch(&device, settings(DiceColor::Red, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let first = collect_until(&mut rx, |e| matches!(e, LoopEvent::ActuationFailed { .. })).await;
    assert_eq!(outcome_amounts(&first), vec![10]);
    assert_eq!(handle.snapshot().total_losses, 1);

    let second = collect_until(&mut rx, is_outcome).await;
    assert_eq!(outcome_amounts(&second), vec![20]);

    let state = handle.snapshot();
    assert!(state.is_active);
    assert_eq!(state.total_wins, 1);
    assert_eq!(state.current_bet, 10);
    assert!(device.taps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_wager_causes_skipped_tick() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 6), Shot::roll(6, 1)]));
    // Three taps at 4s each outlast one 6s tick.
    device.set_tap_latency(Duration::from_secs(4));
    let handle = launch(&device, settings(DiceColor::Red, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let events = collect_until(&mut rx, |e| matches!(e, LoopEvent::WagerPlaced { .. })).await;
    assert!(events.iter().any(|e| matches!(e, LoopEvent::TickSkipped)));
    assert_eq!(device.captures(), 1);
    assert_eq!(device.taps().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_wager_at_step_boundary() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 6)]));
    device.set_tap_latency(Duration::from_secs(1));
    let handle = launch(&device, settings(DiceColor::Red, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    collect_until(&mut rx, is_outcome).await;
    let state = handle.stop().await.unwrap();
    assert!(!state.is_active);

    let events = collect_until(&mut rx, |e| matches!(e, LoopEvent::ActuationFailed { .. })).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, LoopEvent::Stopped { reason: StopReason::Requested })));
    match events.last() {
        Some(LoopEvent::ActuationFailed { reason, .. }) => assert!(reason.contains("cancelled")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(device.taps().len(), 1);
    assert_eq!(device.captures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_loss_cap_begins_at_base() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 2), Shot::roll(1, 3)]));
    let handle = launch(&device, settings(DiceColor::Red, 10, 2));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    collect_until(&mut rx, |e| matches!(e, LoopEvent::Stopped { .. })).await;
    assert_eq!(handle.snapshot().current_bet, 20);

    // Let the halted loop notice, then restart.
    tokio::time::sleep(Duration::from_millis(TICK_MS * 2)).await;
    device.push(Shot::roll(6, 2));
    let restarted = handle.start().await.unwrap();
    assert!(restarted.is_active);
    assert_eq!(restarted.current_bet, 10);
    assert_eq!(restarted.loss_count, 0);

    let events = collect_until(&mut rx, is_outcome).await;
    assert!(matches!(events[0], LoopEvent::Started));
    assert_eq!(outcome_amounts(&events), vec![10]);
    assert_eq!(handle.snapshot().total_wins, 1);
    assert_eq!(handle.snapshot().total_losses, 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_and_settings_while_running() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 2), Shot::roll(5, 1), Shot::roll(2, 6)]));
    let handle = launch(&device, settings(DiceColor::Red, 10, 10));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    collect_until(&mut rx, |e| matches!(e, LoopEvent::WagerPlaced { .. })).await;
    assert_eq!(handle.snapshot().current_bet, 20);

    // A new base does not rewrite the stake already in play.
    let update = SettingsUpdate { base_bet: Some(50), ..Default::default() };
    handle.update_settings(update).await.unwrap();
    assert_eq!(handle.snapshot().current_bet, 20);

    let events = collect_until(&mut rx, is_outcome).await;
    assert_eq!(outcome_amounts(&events), vec![20]);
    assert_eq!(handle.snapshot().current_bet, 50);

    let reset = handle.reset_statistics().await.unwrap();
    assert_eq!(reset.rounds_settled(), 0);
    assert_eq!(reset.total_profit, 0);
    assert!(reset.is_active);

    let events = collect_until(&mut rx, is_outcome).await;
    assert_eq!(outcome_amounts(&events), vec![50]);
    assert_eq!(handle.snapshot().total_losses, 1);
    assert_eq!(handle.snapshot().total_profit, -50);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_restart_after_loss_cap_announces_start() {
    let device = Arc::new(MockDevice::new([Shot::roll(1, 2), Shot::roll(1, 3), Shot::roll(6, 2)]));
    let handle = launch(&device, settings(DiceColor::Red, 10, 2));
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    collect_until(&mut rx, |e| {
        matches!(e, LoopEvent::Stopped { reason: StopReason::LossCapReached })
    })
    .await;

    // No tick has passed since the cap, so the old ticker is still armed.
    let restarted = handle.start().await.unwrap();
    assert!(restarted.is_active);
    assert_eq!(restarted.current_bet, 10);

    let events = collect_until(&mut rx, is_outcome).await;
    assert!(matches!(events[0], LoopEvent::Started));
    assert_eq!(outcome_amounts(&events), vec![10]);
    assert!(handle.snapshot().is_active);
    assert_eq!(handle.snapshot().total_wins, 1);
}
