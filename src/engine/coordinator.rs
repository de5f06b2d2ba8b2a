//! Capture coordinator.
//!
//! A single actor task owns the ticker, the settings snapshot and the
//! collaborators. On each tick it runs at most one capture cycle:
//!
//! capture → crop → recognize → engine update → wager sequence
//!
//! A tick that arrives while the previous cycle is still running is dropped.
//! Nothing that goes wrong inside a cycle escapes it; failures are logged and
//! published as events, and the loop carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::events::{EventBus, LoopEvent, StopReason};
use super::executor::{ActionSequencer, CancelFlag};
use crate::config::{Settings, SettingsUpdate};
use crate::platforms::FrameSource;
use crate::recognizer::DiceRecognizer;
use crate::strategy::BettingEngine;
use crate::types::{
    BetOutcome, BettingRegion, BettingState, CaptureError, ControlError, Rect,
    RecognitionFailure,
};

const COMMAND_BUFFER: usize = 32;

/// How long shutdown waits for an in-flight cycle to reach a step boundary.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum Command {
    Start(oneshot::Sender<Result<BettingState, ControlError>>),
    Stop(oneshot::Sender<BettingState>),
    ResetStatistics(oneshot::Sender<BettingState>),
    UpdateSettings(SettingsUpdate, oneshot::Sender<Result<Settings, ControlError>>),
    GetSettings(oneshot::Sender<Settings>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable control surface for the coordinator actor.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ControlError::Unavailable)?;
        rx.await.map_err(|_| ControlError::Unavailable)
    }

    /// Begin betting and start ticking. A no-op while already running.
    pub async fn start(&self) -> Result<BettingState, ControlError> {
        self.request(Command::Start).await?
    }

    /// Stop ticking and switch the engine off. An in-flight wager aborts at
    /// its next step boundary.
    pub async fn stop(&self) -> Result<BettingState, ControlError> {
        self.request(Command::Stop).await
    }

    pub async fn reset_statistics(&self) -> Result<BettingState, ControlError> {
        self.request(Command::ResetStatistics).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, ControlError> {
        update.validate()?;
        self.request(|tx| Command::UpdateSettings(update, tx)).await?
    }

    /// Set the capture region from the two corners of a drag.
    pub async fn set_capture_region(
        &self,
        start: (f32, f32),
        end: (f32, f32),
    ) -> Result<Settings, ControlError> {
        self.update_settings(SettingsUpdate {
            capture_region: Some(Rect::from_corners(start, end)),
            ..SettingsUpdate::default()
        })
        .await
    }

    pub async fn settings(&self) -> Result<Settings, ControlError> {
        self.request(Command::GetSettings).await
    }

    /// Latest published state. Never blocks on the loop.
    pub fn snapshot(&self) -> BettingState {
        self.bus.snapshot()
    }

    pub fn watch_state(&self) -> watch::Receiver<BettingState> {
        self.bus.watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.bus.subscribe()
    }

    /// Stop the loop and wait for the actor to exit.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.request(Command::Shutdown).await
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    CaptureFailed,
    RecognitionFailed,
    /// A reading was taken while the engine was not betting.
    Observed,
    Settled {
        outcome: BetOutcome,
        wager_placed: bool,
    },
}

/// Clears the in-flight bit when the cycle ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything one cycle needs, captured at cycle start.
pub struct Cycle {
    pub frames: Arc<dyn FrameSource>,
    pub recognizer: DiceRecognizer,
    pub engine: Arc<Mutex<BettingEngine>>,
    pub sequencer: Arc<ActionSequencer>,
    pub bus: EventBus,
    pub capture_region: Rect,
    pub betting_region: BettingRegion,
    pub cancel: CancelFlag,
}

impl Cycle {
    pub async fn run(self) -> CycleOutcome {
        let frame = match self.frames.capture(self.capture_region).await {
            Ok(frame) => frame,
            Err(e) => return self.capture_failed(CaptureError::Source(format!("{e:#}"))),
        };

        // Pixel work runs on the blocking pool.
        let recognizer = self.recognizer;
        let work = tokio::task::spawn_blocking(move || {
            let frame = frame.crop_to_region()?;
            Ok::<_, CaptureError>(recognizer.recognize(&frame))
        })
        .await;
        let recognition = match work {
            Ok(Ok(recognition)) => recognition,
            Ok(Err(e)) => return self.capture_failed(e),
            Err(e) => Err(RecognitionFailure::Worker(e.to_string())),
        };

        let reading = match recognition {
            Ok(r) => r.reading,
            Err(e) => {
                warn!(error = %e, "Dice not recognised; round skipped");
                self.bus.emit(LoopEvent::RecognitionFailed { reason: e.to_string() });
                return CycleOutcome::RecognitionFailed;
            }
        };
        debug!(reading = %reading, "Dice recognised");
        self.bus.emit(LoopEvent::Reading { reading: reading.clone() });

        let (round, snapshot) = {
            let mut engine = self.engine.lock().await;
            let round = engine.on_reading(&reading, &self.betting_region);
            (round, engine.state().clone())
        };
        self.bus.publish_state(snapshot);

        let Some(round) = round else {
            return CycleOutcome::Observed;
        };
        self.bus.emit(LoopEvent::Outcome {
            outcome: round.outcome,
            at: reading.captured_at,
        });
        if round.hit_loss_cap {
            warn!(bet = round.outcome.amount, "Loss cap reached; betting stopped");
            self.bus.emit(LoopEvent::Stopped { reason: StopReason::LossCapReached });
        }

        let mut wager_placed = false;
        if let Some(instruction) = round.instruction {
            match self.sequencer.execute(&instruction, &self.cancel).await {
                Ok(report) => {
                    debug!(steps = report.steps_completed, "Wager sequence complete");
                    self.bus.emit(LoopEvent::WagerPlaced { instruction });
                    wager_placed = true;
                }
                Err(e) => {
                    warn!(error = %e, amount = instruction.amount, "Wager sequence aborted");
                    self.bus.emit(LoopEvent::ActuationFailed {
                        instruction,
                        reason: e.to_string(),
                    });
                }
            }
        }

        CycleOutcome::Settled {
            outcome: round.outcome,
            wager_placed,
        }
    }

    fn capture_failed(&self, e: CaptureError) -> CycleOutcome {
        warn!(error = %e, region = %self.capture_region, "Capture failed; waiting for next tick");
        self.bus.emit(LoopEvent::CaptureFailed { reason: e.to_string() });
        CycleOutcome::CaptureFailed
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub struct Coordinator {
    frames: Arc<dyn FrameSource>,
    recognizer: DiceRecognizer,
    engine: Arc<Mutex<BettingEngine>>,
    sequencer: Arc<ActionSequencer>,
    bus: EventBus,
    settings: Settings,
    in_flight: Arc<AtomicBool>,
    cancel: CancelFlag,
    ticker: Option<Interval>,
    current: Option<JoinHandle<()>>,
    commands: mpsc::Receiver<Command>,
}

impl Coordinator {
    /// Spawn the actor. The engine should have been built from `settings`.
    pub fn spawn(
        frames: Arc<dyn FrameSource>,
        sequencer: ActionSequencer,
        engine: BettingEngine,
        settings: Settings,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let bus = EventBus::new(engine.state().clone());
        let actor = Coordinator {
            frames,
            recognizer: DiceRecognizer::new(),
            engine: Arc::new(Mutex::new(engine)),
            sequencer: Arc::new(sequencer),
            bus: bus.clone(),
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel: CancelFlag::new(),
            ticker: None,
            current: None,
            commands: rx,
        };
        let task = tokio::spawn(actor.run());
        (CoordinatorHandle { commands: tx, bus }, task)
    }

    async fn run(mut self) {
        info!(interval_ms = self.settings.check_interval_ms, "Coordinator ready");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown(reply)) => {
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }
        info!("Coordinator exited");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                let _ = reply.send(self.start().await);
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop(StopReason::Requested).await);
            }
            Command::ResetStatistics(reply) => {
                let mut engine = self.engine.lock().await;
                engine.reset_statistics();
                let snapshot = engine.state().clone();
                self.bus.publish_state(snapshot.clone());
                let _ = reply.send(snapshot);
            }
            Command::UpdateSettings(update, reply) => {
                let _ = reply.send(self.update_settings(update).await);
            }
            Command::GetSettings(reply) => {
                let _ = reply.send(self.settings.clone());
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn start(&mut self) -> Result<BettingState, ControlError> {
        self.settings.check_ready()?;
        let (was_active, snapshot) = {
            let mut engine = self.engine.lock().await;
            let was_active = engine.state().is_active;
            engine.start()?;
            (was_active, engine.state().clone())
        };
        self.bus.publish_state(snapshot.clone());

        // After the loss cap the ticker lingers until the next tick; only an
        // engine that was already betting counts as running.
        if was_active && self.ticker.is_some() {
            debug!("Start requested while running; ignoring");
            return Ok(snapshot);
        }
        self.cancel = CancelFlag::new();
        self.ticker = Some(make_ticker(self.settings.check_interval_ms));
        self.bus.emit(LoopEvent::Started);
        info!(
            interval_ms = self.settings.check_interval_ms,
            color = %snapshot.selected_color,
            "Capture loop started"
        );
        Ok(snapshot)
    }

    async fn stop(&mut self, reason: StopReason) -> BettingState {
        let was_running = self.ticker.take().is_some();
        self.cancel.cancel();
        let snapshot = {
            let mut engine = self.engine.lock().await;
            engine.stop();
            engine.state().clone()
        };
        self.bus.publish_state(snapshot.clone());
        if was_running {
            self.bus.emit(LoopEvent::Stopped { reason });
            info!(?reason, "Capture loop stopped");
        }
        snapshot
    }

    async fn update_settings(&mut self, update: SettingsUpdate) -> Result<Settings, ControlError> {
        update.validate()?;
        let interval_changed = update
            .check_interval_ms
            .is_some_and(|ms| ms != self.settings.check_interval_ms);
        self.settings.apply(&update);

        let snapshot = {
            let mut engine = self.engine.lock().await;
            engine.update_settings(update.base_bet, update.max_loss_count, update.selected_color);
            engine.state().clone()
        };
        self.bus.publish_state(snapshot);

        if interval_changed && self.ticker.is_some() {
            self.ticker = Some(make_ticker(self.settings.check_interval_ms));
            info!(interval_ms = self.settings.check_interval_ms, "Capture interval changed");
        }
        debug!(settings = ?self.settings, "Settings updated");
        Ok(self.settings.clone())
    }

    fn on_tick(&mut self) {
        if !self.bus.snapshot().is_active {
            info!("Engine inactive; capture loop halted");
            self.ticker = None;
            return;
        }
        let (capture_region, betting_region) = match self.settings.check_ready() {
            Ok(regions) => regions,
            Err(e) => {
                error!(error = %e, "Settings no longer usable; capture loop halted");
                self.ticker = None;
                return;
            }
        };
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Previous cycle still running; tick skipped");
            self.bus.emit(LoopEvent::TickSkipped);
            return;
        };

        let cycle = Cycle {
            frames: self.frames.clone(),
            recognizer: self.recognizer,
            engine: self.engine.clone(),
            sequencer: self.sequencer.clone(),
            bus: self.bus.clone(),
            capture_region,
            betting_region,
            cancel: self.cancel.clone(),
        };
        self.current = Some(tokio::spawn(async move {
            let _guard = guard;
            let outcome = cycle.run().await;
            debug!(?outcome, "Cycle finished");
        }));
    }

    async fn shutdown(&mut self) {
        self.stop(StopReason::Shutdown).await;
        if let Some(task) = self.current.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("In-flight cycle did not finish before shutdown");
            }
        }
    }
}

fn make_ticker(interval_ms: u64) -> Interval {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Resolves on the next tick, or never when the loop is stopped.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
