//! Virtual clock and the tick loop that feeds the broadcast hub.
//!
//! Every tick the driver advances the virtual "now", projects the served
//! timetable at that instant, renders the snapshot and publishes it. Two
//! modes exist:
//!
//! - real time: "now" is the wall clock shifted by an operator offset;
//! - simulated: "now" jumps forward by a step that depends on the simulated
//!   hour (coarse at night, fine during the day) and wraps back to the start
//!   of the event once it leaves it.
//!
//! Overrides (`SetNow`, `Resync`) are messages to the loop, so they never
//! race a tick.

use std::sync::Arc;
use std::time::Duration;

use agendawall_core::{Renderer, Timestamp, project};
use agendawall_protocol::ClockModeInfo;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::{RwLock, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::hub::HubHandle;
use crate::store::TimetableStore;

/// How far past the start of the event a wrapped simulation lands.
const WRAP_OFFSET_SECS: i64 = 10;

/// How "now" advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    RealTime,
    /// Unset bounds fall back to the first session start and last session
    /// end of the served timetable.
    Simulated {
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    },
}

/// Clock driver configuration.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub mode: ClockMode,

    /// Wall-clock time between ticks.
    pub tick: Duration,

    /// Zone "now" is expressed in.
    pub timezone: Tz,

    /// Initial virtual "now"; the wall clock when unset.
    pub start_at: Option<Timestamp>,
}

impl ClockConfig {
    pub fn new(timezone: Tz) -> Self {
        Self {
            mode: ClockMode::RealTime,
            tick: Duration::from_secs(1),
            timezone,
            start_at: None,
        }
    }

    pub fn with_mode(mut self, mode: ClockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Intervals under a millisecond are raised to one.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_start_at(mut self, start_at: Timestamp) -> Self {
        self.start_at = Some(start_at);
        self
    }
}

/// Simulated step for a given hour of day.
///
/// | hour      | step   |
/// |-----------|--------|
/// | 00 - 07   | 1 h    |
/// | 08 - 18   | 3 min  |
/// | 19 - 22   | 30 min |
/// | 23        | 1 h    |
pub fn simulated_step(hour: u32) -> chrono::Duration {
    match hour {
        8..=18 => chrono::Duration::minutes(3),
        19..=22 => chrono::Duration::minutes(30),
        _ => chrono::Duration::hours(1),
    }
}

/// The virtual "now", free of any timer so it can be driven by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClock {
    timezone: Tz,
    kind: ClockKind,
}

#[derive(Debug, Clone, PartialEq)]
enum ClockKind {
    RealTime {
        offset: chrono::Duration,
    },
    Simulated {
        now: Timestamp,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    },
}

impl VirtualClock {
    pub fn new(config: &ClockConfig, wall: DateTime<Utc>) -> Self {
        let tz = config.timezone;
        let kind = match config.mode {
            ClockMode::RealTime => ClockKind::RealTime {
                offset: config
                    .start_at
                    .map(|t| t.with_timezone(&Utc) - wall)
                    .unwrap_or_else(chrono::Duration::zero),
            },
            ClockMode::Simulated { start, end } => ClockKind::Simulated {
                now: config
                    .start_at
                    .or(start)
                    .map(|t| t.with_timezone(&tz))
                    .unwrap_or_else(|| wall.with_timezone(&tz)),
                start,
                end,
            },
        };
        Self { timezone: tz, kind }
    }

    pub fn mode(&self) -> ClockModeInfo {
        match self.kind {
            ClockKind::RealTime { .. } => ClockModeInfo::RealTime,
            ClockKind::Simulated { .. } => ClockModeInfo::Simulated,
        }
    }

    /// Current virtual "now" without advancing.
    pub fn now(&self, wall: DateTime<Utc>) -> Timestamp {
        match &self.kind {
            ClockKind::RealTime { offset } => (wall + *offset).with_timezone(&self.timezone),
            ClockKind::Simulated { now, .. } => *now,
        }
    }

    /// Advances by one tick and returns the new "now".
    ///
    /// `event_bounds` supplies the wrap window when the simulation has no
    /// configured bounds.
    pub fn advance(
        &mut self,
        wall: DateTime<Utc>,
        event_bounds: Option<(Timestamp, Timestamp)>,
    ) -> Timestamp {
        let tz = self.timezone;
        match &mut self.kind {
            ClockKind::RealTime { offset } => (wall + *offset).with_timezone(&tz),
            ClockKind::Simulated { now, start, end } => {
                let mut next = *now + simulated_step(now.hour());
                let lower = start.or(event_bounds.map(|b| b.0));
                let upper = end.or(event_bounds.map(|b| b.1));
                if let (Some(lower), Some(upper)) = (lower, upper)
                    && (next < lower || next > upper)
                {
                    next = (lower + chrono::Duration::seconds(WRAP_OFFSET_SECS))
                        .with_timezone(&tz);
                    debug!(now = %next, "simulation wrapped");
                }
                *now = next;
                next
            }
        }
    }

    /// Moves "now" to `target`. In real time the clock keeps running from
    /// there.
    pub fn set_now(&mut self, target: Timestamp, wall: DateTime<Utc>) {
        let tz = self.timezone;
        match &mut self.kind {
            ClockKind::RealTime { offset } => *offset = target.with_timezone(&Utc) - wall,
            ClockKind::Simulated { now, .. } => *now = target.with_timezone(&tz),
        }
    }

    /// Puts "now" back on the wall clock.
    pub fn resync(&mut self, wall: DateTime<Utc>) {
        let tz = self.timezone;
        match &mut self.kind {
            ClockKind::RealTime { offset } => *offset = chrono::Duration::zero(),
            ClockKind::Simulated { now, .. } => *now = wall.with_timezone(&tz),
        }
    }
}

/// Commands that can be sent to the clock driver.
#[derive(Debug, Clone)]
pub enum ClockCommand {
    SetNow(Timestamp),
    Resync,
    Stop,
}

/// What `status` reports about the clock.
#[derive(Debug, Clone)]
pub struct ClockState {
    pub now: Timestamp,
    pub mode: ClockModeInfo,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub last_error: Option<String>,
}

pub type SharedClockState = Arc<RwLock<ClockState>>;

/// The tick loop.
pub struct ClockDriver {
    config: ClockConfig,
    clock: VirtualClock,
    state: SharedClockState,
    store: Arc<TimetableStore>,
    renderer: Arc<dyn Renderer>,
    hub: HubHandle,
    command_tx: mpsc::Sender<ClockCommand>,
    command_rx: mpsc::Receiver<ClockCommand>,
}

impl ClockDriver {
    pub fn new(
        config: ClockConfig,
        store: Arc<TimetableStore>,
        renderer: Arc<dyn Renderer>,
        hub: HubHandle,
    ) -> Self {
        let wall = Utc::now();
        let clock = VirtualClock::new(&config, wall);
        let state = Arc::new(RwLock::new(ClockState {
            now: clock.now(wall),
            mode: clock.mode(),
            ticks: 0,
            skipped_ticks: 0,
            last_error: None,
        }));
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            clock,
            state,
            store,
            renderer,
            hub,
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Ticks until stopped, until every handle is gone or until the hub
    /// stops.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            mode = self.clock.mode().as_str(),
            tick_ms = self.config.tick.as_millis() as u64,
            renderer = self.renderer.name(),
            "clock driver started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.tick(true).await.is_err() {
                        info!("hub closed, clock driver stopping");
                        break;
                    }
                }
                cmd = self.command_rx.recv() => {
                    let wall = Utc::now();
                    match cmd {
                        Some(ClockCommand::SetNow(target)) => {
                            info!(now = %target, "virtual clock set");
                            self.clock.set_now(target, wall);
                        }
                        Some(ClockCommand::Resync) => {
                            info!("virtual clock resynced to wall clock");
                            self.clock.resync(wall);
                        }
                        Some(ClockCommand::Stop) | None => {
                            info!("clock driver stopping");
                            break;
                        }
                    }
                    // Show the override right away rather than on the next tick.
                    if self.tick(false).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Projects, renders and publishes one snapshot. Only a closed hub is an
    /// error; render failures are counted and skipped.
    async fn tick(&mut self, advance: bool) -> ServerResult<()> {
        let wall = Utc::now();
        let view = self.store.snapshot().await;
        let now = if advance {
            self.clock.advance(wall, view.bounds())
        } else {
            self.clock.now(wall)
        };
        let snapshot = project(&view, &now);
        drop(view);

        let rendered = self.renderer.render(&snapshot);

        {
            let mut state = self.state.write().await;
            state.now = now;
            state.ticks += 1;
            if let Err(e) = &rendered {
                state.skipped_ticks += 1;
                state.last_error = Some(e.to_string());
            }
        }

        match rendered {
            Ok(payload) => self
                .hub
                .publish(payload)
                .await
                .map_err(|_| ServerError::unavailable("broadcast hub")),
            Err(e) => {
                warn!(error = %e, now = %now, "render failed, skipping tick");
                Ok(())
            }
        }
    }
}

/// Handle for sending commands to the clock driver.
#[derive(Clone)]
pub struct ClockHandle {
    command_tx: mpsc::Sender<ClockCommand>,
    state: SharedClockState,
}

impl ClockHandle {
    pub async fn set_now(&self, now: Timestamp) -> ServerResult<()> {
        self.send(ClockCommand::SetNow(now)).await
    }

    pub async fn resync(&self) -> ServerResult<()> {
        self.send(ClockCommand::Resync).await
    }

    pub async fn stop(&self) -> ServerResult<()> {
        self.send(ClockCommand::Stop).await
    }

    /// Copy of the state as of the last tick.
    pub async fn state(&self) -> ClockState {
        self.state.read().await.clone()
    }

    async fn send(&self, command: ClockCommand) -> ServerResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ServerError::unavailable("clock"))
    }
}
