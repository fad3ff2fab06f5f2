//! Control State Tracker
//!
//! Turns raw gesture input into the alternating `Start -> (Delta | Change)* -> End`
//! event contract, per control, and shapes continuous gestures:
//! - Duplicate Starts and orphan Ends are absorbed
//! - Deltas or fader moves on an idle control open an implicit activation that
//!   ends itself after a quiet period (wheel input has no natural release)
//! - A held encoder offset is sampled at a fixed cadence and emitted as Deltas
//!
//! Timers run as tokio tasks that post [`TimerTick`]s back to the owner, which
//! feeds them to [`ControlTracker::on_tick`]. Every timer is tied to the
//! activation that created it and is aborted on End, when it fires, or when the
//! tracker is dropped.
//!
//! # Example
//!
//! ```ignore
//! let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
//!
//! tracker.apply(id.clone(), Input::Wheel(-120.0))?; // -> [Start, Delta(0.24)]
//! tracker.apply(id.clone(), Input::Wheel(-120.0))?; // -> [Delta(0.24)]
//!
//! // 200ms later
//! let tick = ticks.recv().await.unwrap();
//! tracker.on_tick(tick);                              // -> [End]
//! ```

use hog_core::{ControlEvent, ControlId, ControlKind, EncoderPhase, FaderPhase};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::TrackerError;

/// Tuning for gesture shaping
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sampling cadence of a held encoder offset
    pub hold_interval: Duration,
    /// Gain applied to the held offset on every sample
    pub hold_gain: f64,
    /// Wheel pixels per unit of encoder delta
    pub wheel_divisor: f64,
    /// Drag pixels per unit of encoder delta
    pub drag_divisor: f64,
    /// Quiet period after which an implicit activation ends
    pub debounce: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            hold_interval: Duration::from_millis(120),
            hold_gain: 0.08,
            wheel_divisor: 500.0,
            drag_divisor: 300.0,
            debounce: Duration::from_millis(200),
        }
    }
}

/// Raw gesture input for one control
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Start,
    End,
    /// Pre-scaled encoder delta
    Delta(f64),
    /// Wheel `deltaY` in pixels (positive scrolls down)
    Wheel(f64),
    /// Drag displacement in pixels (positive moves up)
    Drag(f64),
    /// Current held offset of an indirect rotation
    Hold(f64),
    /// Absolute fader position
    Value(f64),
}

impl Input {
    fn name(&self) -> &'static str {
        match self {
            Input::Start => "start",
            Input::End => "end",
            Input::Delta(_) => "delta",
            Input::Wheel(_) => "wheel",
            Input::Drag(_) => "drag",
            Input::Hold(_) => "hold",
            Input::Value(_) => "value",
        }
    }

    fn supported_by(&self, kind: ControlKind) -> bool {
        match (self, kind) {
            (Input::Start | Input::End, _) => true,
            (
                Input::Delta(_) | Input::Wheel(_) | Input::Drag(_) | Input::Hold(_),
                ControlKind::Encoder,
            ) => true,
            (Input::Value(_), ControlKind::Fader) => true,
            _ => false,
        }
    }

    fn check_finite(&self) -> Result<(), TrackerError> {
        let value = match self {
            Input::Delta(v) | Input::Wheel(v) | Input::Drag(v) | Input::Hold(v) | Input::Value(v) => *v,
            Input::Start | Input::End => return Ok(()),
        };
        if value.is_finite() {
            Ok(())
        } else {
            Err(TrackerError::NonFinite { field: self.name() })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Quiet period of an implicit activation elapsed
    Debounce,
    /// Held offset sampling cadence
    Sample,
}

/// Timer notification posted back to the tracker's owner
#[derive(Debug, Clone, PartialEq)]
pub struct TimerTick {
    pub control: ControlId,
    pub kind: TickKind,
    token: u64,
}

/// Spawned timer, aborted when dropped
#[derive(Debug)]
struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// State of one active control. Absence from the table means inactive.
#[derive(Debug)]
struct ControlState {
    /// Opened by an explicit Start; otherwise ends on debounce
    explicit: bool,
    /// Held encoder offset
    offset: f64,
    debounce: Option<Timer>,
    sampler: Option<Timer>,
}

impl ControlState {
    fn new(explicit: bool) -> Self {
        Self {
            explicit,
            offset: 0.0,
            debounce: None,
            sampler: None,
        }
    }
}

/// Per-session table of momentary control state
pub struct ControlTracker {
    config: TrackerConfig,
    controls: HashMap<ControlId, ControlState>,
    ticks: mpsc::UnboundedSender<TimerTick>,
    next_token: u64,
}

impl ControlTracker {
    /// Create a tracker and the channel its timers report on
    pub fn new(config: TrackerConfig) -> (Self, mpsc::UnboundedReceiver<TimerTick>) {
        let (ticks, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            config,
            controls: HashMap::new(),
            ticks,
            next_token: 0,
        };
        (tracker, rx)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply one raw input, returning the events to forward in order
    pub fn apply(&mut self, id: ControlId, input: Input) -> Result<Vec<ControlEvent>, TrackerError> {
        if !input.supported_by(id.kind()) {
            return Err(TrackerError::Unsupported {
                input: input.name(),
                kind: id.kind(),
            });
        }
        input.check_finite()?;

        let events = match input {
            Input::Start => self.start(id),
            Input::End => self.end(id),
            Input::Delta(delta) => self.motion(id, delta)?,
            Input::Wheel(px) => self.motion(id, -px / self.config.wheel_divisor)?,
            Input::Drag(px) => self.motion(id, px / self.config.drag_divisor)?,
            Input::Value(value) => self.motion(id, value.clamp(0.0, 1.0))?,
            Input::Hold(offset) => self.hold(id, offset),
        };

        Ok(events)
    }

    /// Handle a timer notification, returning the events to forward
    pub fn on_tick(&mut self, tick: TimerTick) -> Vec<ControlEvent> {
        let Some(state) = self.controls.get(&tick.control) else {
            return Vec::new();
        };

        match tick.kind {
            TickKind::Debounce => {
                let current = state.debounce.as_ref().map(|t| t.token) == Some(tick.token);
                if !current || state.explicit {
                    return Vec::new();
                }
                self.controls.remove(&tick.control);
                debug!("Control {} released after quiet period", tick.control);
                vec![ControlEvent::end(&tick.control)]
            }
            TickKind::Sample => {
                let current = state.sampler.as_ref().map(|t| t.token) == Some(tick.token);
                if !current || state.offset == 0.0 {
                    return Vec::new();
                }
                let delta = state.offset * self.config.hold_gain;
                if !delta.is_finite() {
                    return Vec::new();
                }
                vec![delta_event(&tick.control, delta)]
            }
        }
    }

    /// End every active control and cancel all timers
    pub fn release_all(&mut self) -> Vec<ControlEvent> {
        self.controls
            .drain()
            .map(|(id, _)| ControlEvent::end(&id))
            .collect()
    }

    pub fn is_active(&self, id: &ControlId) -> bool {
        self.controls.contains_key(id)
    }

    /// Number of active controls
    pub fn active_count(&self) -> usize {
        self.controls.len()
    }

    /// Number of live timers across all controls
    pub fn pending_timers(&self) -> usize {
        self.controls
            .values()
            .map(|s| s.debounce.is_some() as usize + s.sampler.is_some() as usize)
            .sum()
    }

    fn start(&mut self, id: ControlId) -> Vec<ControlEvent> {
        match self.controls.get_mut(&id) {
            Some(state) => {
                if !state.explicit {
                    // The client now owns the release
                    state.explicit = true;
                    state.debounce = None;
                }
                debug!("Absorbed duplicate start for {}", id);
                Vec::new()
            }
            None => {
                let event = ControlEvent::start(&id);
                self.controls.insert(id, ControlState::new(true));
                vec![event]
            }
        }
    }

    fn end(&mut self, id: ControlId) -> Vec<ControlEvent> {
        match self.controls.remove(&id) {
            Some(_) => vec![ControlEvent::end(&id)],
            None => {
                debug!("Absorbed orphan end for {}", id);
                Vec::new()
            }
        }
    }

    /// Encoder delta or fader change, opening an implicit activation if idle
    fn motion(&mut self, id: ControlId, amount: f64) -> Result<Vec<ControlEvent>, TrackerError> {
        if !amount.is_finite() {
            return Err(TrackerError::NonFinite { field: "delta" });
        }
        let is_encoder = id.kind() == ControlKind::Encoder;
        if is_encoder && amount == 0.0 {
            return Ok(Vec::new());
        }

        let mut events = Vec::with_capacity(2);
        if !self.controls.contains_key(&id) {
            events.push(ControlEvent::start(&id));
            self.controls.insert(id.clone(), ControlState::new(false));
        }

        events.push(if is_encoder {
            delta_event(&id, amount)
        } else {
            ControlEvent::Fader {
                index: fader_index(&id),
                phase: FaderPhase::Change(amount),
            }
        });

        let implicit = self.controls.get(&id).map(|s| !s.explicit).unwrap_or(false);
        if implicit {
            let timer = self.spawn_debounce(&id);
            if let Some(state) = self.controls.get_mut(&id) {
                state.debounce = Some(timer);
            }
        }

        Ok(events)
    }

    fn hold(&mut self, id: ControlId, offset: f64) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        if !self.controls.contains_key(&id) {
            events.push(ControlEvent::start(&id));
            self.controls.insert(id.clone(), ControlState::new(true));
        }

        let needs_sampler = self
            .controls
            .get(&id)
            .map(|s| s.sampler.is_none())
            .unwrap_or(false);
        let sampler = if needs_sampler {
            Some(self.spawn_sampler(&id))
        } else {
            None
        };

        if let Some(state) = self.controls.get_mut(&id) {
            state.explicit = true;
            state.debounce = None;
            state.offset = offset;
            if sampler.is_some() {
                state.sampler = sampler;
            }
        }

        events
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn spawn_debounce(&mut self, id: &ControlId) -> Timer {
        let token = self.token();
        let tick = TimerTick {
            control: id.clone(),
            kind: TickKind::Debounce,
            token,
        };
        let ticks = self.ticks.clone();
        let quiet = self.config.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = ticks.send(tick);
        });

        Timer { token, handle }
    }

    fn spawn_sampler(&mut self, id: &ControlId) -> Timer {
        let token = self.token();
        let tick = TimerTick {
            control: id.clone(),
            kind: TickKind::Sample,
            token,
        };
        let ticks = self.ticks.clone();
        let period = self.config.hold_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if ticks.send(tick.clone()).is_err() {
                    break;
                }
            }
        });

        Timer { token, handle }
    }
}

fn delta_event(id: &ControlId, delta: f64) -> ControlEvent {
    let index = match id {
        ControlId::Encoder(index) => *index,
        _ => 0,
    };
    ControlEvent::Encoder {
        index,
        phase: EncoderPhase::Delta(delta),
    }
}

fn fader_index(id: &ControlId) -> u32 {
    match id {
        ControlId::Fader(index) => *index,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hog_core::ButtonPhase;
    use tokio::time::timeout;

    fn button(key: &str) -> ControlId {
        ControlId::button(key).unwrap()
    }

    fn encoder_delta(events: &[ControlEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ControlEvent::Encoder {
                    phase: EncoderPhase::Delta(d),
                    ..
                } => Some(*d),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_duplicate_start_absorbed() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());

        let first = tracker.apply(button("go"), Input::Start).unwrap();
        assert_eq!(
            first,
            vec![ControlEvent::Button {
                key: "go".to_string(),
                phase: ButtonPhase::Start
            }]
        );
        assert!(tracker.apply(button("go"), Input::Start).unwrap().is_empty());
        assert_eq!(tracker.apply(button("go"), Input::End).unwrap().len(), 1);
        assert!(!tracker.is_active(&button("go")));
    }

    #[tokio::test]
    async fn test_orphan_end_absorbed() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());
        assert!(tracker.apply(button("clear"), Input::End).unwrap().is_empty());
        assert!(tracker
            .apply(ControlId::Encoder(1), Input::End)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_and_non_finite_input_rejected() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());

        assert!(matches!(
            tracker.apply(ControlId::Fader(1), Input::Hold(1.0)),
            Err(TrackerError::Unsupported { .. })
        ));
        assert!(matches!(
            tracker.apply(button("go"), Input::Value(0.5)),
            Err(TrackerError::Unsupported { .. })
        ));
        assert!(matches!(
            tracker.apply(ControlId::Encoder(1), Input::Delta(f64::NAN)),
            Err(TrackerError::NonFinite { field: "delta" })
        ));
        assert!(matches!(
            tracker.apply(ControlId::Fader(1), Input::Value(f64::INFINITY)),
            Err(TrackerError::NonFinite { field: "value" })
        ));
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_encoder_deltas_pass_through() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(2);

        assert_eq!(tracker.apply(id.clone(), Input::Start).unwrap().len(), 1);
        let events = tracker.apply(id.clone(), Input::Delta(0.02)).unwrap();
        assert_eq!(encoder_delta(&events), vec![0.02]);
        assert_eq!(tracker.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_wheel_and_drag_scaling() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(1);
        tracker.apply(id.clone(), Input::Start).unwrap();

        let wheel = tracker.apply(id.clone(), Input::Wheel(100.0)).unwrap();
        assert_eq!(encoder_delta(&wheel), vec![-0.2]);

        let drag = tracker.apply(id.clone(), Input::Drag(30.0)).unwrap();
        assert_eq!(encoder_delta(&drag), vec![0.1]);

        // No displacement, no event
        assert!(tracker.apply(id, Input::Wheel(0.0)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fader_value_clamped() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Fader(3);
        tracker.apply(id.clone(), Input::Start).unwrap();

        let events = tracker.apply(id, Input::Value(1.5)).unwrap();
        assert_eq!(
            events,
            vec![ControlEvent::Fader {
                index: 3,
                phase: FaderPhase::Change(1.0)
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_burst_synthesizes_single_end() {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(4);

        let first = tracker.apply(id.clone(), Input::Wheel(-50.0)).unwrap();
        assert!(first[0].is_start());
        assert_eq!(first.len(), 2);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let events = tracker.apply(id.clone(), Input::Wheel(-50.0)).unwrap();
            assert_eq!(events.len(), 1);
        }

        tokio::time::sleep(Duration::from_millis(250)).await;

        let mut ends = Vec::new();
        while let Ok(tick) = ticks.try_recv() {
            ends.extend(tracker.on_tick(tick));
        }
        assert_eq!(ends, vec![ControlEvent::end(&id)]);
        assert!(!tracker.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_start_cancels_debounce() {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(1);

        tracker.apply(id.clone(), Input::Wheel(10.0)).unwrap();
        assert!(tracker.apply(id.clone(), Input::Start).unwrap().is_empty());
        assert_eq!(tracker.pending_timers(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        while let Ok(tick) = ticks.try_recv() {
            assert!(tracker.on_tick(tick).is_empty());
        }
        assert!(tracker.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_samples_offset_until_end() {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(1);

        let started = tracker.apply(id.clone(), Input::Hold(1.0)).unwrap();
        assert_eq!(started, vec![ControlEvent::start(&id)]);

        // Three samples at 120ms cadence
        let mut deltas = Vec::new();
        for _ in 0..3 {
            let tick = timeout(Duration::from_millis(130), ticks.recv())
                .await
                .expect("sampler should tick")
                .unwrap();
            deltas.extend(encoder_delta(&tracker.on_tick(tick)));
        }
        assert_eq!(deltas, vec![0.08, 0.08, 0.08]);

        // Offset changes are picked up by the next sample, not accumulated
        tracker.apply(id.clone(), Input::Hold(-2.5)).unwrap();
        let tick = timeout(Duration::from_millis(130), ticks.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encoder_delta(&tracker.on_tick(tick)), vec![-0.2]);

        let ended = tracker.apply(id.clone(), Input::End).unwrap();
        assert_eq!(ended, vec![ControlEvent::end(&id)]);
        assert_eq!(tracker.pending_timers(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        while let Ok(tick) = ticks.try_recv() {
            assert!(tracker.on_tick(tick).is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_offset_emits_nothing() {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        let id = ControlId::Encoder(2);

        tracker.apply(id.clone(), Input::Hold(0.0)).unwrap();
        let tick = timeout(Duration::from_millis(130), ticks.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(tracker.on_tick(tick).is_empty());
    }

    #[tokio::test]
    async fn test_release_all_ends_active_controls() {
        let (mut tracker, _ticks) = ControlTracker::new(TrackerConfig::default());
        tracker.apply(button("go"), Input::Start).unwrap();
        tracker.apply(ControlId::Encoder(1), Input::Hold(1.0)).unwrap();

        let mut ended = tracker.release_all();
        ended.sort_by_key(|e| e.id().to_string());
        assert_eq!(
            ended,
            vec![
                ControlEvent::end(&button("go")),
                ControlEvent::end(&ControlId::Encoder(1)),
            ]
        );
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timers() {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        tracker.apply(ControlId::Encoder(1), Input::Hold(1.0)).unwrap();
        tracker.apply(ControlId::Encoder(2), Input::Wheel(5.0)).unwrap();
        assert_eq!(tracker.pending_timers(), 2);

        drop(tracker);

        // Every sender is gone once the timer tasks are aborted
        let closed = timeout(Duration::from_secs(1), async {
            while ticks.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
