//! Frame pacing.
//!
//! The host calls [`FramePacer::on_repaint`] once per display refresh, at whatever rate the
//! display runs. The pacer only steps the core once at least `threshold_ms` has passed since
//! the last step, so a 120 Hz or 144 Hz display does not make the emulated system run fast.
//! Roughly once a second it publishes the measured step rate.

use tracing::{debug, trace};

use crate::config::PacingConfig;

/// Token for one outstanding repaint request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RepaintHandle(pub u64);

/// The host's "call me on the next display refresh" primitive.
pub trait RepaintScheduler {
    fn request(&mut self) -> RepaintHandle;

    /// Cancel `handle`. The pacer never sees a callback for it afterwards.
    fn cancel(&mut self, handle: RepaintHandle);
}

/// Scheduler that just records the outstanding request, for hosts that poll.
#[derive(Debug, Default)]
pub struct QueuedRepaints {
    next_id: u64,
    pending: Option<RepaintHandle>,
}

impl QueuedRepaints {
    pub fn pending(&self) -> Option<RepaintHandle> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl RepaintScheduler for QueuedRepaints {
    fn request(&mut self) -> RepaintHandle {
        self.next_id += 1;
        let handle = RepaintHandle(self.next_id);
        self.pending = Some(handle);
        handle
    }

    fn cancel(&mut self, handle: RepaintHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }
}

/// Receives the measured step rate.
pub trait RateObserver {
    fn on_rate(&mut self, rate: u32);
}

impl<F: FnMut(u32)> RateObserver for F {
    fn on_rate(&mut self, rate: u32) {
        self(rate)
    }
}

/// Timestamps and counters for one run of the loop.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameTiming {
    pub previous: Option<f64>,
    pub window_start: f64,
    pub frames: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacerState {
    Idle,
    Running,
}

/// What a repaint callback did.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PaceOutcome {
    /// The pacer is stopped.
    Idle,
    /// First callback after a start; only the baseline was recorded.
    Baseline,
    /// Too early for the next step.
    Skipped,
    /// The core was stepped. `rate` is set when a measurement window closed.
    Ticked { delta_ms: f64, rate: Option<u32> },
}

impl PaceOutcome {
    pub fn ticked(&self) -> bool {
        matches!(self, PaceOutcome::Ticked { .. })
    }
}

pub struct FramePacer<S = QueuedRepaints> {
    state: PacerState,
    timing: FrameTiming,
    threshold_ms: f64,
    rate_window_ms: f64,
    scheduler: S,
    pending: Option<RepaintHandle>,
    observer: Option<Box<dyn RateObserver>>,
    last_rate: Option<u32>,
}

impl<S: RepaintScheduler> FramePacer<S> {
    pub fn new(config: &PacingConfig, scheduler: S) -> Self {
        Self {
            state: PacerState::Idle,
            timing: FrameTiming::default(),
            threshold_ms: config.threshold_ms,
            rate_window_ms: config.rate_window_ms,
            scheduler,
            pending: None,
            observer: None,
            last_rate: None,
        }
    }

    pub fn state(&self) -> PacerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PacerState::Running
    }

    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Most recently published rate.
    pub fn last_rate(&self) -> Option<u32> {
        self.last_rate
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn set_rate_observer(&mut self, observer: impl RateObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.state = PacerState::Running;
        self.timing = FrameTiming::default();
        self.pending = Some(self.scheduler.request());
        debug!("frame pacing started");
    }

    /// Stop and cancel the outstanding repaint request.
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel(handle);
        }
        if self.is_running() {
            self.state = PacerState::Idle;
            debug!("frame pacing stopped");
        }
        self.timing = FrameTiming::default();
    }

    /// Handle one display refresh at `t_ms`, calling `tick(delta_ms)` if a step is due.
    pub fn on_repaint(&mut self, t_ms: f64, tick: impl FnOnce(f64)) -> PaceOutcome {
        if !self.is_running() {
            return PaceOutcome::Idle;
        }
        self.pending = Some(self.scheduler.request());

        let Some(previous) = self.timing.previous else {
            self.timing.previous = Some(t_ms);
            self.timing.window_start = t_ms;
            self.timing.frames = 0;
            return PaceOutcome::Baseline;
        };

        let delta_ms = t_ms - previous;
        if delta_ms < self.threshold_ms {
            return PaceOutcome::Skipped;
        }

        tick(delta_ms);
        self.timing.previous = Some(t_ms);
        self.timing.frames += 1;

        let elapsed = t_ms - self.timing.window_start;
        let rate = if elapsed >= self.rate_window_ms {
            let rate = (self.timing.frames as f64 * 1000.0 / elapsed).round() as u32;
            self.timing.frames = 0;
            self.timing.window_start = t_ms;
            self.publish(rate);
            Some(rate)
        } else {
            None
        };
        trace!(delta_ms, "frame stepped");
        PaceOutcome::Ticked { delta_ms, rate }
    }

    fn publish(&mut self, rate: u32) {
        self.last_rate = Some(rate);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_rate(rate);
        }
    }
}
