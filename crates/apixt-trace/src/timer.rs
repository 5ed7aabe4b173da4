//! Named, reentrant elapsed-time counters.
//!
//! Starting a timer that is already running does not open a second
//! interval: nested start/stop pairs for one name are charged as a single
//! interval from the outermost start to the matching outermost stop.

use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::error::{Result, TraceError};

/// A single named timer.
#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    total: Duration,
    runs: u32,
    running: u32,
    started: Option<Instant>,
}

impl Timer {
    fn started_at(name: String, now: Instant) -> Self {
        Self {
            name,
            total: Duration::ZERO,
            runs: 1,
            running: 1,
            started: Some(now),
        }
    }

    fn start(&mut self, now: Instant) {
        self.runs += 1;
        self.running += 1;
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    fn stop(&mut self, now: Instant) {
        if self.running == 0 {
            return;
        }
        self.running -= 1;
        if self.running > 0 {
            return;
        }
        if let Some(started) = self.started.take() {
            self.total += now.saturating_duration_since(started);
        }
    }

    fn end(&mut self, now: Instant) -> Duration {
        if let Some(started) = self.started.take() {
            self.total += now.saturating_duration_since(started);
        }
        self.running = 0;
        self.total
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time charged so far, excluding any in-flight interval.
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

/// Summary of one timer, produced by [`TimerRegistry::drain`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerResult {
    pub name: String,
    /// Serialized as fractional milliseconds.
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub runs: u32,
}

fn as_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Timers for one trace, kept in insertion order.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: Vec<Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: &str) {
        self.start_at(name, Instant::now());
    }

    /// Start (or re-enter) `name` as of `now`.
    pub fn start_at(&mut self, name: &str, now: Instant) {
        match self.find_mut(name) {
            Some(timer) => timer.start(now),
            None => self.timers.push(Timer::started_at(name.to_string(), now)),
        }
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        self.stop_at(name, Instant::now())
    }

    /// Leave one level of `name` as of `now`.
    pub fn stop_at(&mut self, name: &str, now: Instant) -> Result<()> {
        let timer = self.find_mut(name).ok_or_else(|| unknown_timer("stop", name))?;
        timer.stop(now);
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<Duration> {
        self.end_at(name, Instant::now())
    }

    /// Fold any in-flight interval of `name` into its total and return it.
    pub fn end_at(&mut self, name: &str, now: Instant) -> Result<Duration> {
        let timer = self.find_mut(name).ok_or_else(|| unknown_timer("end", name))?;
        Ok(timer.end(now))
    }

    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn drain(&mut self) -> Vec<TimerResult> {
        self.drain_at(Instant::now())
    }

    /// Remove every timer, ending running ones as of `now`.
    ///
    /// Results come back in reverse insertion order.
    pub fn drain_at(&mut self, now: Instant) -> Vec<TimerResult> {
        let mut results = Vec::with_capacity(self.timers.len());
        while let Some(mut timer) = self.timers.pop() {
            let duration = timer.end(now);
            results.push(TimerResult {
                name: timer.name,
                duration,
                runs: timer.runs,
            });
        }
        results
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.name == name)
    }
}

fn unknown_timer(op: &str, name: &str) -> TraceError {
    TraceError::protocol(format!(
        "Cannot {op} timer: no timer with name \"{name}\" found"
    ))
}
