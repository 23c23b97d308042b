//! Polling lifecycle: `Stopped → Starting → Polling → Stopped`.
//!
//! A [`PollingSession`] owns the poll timer and a generation counter. Every
//! transition into or out of `Polling` bumps the generation; a fetch started
//! under an older generation is rejected by [`PollingSession::accept`], so a
//! response that resolves after the session was stopped (or restarted) is
//! never applied.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Stopped,
    Starting,
    Polling,
}

/// Proof that a start request was issued from `Stopped`.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct StartToken {
    generation: u64,
}

/// Identifies one status fetch. Hand it back to [`PollingSession::accept`]
/// before applying the response.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct FetchToken {
    generation: u64,
}

/// When the first tick of a freshly armed timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    Immediate,
    AfterInterval,
}

#[derive(Debug)]
pub struct PollingSession {
    state: PollingState,
    generation: u64,
    in_flight: Option<u64>,
    period: Duration,
    timer: Option<Interval>,
    timers_armed: u64,
}

/// Shortest accepted poll period; tokio rejects a zero one.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl PollingSession {
    pub fn new(period: Duration) -> Self {
        Self {
            state: PollingState::Stopped,
            generation: 0,
            in_flight: None,
            period: period.max(MIN_PERIOD),
            timer: None,
            timers_armed: 0,
        }
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == PollingState::Polling
    }

    /// `Starting` or `Polling`.
    pub fn is_active(&self) -> bool {
        self.state != PollingState::Stopped
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// How many timers this session has ever armed.
    pub fn timers_armed(&self) -> u64 {
        self.timers_armed
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// User start request. Only valid from `Stopped`; while `Starting` or
    /// `Polling` this is a no-op and returns `None`.
    pub fn begin_start(&mut self) -> Option<StartToken> {
        if self.state != PollingState::Stopped {
            debug!(state = ?self.state, "start ignored, session already active");
            return None;
        }
        self.state = PollingState::Starting;
        Some(StartToken {
            generation: self.generation,
        })
    }

    /// Conclude a start request. On acceptance the session starts polling
    /// with an immediate first tick. Returns `false` if the session was
    /// stopped while the request was in flight.
    pub fn finish_start(&mut self, token: StartToken, accepted: bool) -> bool {
        if self.state != PollingState::Starting || token.generation != self.generation {
            debug!("start result discarded, session changed meanwhile");
            return false;
        }
        if accepted {
            self.enter_polling(FirstTick::Immediate);
        } else {
            self.state = PollingState::Stopped;
        }
        true
    }

    /// Begin observing a migration the server already runs. Returns `false`
    /// when already polling.
    pub fn resume(&mut self) -> bool {
        if self.state == PollingState::Polling {
            return false;
        }
        self.enter_polling(FirstTick::AfterInterval);
        true
    }

    fn enter_polling(&mut self, first: FirstTick) {
        self.generation += 1;
        self.in_flight = None;
        self.state = PollingState::Polling;
        self.arm_timer(first);
    }

    /// Replace any existing timer with a fresh one.
    fn arm_timer(&mut self, first: FirstTick) {
        self.timer = None;
        let start = match first {
            FirstTick::Immediate => Instant::now(),
            FirstTick::AfterInterval => Instant::now() + self.period,
        };
        let mut timer = tokio::time::interval_at(start, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
        self.timers_armed += 1;
    }

    /// Cancel the timer and invalidate any in-flight fetch.
    pub fn stop(&mut self) {
        if self.state != PollingState::Stopped {
            debug!(generation = self.generation, "polling stopped");
        }
        self.timer = None;
        self.in_flight = None;
        self.generation += 1;
        self.state = PollingState::Stopped;
    }

    /// Claim the single fetch slot. `None` when not polling or when a fetch
    /// is still outstanding: ticks never overlap.
    pub fn begin_fetch(&mut self) -> Option<FetchToken> {
        if self.state != PollingState::Polling {
            return None;
        }
        if self.in_flight.is_some() {
            debug!("tick skipped, previous fetch still in flight");
            return None;
        }
        self.in_flight = Some(self.generation);
        Some(FetchToken {
            generation: self.generation,
        })
    }

    /// Release the fetch slot and report whether the response may be
    /// applied.
    pub fn accept(&mut self, token: FetchToken) -> bool {
        if self.in_flight == Some(token.generation) {
            self.in_flight = None;
        }
        self.state == PollingState::Polling && token.generation == self.generation
    }

    /// Wait for the next timer tick and claim the fetch slot. Never resolves
    /// while no timer is armed.
    pub async fn next_tick(&mut self) -> Option<FetchToken> {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        self.begin_fetch()
    }
}
