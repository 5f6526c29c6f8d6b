//! Single-timer refresh schedule.
//!
//! Transitions: `Idle -> Armed -> Fired -> (Armed | Idle)`. Arming always
//! aborts the previous timer and bumps the generation; a timer that wakes up
//! for an older generation does nothing.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Idle,
    Armed { generation: u64, fires_at: Instant },
    /// The timer woke up and its refresh is running.
    Fired { generation: u64 },
}

#[derive(Debug)]
pub struct RefreshSchedule {
    state: ScheduleState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSchedule {
    pub fn new() -> Self {
        Self {
            state: ScheduleState::Idle,
            generation: 0,
            timer: None,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Number of armed timers: zero or one.
    pub fn pending(&self) -> usize {
        usize::from(matches!(self.state, ScheduleState::Armed { .. }))
    }

    /// Arm the timer to run `on_fire(generation)` after `delay`, replacing any
    /// previous timer. Returns the new generation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.abort_timer();
        self.generation += 1;
        let generation = self.generation;
        let fires_at = Instant::now() + delay;
        let fire = on_fire(generation);

        self.timer = Some(tokio::spawn(async move {
            time::sleep_until(fires_at).await;
            fire.await;
        }));
        self.state = ScheduleState::Armed {
            generation,
            fires_at,
        };
        generation
    }

    /// Called by a woken timer. Moves `Armed -> Fired` and returns `true` only
    /// if `generation` is still the armed one.
    pub fn begin_fire(&mut self, generation: u64) -> bool {
        match self.state {
            ScheduleState::Armed { generation: g, .. } if g == generation => {
                // The caller is this timer's own task; drop the handle without aborting.
                self.timer = None;
                self.state = ScheduleState::Fired { generation };
                true
            }
            _ => false,
        }
    }

    /// Whether a refresh started by `generation` may still apply its result.
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(self.state, ScheduleState::Fired { generation: g } if g == generation)
    }

    /// Tear down: abort any armed timer and go idle.
    pub fn cancel(&mut self) {
        self.abort_timer();
        self.state = ScheduleState::Idle;
    }

    /// `Fired -> Idle` when the refresh that fired does not re-arm.
    pub fn finish(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.state = ScheduleState::Idle;
        }
    }

    fn abort_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Drop for RefreshSchedule {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
