//! Animation scheduler.
//!
//! A fixed-period tick on its own thread that asks the host to redraw. The
//! thread runs a current-thread tokio runtime so that sleeping until the next
//! deadline and observing shutdown are one `select!`.
//!
//! # Timing
//!
//! The next deadline is `max(now, previous_deadline + period)`. A tick that
//! overruns its period moves the schedule to "now" instead of firing a burst
//! of overdue ticks.
//!
//! Two rolling averages over the last `samples` ticks are kept for
//! diagnostics: the achieved inter-tick period ("frequency") and the time
//! spent in the redraw callback ("speed").

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Receives redraw requests from the scheduler and the loader workers.
///
/// Implementations must be cheap and must not block; a typical host posts an
/// event to its UI loop.
pub trait RedrawSink: Send + Sync {
    fn request_redraw(&self);
}

/// Sink that ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRedraw;

impl RedrawSink for NoopRedraw {
    fn request_redraw(&self) {}
}

/// Mean of the most recent `capacity` durations.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Drift-corrected wake-up time for the tick after `previous`.
pub fn next_deadline(now: Instant, previous: Instant, period: Duration) -> Instant {
    (previous + period).max(now)
}

/// Snapshot of scheduler cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Average achieved time between ticks.
    pub frequency: Option<Duration>,
    /// Average time spent in the redraw callback.
    pub speed: Option<Duration>,
    pub ticks: u64,
}

impl SchedulerStats {
    /// Achieved ticks per second, derived from `frequency`.
    pub fn ticks_per_second(&self) -> Option<f64> {
        self.frequency
            .filter(|period| !period.is_zero())
            .map(|period| 1.0 / period.as_secs_f64())
    }
}

#[derive(Debug)]
struct TickState {
    frequency: RollingAverage,
    speed: RollingAverage,
    ticks: u64,
}

/// Periodic redraw driver. A zero period disables it: no thread is started.
pub struct Scheduler {
    period: Duration,
    state: Arc<Mutex<TickState>>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        period: Duration,
        samples: usize,
        sink: Arc<dyn RedrawSink>,
    ) -> Result<Self, EngineError> {
        let state = Arc::new(Mutex::new(TickState {
            frequency: RollingAverage::new(samples),
            speed: RollingAverage::new(samples),
            ticks: 0,
        }));
        let token = CancellationToken::new();

        let handle = if period.is_zero() {
            debug!("Animation disabled");
            None
        } else {
            let state = Arc::clone(&state);
            let token = token.clone();
            let handle = std::thread::Builder::new()
                .name("tilepyramid-scheduler".to_string())
                .spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_time()
                        .build();
                    match runtime {
                        Ok(runtime) => runtime.block_on(tick_loop(period, sink, state, token)),
                        Err(e) => warn!(error = %e, "Failed to build scheduler runtime"),
                    }
                })
                .map_err(|source| EngineError::Spawn {
                    name: "scheduler",
                    source,
                })?;
            info!(period_ms = period.as_millis() as u64, samples, "Scheduler started");
            Some(handle)
        };

        Ok(Self {
            period,
            state,
            token,
            handle,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            frequency: state.frequency.average(),
            speed: state.speed.average(),
            ticks: state.ticks,
        }
    }

    /// Cancels the tick loop and waits up to `timeout` for the thread.
    ///
    /// Returns `false` if the thread did not exit in time.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => join_with_timeout(handle, timeout, "scheduler"),
            None => true,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn tick_loop(
    period: Duration,
    sink: Arc<dyn RedrawSink>,
    state: Arc<Mutex<TickState>>,
    token: CancellationToken,
) {
    let mut deadline = Instant::now() + period;
    let mut last_tick: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
        }

        let started = Instant::now();
        sink.request_redraw();
        let spent = started.elapsed();

        {
            let mut state = state.lock();
            if let Some(previous) = last_tick {
                state.frequency.push(started - previous);
            }
            state.speed.push(spent);
            state.ticks += 1;
        }
        last_tick = Some(started);
        deadline = next_deadline(Instant::now(), deadline, period);
    }

    info!("Scheduler stopped");
}

/// Joins a thread, giving up after `timeout`. A thread that does not finish
/// in time is detached.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, timeout_ms = timeout.as_millis() as u64, "Thread did not stop in time");
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!(thread = name, "Thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl RedrawSink for Counter {
        fn request_redraw(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_rolling_average_keeps_last_samples() {
        let mut average = RollingAverage::new(3);
        assert_eq!(average.average(), None);

        for ms in [100, 10, 20, 30] {
            average.push(Duration::from_millis(ms));
        }
        assert_eq!(average.len(), 3);
        assert_eq!(average.average(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_next_deadline_on_schedule() {
        let start = Instant::now();
        let period = Duration::from_millis(40);
        let now = start + Duration::from_millis(41);
        assert_eq!(next_deadline(now, start + period, period), start + period * 2);
    }

    #[test]
    fn test_next_deadline_catches_up_after_overrun() {
        let start = Instant::now();
        let period = Duration::from_millis(40);
        let now = start + Duration::from_millis(500);
        assert_eq!(next_deadline(now, start + period, period), now);
    }

    #[test]
    fn test_zero_period_starts_no_thread() {
        let mut scheduler = Scheduler::start(Duration::ZERO, 10, Arc::new(NoopRedraw)).unwrap();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.stats(), SchedulerStats::default());
        assert!(scheduler.stop(Duration::from_millis(10)));
    }

    #[test]
    fn test_ticks_request_redraws_and_record_stats() {
        let counter = Arc::new(Counter::default());
        let mut scheduler = Scheduler::start(Duration::from_millis(5), 10, counter.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.stats().ticks < 5 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(scheduler.stop(Duration::from_secs(2)));

        let stats = scheduler.stats();
        assert!(stats.ticks >= 5);
        assert_eq!(counter.0.load(Ordering::SeqCst) as u64, stats.ticks);
        assert!(stats.frequency.is_some());
        assert!(stats.speed.is_some());
        assert!(stats.ticks_per_second().is_some());
    }

    #[test]
    fn test_stop_interrupts_long_sleep() {
        let mut scheduler =
            Scheduler::start(Duration::from_secs(3600), 10, Arc::new(NoopRedraw)).unwrap();
        assert!(scheduler.is_running());

        let started = Instant::now();
        assert!(scheduler.stop(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(scheduler.stats().ticks, 0);
    }
}
