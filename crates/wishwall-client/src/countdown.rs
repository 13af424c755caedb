//! Countdown to a fixed instant
//!
//! [`Countdown`] is the pure state machine; [`CountdownTicker`] recomputes it
//! once per period on a background task and publishes the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use wishwall_core::Clock;

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Whole units remaining until the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLeft {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl TimeLeft {
    /// Remaining time, or `None` once `now` has reached `target`
    pub fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        let ms = (target - now).num_milliseconds();
        if ms <= 0 {
            return None;
        }
        Some(Self {
            days: ms / MS_PER_DAY,
            hours: (ms / MS_PER_HOUR) % 24,
            minutes: (ms / MS_PER_MINUTE) % 60,
            seconds: (ms / MS_PER_SECOND) % 60,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Running(TimeLeft),
    /// Terminal for the current target
    Elapsed,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    target: DateTime<Utc>,
    state: CountdownState,
}

impl Countdown {
    pub fn new(target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            target,
            state: Self::compute(target, now),
        }
    }

    fn compute(target: DateTime<Utc>, now: DateTime<Utc>) -> CountdownState {
        TimeLeft::until(target, now)
            .map(CountdownState::Running)
            .unwrap_or(CountdownState::Elapsed)
    }

    /// Recompute against `now`; once elapsed, stays elapsed
    pub fn tick(&mut self, now: DateTime<Utc>) -> CountdownState {
        if self.state != CountdownState::Elapsed {
            self.state = Self::compute(self.target, now);
        }
        self.state
    }

    /// Switch to a new target, resetting the terminal state
    pub fn set_target(&mut self, target: DateTime<Utc>, now: DateTime<Utc>) -> CountdownState {
        self.target = target;
        self.state = Self::compute(target, now);
        self.state
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_elapsed(&self) -> bool {
        self.state == CountdownState::Elapsed
    }
}

/// Drives a [`Countdown`] on a tokio interval
///
/// Ticking stops while elapsed and resumes when the target changes. The
/// task stops when the ticker is dropped.
#[derive(Debug)]
pub struct CountdownTicker {
    target_tx: watch::Sender<DateTime<Utc>>,
    state_rx: watch::Receiver<CountdownState>,
    task: JoinHandle<()>,
}

impl CountdownTicker {
    pub fn spawn(target: DateTime<Utc>, clock: Arc<dyn Clock>, period: Duration) -> Self {
        let initial = Countdown::new(target, clock.now_utc());
        let (target_tx, target_rx) = watch::channel(target);
        let (state_tx, state_rx) = watch::channel(initial.state());
        let task = tokio::spawn(run_ticker(initial, clock, period, target_rx, state_tx));

        Self {
            target_tx,
            state_rx,
            task,
        }
    }

    pub fn set_target(&self, target: DateTime<Utc>) {
        self.target_tx.send_replace(target);
    }

    pub fn state(&self) -> CountdownState {
        *self.state_rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<CountdownState> {
        self.state_rx.clone()
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_ticker(
    mut countdown: Countdown,
    clock: Arc<dyn Clock>,
    period: Duration,
    mut target_rx: watch::Receiver<DateTime<Utc>>,
    state_tx: watch::Sender<CountdownState>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if countdown.is_elapsed() {
            tracing::debug!(target_at = %countdown.target(), "countdown elapsed");
            // Nothing to tick until the target moves
            if target_rx.changed().await.is_err() {
                break;
            }
            let target = *target_rx.borrow_and_update();
            countdown.set_target(target, clock.now_utc());
            interval.reset();
        } else {
            tokio::select! {
                _ = interval.tick() => {
                    countdown.tick(clock.now_utc());
                }
                changed = target_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let target = *target_rx.borrow_and_update();
                    countdown.set_target(target, clock.now_utc());
                    interval.reset();
                }
            }
        }

        let state = countdown.state();
        state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn target() -> DateTime<Utc> {
        "2026-01-25T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_hours_minutes_seconds() {
        let now = target()
            - ChronoDuration::hours(1)
            - ChronoDuration::minutes(30)
            - ChronoDuration::seconds(5);
        assert_eq!(
            TimeLeft::until(target(), now),
            Some(TimeLeft {
                days: 0,
                hours: 1,
                minutes: 30,
                seconds: 5
            })
        );
    }

    #[test]
    fn test_days_component() {
        let now = target() - ChronoDuration::days(3) - ChronoDuration::hours(25);
        let left = TimeLeft::until(target(), now).unwrap();
        assert_eq!(left.days, 4);
        assert_eq!(left.hours, 1);
    }

    #[test]
    fn test_partial_seconds_round_down() {
        let now = target() - ChronoDuration::milliseconds(1999);
        let left = TimeLeft::until(target(), now).unwrap();
        assert_eq!(left.seconds, 1);
    }

    #[test]
    fn test_elapsed_is_terminal() {
        let mut countdown = Countdown::new(target(), target() - ChronoDuration::seconds(2));
        assert!(!countdown.is_elapsed());

        assert_eq!(countdown.tick(target()), CountdownState::Elapsed);
        // A clock that jumps backwards does not revive the same target
        assert_eq!(
            countdown.tick(target() - ChronoDuration::hours(1)),
            CountdownState::Elapsed
        );
    }

    #[test]
    fn test_new_target_resets() {
        let mut countdown = Countdown::new(target(), target() + ChronoDuration::seconds(1));
        assert!(countdown.is_elapsed());

        let later = target() + ChronoDuration::days(1);
        let state = countdown.set_target(later, target());
        assert_eq!(
            state,
            CountdownState::Running(TimeLeft {
                days: 1,
                hours: 0,
                minutes: 0,
                seconds: 0
            })
        );
    }

    #[tokio::test]
    async fn test_ticker_reaches_elapsed_and_rearms() {
        use wishwall_core::ManualClock;

        let clock = ManualClock::new(target() - ChronoDuration::seconds(3));
        let ticker = CountdownTicker::spawn(
            target(),
            Arc::new(clock.clone()),
            Duration::from_millis(5),
        );
        let mut states = ticker.watch();
        assert!(matches!(ticker.state(), CountdownState::Running(_)));

        clock.advance(ChronoDuration::seconds(3));
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == CountdownState::Elapsed),
        )
        .await
        .expect("ticker never elapsed")
        .unwrap();

        ticker.set_target(target() + ChronoDuration::minutes(2));
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s != CountdownState::Elapsed),
        )
        .await
        .expect("ticker never rearmed")
        .map(|s| *s)
        .unwrap();
        assert_eq!(
            state,
            CountdownState::Running(TimeLeft {
                days: 0,
                hours: 0,
                minutes: 2,
                seconds: 0
            })
        );
    }
}
