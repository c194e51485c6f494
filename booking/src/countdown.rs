//! Countdown to a booking's payment deadline.
//!
//! Remaining time is always recomputed as `expires_at - now`, never by
//! decrementing a counter, so a late tick or a clock jump cannot drift.

use chrono::{DateTime, Utc};
use futures::Stream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tixwatch_core::Clock;
use tokio::time::MissedTickBehavior;

/// Tick period
pub const TICK: Duration = Duration::from_secs(1);

/// Remaining time until expiry, in whole seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CountdownState {
    /// Deadline in the future
    Active {
        /// Whole seconds left, always at least one
        remaining: Duration,
    },
    /// Deadline reached, or no deadline at all
    #[default]
    Expired,
}

impl CountdownState {
    /// State at `now` for a deadline
    ///
    /// A missing deadline counts as expired. Sub-second remainders are
    /// truncated, so the last active value is one second.
    #[must_use]
    pub fn at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(expires_at) = expires_at else {
            return Self::Expired;
        };
        match u64::try_from((expires_at - now).num_seconds()) {
            Ok(secs) if secs > 0 => Self::Active {
                remaining: Duration::from_secs(secs),
            },
            _ => Self::Expired,
        }
    }

    /// Whether the deadline has passed
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Time left, `None` once expired
    #[must_use]
    pub const fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Active { remaining } => Some(*remaining),
            Self::Expired => None,
        }
    }
}

impl fmt::Display for CountdownState {
    /// `MM:SS`, or `HH:MM:SS` beyond an hour
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.remaining().map_or(0, |remaining| remaining.as_secs());
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if hours > 0 {
            write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{minutes:02}:{seconds:02}")
        }
    }
}

/// Live countdown for `expires_at`
///
/// Yields the current state immediately, then once per [`TICK`] while
/// active. The first [`CountdownState::Expired`] is the last item. A missing
/// or past deadline yields `Expired` once and ends.
///
/// The stream owns its timer: dropping it (or cancelling the effect that
/// runs it) stops all further work.
pub fn ticks(
    expires_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
) -> impl Stream<Item = CountdownState> + Send + 'static {
    async_stream::stream! {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let state = CountdownState::at(expires_at, clock.now());
            yield state;
            if state.is_expired() {
                tracing::debug!(?expires_at, "Countdown expired");
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use proptest::prelude::*;
    use tixwatch_testing::{FixedClock, ManualClock, TokioClock, fixtures};

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_state_at() {
        let now = fixtures::epoch();
        assert_eq!(
            CountdownState::at(Some(now + secs(120)), now),
            CountdownState::Active {
                remaining: Duration::from_secs(120)
            }
        );
        assert_eq!(CountdownState::at(Some(now), now), CountdownState::Expired);
        assert_eq!(CountdownState::at(Some(now - secs(5)), now), CountdownState::Expired);
        assert_eq!(CountdownState::at(None, now), CountdownState::Expired);
    }

    #[test]
    fn test_sub_second_remainder_is_truncated() {
        let now = fixtures::epoch();
        let state = CountdownState::at(Some(now + chrono::Duration::milliseconds(119_900)), now);
        assert_eq!(state.remaining(), Some(Duration::from_secs(119)));
        let state = CountdownState::at(Some(now + chrono::Duration::milliseconds(900)), now);
        assert!(state.is_expired());
    }

    #[test]
    fn test_display() {
        let now = fixtures::epoch();
        assert_eq!(CountdownState::at(Some(now + secs(899)), now).to_string(), "14:59");
        assert_eq!(CountdownState::at(Some(now + secs(3_725)), now).to_string(), "01:02:05");
        assert_eq!(CountdownState::Expired.to_string(), "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_expires_on_first_tick() {
        let clock = Arc::new(FixedClock::new(fixtures::epoch()));
        let states: Vec<_> = ticks(Some(fixtures::epoch() - secs(30)), clock).collect().await;
        assert_eq!(states, vec![CountdownState::Expired]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_deadline_expires_immediately() {
        let clock = Arc::new(FixedClock::new(fixtures::epoch()));
        let states: Vec<_> = ticks(None, clock).collect().await;
        assert_eq!(states, vec![CountdownState::Expired]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_once_per_second_then_expires_once() {
        let clock = Arc::new(TokioClock::starting_at(fixtures::epoch()));
        let states: Vec<_> = ticks(Some(fixtures::epoch() + secs(5)), clock).collect().await;

        let remaining: Vec<_> = states.iter().map(|s| s.remaining().map(|d| d.as_secs())).collect();
        assert_eq!(
            remaining,
            vec![Some(5), Some(4), Some(3), Some(2), Some(1), None]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recomputes_from_clock_instead_of_decrementing() {
        let clock = ManualClock::new(fixtures::epoch());
        let mut stream = Box::pin(ticks(Some(fixtures::epoch() + secs(600)), Arc::new(clock.clone())));

        assert_eq!(stream.next().await.unwrap().remaining(), Some(Duration::from_secs(600)));

        // Device slept for five minutes between ticks.
        clock.advance(Duration::from_secs(300));
        assert_eq!(stream.next().await.unwrap().remaining(), Some(Duration::from_secs(300)));

        clock.advance(Duration::from_secs(400));
        assert_eq!(stream.next().await, Some(CountdownState::Expired));
        assert_eq!(stream.next().await, None);
    }

    proptest! {
        #[test]
        fn prop_future_deadline_yields_one_active_tick_per_second(offset in 1_i64..240) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let states: Vec<CountdownState> = runtime.block_on(async {
                let clock = Arc::new(TokioClock::starting_at(fixtures::epoch()));
                ticks(Some(fixtures::epoch() + secs(offset)), clock).collect().await
            });

            let active = states.iter().filter(|s| !s.is_expired()).count();
            prop_assert_eq!(i64::try_from(active).unwrap(), offset);
            prop_assert_eq!(states.last(), Some(&CountdownState::Expired));
            prop_assert_eq!(states.iter().filter(|s| s.is_expired()).count(), 1);
        }

        #[test]
        fn prop_state_is_consistent_with_offset(offset in -3_600_i64..3_600) {
            let now = fixtures::epoch();
            let state = CountdownState::at(Some(now + secs(offset)), now);
            if offset > 0 {
                prop_assert_eq!(state.remaining().map(|d| d.as_secs()), u64::try_from(offset).ok());
            } else {
                prop_assert!(state.is_expired());
            }
        }
    }
}
