//! Booking status projection.
//!
//! Turns a cache snapshot plus the local countdown into the state a screen
//! renders and the actions it may offer. Pure: same inputs, same view.

use crate::cache::CacheSnapshot;
use crate::countdown::CountdownState;
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::time::Duration;
use tixwatch_api::{ApiError, BookingRecord, BookingStatus};

/// What the booking screen shows
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiState {
    /// Nothing fetched yet
    Loading,
    /// First fetch failed; message from the backend, unchanged
    Error {
        /// Error message
        message: String,
    },
    /// Pending with time left to pay
    ActiveCountdown {
        /// Whole seconds left
        remaining: Duration,
    },
    /// Local countdown hit zero but the server still says pending;
    /// cancellation is imminent server-side
    ExpiredPendingSync,
    /// Paid
    Confirmed,
    /// Cancelled
    Cancelled,
    /// Payment failed
    Failed,
}

impl UiState {
    /// Stable name, e.g. for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Error { .. } => "error",
            Self::ActiveCountdown { .. } => "active-countdown",
            Self::ExpiredPendingSync => "expired-pending-sync",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User intents a view can offer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserAction {
    /// Cancel the booking
    Cancel,
    /// Pay for the booking
    Pay,
}

/// Allowed actions; at most two
pub type AllowedActions = SmallVec<[UserAction; 2]>;

/// Projection result
#[derive(Clone, Debug, PartialEq)]
pub struct StatusView {
    /// What to show
    pub state: UiState,
    /// Actions legal in `state`
    pub allowed: AllowedActions,
    /// Record the view was derived from
    pub record: Option<BookingRecord>,
    /// A background refresh failed; the record shown is the last good one
    pub sync_error: Option<ApiError>,
    /// A fetch is in flight
    pub is_revalidating: bool,
}

impl StatusView {
    /// Whether `action` may be offered
    #[must_use]
    pub fn allows(&self, action: UserAction) -> bool {
        self.allowed.contains(&action)
    }
}

impl Default for StatusView {
    fn default() -> Self {
        project(&CacheSnapshot::empty(), &CountdownState::Expired)
    }
}

/// Derive the view, first matching rule wins:
///
/// 1. no value, no error: `Loading`
/// 2. no value, error: `Error`
/// 3. confirmed: `Confirmed`, no actions
/// 4. cancelled or failed: same name, no actions
/// 5. pending, countdown active: `ActiveCountdown`, cancel and pay
/// 6. pending, countdown expired: `ExpiredPendingSync`, no actions
///
/// Local expiry is advisory: only the next fetch moves a pending record on.
#[must_use]
pub fn project(snapshot: &CacheSnapshot<BookingRecord>, countdown: &CountdownState) -> StatusView {
    let (state, allowed): (UiState, AllowedActions) = match (&snapshot.value, &snapshot.error) {
        (None, None) => (UiState::Loading, smallvec![]),
        (None, Some(error)) => (
            UiState::Error {
                message: error.to_string(),
            },
            smallvec![],
        ),
        (Some(record), _) => match (record.status, countdown) {
            (BookingStatus::Confirmed, _) => (UiState::Confirmed, smallvec![]),
            (BookingStatus::Cancelled, _) => (UiState::Cancelled, smallvec![]),
            (BookingStatus::Failed, _) => (UiState::Failed, smallvec![]),
            (BookingStatus::Pending, CountdownState::Active { remaining }) => (
                UiState::ActiveCountdown {
                    remaining: *remaining,
                },
                smallvec![UserAction::Cancel, UserAction::Pay],
            ),
            (BookingStatus::Pending, CountdownState::Expired) => {
                (UiState::ExpiredPendingSync, smallvec![])
            },
        },
    };

    StatusView {
        state,
        allowed,
        record: snapshot.value.clone(),
        sync_error: snapshot.value.as_ref().and(snapshot.error.clone()),
        is_revalidating: snapshot.is_revalidating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tixwatch_testing::{fixtures, properties};

    fn active(secs: u64) -> CountdownState {
        CountdownState::Active {
            remaining: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_loading_without_data() {
        let view = project(&CacheSnapshot::empty(), &CountdownState::Expired);
        assert_eq!(view.state, UiState::Loading);
        assert!(view.allowed.is_empty());
    }

    #[test]
    fn test_error_without_data_passes_message_through() {
        let snapshot = CacheSnapshot::failed(None, ApiError::Unauthorized("token expired".into()));
        let view = project(&snapshot, &CountdownState::Expired);
        assert_eq!(
            view.state,
            UiState::Error {
                message: "token expired".to_string()
            }
        );
        assert!(view.allowed.is_empty());
        assert_eq!(view.sync_error, None);
    }

    #[test]
    fn test_pending_with_time_left_allows_cancel_and_pay() {
        let now = fixtures::epoch();
        let record = fixtures::pending_booking("b1", now + chrono::Duration::seconds(120));
        let view = project(&CacheSnapshot::of(record), &active(119));

        assert_eq!(
            view.state,
            UiState::ActiveCountdown {
                remaining: Duration::from_secs(119)
            }
        );
        assert!(view.allows(UserAction::Cancel));
        assert!(view.allows(UserAction::Pay));
    }

    #[test]
    fn test_pending_past_deadline_waits_for_server() {
        let now = fixtures::epoch();
        let record = fixtures::pending_booking("b1", now - chrono::Duration::seconds(5));
        let view = project(&CacheSnapshot::of(record), &CountdownState::Expired);

        assert_eq!(view.state, UiState::ExpiredPendingSync);
        assert!(view.allowed.is_empty());
    }

    #[test]
    fn test_terminal_statuses_are_view_only() {
        for (record, expected) in [
            (fixtures::confirmed_booking("b1"), UiState::Confirmed),
            (fixtures::cancelled_booking("b1"), UiState::Cancelled),
            (fixtures::failed_booking("b1"), UiState::Failed),
        ] {
            // A leftover active countdown never overrides a terminal status.
            let view = project(&CacheSnapshot::of(record), &active(300));
            assert_eq!(view.state, expected);
            assert!(view.allowed.is_empty());
        }
    }

    #[test]
    fn test_failed_refresh_keeps_record_and_reports_sync_error() {
        let now = fixtures::epoch();
        let record = fixtures::pending_booking("b1", now + chrono::Duration::seconds(60));
        let snapshot = CacheSnapshot::failed(
            Some(record.clone()),
            ApiError::Network("connection reset".into()),
        );
        let view = project(&snapshot, &active(60));

        assert_eq!(view.state.name(), "active-countdown");
        assert_eq!(view.record, Some(record));
        assert_eq!(view.sync_error, Some(ApiError::Network("connection reset".into())));
    }

    proptest! {
        #[test]
        fn prop_terminal_status_never_offers_actions(
            status in properties::terminal_status(),
            offset in properties::expiry_offset_secs(),
        ) {
            let now = fixtures::epoch();
            let record = fixtures::with_status("b1", status);
            let countdown = CountdownState::at(Some(now + chrono::Duration::seconds(offset)), now);
            let view = project(&CacheSnapshot::of(record), &countdown);
            prop_assert!(matches!(
                view.state,
                UiState::Confirmed | UiState::Cancelled | UiState::Failed
            ));
            prop_assert!(view.allowed.is_empty());
        }

        #[test]
        fn prop_actions_only_while_counting_down(
            status in properties::booking_status(),
            offset in properties::expiry_offset_secs(),
        ) {
            let now = fixtures::epoch();
            let expires_at = now + chrono::Duration::seconds(offset);
            let mut record = fixtures::with_status("b1", status);
            record.expires_at = Some(expires_at);
            let view = project(&CacheSnapshot::of(record), &CountdownState::at(Some(expires_at), now));
            let counting = matches!(view.state, UiState::ActiveCountdown { .. });
            prop_assert_eq!(!view.allowed.is_empty(), counting);
            prop_assert_eq!(counting, status == BookingStatus::Pending && offset > 0);
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(UiState::ExpiredPendingSync.to_string(), "expired-pending-sync");
        assert_eq!(StatusView::default().state, UiState::Loading);
    }
}
