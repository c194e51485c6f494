//! # Tixwatch Testing
//!
//! Testing utilities and helpers for tixwatch.
//!
//! This crate provides:
//! - Clocks for deterministic countdown arithmetic
//! - A scripted [`MockBackend`] standing in for the booking and payment services
//! - Booking fixtures and proptest strategies
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use tixwatch_testing::{MockBackend, fixtures, mocks::TokioClock};
//!
//! #[tokio::test(start_paused = true)]
//! async fn polls_while_pending() {
//!     let clock = TokioClock::starting_at(fixtures::epoch());
//!     let backend = MockBackend::new();
//!     backend.set_booking(fixtures::pending_booking("b1", clock.now()));
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use tixwatch_core::environment::Clock;

pub mod backend;

/// Clock implementations for tests
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tixwatch_testing::mocks::FixedClock;
    /// use tixwatch_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::epoch())
    }

    /// Clock that only moves when told to
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        }

        /// Jump to an absolute time (backwards jumps allowed)
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Wall clock driven by tokio's clock
    ///
    /// Under `#[tokio::test(start_paused = true)]` wall time advances exactly
    /// as far as `tokio::time` does, so countdowns and poll intervals stay in
    /// lockstep. An optional skew shifts the reported time, which simulates a
    /// device clock that disagrees with the server.
    #[derive(Debug, Clone)]
    pub struct TokioClock {
        start: DateTime<Utc>,
        origin: tokio::time::Instant,
        skew: Arc<Mutex<chrono::Duration>>,
    }

    impl TokioClock {
        /// Create a clock reading `start` at the current tokio instant
        #[must_use]
        pub fn starting_at(start: DateTime<Utc>) -> Self {
            Self {
                start,
                origin: tokio::time::Instant::now(),
                skew: Arc::new(Mutex::new(chrono::Duration::zero())),
            }
        }

        /// Shift the reported wall time without moving tokio's clock
        pub fn skew(&self, by: chrono::Duration) {
            let mut skew = self.skew.lock().unwrap_or_else(PoisonError::into_inner);
            *skew += by;
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = chrono::Duration::from_std(self.origin.elapsed())
                .unwrap_or(chrono::Duration::MAX);
            let skew = *self.skew.lock().unwrap_or_else(PoisonError::into_inner);
            self.start + elapsed + skew
        }
    }
}

/// Booking and payment fixtures
pub mod fixtures {
    use super::{DateTime, Utc};
    use chrono::TimeZone;
    use tixwatch_api::{
        Amount, BookingRecord, BookingStatus, BuyerInfo, Concert, ConcertTicketClass, PaymentId,
        PaymentMethod, PaymentRecord, PaymentStatus,
    };

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Price used by every fixture booking
    #[must_use]
    pub fn price() -> Amount {
        Amount::new(1_500_000.0).unwrap_or(Amount::ZERO)
    }

    /// Pending booking that expires at `expires_at`
    #[must_use]
    pub fn pending_booking(id: &str, expires_at: DateTime<Utc>) -> BookingRecord {
        BookingRecord::new(id, BookingStatus::Pending, price()).with_expiry(expires_at)
    }

    /// Pending booking with no expiry set
    #[must_use]
    pub fn pending_without_expiry(id: &str) -> BookingRecord {
        BookingRecord::new(id, BookingStatus::Pending, price())
    }

    /// Confirmed booking
    #[must_use]
    pub fn confirmed_booking(id: &str) -> BookingRecord {
        with_status(id, BookingStatus::Confirmed)
    }

    /// Cancelled booking
    #[must_use]
    pub fn cancelled_booking(id: &str) -> BookingRecord {
        with_status(id, BookingStatus::Cancelled)
    }

    /// Failed booking
    #[must_use]
    pub fn failed_booking(id: &str) -> BookingRecord {
        with_status(id, BookingStatus::Failed)
    }

    /// Booking with the given status and no expiry
    #[must_use]
    pub fn with_status(id: &str, status: BookingStatus) -> BookingRecord {
        BookingRecord::new(id, status, price())
    }

    /// Buyer details that pass validation
    #[must_use]
    pub fn buyer() -> BuyerInfo {
        BuyerInfo {
            full_name: "Sari Wulandari".to_string(),
            phone_number: "081234567890".to_string(),
            email: "sari@example.com".to_string(),
            ktp_number: "3171234567890123".to_string(),
        }
    }

    /// Concert 11 with a VIP class (id 2, 4 seats left at 1,500,000) and a
    /// festival class (id 3, 116 seats left at 350,000)
    #[must_use]
    pub fn concert() -> Concert {
        let class = |id, name: &str, price: f64, total, available| ConcertTicketClass {
            id,
            name: name.to_string(),
            price: Amount::new(price).unwrap_or(Amount::ZERO),
            total_seats_in_class: total,
            available_seats_in_class: available,
        };
        Concert {
            id: 11,
            name: "Jazz on the Lawn".to_string(),
            artist: "Trio Senja".to_string(),
            date: Some("2025-03-01T19:00:00Z".to_string()),
            venue: "Taman Ismail Marzuki".to_string(),
            total_seats: 300,
            available_seats: 120,
            description: String::new(),
            status: "active".to_string(),
            ticket_classes: vec![
                class(2, "VIP", 1_500_000.0, 50, 4),
                class(3, "Festival", 350_000.0, 250, 116),
            ],
        }
    }

    /// Payment record for `booking`
    #[must_use]
    pub fn payment_for(
        id: u64,
        booking: &BookingRecord,
        method: PaymentMethod,
        status: PaymentStatus,
    ) -> PaymentRecord {
        PaymentRecord {
            id: PaymentId::new(id),
            booking_id: booking.id.clone(),
            amount: booking.total_price,
            payment_method: method,
            transaction_id: format!("TXN-{id}"),
            status,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Async test helpers
pub mod helpers {
    use std::time::Duration;

    /// Let spawned tasks run until they block
    ///
    /// Works with both paused and real time: yields first, then sleeps one
    /// millisecond so pending timers at the current instant fire.
    pub async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    /// Install a test-friendly tracing subscriber (idempotent)
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest
pub mod properties {
    use proptest::prelude::*;
    use tixwatch_api::BookingStatus;

    /// Any booking status
    pub fn booking_status() -> impl Strategy<Value = BookingStatus> {
        prop_oneof![
            Just(BookingStatus::Pending),
            Just(BookingStatus::Confirmed),
            Just(BookingStatus::Cancelled),
            Just(BookingStatus::Failed),
        ]
    }

    /// Terminal booking statuses only
    pub fn terminal_status() -> impl Strategy<Value = BookingStatus> {
        prop_oneof![
            Just(BookingStatus::Confirmed),
            Just(BookingStatus::Cancelled),
            Just(BookingStatus::Failed),
        ]
    }

    /// Offset of an expiry relative to "now", in seconds (past and future)
    pub fn expiry_offset_secs() -> impl Strategy<Value = i64> {
        -3_600_i64..3_600_i64
    }
}

// Re-export commonly used items
pub use backend::{BackendCall, MockBackend};
pub use mocks::{FixedClock, ManualClock, TokioClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1, fixtures::epoch());
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(fixtures::epoch());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), fixtures::epoch() + chrono::Duration::seconds(90));
        clock.set(fixtures::epoch());
        assert_eq!(clock.now(), fixtures::epoch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(fixtures::epoch());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), fixtures::epoch() + chrono::Duration::seconds(5));

        clock.skew(chrono::Duration::seconds(-2));
        assert_eq!(clock.now(), fixtures::epoch() + chrono::Duration::seconds(3));
    }

    #[test]
    fn test_fixtures_statuses() {
        assert!(!fixtures::pending_booking("b", fixtures::epoch()).is_terminal());
        assert!(fixtures::confirmed_booking("b").is_terminal());
        assert!(fixtures::cancelled_booking("b").is_terminal());
        assert!(fixtures::failed_booking("b").is_terminal());
    }
}
