//! The three caches a booking screen reads from.

use crate::cache::{Query, QueryCache};
use crate::config::CacheConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tixwatch_api::{
    ApiError, BookingBackend, BookingId, BookingRecord, BookingStatus, PaymentId, PaymentRecord,
};

/// A single booking by id
///
/// Polled while pending; settled once the status is terminal.
pub struct BookingQuery {
    backend: Arc<dyn BookingBackend>,
    poll_interval: Duration,
}

impl BookingQuery {
    /// Create the query
    #[must_use]
    pub fn new(backend: Arc<dyn BookingBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }
}

#[async_trait]
impl Query for BookingQuery {
    type Key = BookingId;
    type Value = BookingRecord;

    const NAME: &'static str = "booking";

    async fn fetch(&self, key: &BookingId) -> Result<BookingRecord, ApiError> {
        self.backend.get_booking(key).await
    }

    fn is_settled(&self, value: &BookingRecord) -> bool {
        value.is_terminal()
    }

    fn poll_interval(&self, value: &BookingRecord) -> Option<Duration> {
        (value.status == BookingStatus::Pending).then_some(self.poll_interval)
    }
}

/// The signed-in user's bookings
///
/// Polled while any listed booking is pending. Never settled, since new
/// bookings can appear at any time.
pub struct MyBookingsQuery {
    backend: Arc<dyn BookingBackend>,
    poll_interval: Duration,
}

impl MyBookingsQuery {
    /// Create the query
    #[must_use]
    pub fn new(backend: Arc<dyn BookingBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }
}

#[async_trait]
impl Query for MyBookingsQuery {
    type Key = ();
    type Value = Vec<BookingRecord>;

    const NAME: &'static str = "my_bookings";

    async fn fetch(&self, _key: &()) -> Result<Vec<BookingRecord>, ApiError> {
        self.backend.my_bookings().await
    }

    fn poll_interval(&self, value: &Vec<BookingRecord>) -> Option<Duration> {
        value
            .iter()
            .any(|booking| booking.status == BookingStatus::Pending)
            .then_some(self.poll_interval)
    }
}

/// A payment record by id; never polled
pub struct PaymentQuery {
    backend: Arc<dyn BookingBackend>,
}

impl PaymentQuery {
    /// Create the query
    #[must_use]
    pub fn new(backend: Arc<dyn BookingBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Query for PaymentQuery {
    type Key = PaymentId;
    type Value = PaymentRecord;

    const NAME: &'static str = "payment";

    async fn fetch(&self, key: &PaymentId) -> Result<PaymentRecord, ApiError> {
        self.backend.get_payment(*key).await
    }
}

/// Booking records by id
pub type BookingCache = QueryCache<BookingQuery>;
/// "My bookings" list, keyed by `()`
pub type MyBookingsCache = QueryCache<MyBookingsQuery>;
/// Payment records by id
pub type PaymentCache = QueryCache<PaymentQuery>;

/// All caches sharing one backend
#[derive(Clone)]
pub struct BookingCaches {
    /// Booking records
    pub bookings: BookingCache,
    /// "My bookings" list
    pub my_bookings: MyBookingsCache,
    /// Payment records
    pub payments: PaymentCache,
}

impl BookingCaches {
    /// Build the caches over `backend` with the configured timings
    #[must_use]
    pub fn new(backend: Arc<dyn BookingBackend>, config: &CacheConfig) -> Self {
        Self {
            bookings: QueryCache::new(
                BookingQuery::new(Arc::clone(&backend), config.poll_interval()),
                config.stale_time(),
            ),
            my_bookings: QueryCache::new(
                MyBookingsQuery::new(Arc::clone(&backend), config.poll_interval()),
                config.stale_time(),
            ),
            payments: QueryCache::new(PaymentQuery::new(backend), config.payment_stale_time()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tixwatch_testing::{MockBackend, fixtures};

    fn backend() -> Arc<dyn BookingBackend> {
        Arc::new(MockBackend::new())
    }

    #[test]
    fn booking_polls_only_while_pending() {
        let query = BookingQuery::new(backend(), Duration::from_secs(5));
        let pending = fixtures::pending_booking("b1", fixtures::epoch());

        assert_eq!(query.poll_interval(&pending), Some(Duration::from_secs(5)));
        assert!(!query.is_settled(&pending));
        for terminal in [
            fixtures::confirmed_booking("b1"),
            fixtures::cancelled_booking("b1"),
            fixtures::failed_booking("b1"),
        ] {
            assert!(query.is_settled(&terminal));
            assert_eq!(query.poll_interval(&terminal), None);
        }
    }

    #[test]
    fn list_polls_while_any_booking_is_pending() {
        let query = MyBookingsQuery::new(backend(), Duration::from_secs(5));
        let resolved = vec![fixtures::confirmed_booking("a"), fixtures::cancelled_booking("b")];
        let mut mixed = resolved.clone();
        mixed.push(fixtures::pending_booking("c", fixtures::epoch()));

        assert_eq!(query.poll_interval(&resolved), None);
        assert_eq!(query.poll_interval(&mixed), Some(Duration::from_secs(5)));
        assert!(!query.is_settled(&resolved));
    }

    #[test]
    fn payments_are_never_polled() {
        let query = PaymentQuery::new(backend());
        let booking = fixtures::pending_booking("b1", fixtures::epoch());
        let payment = fixtures::payment_for(
            1,
            &booking,
            tixwatch_api::PaymentMethod::CreditCard,
            tixwatch_api::PaymentStatus::Pending,
        );
        assert_eq!(query.poll_interval(&payment), None);
    }
}
