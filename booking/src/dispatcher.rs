//! User intents that mutate bookings.
//!
//! The dispatcher talks to the backend and keeps the caches honest: after
//! a successful mutation it invalidates every entry the mutation may have
//! changed, so the next read goes to the network instead of waiting for a
//! poll. It never edits cached records itself.
//!
//! In-flight requests are not deduplicated here. Screens disable their
//! actions while one is running.

use crate::cache::FetchOptions;
use crate::error::{DispatchError, ValidationError};
use crate::queries::BookingCaches;
use crate::selection::{self, ConcertSummary, SelectionStash};
use std::sync::Arc;
use tixwatch_api::{
    Amount, BookingBackend, BookingId, BookingRecord, BuyerInfo, CancelReceipt,
    InitiatePaymentRequest, PaymentMethod, PaymentRecord, TicketHolderInfo, TicketQuantity,
};

/// Result of a payment intent
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentOutcome {
    /// E-wallet: show the QR code; nothing was sent to the backend
    QrPayment {
        /// Booking being paid
        booking_id: BookingId,
        /// Amount encoded in the QR payload
        amount: Amount,
    },
    /// The payment service accepted the request
    Initiated(PaymentRecord),
}

/// Executes booking mutations and invalidates the affected caches
#[derive(Clone)]
pub struct ActionDispatcher {
    backend: Arc<dyn BookingBackend>,
    caches: BookingCaches,
    stash: SelectionStash,
}

impl ActionDispatcher {
    /// Create a dispatcher sharing `caches` and `stash` with the screens
    #[must_use]
    pub fn new(
        backend: Arc<dyn BookingBackend>,
        caches: BookingCaches,
        stash: SelectionStash,
    ) -> Self {
        Self {
            backend,
            caches,
            stash,
        }
    }

    /// Caches this dispatcher invalidates
    #[must_use]
    pub const fn caches(&self) -> &BookingCaches {
        &self.caches
    }

    /// Selection stash consumed by [`submit_booking`](Self::submit_booking)
    #[must_use]
    pub const fn stash(&self) -> &SelectionStash {
        &self.stash
    }

    /// Cancel a booking
    ///
    /// Refused locally when the cached record is already terminal. On
    /// success the booking and the "my bookings" list are invalidated.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyTerminal`]: cached status is terminal; no request sent
    /// - [`DispatchError::Api`]: the backend refused or was unreachable; caches untouched
    #[tracing::instrument(skip(self), fields(booking_id = %id))]
    pub async fn cancel(&self, id: &BookingId) -> Result<CancelReceipt, DispatchError> {
        if let Some(record) = self.caches.bookings.peek(id).value {
            ensure_open(&record)?;
        }

        let receipt = self.backend.cancel_booking(id).await.inspect_err(|error| {
            metrics::counter!("dispatcher.failures", "action" => "cancel").increment(1);
            tracing::warn!(%error, "Cancel rejected");
        })?;

        metrics::counter!("dispatcher.success", "action" => "cancel").increment(1);
        tracing::info!(message = %receipt.message, "Booking cancelled");
        self.caches.bookings.invalidate(id);
        self.caches.my_bookings.invalidate(&());
        Ok(receipt)
    }

    /// Start paying for a booking
    ///
    /// The amount is the booking's total price, read through the cache.
    /// `e_wallet` never reaches the payment service: the caller gets a
    /// [`PaymentOutcome::QrPayment`] to navigate to. Other methods post the
    /// payment and, on success, invalidate the booking, "my bookings" and
    /// payment caches.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyTerminal`]: the booking is no longer pending
    /// - [`DispatchError::Validation`]: the booking has nothing to pay
    /// - [`DispatchError::Api`]: the booking could not be read or the
    ///   payment service refused
    #[tracing::instrument(skip(self), fields(booking_id = %id, method = %method))]
    pub async fn initiate_payment(
        &self,
        id: &BookingId,
        method: PaymentMethod,
    ) -> Result<PaymentOutcome, DispatchError> {
        let record = self.caches.bookings.get(id, FetchOptions::never_stale()).await?;
        ensure_open(&record)?;
        if !record.total_price.is_positive() {
            return Err(ValidationError::NonPositiveAmount.into());
        }

        if method == PaymentMethod::EWallet {
            metrics::counter!("dispatcher.success", "action" => "qr_payment").increment(1);
            tracing::debug!(amount = %record.total_price, "E-wallet payment, showing QR code");
            return Ok(PaymentOutcome::QrPayment {
                booking_id: id.clone(),
                amount: record.total_price,
            });
        }

        let request = InitiatePaymentRequest {
            booking_id: id.clone(),
            amount: record.total_price,
            payment_method: method,
        };
        let payment = self
            .backend
            .initiate_payment(&request)
            .await
            .inspect_err(|error| {
                metrics::counter!("dispatcher.failures", "action" => "pay").increment(1);
                tracing::warn!(%error, "Payment rejected");
            })?;

        metrics::counter!("dispatcher.success", "action" => "pay").increment(1);
        tracing::info!(payment_id = %payment.id, status = ?payment.status, "Payment initiated");
        self.caches.bookings.invalidate(id);
        self.caches.my_bookings.invalidate(&());
        self.caches.payments.invalidate_all();
        Ok(PaymentOutcome::Initiated(payment))
    }

    /// Price a ticket selection and park it for [`submit_booking`](Self::submit_booking)
    ///
    /// The concert is read fresh from the backend so the total reflects
    /// current prices and seat counts.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`]: empty or oversized selection, unknown
    ///   class, or not enough seats left; the previous stash is kept
    /// - [`DispatchError::Api`]: the concert could not be read
    #[tracing::instrument(skip(self, tickets))]
    pub async fn select_tickets(
        &self,
        concert_id: u64,
        tickets: Vec<TicketQuantity>,
    ) -> Result<ConcertSummary, DispatchError> {
        let concert = self.backend.get_concert(concert_id).await.inspect_err(|error| {
            tracing::warn!(%error, "Concert unavailable");
        })?;
        let summary = ConcertSummary::for_selection(&concert, &tickets)?;
        self.stash.stash(summary.clone(), tickets)?;

        tracing::info!(total = %summary.total_price, "Tickets selected");
        Ok(summary)
    }

    /// Create a booking from the stashed selection
    ///
    /// On success the stash is cleared, the new record is primed into the
    /// booking cache and the "my bookings" list is invalidated. On failure
    /// the stash is kept so the form can be resubmitted.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`]: nothing stashed, or a form field is invalid
    /// - [`DispatchError::Api`]: the booking service refused, message unchanged
    #[tracing::instrument(skip_all)]
    pub async fn submit_booking(
        &self,
        buyer: BuyerInfo,
        holder: Option<TicketHolderInfo>,
    ) -> Result<BookingRecord, DispatchError> {
        let pending = self.stash.peek().ok_or(ValidationError::NoSelection)?;
        let request = selection::build_request(&pending, buyer, holder)?;

        let record = self
            .backend
            .create_booking(&request)
            .await
            .inspect_err(|error| {
                metrics::counter!("dispatcher.failures", "action" => "submit").increment(1);
                tracing::warn!(concert_id = request.concert_id, %error, "Booking rejected");
            })?;

        metrics::counter!("dispatcher.success", "action" => "submit").increment(1);
        tracing::info!(booking_id = %record.id, status = %record.status, "Booking created");
        self.stash.clear();
        self.caches.bookings.prime(record.id.clone(), record.clone());
        self.caches.my_bookings.invalidate(&());
        Ok(record)
    }
}

fn ensure_open(record: &BookingRecord) -> Result<(), DispatchError> {
    if record.is_terminal() {
        tracing::debug!(booking_id = %record.id, status = %record.status, "Refusing action on resolved booking");
        return Err(DispatchError::AlreadyTerminal {
            id: record.id.clone(),
            status: record.status,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tixwatch_api::{ApiError, BookingStatus};
    use tixwatch_testing::{BackendCall, MockBackend, fixtures};

    fn dispatcher(backend: &MockBackend) -> ActionDispatcher {
        let backend: Arc<dyn BookingBackend> = Arc::new(backend.clone());
        let caches = BookingCaches::new(Arc::clone(&backend), &Config::default().cache);
        ActionDispatcher::new(backend, caches, SelectionStash::new())
    }

    #[tokio::test]
    async fn cancel_with_nothing_cached_asks_the_backend() {
        let backend = MockBackend::new();
        let dispatcher = dispatcher(&backend);
        let id = BookingId::new("b1");

        let receipt = dispatcher.cancel(&id).await.unwrap();
        assert_eq!(receipt.message, "Booking cancelled successfully");
        assert_eq!(backend.calls(), vec![BackendCall::CancelBooking(id)]);
    }

    #[tokio::test]
    async fn failed_cancel_leaves_cache_untouched() {
        let backend = MockBackend::new();
        let dispatcher = dispatcher(&backend);
        let record = fixtures::pending_booking("b1", fixtures::epoch());
        dispatcher.caches().bookings.prime(record.id.clone(), record.clone());
        backend.set_cancel(
            &record.id,
            Err(ApiError::BackendRejected {
                status: 400,
                message: "Cannot cancel a paid booking".to_string(),
            }),
        );

        let error = dispatcher.cancel(&record.id).await.unwrap_err();
        assert_eq!(error.to_string(), "Cannot cancel a paid booking");
        assert_eq!(dispatcher.caches().bookings.peek(&record.id).value, Some(record));
        assert_eq!(backend.booking_fetches(&BookingId::new("b1")), 0);
    }

    #[tokio::test]
    async fn pay_refuses_resolved_booking() {
        let backend = MockBackend::new();
        let dispatcher = dispatcher(&backend);
        let record = fixtures::confirmed_booking("b1");
        dispatcher.caches().bookings.prime(record.id.clone(), record.clone());

        let error = dispatcher
            .initiate_payment(&record.id, PaymentMethod::CreditCard)
            .await
            .unwrap_err();
        assert_eq!(
            error,
            DispatchError::AlreadyTerminal {
                id: record.id,
                status: BookingStatus::Confirmed
            }
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn pay_refuses_free_booking() {
        let backend = MockBackend::new();
        let dispatcher = dispatcher(&backend);
        let record = BookingRecord::new("b1", BookingStatus::Pending, Amount::ZERO);
        dispatcher.caches().bookings.prime(record.id.clone(), record.clone());

        let error = dispatcher
            .initiate_payment(&record.id, PaymentMethod::BankTransfer)
            .await
            .unwrap_err();
        assert_eq!(error, DispatchError::Validation(ValidationError::NonPositiveAmount));
        assert!(backend.initiated().is_empty());
    }

    #[tokio::test]
    async fn submit_without_selection_is_a_validation_error() {
        let backend = MockBackend::new();
        let dispatcher = dispatcher(&backend);

        let error = dispatcher.submit_booking(fixtures::buyer(), None).await.unwrap_err();
        assert_eq!(error, DispatchError::Validation(ValidationError::NoSelection));
        assert!(backend.created().is_empty());
    }
}
