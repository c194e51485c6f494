//! Scripted stand-in for the booking and payment services.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tixwatch_api::{
    ApiError, BookingBackend, BookingId, BookingRecord, CancelReceipt, Concert,
    CreateBookingRequest, InitiatePaymentRequest, PaymentId, PaymentRecord, PaymentStatus,
};

/// A call the backend received, in arrival order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// `get_booking`
    GetBooking(BookingId),
    /// `my_bookings`
    MyBookings,
    /// `cancel_booking`
    CancelBooking(BookingId),
    /// `create_booking`
    CreateBooking(u64),
    /// `initiate_payment`
    InitiatePayment(BookingId),
    /// `get_payment`
    GetPayment(PaymentId),
    /// `get_concert`
    GetConcert(u64),
}

/// One scripted answer
#[derive(Clone, Debug)]
struct Scripted<T> {
    result: Result<T, ApiError>,
    delay: Duration,
}

/// FIFO of scripted answers; the last one repeats forever
#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<Scripted<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<Scripted<T>> {
        if self.queue.len() > 1 {
            self.queue.pop_front()
        } else {
            self.queue.front().cloned()
        }
    }

    fn replace(&mut self, answer: Scripted<T>) {
        self.queue.clear();
        self.queue.push_back(answer);
    }
}

#[derive(Debug, Default)]
struct State {
    bookings: HashMap<BookingId, Script<BookingRecord>>,
    my_bookings: Script<Vec<BookingRecord>>,
    cancels: HashMap<BookingId, Script<CancelReceipt>>,
    creates: Script<BookingRecord>,
    payments: Script<PaymentRecord>,
    payment_lookups: HashMap<PaymentId, Script<PaymentRecord>>,
    concerts: HashMap<u64, Script<Concert>>,
    calls: Vec<BackendCall>,
    created: Vec<CreateBookingRequest>,
    initiated: Vec<InitiatePaymentRequest>,
}

/// In-memory [`BookingBackend`] with scripted answers and a call log
///
/// Each operation answers from its script. Queued answers are consumed in
/// order and the last one repeats. Unscripted lookups answer `NotFound`;
/// unscripted cancels succeed and unscripted payments echo the request back
/// as a pending payment.
///
/// Delays use `tokio::time::sleep`, so they compose with paused test time.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every `get_booking(record.id)` with `record`
    pub fn set_booking(&self, record: BookingRecord) {
        let id = record.id.clone();
        self.lock().bookings.entry(id).or_default().replace(Scripted {
            result: Ok(record),
            delay: Duration::ZERO,
        });
    }

    /// Queue one answer for `get_booking(id)`
    pub fn push_booking(&self, id: &BookingId, result: Result<BookingRecord, ApiError>) {
        self.push_booking_delayed(id, result, Duration::ZERO);
    }

    /// Queue one answer for `get_booking(id)` that takes `delay` to arrive
    pub fn push_booking_delayed(
        &self,
        id: &BookingId,
        result: Result<BookingRecord, ApiError>,
        delay: Duration,
    ) {
        self.lock()
            .bookings
            .entry(id.clone())
            .or_default()
            .queue
            .push_back(Scripted { result, delay });
    }

    /// Make every `get_booking(id)` fail with `error`
    pub fn fail_booking(&self, id: &BookingId, error: ApiError) {
        self.lock()
            .bookings
            .entry(id.clone())
            .or_default()
            .replace(Scripted {
                result: Err(error),
                delay: Duration::ZERO,
            });
    }

    /// Answer every `my_bookings` with `records`
    pub fn set_my_bookings(&self, records: Vec<BookingRecord>) {
        self.lock().my_bookings.replace(Scripted {
            result: Ok(records),
            delay: Duration::ZERO,
        });
    }

    /// Queue one answer for `my_bookings`
    pub fn push_my_bookings(&self, result: Result<Vec<BookingRecord>, ApiError>) {
        self.lock().my_bookings.queue.push_back(Scripted {
            result,
            delay: Duration::ZERO,
        });
    }

    /// Make `cancel_booking(id)` answer with `result`
    pub fn set_cancel(&self, id: &BookingId, result: Result<CancelReceipt, ApiError>) {
        self.lock()
            .cancels
            .entry(id.clone())
            .or_default()
            .replace(Scripted {
                result,
                delay: Duration::ZERO,
            });
    }

    /// Make `create_booking` answer with `result`
    pub fn set_create(&self, result: Result<BookingRecord, ApiError>) {
        self.lock().creates.replace(Scripted {
            result,
            delay: Duration::ZERO,
        });
    }

    /// Make `initiate_payment` answer with `result`
    pub fn set_payment(&self, result: Result<PaymentRecord, ApiError>) {
        self.lock().payments.replace(Scripted {
            result,
            delay: Duration::ZERO,
        });
    }

    /// Answer every `get_payment(record.id)` with `record`
    pub fn set_payment_lookup(&self, record: PaymentRecord) {
        let id = record.id;
        self.lock()
            .payment_lookups
            .entry(id)
            .or_default()
            .replace(Scripted {
                result: Ok(record),
                delay: Duration::ZERO,
            });
    }

    /// Answer every `get_concert(concert.id)` with `concert`
    pub fn set_concert(&self, concert: Concert) {
        let id = concert.id;
        self.lock().concerts.entry(id).or_default().replace(Scripted {
            result: Ok(concert),
            delay: Duration::ZERO,
        });
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Number of calls equal to `call`
    #[must_use]
    pub fn count(&self, call: &BackendCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Number of `get_booking(id)` calls
    #[must_use]
    pub fn booking_fetches(&self, id: &BookingId) -> usize {
        self.count(&BackendCall::GetBooking(id.clone()))
    }

    /// Requests passed to `create_booking`
    #[must_use]
    pub fn created(&self) -> Vec<CreateBookingRequest> {
        self.lock().created.clone()
    }

    /// Requests passed to `initiate_payment`
    #[must_use]
    pub fn initiated(&self) -> Vec<InitiatePaymentRequest> {
        self.lock().initiated.clone()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    async fn answer<T>(
        scripted: Option<Scripted<T>>,
        missing: impl FnOnce() -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        match scripted {
            Some(Scripted { result, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            },
            None => missing(),
        }
    }
}

#[async_trait]
impl BookingBackend for MockBackend {
    async fn get_booking(&self, id: &BookingId) -> Result<BookingRecord, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::GetBooking(id.clone()));
            state.bookings.get_mut(id).and_then(Script::next)
        };
        Self::answer(scripted, || Err(ApiError::NotFound("booking not found".to_string()))).await
    }

    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::MyBookings);
            state.my_bookings.next()
        };
        Self::answer(scripted, || Ok(Vec::new())).await
    }

    async fn cancel_booking(&self, id: &BookingId) -> Result<CancelReceipt, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::CancelBooking(id.clone()));
            state.cancels.get_mut(id).and_then(Script::next)
        };
        Self::answer(scripted, || {
            Ok(CancelReceipt {
                message: "Booking cancelled successfully".to_string(),
            })
        })
        .await
    }

    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::CreateBooking(request.concert_id));
            state.created.push(request.clone());
            state.creates.next()
        };
        Self::answer(scripted, || {
            Err(ApiError::BackendRejected {
                status: 500,
                message: "create_booking not scripted".to_string(),
            })
        })
        .await
    }

    async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<PaymentRecord, ApiError> {
        let (scripted, sequence) = {
            let mut state = self.lock();
            state
                .calls
                .push(BackendCall::InitiatePayment(request.booking_id.clone()));
            state.initiated.push(request.clone());
            (
                state.payments.next(),
                u64::try_from(state.initiated.len()).unwrap_or(u64::MAX),
            )
        };
        Self::answer(scripted, || {
            Ok(PaymentRecord {
                id: PaymentId::new(sequence),
                booking_id: request.booking_id.clone(),
                amount: request.amount,
                payment_method: request.payment_method,
                transaction_id: format!("TXN-{sequence}"),
                status: PaymentStatus::Pending,
                created_at: None,
                updated_at: None,
            })
        })
        .await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<PaymentRecord, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::GetPayment(id));
            state.payment_lookups.get_mut(&id).and_then(Script::next)
        };
        Self::answer(scripted, || Err(ApiError::NotFound("payment not found".to_string()))).await
    }

    async fn get_concert(&self, id: u64) -> Result<Concert, ApiError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(BackendCall::GetConcert(id));
            state.concerts.get_mut(&id).and_then(Script::next)
        };
        Self::answer(scripted, || Err(ApiError::NotFound("concert not found".to_string()))).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn unscripted_booking_is_not_found() {
        let backend = MockBackend::new();
        let error = backend.get_booking(&BookingId::new("nope")).await.unwrap_err();
        assert!(matches!(error, ApiError::NotFound(_)));
        assert_eq!(backend.booking_fetches(&BookingId::new("nope")), 1);
    }

    #[tokio::test]
    async fn queued_answers_are_consumed_and_last_repeats() {
        let backend = MockBackend::new();
        let id = BookingId::new("b1");
        backend.push_booking(&id, Ok(fixtures::pending_booking("b1", fixtures::epoch())));
        backend.push_booking(&id, Ok(fixtures::confirmed_booking("b1")));

        assert!(!backend.get_booking(&id).await.unwrap().is_terminal());
        assert!(backend.get_booking(&id).await.unwrap().is_terminal());
        assert!(backend.get_booking(&id).await.unwrap().is_terminal());
        assert_eq!(backend.booking_fetches(&id), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_answer_waits_on_tokio_time() {
        let backend = MockBackend::new();
        let id = BookingId::new("b1");
        backend.push_booking_delayed(
            &id,
            Ok(fixtures::confirmed_booking("b1")),
            Duration::from_secs(3),
        );

        let started = tokio::time::Instant::now();
        backend.get_booking(&id).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unscripted_payment_echoes_request() {
        let backend = MockBackend::new();
        let request = InitiatePaymentRequest {
            booking_id: BookingId::new("b1"),
            amount: fixtures::price(),
            payment_method: tixwatch_api::PaymentMethod::BankTransfer,
        };
        let payment = backend.initiate_payment(&request).await.unwrap();
        assert_eq!(payment.booking_id, request.booking_id);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(backend.initiated(), vec![request]);
    }
}
