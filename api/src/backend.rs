//! The backend seam used by the cache and the dispatcher

use crate::error::ApiError;
use crate::types::{
    BookingId, BookingRecord, CancelReceipt, Concert, CreateBookingRequest,
    InitiatePaymentRequest, PaymentId, PaymentRecord,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the client needs from the booking and payment services
///
/// [`crate::BookingApiClient`] talks HTTP; tests substitute a scripted mock.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    /// `GET /bookings/{id}`
    async fn get_booking(&self, id: &BookingId) -> Result<BookingRecord, ApiError>;

    /// `GET /bookings/my`
    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError>;

    /// `PUT /bookings/{id}/cancel`
    async fn cancel_booking(&self, id: &BookingId) -> Result<CancelReceipt, ApiError>;

    /// `POST /bookings/`
    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError>;

    /// `POST /payments`
    async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<PaymentRecord, ApiError>;

    /// `GET /payments/{id}`
    async fn get_payment(&self, id: PaymentId) -> Result<PaymentRecord, ApiError>;

    /// `GET /concerts/{id}`, read-only concert details with ticket classes
    async fn get_concert(&self, id: u64) -> Result<Concert, ApiError>;
}

#[async_trait]
impl<T: BookingBackend + ?Sized> BookingBackend for Arc<T> {
    async fn get_booking(&self, id: &BookingId) -> Result<BookingRecord, ApiError> {
        (**self).get_booking(id).await
    }

    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        (**self).my_bookings().await
    }

    async fn cancel_booking(&self, id: &BookingId) -> Result<CancelReceipt, ApiError> {
        (**self).cancel_booking(id).await
    }

    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError> {
        (**self).create_booking(request).await
    }

    async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<PaymentRecord, ApiError> {
        (**self).initiate_payment(request).await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<PaymentRecord, ApiError> {
        (**self).get_payment(id).await
    }

    async fn get_concert(&self, id: u64) -> Result<Concert, ApiError> {
        (**self).get_concert(id).await
    }
}
