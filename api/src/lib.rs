//! # Tixwatch API
//!
//! Typed client for the concert booking and payment services.
//!
//! ## Example
//!
//! ```no_run
//! use tixwatch_api::{BookingApiClient, BookingBackend, BookingId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BookingApiClient::default().with_token("jwt");
//!     let booking = client.get_booking(&BookingId::new("b-123")).await?;
//!     println!("{} is {}", booking.id, booking.status);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

// Re-export main types for convenience
pub use backend::BookingBackend;
pub use client::{BookingApiClient, DEFAULT_BOOKING_URL, DEFAULT_PAYMENT_URL};
pub use error::ApiError;
pub use types::{
    Amount, BookedSeat, BookingId, BookingRecord, BookingStatus, BuyerInfo, CancelReceipt,
    Concert, ConcertTicketClass, CreateBookingRequest, InitiatePaymentRequest, InvalidAmount, ParseIdError, PaymentId,
    PaymentMethod, PaymentRecord, PaymentStatus, TicketHolderInfo, TicketQuantity,
    UnknownPaymentMethod,
};
