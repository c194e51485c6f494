//! Error types for booking actions and client-side validation.

use thiserror::Error;
use tixwatch_api::{ApiError, BookingId, BookingStatus};

/// Client-side form validation failures
///
/// These never reach the backend; the offending request is not sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No ticket class selected
    #[error("Select at least one ticket")]
    NoTickets,

    /// A ticket class was selected with quantity zero
    #[error("Ticket quantity must be at least 1 (class {ticket_class_id})")]
    ZeroQuantity {
        /// Offending ticket class
        ticket_class_id: u64,
    },

    /// More tickets than a single booking may hold
    #[error("A booking can hold at most {max} tickets, got {requested}")]
    TooManyTickets {
        /// Total requested
        requested: u32,
        /// Allowed maximum
        max: u32,
    },

    /// The concert has no ticket class with this id
    #[error("Unknown ticket class {ticket_class_id}")]
    UnknownTicketClass {
        /// Requested ticket class
        ticket_class_id: u64,
    },

    /// More tickets requested than the class has left
    #[error("Only {available} seats left in {class_name}")]
    NotEnoughSeats {
        /// Ticket class display name
        class_name: String,
        /// Seats still unsold
        available: u32,
    },

    /// Buyer name missing
    #[error("Full name is required")]
    MissingName,

    /// Buyer phone number is not 10 to 15 digits
    #[error("Phone number must be 10-15 digits")]
    InvalidPhone,

    /// Buyer e-mail does not look like an address
    #[error("Invalid email address")]
    InvalidEmail,

    /// Buyer KTP number is not 16 digits
    #[error("KTP number must be exactly 16 digits")]
    InvalidKtp,

    /// Ticket holder name missing
    #[error("Ticket holder full name is required")]
    MissingHolderName,

    /// Ticket holder KTP number is not 16 digits
    #[error("Ticket holder KTP number must be exactly 16 digits")]
    InvalidHolderKtp,

    /// Submit without a stashed selection
    #[error("No ticket selection to submit")]
    NoSelection,

    /// Payment of a zero-priced booking
    #[error("Payment amount must be greater than zero")]
    NonPositiveAmount,
}

/// Errors returned by the [`crate::dispatcher::ActionDispatcher`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The locally cached record is already terminal; nothing was sent
    #[error("Booking {id} is already {status}")]
    AlreadyTerminal {
        /// Booking the action targeted
        id: BookingId,
        /// Status seen in the cache
        status: BookingStatus,
    },

    /// Input rejected before reaching the backend
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend or transport failure, message unchanged
    #[error(transparent)]
    Api(#[from] ApiError),
}
