//! Wire types for the booking and payment services.
//!
//! Field names follow the services' JSON (snake case). Descriptive payloads
//! (buyer, ticket holder, seats) are decoded for display but carry no logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque, stable booking identifier issued by the booking service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    /// Wrap a booking identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Error type for parsing identifiers from user input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0:?}")]
pub struct ParseIdError(String);

impl FromStr for BookingId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(ParseIdError(s.to_string()));
        }
        Ok(Self::new(trimmed))
    }
}

/// Payment record identifier issued by the payment service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(u64);

impl PaymentId {
    /// Wrap a payment identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The numeric identifier
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

// ============================================================================
// Money
// ============================================================================

/// Rejected monetary amount
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Amount must be a finite, non-negative number, got {0}")]
pub struct InvalidAmount(pub f64);

/// Non-negative decimal amount, carried as a JSON number
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Amount(f64);

impl Amount {
    /// Zero
    pub const ZERO: Self = Self(0.0);

    /// Create an amount
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAmount`] for negative, NaN or infinite values.
    pub fn new(value: f64) -> Result<Self, InvalidAmount> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(InvalidAmount(value))
        }
    }

    /// The amount as a float
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether the amount is strictly greater than zero
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0.0
    }
}

impl TryFrom<f64> for Amount {
    type Error = InvalidAmount;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for f64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// Lifecycle status of a booking
///
/// `Pending` is the only non-terminal value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seats held, waiting for payment until `expires_at`
    Pending,
    /// Paid
    Confirmed,
    /// Cancelled by the user or by the expiry job
    Cancelled,
    /// Payment failed
    Failed,
}

impl BookingStatus {
    /// Whether no further transition is expected
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buyer contact details
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    /// Full name
    pub full_name: String,
    /// Phone number (digits only)
    pub phone_number: String,
    /// E-mail address
    pub email: String,
    /// National identity (KTP) number
    pub ktp_number: String,
}

/// Ticket holder, when the buyer books for someone else
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketHolderInfo {
    /// Full name
    pub full_name: String,
    /// National identity (KTP) number
    pub ktp_number: String,
}

/// A seat attached to a booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSeat {
    /// Seat id
    pub id: u64,
    /// Seat label as printed on the ticket
    pub seat_number: String,
    /// Seat status as reported by inventory
    pub status: String,
    /// Ticket class the seat belongs to
    #[serde(default)]
    pub ticket_class_id: Option<u64>,
    /// Ticket class display name
    #[serde(default)]
    pub ticket_class_name: Option<String>,
}

/// Booking as returned by `GET /bookings/{id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    /// Booking id
    pub id: BookingId,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Total price of all booked seats
    pub total_price: Amount,
    /// Payment deadline; only meaningful while `status` is pending
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set once a payment attempt has been initiated
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
    /// Owner
    #[serde(default)]
    pub user_id: Option<u64>,
    /// Concert the seats belong to
    #[serde(default)]
    pub concert_id: Option<u64>,
    /// Concert display name
    #[serde(default)]
    pub concert_name: Option<String>,
    /// Concert date as sent by the service
    #[serde(default)]
    pub concert_date: Option<String>,
    /// Buyer details
    #[serde(default)]
    pub buyer_info: Option<BuyerInfo>,
    /// Ticket holder details
    #[serde(default)]
    pub ticket_holder_info: Option<TicketHolderInfo>,
    /// Seats held or sold
    #[serde(default)]
    pub booked_seats: Option<Vec<BookedSeat>>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last server-side update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BookingRecord {
    /// Minimal record, mostly useful for tests and fixtures
    #[must_use]
    pub fn new(id: impl Into<String>, status: BookingStatus, total_price: Amount) -> Self {
        Self {
            id: BookingId::new(id),
            status,
            total_price,
            expires_at: None,
            payment_id: None,
            user_id: None,
            concert_id: None,
            concert_name: None,
            concert_date: None,
            buyer_info: None,
            ticket_holder_info: None,
            booked_seats: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the payment deadline
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the record's status is terminal
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The payment deadline, if the booking is still pending
    ///
    /// A leftover `expires_at` on a resolved booking is ignored.
    #[must_use]
    pub const fn active_expiry(&self) -> Option<DateTime<Utc>> {
        match self.status {
            BookingStatus::Pending => self.expires_at,
            _ => None,
        }
    }

    /// Number of seats attached to the booking
    #[must_use]
    pub fn seat_count(&self) -> usize {
        self.booked_seats.as_ref().map_or(0, Vec::len)
    }
}

/// Response body of `PUT /bookings/{id}/cancel`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReceipt {
    /// Confirmation message from the booking service
    pub message: String,
}

/// Quantity requested for one ticket class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketQuantity {
    /// Ticket class id
    pub ticket_class_id: u64,
    /// Number of seats
    pub quantity: u32,
}

/// Body of `POST /bookings/`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    /// Concert to book
    pub concert_id: u64,
    /// Requested seats per ticket class
    pub tickets_by_class: Vec<TicketQuantity>,
    /// Buyer details
    pub buyer_info: BuyerInfo,
    /// Optional separate ticket holder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_holder_info: Option<TicketHolderInfo>,
}

// ============================================================================
// Concerts
// ============================================================================

/// Ticket class on sale for a concert
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConcertTicketClass {
    /// Ticket class id, as used in [`TicketQuantity::ticket_class_id`]
    pub id: u64,
    /// Display name
    pub name: String,
    /// Price of one ticket
    pub price: Amount,
    /// Seats in this class
    #[serde(default)]
    pub total_seats_in_class: u32,
    /// Seats still unsold
    #[serde(default)]
    pub available_seats_in_class: u32,
}

/// Concert as returned by `GET /concerts/{id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Concert {
    /// Concert id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Performing artist
    #[serde(default)]
    pub artist: String,
    /// Date as sent by the service
    #[serde(default)]
    pub date: Option<String>,
    /// Venue
    #[serde(default)]
    pub venue: String,
    /// Seats across all classes
    #[serde(default)]
    pub total_seats: u32,
    /// Unsold seats across all classes
    #[serde(default)]
    pub available_seats: u32,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Seat creation status
    #[serde(default)]
    pub status: String,
    /// Ticket classes; the service sends `null` for none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ticket_classes: Vec<ConcertTicketClass>,
}

impl Concert {
    /// Look up a ticket class by id
    #[must_use]
    pub fn ticket_class(&self, id: u64) -> Option<&ConcertTicketClass> {
        self.ticket_classes.iter().find(|class| class.id == id)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Payments
// ============================================================================

/// Error type for unknown payment method names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown payment method: {0:?} (expected credit_card, bank_transfer or e_wallet)")]
pub struct UnknownPaymentMethod(String);

/// Simulated payment methods offered at checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment processed by the mock gateway
    CreditCard,
    /// Manual bank transfer
    BankTransfer,
    /// QR based e-wallet payment, completed outside the app
    EWallet,
}

impl PaymentMethod {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::EWallet => "e_wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "credit_card" => Ok(Self::CreditCard),
            "bank_transfer" => Ok(Self::BankTransfer),
            "e_wallet" | "ewallet" => Ok(Self::EWallet),
            _ => Err(UnknownPaymentMethod(s.to_string())),
        }
    }
}

/// Status of a payment attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Not yet processed
    Pending,
    /// Gateway accepted the payment
    Success,
    /// Gateway rejected the payment
    Failed,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

/// Payment record as returned by the payment service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment id
    pub id: PaymentId,
    /// Booking being paid
    pub booking_id: BookingId,
    /// Amount charged
    pub amount: Amount,
    /// Method used
    pub payment_method: PaymentMethod,
    /// Gateway transaction id
    #[serde(default)]
    pub transaction_id: String,
    /// Processing status
    pub status: PaymentStatus,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /payments`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    /// Booking being paid
    pub booking_id: BookingId,
    /// Amount to charge (the booking total)
    pub amount: Amount,
    /// Selected method
    pub payment_method: PaymentMethod,
}
