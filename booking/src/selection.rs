//! Ticket selection stash and booking form validation.
//!
//! The selection made on the concert screen is parked here until the buyer
//! form is submitted. The stash lives for the session only: nothing is
//! written to disk.

use crate::error::ValidationError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tixwatch_api::{
    Amount, BuyerInfo, Concert, CreateBookingRequest, TicketHolderInfo, TicketQuantity,
};

/// Most tickets a single booking may hold
pub const MAX_TICKETS_PER_BOOKING: u32 = 5;

/// Slot holding the selected ticket quantities
pub const PENDING_TICKETS: &str = "pending_tickets";

/// Slot holding the concert summary
pub const PENDING_CONCERT: &str = "pending_concert";

/// Concert details shown on the buyer form
#[derive(Clone, Debug, PartialEq)]
pub struct ConcertSummary {
    /// Concert id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Date as sent by the concert service
    pub date: Option<String>,
    /// Price of the selection
    pub total_price: Amount,
}

impl ConcertSummary {
    /// Price `tickets` against the concert's ticket classes
    ///
    /// Zero quantities are ignored.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownTicketClass`]: the concert has no such class
    /// - [`ValidationError::NotEnoughSeats`]: more than the class has left
    pub fn for_selection(
        concert: &Concert,
        tickets: &[TicketQuantity],
    ) -> Result<Self, ValidationError> {
        let mut total = 0.0;
        for ticket in tickets.iter().filter(|ticket| ticket.quantity > 0) {
            let class = concert.ticket_class(ticket.ticket_class_id).ok_or(
                ValidationError::UnknownTicketClass {
                    ticket_class_id: ticket.ticket_class_id,
                },
            )?;
            if ticket.quantity > class.available_seats_in_class {
                return Err(ValidationError::NotEnoughSeats {
                    class_name: class.name.clone(),
                    available: class.available_seats_in_class,
                });
            }
            total += class.price.value() * f64::from(ticket.quantity);
        }

        Ok(Self {
            id: concert.id,
            name: concert.name.clone(),
            date: concert.date.clone(),
            total_price: Amount::new(total).map_err(|_| ValidationError::NonPositiveAmount)?,
        })
    }
}

/// Selection waiting for buyer details
#[derive(Clone, Debug, PartialEq)]
pub struct PendingSelection {
    /// Concert being booked
    pub concert: ConcertSummary,
    /// Requested quantities, one entry per ticket class
    pub tickets: Vec<TicketQuantity>,
}

#[derive(Debug, Default)]
struct Slots {
    pending_tickets: Option<Vec<TicketQuantity>>,
    pending_concert: Option<ConcertSummary>,
}

/// Session-scoped stash with two fixed slots
///
/// Cheap to clone; clones share the slots.
#[derive(Clone, Debug, Default)]
pub struct SelectionStash {
    slots: Arc<Mutex<Slots>>,
}

impl SelectionStash {
    /// Create an empty stash
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park a selection, replacing any previous one
    ///
    /// Classes with quantity zero are dropped before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if nothing is selected or the total
    /// exceeds [`MAX_TICKETS_PER_BOOKING`]. The previous selection is kept.
    pub fn stash(
        &self,
        concert: ConcertSummary,
        tickets: Vec<TicketQuantity>,
    ) -> Result<(), ValidationError> {
        let tickets: Vec<TicketQuantity> =
            tickets.into_iter().filter(|ticket| ticket.quantity > 0).collect();
        let total = validate_tickets(&tickets)?;

        tracing::debug!(concert_id = concert.id, total, "Selection stashed");
        let mut slots = self.lock();
        slots.pending_tickets = Some(tickets);
        slots.pending_concert = Some(concert);
        Ok(())
    }

    /// The parked selection, if both slots are filled
    #[must_use]
    pub fn peek(&self) -> Option<PendingSelection> {
        let slots = self.lock();
        Some(PendingSelection {
            concert: slots.pending_concert.clone()?,
            tickets: slots.pending_tickets.clone()?,
        })
    }

    /// Remove and return the parked selection
    ///
    /// A half-filled stash is left untouched.
    #[must_use]
    pub fn take(&self) -> Option<PendingSelection> {
        let mut slots = self.lock();
        if slots.pending_concert.is_none() || slots.pending_tickets.is_none() {
            return None;
        }
        Some(PendingSelection {
            concert: slots.pending_concert.take()?,
            tickets: slots.pending_tickets.take()?,
        })
    }

    /// Empty both slots
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.pending_tickets = None;
        slots.pending_concert = None;
    }

    /// Whether a slot is filled
    #[must_use]
    pub fn contains(&self, slot: &str) -> bool {
        let slots = self.lock();
        match slot {
            PENDING_TICKETS => slots.pending_tickets.is_some(),
            PENDING_CONCERT => slots.pending_concert.is_some(),
            _ => false,
        }
    }
}

/// Check ticket quantities; returns the total
///
/// # Errors
///
/// Returns [`ValidationError`] for an empty selection, a zero quantity or
/// too many tickets.
pub fn validate_tickets(tickets: &[TicketQuantity]) -> Result<u32, ValidationError> {
    if tickets.is_empty() {
        return Err(ValidationError::NoTickets);
    }
    if let Some(ticket) = tickets.iter().find(|ticket| ticket.quantity == 0) {
        return Err(ValidationError::ZeroQuantity {
            ticket_class_id: ticket.ticket_class_id,
        });
    }
    let total = tickets
        .iter()
        .fold(0_u32, |sum, ticket| sum.saturating_add(ticket.quantity));
    if total > MAX_TICKETS_PER_BOOKING {
        return Err(ValidationError::TooManyTickets {
            requested: total,
            max: MAX_TICKETS_PER_BOOKING,
        });
    }
    Ok(total)
}

/// Check the buyer form
///
/// # Errors
///
/// Returns the first failing field.
pub fn validate_buyer(buyer: &BuyerInfo) -> Result<(), ValidationError> {
    if buyer.full_name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    let phone_len = buyer.phone_number.len();
    if !is_digits(&buyer.phone_number) || !(10..=15).contains(&phone_len) {
        return Err(ValidationError::InvalidPhone);
    }
    if !is_email(&buyer.email) {
        return Err(ValidationError::InvalidEmail);
    }
    if !is_ktp(&buyer.ktp_number) {
        return Err(ValidationError::InvalidKtp);
    }
    Ok(())
}

/// Check the ticket holder form
///
/// # Errors
///
/// Returns the first failing field.
pub fn validate_holder(holder: &TicketHolderInfo) -> Result<(), ValidationError> {
    if holder.full_name.trim().is_empty() {
        return Err(ValidationError::MissingHolderName);
    }
    if !is_ktp(&holder.ktp_number) {
        return Err(ValidationError::InvalidHolderKtp);
    }
    Ok(())
}

/// Validate everything and assemble the creation request
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn build_request(
    selection: &PendingSelection,
    buyer: BuyerInfo,
    holder: Option<TicketHolderInfo>,
) -> Result<CreateBookingRequest, ValidationError> {
    validate_tickets(&selection.tickets)?;
    validate_buyer(&buyer)?;
    if let Some(holder) = &holder {
        validate_holder(holder)?;
    }
    Ok(CreateBookingRequest {
        concert_id: selection.concert.id,
        tickets_by_class: selection.tickets.clone(),
        buyer_info: buyer,
        ticket_holder_info: holder,
    })
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_ktp(value: &str) -> bool {
    value.len() == 16 && is_digits(value)
}

// local@domain.tld, no whitespace
fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .rsplit_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}
