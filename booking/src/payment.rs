//! Checkout helpers: QR payload, bank transfer details, card brand and
//! currency formatting.

use std::fmt;
use tixwatch_api::{Amount, BookingId};

/// Base URL encoded in e-wallet QR codes
pub const QR_GATEWAY_URL: &str = "http://dummy-payment-gateway.com/pay";

/// Bank accounts shown for manual transfers, `(bank, account number)`
pub const BANK_ACCOUNTS: [(&str, &str); 4] = [
    ("BCA", "123-456-7890"),
    ("BNI", "098-765-4321"),
    ("BRI", "112-233-4455"),
    ("MANDIRI", "554-443-2211"),
];

/// Content of the e-wallet QR code for a booking
#[must_use]
pub fn qr_payload(booking_id: &BookingId, amount: Amount) -> String {
    format!(
        "{QR_GATEWAY_URL}?booking_id={booking_id}&amount={}",
        amount.value()
    )
}

/// Reference the buyer must put on a bank transfer
///
/// The last three characters of the booking id, or the whole id when it
/// is shorter.
#[must_use]
pub fn bank_reference(booking_id: &BookingId) -> String {
    let chars: Vec<char> = booking_id.as_str().chars().collect();
    chars[chars.len().saturating_sub(3)..].iter().collect()
}

/// Card network recognised from the number prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardBrand {
    /// Starts with 4
    Visa,
    /// Starts with 51 through 55
    Mastercard,
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Visa => "Visa",
            Self::Mastercard => "Mastercard",
        })
    }
}

/// Detect the card brand, ignoring spaces and dashes
#[must_use]
pub fn card_brand(card_number: &str) -> Option<CardBrand> {
    let digits: String = card_number.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with('4') {
        return Some(CardBrand::Visa);
    }
    match digits.get(..2) {
        Some("51" | "52" | "53" | "54" | "55") => Some(CardBrand::Mastercard),
        _ => None,
    }
}

/// Group card digits in blocks of four for display
#[must_use]
pub fn group_card_number(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(char::is_ascii_digit).collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format an amount as Indonesian Rupiah, e.g. `Rp 1.500.000,00`
#[must_use]
pub fn format_idr(amount: Amount) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = (amount.value() * 100.0).round() as u64;
    let (whole, fraction) = (cents / 100, cents % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("Rp {grouped},{fraction:02}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_payload() {
        let amount = Amount::new(1_500_000.0).unwrap();
        assert_eq!(
            qr_payload(&BookingId::new("b-42"), amount),
            "http://dummy-payment-gateway.com/pay?booking_id=b-42&amount=1500000"
        );
        assert_eq!(
            qr_payload(&BookingId::new("b-42"), Amount::new(99.5).unwrap()),
            "http://dummy-payment-gateway.com/pay?booking_id=b-42&amount=99.5"
        );
    }

    #[test]
    fn test_bank_reference() {
        assert_eq!(bank_reference(&BookingId::new("6f1c2a9e")), "a9e");
        assert_eq!(bank_reference(&BookingId::new("abc")), "abc");
        assert_eq!(bank_reference(&BookingId::new("7")), "7");
    }

    #[test]
    fn test_card_brand() {
        assert_eq!(card_brand("4111 1111 1111 1111"), Some(CardBrand::Visa));
        assert_eq!(card_brand("5500-0000-0000-0004"), Some(CardBrand::Mastercard));
        assert_eq!(card_brand("5600000000000000"), None);
        assert_eq!(card_brand("3782 822463 10005"), None);
        assert_eq!(card_brand(""), None);
        assert_eq!(CardBrand::Mastercard.to_string(), "Mastercard");
    }

    #[test]
    fn test_group_card_number() {
        assert_eq!(group_card_number("4111111111111111"), "4111 1111 1111 1111");
        assert_eq!(group_card_number("41111"), "4111 1");
    }

    #[test]
    fn test_format_idr() {
        assert_eq!(format_idr(Amount::new(1_500_000.0).unwrap()), "Rp 1.500.000,00");
        assert_eq!(format_idr(Amount::new(750.5).unwrap()), "Rp 750,50");
        assert_eq!(format_idr(Amount::ZERO), "Rp 0,00");
        assert_eq!(format_idr(Amount::new(1234.567).unwrap()), "Rp 1.234,57");
    }
}
