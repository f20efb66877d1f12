//! # Card Top-Up
//!
//! Pure validation for the simulated card purchase that credits points.
//! Nothing here talks to a payment network; the checkout engine credits the
//! balance once [`validate_top_up`] accepts the form.
//!
//! ## Form Checks
//! ```text
//! CardTopUpRequest (raw strings from the form)
//!      │
//!      ├── any of name / number / expiry / cvv / points blank?
//!      │       └──► MissingFields { fields: [...] }   (all blanks listed)
//!      │
//!      ├── points not a positive whole number?
//!      │       └──► InvalidAmount { input }
//!      │
//!      └──► ValidatedTopUp { brand, last4, points, cardholder_name }
//! ```
//!
//! The full card number and the CVV never leave this module.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::points::Points;
use crate::types::CardReceipt;

/// Card network, detected from the leading digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Generic,
}

impl CardBrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Generic => "generic",
        }
    }
}

impl std::fmt::Display for CardBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the brand from a card number. Non-digits are ignored.
///
/// | Prefix        | Brand      |
/// |---------------|------------|
/// | `4`           | Visa       |
/// | `51` - `55`   | Mastercard |
/// | `34`, `37`    | Amex       |
/// | `6011`, `65`  | Discover   |
/// | anything else | Generic    |
///
/// ## Example
/// ```rust
/// use loyalty_core::card::{detect_brand, CardBrand};
///
/// assert_eq!(detect_brand("4111 1111 1111 1111"), CardBrand::Visa);
/// assert_eq!(detect_brand("3782-822463-10005"), CardBrand::Amex);
/// assert_eq!(detect_brand("9999"), CardBrand::Generic);
/// ```
pub fn detect_brand(card_number: &str) -> CardBrand {
    let digits = digits_only(card_number);

    if digits.starts_with('4') {
        return CardBrand::Visa;
    }
    if ["51", "52", "53", "54", "55"].iter().any(|p| digits.starts_with(p)) {
        return CardBrand::Mastercard;
    }
    if digits.starts_with("34") || digits.starts_with("37") {
        return CardBrand::Amex;
    }
    if digits.starts_with("6011") || digits.starts_with("65") {
        return CardBrand::Discover;
    }
    CardBrand::Generic
}

/// Last four digits of a card number (fewer if the number is shorter).
pub fn last4(card_number: &str) -> String {
    let digits = digits_only(card_number);
    let skip = digits.len().saturating_sub(4);
    digits[skip..].to_string()
}

fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// The top-up form exactly as the user filled it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CardTopUpRequest {
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
    /// Raw amount text; parsed by [`validate_top_up`].
    pub points: String,
}

/// A top-up form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTopUp {
    pub cardholder_name: String,
    pub brand: CardBrand,
    pub last4: String,
    pub points: Points,
}

impl ValidatedTopUp {
    /// What the purchase record keeps about the card.
    pub fn receipt(&self) -> CardReceipt {
        CardReceipt {
            brand: self.brand,
            last4: self.last4.clone(),
            cardholder_name: self.cardholder_name.clone(),
        }
    }
}

/// Validates a card top-up form.
///
/// ## Rules
/// - Every field must be non-blank; all blank fields are reported together
/// - A card number without a single digit counts as blank
/// - `points` must parse as a whole number greater than zero
///
/// ## Example
/// ```rust
/// use loyalty_core::card::{validate_top_up, CardBrand, CardTopUpRequest};
///
/// let request = CardTopUpRequest {
///     cardholder_name: "Ana Pérez".into(),
///     card_number: "5500 0000 0000 0004".into(),
///     expiry: "12/30".into(),
///     cvv: "123".into(),
///     points: "500".into(),
/// };
/// let top_up = validate_top_up(&request).unwrap();
/// assert_eq!(top_up.brand, CardBrand::Mastercard);
/// assert_eq!(top_up.last4, "0004");
/// assert_eq!(top_up.points.value(), 500);
/// ```
pub fn validate_top_up(request: &CardTopUpRequest) -> CoreResult<ValidatedTopUp> {
    let fields = [
        ("cardholder_name", &request.cardholder_name),
        ("card_number", &request.card_number),
        ("expiry", &request.expiry),
        ("cvv", &request.cvv),
        ("points", &request.points),
    ];

    let missing: Vec<String> = fields
        .iter()
        .filter(|(name, value)| match *name {
            // separators alone are not a card number
            "card_number" => !value.chars().any(|c| c.is_ascii_digit()),
            _ => value.trim().is_empty(),
        })
        .map(|(name, _)| name.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(CoreError::MissingFields { fields: missing });
    }

    let points = parse_amount(&request.points)?;

    Ok(ValidatedTopUp {
        cardholder_name: request.cardholder_name.trim().to_string(),
        brand: detect_brand(&request.card_number),
        last4: last4(&request.card_number),
        points,
    })
}

/// Parses a positive whole number of points.
fn parse_amount(raw: &str) -> CoreResult<Points> {
    let invalid = || CoreError::InvalidAmount {
        input: raw.to_string(),
    };

    let trimmed = raw.trim();
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: i64 = trimmed.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }

    Ok(Points::new(value))
}

// =============================================================================
// Unit Tests
// =============================================================================
