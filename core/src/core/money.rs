//! Money representation
//!
//! CRITICAL: All stored amounts are i64 minor units (cents for a two-digit
//! currency). Floating point only appears transiently when an amount is
//! derived from a rate, and the result is immediately rounded half-up back
//! to minor units.

use serde::{Deserialize, Serialize};

/// Currency configuration for a loan
///
/// `digits` is the number of decimal digits in the major unit; amounts are
/// stored in minor units so a 2-digit currency stores $10.00 as 1000.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    code: String,
    digits: u32,
}

/// Largest digit count for which 10^digits fits an i64
pub const MAX_CURRENCY_DIGITS: u32 = 18;

impl Currency {
    /// Create a currency; `digits` is capped at [`MAX_CURRENCY_DIGITS`]
    /// so minor-per-major arithmetic can never overflow
    pub fn new(code: impl Into<String>, digits: u32) -> Self {
        Self {
            code: code.into(),
            digits: digits.min(MAX_CURRENCY_DIGITS),
        }
    }

    /// ISO-style currency code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Decimal digits of the major unit
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Minor units per major unit (10^digits)
    pub fn minor_per_major(&self) -> i64 {
        10i64.pow(self.digits)
    }

    /// Render a minor-unit amount in major units, e.g. 123456 -> "1234.56"
    /// for a 2-digit currency
    pub fn format_amount(&self, amount: i64) -> String {
        if self.digits == 0 {
            return amount.to_string();
        }
        let per = self.minor_per_major() as i128;
        let abs = (amount as i128).abs();
        let sign = if amount < 0 { "-" } else { "" };
        format!(
            "{sign}{}.{:0width$}",
            abs / per,
            abs % per,
            width = self.digits as usize
        )
    }
}

/// Round a rate-derived amount half-up to whole minor units
///
/// Used wherever an `i64` amount is produced from a fractional computation
/// (periodic interest, annuity payments). Amounts in this ledger are never
/// negative at the point of rounding.
///
/// # Example
/// ```
/// use loan_ledger_core_rs::core::money::round_half_up;
///
/// assert_eq!(round_half_up(2.4), 2);
/// assert_eq!(round_half_up(2.5), 3);
/// assert_eq!(round_half_up(2.6), 3);
/// ```
pub fn round_half_up(value: f64) -> i64 {
    debug_assert!(value >= 0.0, "amounts are non-negative at rounding");
    (value + 0.5).floor() as i64
}
