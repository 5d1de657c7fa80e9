//! Payment reference helpers.

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

const REFERENCE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const REFERENCE_PREFIX: &str = "MAY";

/// Canonical comparison key: ASCII letters and digits only, upper-cased.
///
/// `"may-1234-5678"` and `"MAY12345678"` share the key `"MAY12345678"`.
pub fn normalize_reference(reference: &str) -> String {
    reference
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// New bank transfer reference of the form `MAY-XXXX-XXXX`.
pub fn generate_reference_code() -> String {
    let mut rng = rand::thread_rng();
    let id: String = (0..8)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", REFERENCE_PREFIX, &id[..4], &id[4..])
}

/// GBP amount with thousands separators and at most two decimals,
/// trailing zeros dropped (`2500` → `£2,500`, `12.5` → `£12.5`).
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let digits = rounded.abs().to_string();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), Some(fraction.to_string())),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match fraction {
        Some(fraction) => format!("{sign}£{grouped}.{fraction}"),
        None => format!("{sign}£{grouped}"),
    }
}
