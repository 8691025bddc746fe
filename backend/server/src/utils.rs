use rust_decimal::Decimal;

use crate::total::round_money;

/// Adds a signed delta to a tally, clamping at zero and at `u32::MAX`.
pub fn apply_delta(current: u32, delta: i64) -> u32 {
    let updated = i64::from(current).saturating_add(delta);

    u32::try_from(updated.max(0)).unwrap_or(u32::MAX)
}

pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}
