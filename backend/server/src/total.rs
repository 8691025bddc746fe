//! # Totals
//!
//! ```text
//! total = sum(counts[i] * (price[i] + deposit[i])) - sum(amount * returned)
//! ```
//!
//! The total is not floored. Returning more deposit than was tallied shows a negative
//! total, which is the amount the kiosk float owes back.
//!
//! All arithmetic is exact `Decimal`. Rounding happens once, at the end, to 2 places with
//! half away from zero (`1.005` becomes `1.01`, `-1.005` becomes `-1.01`).
//!
//! Every step is checked. A total that does not fit in a `Decimal` comes back as `None`
//! and the card shows an overflow notice instead of a number.
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    catalog::{Drink, PriceCatalog},
    session::SessionState,
};

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn times(amount: Decimal, count: u32) -> Option<Decimal> {
    amount.checked_mul(Decimal::from(count))
}

/// Unrounded total. Counts past the end of the catalog are ignored, missing ones count as zero.
pub fn raw_total(catalog: &PriceCatalog, state: &SessionState) -> Option<Decimal> {
    let consumed = catalog
        .drinks()
        .iter()
        .zip(&state.counts)
        .try_fold(Decimal::ZERO, |sum, (drink, &count)| {
            sum.checked_add(times(drink.unit_price()?, count)?)
        })?;

    let returned = state
        .deposit_returns
        .iter()
        .try_fold(Decimal::ZERO, |sum, (&amount, &count)| {
            sum.checked_add(times(amount, count)?)
        })?;

    consumed.checked_sub(returned)
}

pub fn compute_total(catalog: &PriceCatalog, state: &SessionState) -> Option<Decimal> {
    raw_total(catalog, state).map(round_money)
}

pub fn line_total(drink: &Drink, count: u32) -> Option<Decimal> {
    times(drink.unit_price()?, count).map(round_money)
}

pub fn deposit_return_total(amount: Decimal, count: u32) -> Option<Decimal> {
    times(amount, count).map(round_money)
}
