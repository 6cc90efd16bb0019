//! Currency handling shared by the split calculator and the debt simplifier.
//!
//! Amounts are `Decimal` values held at two decimal places. Anything that has
//! to add up exactly is done in integer cents and converted back at the end.

use std::cmp::Reverse;
use std::fmt;

use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Number of decimal places every amount is kept at.
pub const SCALE: u32 = 2;

/// Largest discrepancy still accepted as rounding noise. A difference is
/// reconciled only when it is strictly smaller than this.
pub const TOLERANCE: Decimal = dec!(0.01);

/// Largest amount, in either direction, accepted anywhere in the crate.
///
/// Keeps every intermediate product in range: a capped total in cents times
/// a `u32` share count still fits an `i128`, and percentages of capped
/// amounts stay well inside `Decimal`.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// Currencies a group can keep its books in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Inr,
    Cad,
    Aud,
    Jpy,
    Cny,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Inr => "INR",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Rounds to two decimal places, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `discrepancy` is small enough to be rounding noise.
pub fn is_reconciled(discrepancy: Decimal) -> bool {
    discrepancy.abs() < TOLERANCE
}

/// True when `value` is no further from zero than [`MAX_AMOUNT`].
pub fn within_limit(value: Decimal) -> bool {
    value.abs() <= MAX_AMOUNT
}

/// True when the value carries nothing below a cent.
pub fn is_whole_cents(value: Decimal) -> bool {
    value == round_money(value)
}

/// Converts an amount to integer cents, rounding anything below a cent.
pub fn to_cents(value: Decimal) -> i128 {
    let mut rounded = round_money(value);
    rounded.rescale(SCALE);
    rounded.mantissa()
}

pub fn from_cents(cents: i128) -> Decimal {
    Decimal::from_i128_with_scale(cents, SCALE)
}

/// Splits `total` cents over `weights` by largest remainder.
///
/// Everyone gets the floor of their exact share. The cents left over go one
/// each to the largest fractional remainders, ties resolved by `first` and
/// then by position. The result always sums to `total` and no entry is more
/// than one cent away from its exact share.
///
/// Returns all zeros when the weights sum to zero. Callers keep `total`
/// within [`MAX_AMOUNT`] and each weight within `u32`.
pub fn apportion(total: i128, weights: &[i128], first: Option<usize>) -> Vec<i128> {
    let weight_sum: i128 = weights.iter().sum();
    if weight_sum <= 0 {
        return vec![0; weights.len()];
    }

    let (mut cents, remainders): (Vec<i128>, Vec<i128>) = weights
        .iter()
        .map(|&w| ((total * w).div_euclid(weight_sum), (total * w).rem_euclid(weight_sum)))
        .unzip();

    let leftover = total - cents.iter().sum::<i128>();
    let leftover = usize::try_from(leftover).unwrap_or(0);

    let order = (0..weights.len())
        .sorted_by_key(|&i| (Reverse(remainders[i]), Some(i) != first, i))
        .take(leftover);
    for i in order {
        cents[i] += 1;
    }
    cents
}
