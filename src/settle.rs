//! Suggests the payments that settle a group.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use itertools::{Either, Itertools};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::SettleError;
use crate::money::{from_cents, is_reconciled, round_money, to_cents, within_limit, Currency, TOLERANCE};

/// Identifies a user on either end of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: String,
    pub user_name: String,
}

impl UserRef {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        UserRef {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Part of a user's balance that is owed to one other user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwedAmount {
    pub user_id: String,
    pub user_name: String,
    pub amount: Decimal,
}

/// Where a user stands within a group. Positive means the user is owed
/// money, negative means the user owes money.
///
/// `owes_to` breaks the position down per creditor. It is only needed when
/// debts are settled directly instead of simplified, and when given it has to
/// agree with `net_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetBalance {
    pub user_id: String,
    pub user_name: String,
    pub net_amount: Decimal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owes_to: Vec<OwedAmount>,
}

impl NetBalance {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>, net_amount: Decimal) -> Self {
        NetBalance {
            user_id: user_id.into(),
            user_name: user_name.into(),
            net_amount,
            owes_to: Vec::new(),
        }
    }

    /// Records that this user owes `amount` to another user.
    #[must_use]
    pub fn owing(mut self, user_id: impl Into<String>, user_name: impl Into<String>, amount: Decimal) -> Self {
        self.owes_to.push(OwedAmount {
            user_id: user_id.into(),
            user_name: user_name.into(),
            amount,
        });
        self
    }

    fn user(&self) -> UserRef {
        UserRef::new(self.user_id.as_str(), self.user_name.as_str())
    }
}

/// A payment that, once made, moves the group towards being settled up.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSuggestion {
    from: UserRef,
    to: UserRef,
    amount: Decimal,
    currency: Currency,
}

impl SettlementSuggestion {
    /// # Errors
    ///
    /// Fails when the amount is not positive or both ends are the same user.
    pub fn new(from: UserRef, to: UserRef, amount: Decimal, currency: Currency) -> Result<Self, SettleError> {
        if amount <= Decimal::ZERO {
            return Err(SettleError::NonPositiveAmount(amount));
        }
        if from.user_id == to.user_id {
            return Err(SettleError::SelfSettlement(from.user_id));
        }
        Ok(SettlementSuggestion {
            from,
            to,
            amount,
            currency,
        })
    }

    pub fn from(&self) -> &UserRef {
        &self.from
    }

    pub fn to(&self) -> &UserRef {
        &self.to
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for SettlementSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} owes {} {} {}",
            self.from.user_name, self.to.user_name, self.amount, self.currency
        )
    }
}

/// Sum of every suggested payment.
pub fn total_to_settle(suggestions: &[SettlementSuggestion]) -> Decimal {
    suggestions.iter().map(SettlementSuggestion::amount).sum()
}

/// Suggests payments that bring every balance to zero.
///
/// With `simplify` set, debts are netted across the whole group and paid
/// largest creditor to largest debtor, which keeps the number of payments
/// low. Without it, every pair of users settles only what they owe each
/// other, taken from the `owes_to` breakdowns. When no balance carries a
/// breakdown there are no pairs to go by, and the net amounts are settled as
/// if `simplify` were set.
///
/// # Errors
///
/// Returns [`SettleError::ImbalancedLedger`] when the net amounts do not
/// cancel out within the tolerance, [`SettleError::InconsistentBreakdown`]
/// when a breakdown disagrees with its net amount, and
/// [`SettleError::AmountTooLarge`] for amounts beyond
/// [`MAX_AMOUNT`](crate::money::MAX_AMOUNT).
pub fn simplify_debts(
    balances: &[NetBalance],
    currency: Currency,
    simplify: bool,
) -> Result<Vec<SettlementSuggestion>, SettleError> {
    if let Some(balance) = balances.iter().find(|b| !within_limit(b.net_amount)) {
        return Err(SettleError::AmountTooLarge(balance.net_amount));
    }
    let sum: Decimal = balances.iter().map(|b| b.net_amount).sum();
    if sum.abs() > TOLERANCE {
        warn!(%sum, tolerance = %TOLERANCE, users = balances.len(), "net balances do not cancel out");
        return Err(SettleError::ImbalancedLedger {
            sum,
            tolerance: TOLERANCE,
        });
    }

    let suggestions = if simplify {
        settle_largest_first(balances, currency)?
    } else if balances.iter().all(|b| b.owes_to.is_empty()) {
        debug!(users = balances.len(), "no pairwise breakdown, settling net amounts");
        settle_largest_first(balances, currency)?
    } else {
        settle_directly(balances, currency)?
    };
    debug!(
        simplify,
        %currency,
        suggestions = suggestions.len(),
        total = %total_to_settle(&suggestions),
        "suggested settlements"
    );
    Ok(suggestions)
}

// Heap entry: the largest balance comes out first, ties go to the lowest id.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Party {
    cents: i128,
    user: Reverse<UserRef>,
}

// Rounds every balance to whole cents, up or down, so that the rounded
// balances add up to the rounded sum. Leftover cents go to the largest
// fractions, ties to the lowest id.
fn balance_cents(balances: &[NetBalance]) -> Vec<i128> {
    let (mut cents, fractions): (Vec<i128>, Vec<Decimal>) = balances
        .iter()
        .map(|b| {
            let scaled = b.net_amount * Decimal::ONE_HUNDRED;
            let mut floor = scaled.floor();
            let fraction = scaled - floor;
            floor.rescale(0);
            (floor.mantissa(), fraction)
        })
        .unzip();

    let sum: Decimal = balances.iter().map(|b| b.net_amount).sum();
    let leftover = to_cents(sum) - cents.iter().sum::<i128>();
    let leftover = usize::try_from(leftover).unwrap_or(0);
    let order = (0..balances.len())
        .sorted_by(|&i, &j| {
            fractions[j]
                .cmp(&fractions[i])
                .then_with(|| balances[i].user_id.cmp(&balances[j].user_id))
        })
        .take(leftover);
    for i in order {
        cents[i] += 1;
    }
    cents
}

fn settle_largest_first(
    balances: &[NetBalance],
    currency: Currency,
) -> Result<Vec<SettlementSuggestion>, SettleError> {
    let (mut creditors, mut debtors): (BinaryHeap<Party>, BinaryHeap<Party>) = balances
        .iter()
        .zip(balance_cents(balances))
        .filter(|(_, cents)| *cents != 0)
        .partition_map(|(b, cents)| {
            let party = Party {
                cents: cents.abs(),
                user: Reverse(b.user()),
            };
            if cents > 0 {
                Either::Left(party)
            } else {
                Either::Right(party)
            }
        });

    let mut suggestions = Vec::new();
    loop {
        let Some(mut creditor) = creditors.pop() else {
            break;
        };
        let Some(mut debtor) = debtors.pop() else {
            creditors.push(creditor);
            break;
        };

        let cents = creditor.cents.min(debtor.cents);
        trace!(
            from = %debtor.user.0.user_id,
            to = %creditor.user.0.user_id,
            amount = %from_cents(cents),
            "matched debtor with creditor"
        );
        suggestions.push(SettlementSuggestion::new(
            debtor.user.0.clone(),
            creditor.user.0.clone(),
            from_cents(cents),
            currency,
        )?);

        creditor.cents -= cents;
        debtor.cents -= cents;
        if creditor.cents > 0 {
            creditors.push(creditor);
        }
        if debtor.cents > 0 {
            debtors.push(debtor);
        }
    }

    if !creditors.is_empty() || !debtors.is_empty() {
        debug!(
            creditors = creditors.len(),
            debtors = debtors.len(),
            "left rounding residue unsettled"
        );
    }
    Ok(suggestions)
}

fn settle_directly(
    balances: &[NetBalance],
    currency: Currency,
) -> Result<Vec<SettlementSuggestion>, SettleError> {
    let mut names: BTreeMap<&str, &str> = BTreeMap::new();
    // Keyed by (lower id, higher id); positive flows run from lower to higher.
    let mut flows: BTreeMap<(&str, &str), Decimal> = BTreeMap::new();
    let mut stated: BTreeMap<&str, Decimal> = BTreeMap::new();
    let mut implied: BTreeMap<&str, Decimal> = BTreeMap::new();

    for balance in balances {
        names.entry(balance.user_id.as_str()).or_insert(balance.user_name.as_str());
        *stated.entry(balance.user_id.as_str()).or_default() += balance.net_amount;
        for owed in &balance.owes_to {
            if !within_limit(owed.amount) {
                return Err(SettleError::AmountTooLarge(owed.amount));
            }
            names.entry(owed.user_id.as_str()).or_insert(owed.user_name.as_str());
            let debtor = balance.user_id.as_str();
            let creditor = owed.user_id.as_str();
            *implied.entry(debtor).or_default() -= owed.amount;
            *implied.entry(creditor).or_default() += owed.amount;
            if debtor < creditor {
                *flows.entry((debtor, creditor)).or_default() += owed.amount;
            } else if creditor < debtor {
                *flows.entry((creditor, debtor)).or_default() -= owed.amount;
            }
        }
    }

    for &user_id in names.keys() {
        let net_amount = stated.get(user_id).copied().unwrap_or_default();
        let breakdown = implied.get(user_id).copied().unwrap_or_default();
        if !is_reconciled(net_amount - breakdown) {
            warn!(%user_id, %net_amount, %breakdown, "breakdown does not match net amount");
            return Err(SettleError::InconsistentBreakdown {
                user_id: user_id.to_string(),
                net_amount,
                breakdown,
            });
        }
    }

    let user = |id: &str| UserRef::new(id, names.get(id).copied().unwrap_or_default());
    let mut suggestions = flows
        .into_iter()
        .filter(|(_, flow)| flow.abs() >= TOLERANCE)
        .map(|((low, high), flow)| {
            let (from, to) = if flow > Decimal::ZERO { (low, high) } else { (high, low) };
            SettlementSuggestion::new(user(from), user(to), round_money(flow.abs()), currency)
        })
        .collect::<Result<Vec<_>, _>>()?;
    suggestions.sort_by(|a, b| {
        a.from
            .user_id
            .cmp(&b.from.user_id)
            .then_with(|| a.to.user_id.cmp(&b.to.user_id))
    });
    Ok(suggestions)
}
