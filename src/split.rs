//! Turns an expense total into per-person splits.
//!
//! A [`SplitState`] is an immutable snapshot of one expense being split.
//! Every edit the user makes goes through [`SplitState::apply`], which hands
//! back the next snapshot, so the amounts shown are always recomputed from
//! scratch for the chosen [`SplitMethod`].

use std::collections::HashSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::SplitError;
use crate::money::{
    apportion, from_cents, is_reconciled, is_whole_cents, round_money, to_cents, within_limit, Currency,
};

/// A member who takes part in an expense.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Participant {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// How the total is divided between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    /// Everyone pays the same.
    #[default]
    Equal,
    /// Amounts are typed in by hand.
    Exact,
    /// Each participant pays a percentage of the total.
    Percentage,
    /// The total is divided in proportion to integer shares.
    Shares,
}

impl SplitMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Exact => "exact",
            SplitMethod::Percentage => "percentage",
            SplitMethod::Shares => "shares",
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant's part of an expense, as it is stored with the expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSplit {
    pub user_id: String,
    pub user_name: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u32>,
    /// Set for the payer of the expense; everyone else starts unpaid.
    pub is_paid: bool,
}

impl ExpenseSplit {
    fn blank(participant: &Participant, is_paid: bool) -> Self {
        ExpenseSplit {
            user_id: participant.user_id.clone(),
            user_name: participant.user_name.clone(),
            amount: Decimal::ZERO,
            percentage: None,
            shares: None,
            is_paid,
        }
    }
}

/// A single user interaction with the split form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SplitEdit {
    /// Set one participant's amount. Exact splits only.
    Amount { user_id: String, amount: Decimal },
    /// Set one participant's percentage. Percentage splits only.
    Percentage { user_id: String, percentage: Decimal },
    /// Set one participant's shares. Share splits only.
    Shares { user_id: String, shares: u32 },
    /// Switch to another method, discarding edits.
    Method { method: SplitMethod },
    /// Change the expense total, discarding edits.
    Total { total: Decimal },
    /// Replace the participant set, discarding edits.
    Participants { participants: Vec<Participant> },
}

impl SplitEdit {
    fn kind(&self) -> &'static str {
        match self {
            SplitEdit::Amount { .. } => "amount",
            SplitEdit::Percentage { .. } => "percentage",
            SplitEdit::Shares { .. } => "shares",
            SplitEdit::Method { .. } => "method",
            SplitEdit::Total { .. } => "total",
            SplitEdit::Participants { .. } => "participants",
        }
    }
}

/// How far a split set is from adding up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "missing", rename_all = "camelCase")]
pub enum Discrepancy {
    /// `total - sum(amounts)`.
    Amount(Decimal),
    /// `100 - sum(percentages)`.
    Percentage(Decimal),
}

/// Outcome of checking a split set against its total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitValidity {
    Valid,
    /// The set must not be submitted until the discrepancy is fixed.
    Unreconciled(Discrepancy),
}

impl SplitValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, SplitValidity::Valid)
    }

    pub fn discrepancy(&self) -> Option<Discrepancy> {
        match self {
            SplitValidity::Valid => None,
            SplitValidity::Unreconciled(discrepancy) => Some(*discrepancy),
        }
    }
}

/// Checks that `splits` add up to `total`.
///
/// Percentage splits must first have percentages summing to 100; the amount
/// check applies to every method. Both use the shared 0.01 tolerance,
/// exclusive, so 99.99% is as unreconciled as 100.01%.
///
/// Sums saturate instead of overflowing, so absurd inputs come back
/// unreconciled rather than panicking.
pub fn validate_split(splits: &[ExpenseSplit], total: Decimal, method: SplitMethod) -> SplitValidity {
    if method == SplitMethod::Percentage {
        let percent = splits
            .iter()
            .filter_map(|s| s.percentage)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        let missing = Decimal::ONE_HUNDRED.saturating_sub(percent);
        if !is_reconciled(missing) {
            return SplitValidity::Unreconciled(Discrepancy::Percentage(missing));
        }
    }
    let split_total = splits.iter().map(|s| s.amount).fold(Decimal::ZERO, Decimal::saturating_add);
    let missing = total.saturating_sub(split_total);
    if is_reconciled(missing) {
        SplitValidity::Valid
    } else {
        SplitValidity::Unreconciled(Discrepancy::Amount(missing))
    }
}

/// Splits and their validity after all edits were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub splits: Vec<ExpenseSplit>,
    pub validity: SplitValidity,
}

/// Computes the splits for an expense and replays `edits` on top of them.
///
/// # Errors
///
/// Returns a [`SplitError`] for a non-positive or oversized total, an empty
/// or duplicated participant list, a payer who is not participating, or an edit that does
/// not fit the state it is applied to.
pub fn compute_split(
    total: Decimal,
    currency: Currency,
    participants: &[Participant],
    payer_user_id: &str,
    method: SplitMethod,
    edits: &[SplitEdit],
) -> Result<SplitOutcome, SplitError> {
    let initial = SplitState::new(total, currency, participants.to_vec(), payer_user_id, method)?;
    let state = edits.iter().try_fold(initial, |state, edit| state.apply(edit))?;
    Ok(state.outcome())
}

/// Snapshot of one expense being split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitState {
    total: Decimal,
    currency: Currency,
    method: SplitMethod,
    participants: Vec<Participant>,
    payer: usize,
    splits: Vec<ExpenseSplit>,
}

impl SplitState {
    /// Starts a split with the defaults of `method`.
    ///
    /// # Errors
    ///
    /// Returns a [`SplitError`] when the total or participant list is unusable.
    pub fn new(
        total: Decimal,
        currency: Currency,
        participants: Vec<Participant>,
        payer_user_id: &str,
        method: SplitMethod,
    ) -> Result<Self, SplitError> {
        check_total(total)?;
        let payer = payer_position(&participants, payer_user_id)?;

        let mut state = SplitState {
            total,
            currency,
            method,
            splits: participants
                .iter()
                .enumerate()
                .map(|(i, p)| ExpenseSplit::blank(p, i == payer))
                .collect(),
            participants,
            payer,
        };
        match method {
            SplitMethod::Equal => state.fill_equal(),
            SplitMethod::Exact => state.fill_exact_percentages(),
            SplitMethod::Percentage => {
                for split in &mut state.splits {
                    split.percentage = Some(Decimal::ZERO);
                }
                state.fill_from_percentages();
            }
            SplitMethod::Shares => {
                for split in &mut state.splits {
                    split.shares = Some(1);
                }
                state.fill_from_shares();
            }
        }
        debug!(
            %method,
            %total,
            currency = %state.currency,
            participants = state.splits.len(),
            "calculated splits"
        );
        Ok(state)
    }

    /// Reopens a split that was saved earlier, keeping its amounts,
    /// percentages and shares as they were stored.
    ///
    /// The participants are taken from `splits` in order. Later edits
    /// recompute the splits the same way they would for a fresh state.
    ///
    /// # Errors
    ///
    /// Returns a [`SplitError`] for the same totals and participant lists
    /// [`SplitState::new`] refuses, and for a stored amount or percentage that
    /// an edit could not have produced.
    pub fn from_splits(
        total: Decimal,
        currency: Currency,
        splits: Vec<ExpenseSplit>,
        payer_user_id: &str,
        method: SplitMethod,
    ) -> Result<Self, SplitError> {
        check_total(total)?;
        let participants: Vec<Participant> = splits
            .iter()
            .map(|s| Participant::new(s.user_id.as_str(), s.user_name.as_str()))
            .collect();
        let payer = payer_position(&participants, payer_user_id)?;
        for split in &splits {
            check_amount(split.amount)?;
            if let Some(percentage) = split.percentage {
                check_percentage(percentage)?;
            }
        }

        let state = SplitState {
            total,
            currency,
            method,
            participants,
            payer,
            splits,
        };
        debug!(
            %method,
            %total,
            currency = %state.currency,
            participants = state.splits.len(),
            "reopened saved splits"
        );
        Ok(state)
    }

    /// Applies one edit and returns the resulting state. `self` is untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`SplitError`] when the edit names an unknown participant,
    /// carries an out of range value, or does not fit the current method.
    pub fn apply(&self, edit: &SplitEdit) -> Result<Self, SplitError> {
        trace!(edit = edit.kind(), method = %self.method, "applying split edit");
        match edit {
            SplitEdit::Method { method } => self.rebuild(self.total, self.participants.clone(), *method),
            SplitEdit::Total { total } => self.rebuild(*total, self.participants.clone(), self.method),
            SplitEdit::Participants { participants } => {
                self.rebuild(self.total, participants.clone(), self.method)
            }
            SplitEdit::Amount { user_id, amount } => {
                self.expect_method(SplitMethod::Exact, edit)?;
                check_amount(*amount)?;
                let index = self.index_of(user_id)?;
                let mut next = self.clone();
                next.splits[index].amount = round_money(*amount);
                next.fill_exact_percentages();
                Ok(next)
            }
            SplitEdit::Percentage { user_id, percentage } => {
                self.expect_method(SplitMethod::Percentage, edit)?;
                check_percentage(*percentage)?;
                let index = self.index_of(user_id)?;
                let mut next = self.clone();
                next.splits[index].percentage = Some(round_money(*percentage));
                next.fill_from_percentages();
                Ok(next)
            }
            SplitEdit::Shares { user_id, shares } => {
                self.expect_method(SplitMethod::Shares, edit)?;
                let index = self.index_of(user_id)?;
                let mut next = self.clone();
                next.splits[index].shares = Some(*shares);
                next.fill_from_shares();
                Ok(next)
            }
        }
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn method(&self) -> SplitMethod {
        self.method
    }

    pub fn payer_user_id(&self) -> &str {
        &self.participants[self.payer].user_id
    }

    pub fn splits(&self) -> &[ExpenseSplit] {
        &self.splits
    }

    pub fn validity(&self) -> SplitValidity {
        validate_split(&self.splits, self.total, self.method)
    }

    pub fn outcome(self) -> SplitOutcome {
        let validity = self.validity();
        SplitOutcome {
            splits: self.splits,
            validity,
        }
    }

    fn rebuild(
        &self,
        total: Decimal,
        participants: Vec<Participant>,
        method: SplitMethod,
    ) -> Result<Self, SplitError> {
        let payer = self.payer_user_id().to_string();
        SplitState::new(total, self.currency, participants, &payer, method)
    }

    fn expect_method(&self, method: SplitMethod, edit: &SplitEdit) -> Result<(), SplitError> {
        if self.method == method {
            Ok(())
        } else {
            Err(SplitError::EditNotApplicable {
                edit: edit.kind(),
                method: self.method,
            })
        }
    }

    fn index_of(&self, user_id: &str) -> Result<usize, SplitError> {
        self.splits
            .iter()
            .position(|s| s.user_id == user_id)
            .ok_or_else(|| SplitError::UnknownParticipant(user_id.to_string()))
    }

    fn fill_equal(&mut self) {
        let count = Decimal::from(self.splits.len());
        let percentage = round_money(Decimal::ONE_HUNDRED / count);
        let weights = vec![1; self.splits.len()];
        let cents = apportion(to_cents(self.total), &weights, Some(self.payer));
        for (split, cents) in self.splits.iter_mut().zip(cents) {
            split.amount = from_cents(cents);
            split.percentage = Some(percentage);
            split.shares = Some(1);
        }
    }

    fn fill_exact_percentages(&mut self) {
        for split in &mut self.splits {
            split.percentage = Some(round_money(split.amount / self.total * Decimal::ONE_HUNDRED));
        }
    }

    // Once the percentages reach exactly 100 the amounts are apportioned so
    // they land on the total; before that each one is rounded on its own.
    fn fill_from_percentages(&mut self) {
        let basis_points: Vec<i128> = self
            .splits
            .iter()
            .map(|s| to_cents(s.percentage.unwrap_or_default()))
            .collect();
        if basis_points.iter().sum::<i128>() == 10_000 {
            let cents = apportion(to_cents(self.total), &basis_points, Some(self.payer));
            for (split, cents) in self.splits.iter_mut().zip(cents) {
                split.amount = from_cents(cents);
            }
        } else {
            for split in &mut self.splits {
                let percentage = split.percentage.unwrap_or_default();
                split.amount = round_money(self.total * percentage / Decimal::ONE_HUNDRED);
            }
        }
    }

    fn fill_from_shares(&mut self) {
        let shares: Vec<i128> = self
            .splits
            .iter()
            .map(|s| i128::from(s.shares.unwrap_or_default()))
            .collect();
        let total_shares: i128 = shares.iter().sum();
        let cents = apportion(to_cents(self.total), &shares, Some(self.payer));
        for ((split, cents), share) in self.splits.iter_mut().zip(cents).zip(shares) {
            split.amount = from_cents(cents);
            split.percentage = Some(if total_shares == 0 {
                Decimal::ZERO
            } else {
                round_money(Decimal::from(share) * Decimal::ONE_HUNDRED / Decimal::from(total_shares))
            });
        }
    }
}

fn check_total(total: Decimal) -> Result<(), SplitError> {
    if total <= Decimal::ZERO {
        return Err(SplitError::NonPositiveTotal(total));
    }
    if !within_limit(total) {
        return Err(SplitError::AmountTooLarge(total));
    }
    if !is_whole_cents(total) {
        return Err(SplitError::SubCentTotal(total));
    }
    Ok(())
}

// Index of the payer in a non-empty list of distinct participants.
fn payer_position(participants: &[Participant], payer_user_id: &str) -> Result<usize, SplitError> {
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    let mut seen = HashSet::with_capacity(participants.len());
    if let Some(dup) = participants.iter().find(|p| !seen.insert(p.user_id.as_str())) {
        return Err(SplitError::DuplicateParticipant(dup.user_id.clone()));
    }
    participants
        .iter()
        .position(|p| p.user_id == payer_user_id)
        .ok_or_else(|| SplitError::PayerNotParticipant(payer_user_id.to_string()))
}

fn check_amount(amount: Decimal) -> Result<(), SplitError> {
    if amount < Decimal::ZERO {
        Err(SplitError::NegativeAmount(amount))
    } else if !within_limit(amount) {
        Err(SplitError::AmountTooLarge(amount))
    } else {
        Ok(())
    }
}

fn check_percentage(percentage: Decimal) -> Result<(), SplitError> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        Err(SplitError::PercentageOutOfRange(percentage))
    } else {
        Ok(())
    }
}
