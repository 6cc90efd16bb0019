use rust_decimal::Decimal;
use thiserror::Error;

use crate::split::SplitMethod;

/// Input the split calculator refuses to work with. No splits are produced
/// when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("total amount {0} must be greater than zero")]
    NonPositiveTotal(Decimal),
    #[error("total amount {0} has more than two decimal places")]
    SubCentTotal(Decimal),
    #[error("at least one participant is required")]
    NoParticipants,
    #[error("participant {0} is listed more than once")]
    DuplicateParticipant(String),
    #[error("payer {0} is not one of the participants")]
    PayerNotParticipant(String),
    #[error("{0} is not part of this split")]
    UnknownParticipant(String),
    #[error("amount {0} must not be negative")]
    NegativeAmount(Decimal),
    #[error("percentage {0} must be between 0 and 100")]
    PercentageOutOfRange(Decimal),
    #[error("amount {0} exceeds the largest supported amount")]
    AmountTooLarge(Decimal),
    #[error("{edit} edits do not apply to a {method} split")]
    EditNotApplicable {
        edit: &'static str,
        method: SplitMethod,
    },
}

/// Failures of the debt simplifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    /// Net balances that do not cancel out point at a bug in whatever
    /// aggregated them. Nothing is suggested.
    #[error("net balances sum to {sum}, which exceeds the tolerance of {tolerance}")]
    ImbalancedLedger { sum: Decimal, tolerance: Decimal },
    #[error("settlement amount {0} must be greater than zero")]
    NonPositiveAmount(Decimal),
    #[error("{0} cannot settle with themselves")]
    SelfSettlement(String),
    #[error("amount {0} exceeds the largest supported amount")]
    AmountTooLarge(Decimal),
    /// A user's `owes_to` entries, netted against what others owe them, do
    /// not add up to their net amount.
    #[error("{user_id} has a net amount of {net_amount} but their breakdown adds up to {breakdown}")]
    InconsistentBreakdown {
        user_id: String,
        net_amount: Decimal,
        breakdown: Decimal,
    },
}

/// Rejected ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("splits sum to {split_total} but the expense total is {total}")]
    Unreconciled { total: Decimal, split_total: Decimal },
    #[error("split for {user_id} is {amount}, which is negative")]
    NegativeSplit { user_id: String, amount: Decimal },
    #[error("{0} has more than one split in the same expense")]
    DuplicateSplit(String),
    #[error("amount {0} exceeds the largest supported amount")]
    AmountTooLarge(Decimal),
    #[error(transparent)]
    Settlement(#[from] SettleError),
}
