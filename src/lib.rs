//! Split shared expenses to the cent and settle group debts with few payments.
//!
//! Splitsolver gives you two halves - a split calculator, which turns an
//! expense total into what each participant owes, and a debt simplifier,
//! which turns everyone's balance into a short list of payments.
//!
//! # Use
//!
//! Splits are computed from a total, the people taking part, who paid and a
//! [`SplitMethod`]. If Alice pays 10.00 for herself, Bob and Charlie, the odd
//! cent goes to the payer so the splits add up exactly:
//!
//! ```
//! use rust_decimal_macros::dec;
//! use splitsolver::{compute_split, Currency, Participant, SplitMethod};
//!
//! let people = [
//!     Participant::new("alice", "Alice"),
//!     Participant::new("bob", "Bob"),
//!     Participant::new("charlie", "Charlie"),
//! ];
//! let outcome = compute_split(dec!(10.00), Currency::Usd, &people, "alice", SplitMethod::Equal, &[]).unwrap();
//!
//! let amounts: Vec<_> = outcome.splits.iter().map(|s| s.amount).collect();
//! assert_eq!(amounts, [dec!(3.34), dec!(3.33), dec!(3.33)]);
//! assert!(outcome.validity.is_valid());
//! ```
//!
//! Edits are replayed on top of the starting splits. A split that does not
//! add up yet is not an error, it just reports how much is missing:
//!
//! ```
//! use rust_decimal_macros::dec;
//! use splitsolver::{compute_split, Currency, Discrepancy, Participant, SplitEdit, SplitMethod};
//!
//! let people = [Participant::new("alice", "Alice"), Participant::new("bob", "Bob")];
//! let edits = [SplitEdit::Amount { user_id: "bob".into(), amount: dec!(12) }];
//! let outcome = compute_split(dec!(20), Currency::Usd, &people, "alice", SplitMethod::Exact, &edits).unwrap();
//!
//! assert_eq!(outcome.validity.discrepancy(), Some(Discrepancy::Amount(dec!(8))));
//! ```
//!
//! Once splits are recorded, a [`Ledger`] keeps track of who owes whom, and
//! suggests the payments that settle everyone:
//!
//! ```
//! use rust_decimal_macros::dec;
//! use splitsolver::{ExpenseSplit, GroupSettings, Ledger, UserRef};
//!
//! fn owes(id: &str, amount: rust_decimal::Decimal, is_paid: bool) -> ExpenseSplit {
//!     ExpenseSplit {
//!         user_id: id.to_string(),
//!         user_name: id.to_string(),
//!         amount,
//!         percentage: None,
//!         shares: None,
//!         is_paid,
//!     }
//! }
//!
//! let mut ledger = Ledger::new(GroupSettings::default());
//!
//! // Bob paid 20 for Alice's lunch, Charlie paid 20 for Bob's dinner.
//! ledger.add_expense(&UserRef::new("bob", "bob"), dec!(20), &[owes("alice", dec!(20), false), owes("bob", dec!(0), true)]).unwrap();
//! ledger.add_expense(&UserRef::new("charlie", "charlie"), dec!(20), &[owes("bob", dec!(20), false), owes("charlie", dec!(0), true)]).unwrap();
//!
//! let payments = ledger.suggest_settlements().unwrap();
//! assert_eq!(payments.len(), 1);
//! assert_eq!(payments[0].to_string(), "alice owes charlie 20.00 USD");
//! ```
//!
//! [`simplify_debts`] can also be called directly with balances computed
//! elsewhere. Balances that do not sum to zero are refused with
//! [`SettleError::ImbalancedLedger`]. Amounts beyond [`MAX_AMOUNT`] are
//! refused everywhere.

pub mod config;
pub mod error;
pub mod ledger;
pub mod money;
pub mod settle;
pub mod split;

pub use config::GroupSettings;
pub use error::{LedgerError, SettleError, SplitError};
pub use ledger::Ledger;
pub use money::{Currency, MAX_AMOUNT, TOLERANCE};
pub use settle::{simplify_debts, total_to_settle, NetBalance, OwedAmount, SettlementSuggestion, UserRef};
pub use split::{
    compute_split, validate_split, Discrepancy, ExpenseSplit, Participant, SplitEdit, SplitMethod, SplitOutcome,
    SplitState, SplitValidity,
};
