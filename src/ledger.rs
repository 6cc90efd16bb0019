use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::GroupSettings;
use crate::error::{LedgerError, SettleError};
use crate::money::{is_reconciled, within_limit};
use crate::settle::{simplify_debts, NetBalance, OwedAmount, SettlementSuggestion, UserRef};
use crate::split::ExpenseSplit;

/// Zero-sum record of who owes whom within one group.
///
/// Expenses add debts from each participant to whoever paid, settlements
/// pay them down. The balances of all users always add up to zero, since
/// every debt has a matching credit.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    settings: GroupSettings,
    names: BTreeMap<String, String>,
    // (lower id, higher id) -> what the lower id owes the higher one.
    // Negative when the debt runs the other way.
    debts: BTreeMap<(String, String), Decimal>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new(settings: GroupSettings) -> Ledger {
        Ledger {
            settings,
            ..Ledger::default()
        }
    }

    pub fn settings(&self) -> GroupSettings {
        self.settings
    }

    /// Records an expense paid by `paid_by` and split as `splits`.
    ///
    /// Splits already marked paid, and the payer's own split, add no debt.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unreconciled`] when the splits do not add up
    /// to `total`, and refuses negative splits, a user split twice, or
    /// amounts beyond [`MAX_AMOUNT`](crate::money::MAX_AMOUNT). Nothing is
    /// recorded on error.
    pub fn add_expense(
        &mut self,
        paid_by: &UserRef,
        total: Decimal,
        splits: &[ExpenseSplit],
    ) -> Result<(), LedgerError> {
        if !within_limit(total) {
            return Err(LedgerError::AmountTooLarge(total));
        }
        let mut seen = HashSet::with_capacity(splits.len());
        for split in splits {
            if split.amount < Decimal::ZERO {
                return Err(LedgerError::NegativeSplit {
                    user_id: split.user_id.clone(),
                    amount: split.amount,
                });
            }
            if !within_limit(split.amount) {
                return Err(LedgerError::AmountTooLarge(split.amount));
            }
            if !seen.insert(split.user_id.as_str()) {
                return Err(LedgerError::DuplicateSplit(split.user_id.clone()));
            }
        }
        let split_total: Decimal = splits.iter().map(|s| s.amount).sum();
        if !is_reconciled(total - split_total) {
            return Err(LedgerError::Unreconciled { total, split_total });
        }

        self.learn(&paid_by.user_id, &paid_by.user_name);
        for split in splits {
            self.learn(&split.user_id, &split.user_name);
            if split.user_id != paid_by.user_id && !split.is_paid && split.amount > Decimal::ZERO {
                self.record(&split.user_id, &paid_by.user_id, split.amount);
            }
        }
        debug!(payer = %paid_by.user_id, %total, splits = splits.len(), "recorded expense");
        Ok(())
    }

    /// Records a confirmed payment from `payer` to `recipient`.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive amount or a payment to oneself.
    pub fn add_settlement(
        &mut self,
        payer: &UserRef,
        recipient: &UserRef,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(SettleError::NonPositiveAmount(amount).into());
        }
        if payer.user_id == recipient.user_id {
            return Err(SettleError::SelfSettlement(payer.user_id.clone()).into());
        }
        if !within_limit(amount) {
            return Err(LedgerError::AmountTooLarge(amount));
        }
        self.learn(&payer.user_id, &payer.user_name);
        self.learn(&recipient.user_id, &recipient.user_name);
        self.record(&recipient.user_id, &payer.user_id, amount);
        debug!(payer = %payer.user_id, recipient = %recipient.user_id, %amount, "recorded settlement");
        Ok(())
    }

    /// Records that a suggested payment was made.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::add_settlement`].
    pub fn confirm(&mut self, suggestion: &SettlementSuggestion) -> Result<(), LedgerError> {
        self.add_settlement(suggestion.from(), suggestion.to(), suggestion.amount())
    }

    /// Every known user's balance, ordered by user id, with what they owe
    /// each other user broken out.
    pub fn net_balances(&self) -> Vec<NetBalance> {
        let mut balances: BTreeMap<&str, NetBalance> = self
            .names
            .iter()
            .map(|(id, name)| (id.as_str(), NetBalance::new(id.as_str(), name.as_str(), Decimal::ZERO)))
            .collect();

        for ((low, high), &amount) in &self.debts {
            if amount.is_zero() {
                continue;
            }
            let (debtor, creditor) = if amount > Decimal::ZERO { (low, high) } else { (high, low) };
            let owed = amount.abs();
            if let Some(balance) = balances.get_mut(creditor.as_str()) {
                balance.net_amount += owed;
            }
            if let Some(balance) = balances.get_mut(debtor.as_str()) {
                balance.net_amount -= owed;
                balance.owes_to.push(OwedAmount {
                    user_id: creditor.clone(),
                    user_name: self.names.get(creditor).cloned().unwrap_or_default(),
                    amount: owed,
                });
            }
        }
        balances.into_values().collect()
    }

    /// Payments that would settle the group, simplified or not as the
    /// group settings say.
    ///
    /// # Errors
    ///
    /// Propagates [`SettleError`] from the simplifier.
    pub fn suggest_settlements(&self) -> Result<Vec<SettlementSuggestion>, SettleError> {
        simplify_debts(
            &self.net_balances(),
            self.settings.currency,
            self.settings.simplify_debts,
        )
    }

    /// True once every user's balance is back to zero. Pairwise debts may
    /// still cancel out around a cycle.
    pub fn is_settled(&self) -> bool {
        self.net_balances()
            .iter()
            .all(|balance| is_reconciled(balance.net_amount))
    }

    fn learn(&mut self, user_id: &str, user_name: &str) {
        self.names
            .entry(user_id.to_string())
            .or_insert_with(|| user_name.to_string());
    }

    fn record(&mut self, debtor: &str, creditor: &str, amount: Decimal) {
        if debtor < creditor {
            *self
                .debts
                .entry((debtor.to_string(), creditor.to_string()))
                .or_default() += amount;
        } else {
            *self
                .debts
                .entry((creditor.to_string(), debtor.to_string()))
                .or_default() -= amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::money::MAX_AMOUNT;
    use crate::split::{compute_split, Participant, SplitMethod};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn user(id: &str) -> UserRef {
        UserRef::new(id, id.to_uppercase())
    }

    fn split(id: &str, amount: Decimal, is_paid: bool) -> ExpenseSplit {
        ExpenseSplit {
            user_id: id.to_string(),
            user_name: id.to_uppercase(),
            amount,
            percentage: None,
            shares: None,
            is_paid,
        }
    }

    // `payer` covered `amount` on behalf of `debtor` alone.
    fn covered(ledger: &mut Ledger, payer: &str, debtor: &str, amount: Decimal) {
        ledger
            .add_expense(
                &user(payer),
                amount,
                &[split(debtor, amount, false), split(payer, dec!(0), true)],
            )
            .unwrap();
    }

    fn summary(suggestions: &[SettlementSuggestion]) -> Vec<(&str, &str, Decimal)> {
        suggestions
            .iter()
            .map(|s| (s.from().user_id.as_str(), s.to().user_id.as_str(), s.amount()))
            .collect()
    }

    #[test]
    fn chained_debts_collapse_into_one_payment() {
        let mut ledger = Ledger::new(GroupSettings::default());
        covered(&mut ledger, "b", "a", dec!(20));
        covered(&mut ledger, "c", "b", dec!(20));

        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(summary(&suggestions), vec![("a", "c", dec!(20))]);
    }

    #[test]
    fn chained_debts_stay_apart_without_simplifying() {
        let mut ledger = Ledger::new(GroupSettings {
            simplify_debts: false,
            currency: Currency::Usd,
        });
        covered(&mut ledger, "b", "a", dec!(20));
        covered(&mut ledger, "c", "b", dec!(20));

        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(
            summary(&suggestions),
            vec![("a", "b", dec!(20)), ("b", "c", dec!(20))]
        );
    }

    #[test]
    fn three_way_debts_settle_in_two_payments() {
        let mut ledger = Ledger::new(GroupSettings::default());
        covered(&mut ledger, "b", "a", dec!(20));
        covered(&mut ledger, "c", "b", dec!(50));
        covered(&mut ledger, "a", "c", dec!(35));

        let balances = ledger.net_balances();
        let nets: Vec<Decimal> = balances.iter().map(|b| b.net_amount).collect();
        assert_eq!(nets, vec![dec!(15), dec!(-30), dec!(15)]);

        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(
            summary(&suggestions),
            vec![("b", "a", dec!(15)), ("b", "c", dec!(15))]
        );
    }

    #[test]
    fn net_balances_break_down_what_is_owed() {
        let mut ledger = Ledger::new(GroupSettings::default());
        covered(&mut ledger, "b", "a", dec!(10));
        covered(&mut ledger, "a", "b", dec!(4));
        covered(&mut ledger, "c", "a", dec!(1.50));

        let balances = ledger.net_balances();
        assert_eq!(balances[0].user_id, "a");
        assert_eq!(balances[0].net_amount, dec!(-7.50));
        let owed: Vec<(&str, Decimal)> = balances[0]
            .owes_to
            .iter()
            .map(|o| (o.user_id.as_str(), o.amount))
            .collect();
        assert_eq!(owed, vec![("b", dec!(6)), ("c", dec!(1.50))]);
        assert!(balances[1].owes_to.is_empty());
        assert_eq!(balances[2].user_name, "C");
    }

    #[test]
    fn confirming_suggestions_settles_the_group() {
        let participants: Vec<Participant> = ["a", "b", "c"]
            .iter()
            .map(|id| Participant::new(*id, id.to_uppercase()))
            .collect();
        let outcome = compute_split(dec!(10), Currency::Usd, &participants, "a", SplitMethod::Equal, &[]).unwrap();

        let mut ledger = Ledger::new(GroupSettings::default());
        ledger.add_expense(&user("a"), dec!(10), &outcome.splits).unwrap();
        assert!(!ledger.is_settled());

        for suggestion in ledger.suggest_settlements().unwrap() {
            ledger.confirm(&suggestion).unwrap();
        }
        assert!(ledger.is_settled());
        assert!(ledger.suggest_settlements().unwrap().is_empty());
        assert!(ledger.net_balances().iter().all(|b| b.net_amount.is_zero()));
    }

    #[test]
    fn paid_splits_add_no_debt() {
        let mut ledger = Ledger::new(GroupSettings::default());
        ledger
            .add_expense(
                &user("a"),
                dec!(30),
                &[
                    split("a", dec!(10), true),
                    split("b", dec!(10), true),
                    split("c", dec!(10), false),
                ],
            )
            .unwrap();
        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(summary(&suggestions), vec![("c", "a", dec!(10))]);
    }

    #[test]
    fn overpaying_flips_the_debt() {
        let mut ledger = Ledger::new(GroupSettings::default());
        covered(&mut ledger, "b", "a", dec!(10));
        ledger.add_settlement(&user("a"), &user("b"), dec!(12)).unwrap();

        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(summary(&suggestions), vec![("b", "a", dec!(2))]);
    }

    #[test]
    fn unreconciled_expenses_are_refused() {
        let mut ledger = Ledger::new(GroupSettings::default());
        let result = ledger.add_expense(
            &user("a"),
            dec!(30),
            &[split("a", dec!(10), true), split("b", dec!(19.99), false)],
        );
        assert_eq!(
            result.unwrap_err(),
            LedgerError::Unreconciled {
                total: dec!(30),
                split_total: dec!(29.99)
            }
        );
        assert!(ledger.net_balances().is_empty());
    }

    #[rstest]
    #[case::negative_payer_split(
        dec!(10),
        vec![split("a", dec!(-20), true), split("b", dec!(30), false)],
        LedgerError::NegativeSplit { user_id: "a".to_string(), amount: dec!(-20) }
    )]
    #[case::negative_debtor_split(
        dec!(10),
        vec![split("a", dec!(15), true), split("b", dec!(-5), false)],
        LedgerError::NegativeSplit { user_id: "b".to_string(), amount: dec!(-5) }
    )]
    #[case::user_split_twice(
        dec!(10),
        vec![split("a", dec!(5), true), split("b", dec!(3), false), split("b", dec!(2), false)],
        LedgerError::DuplicateSplit("b".to_string())
    )]
    #[case::oversized_split(
        dec!(10),
        vec![split("a", Decimal::MAX, true)],
        LedgerError::AmountTooLarge(Decimal::MAX)
    )]
    #[case::oversized_total(
        Decimal::MAX,
        vec![split("a", dec!(1), true)],
        LedgerError::AmountTooLarge(Decimal::MAX)
    )]
    fn malformed_splits_are_refused(
        #[case] total: Decimal,
        #[case] splits: Vec<ExpenseSplit>,
        #[case] expected: LedgerError,
    ) {
        let mut ledger = Ledger::new(GroupSettings::default());
        assert_eq!(ledger.add_expense(&user("a"), total, &splits).unwrap_err(), expected);
        assert!(ledger.net_balances().is_empty());
    }

    #[test]
    fn bad_settlements_are_refused() {
        let mut ledger = Ledger::new(GroupSettings::default());
        assert_eq!(
            ledger.add_settlement(&user("a"), &user("b"), dec!(0)).unwrap_err(),
            LedgerError::Settlement(SettleError::NonPositiveAmount(dec!(0)))
        );
        assert_eq!(
            ledger.add_settlement(&user("a"), &user("a"), dec!(5)).unwrap_err(),
            LedgerError::Settlement(SettleError::SelfSettlement("a".to_string()))
        );
        assert_eq!(
            ledger.add_settlement(&user("a"), &user("b"), MAX_AMOUNT + dec!(1)).unwrap_err(),
            LedgerError::AmountTooLarge(MAX_AMOUNT + dec!(1))
        );
        assert!(ledger.net_balances().is_empty());
    }

    #[test]
    fn suggestions_carry_the_group_currency() {
        let mut ledger = Ledger::new(GroupSettings {
            simplify_debts: true,
            currency: Currency::Jpy,
        });
        covered(&mut ledger, "b", "a", dec!(500));
        let suggestions = ledger.suggest_settlements().unwrap();
        assert_eq!(suggestions[0].currency(), Currency::Jpy);
    }
}
