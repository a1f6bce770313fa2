//! The reconciliation engine: folds the prior ledger state, the current
//! budget, and new bank data into the next dated ledger line.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::bucket::CarryForwardPolicy;
use crate::domain::budget::BudgetModel;
use crate::domain::ledger::{
    BankBalance, LedgerBook, LedgerEntry, LedgerEntryLine, LedgerTransaction,
};
use crate::domain::statement::StatementTransaction;
use crate::errors::{BudgetError, LedgerError};

/// Narrative attached to the automatic budgeted-amount credit.
pub const BUDGETED_AMOUNT_NARRATIVE: &str = "Budgeted amount";

/// Stateless service producing the next reconciliation line for a book.
pub struct ReconciliationService;

impl ReconciliationService {
    /// Reconciles the book at `date` against the supplied bank balances,
    /// the applicable budget, and optionally the statement transactions
    /// for the new period.
    ///
    /// For every tracked bucket a new entry is built: the opening balance
    /// carries forward per the bucket's policy, the budgeted amount is
    /// credited, and matching statement transactions within the period
    /// `(previous line date, date]` are allocated. The new line is
    /// prepended to the history and returned for chaining edits.
    ///
    /// Fails when `date` is not strictly after the latest existing line,
    /// or when the budget does not cover `date`.
    pub fn reconcile<'a>(
        book: &'a mut LedgerBook,
        date: NaiveDate,
        bank_balances: Vec<BankBalance>,
        budget: &BudgetModel,
        statement: Option<&[StatementTransaction]>,
    ) -> Result<&'a LedgerEntryLine, LedgerError> {
        let previous_date = match book.latest_line() {
            Some(latest) if date <= latest.date => {
                return Err(LedgerError::ReconciliationOutOfOrder {
                    attempted: date,
                    latest: latest.date,
                });
            }
            Some(latest) => Some(latest.date),
            None => None,
        };
        if budget.effective_from > date {
            return Err(BudgetError::DateRangeNotCovered(date).into());
        }

        let mut line = LedgerEntryLine::new(date, bank_balances);
        for column in book.ledgers().to_vec() {
            let code = column.code().to_string();
            let opening = match column.bucket.carry_forward() {
                CarryForwardPolicy::ResetEachPeriod => Decimal::ZERO,
                CarryForwardPolicy::Accumulate => book
                    .latest_line()
                    .and_then(|previous| previous.entry(&code))
                    .map(|entry| entry.balance())
                    .unwrap_or(Decimal::ZERO),
            };
            let mut entry = LedgerEntry::new(column, opening);

            let budgeted = budget.budgeted_amount(&code);
            if !budgeted.is_zero() {
                entry.add_transaction(
                    LedgerTransaction::budget_credit(budgeted, BUDGETED_AMOUNT_NARRATIVE)
                        .with_date(date),
                );
            }

            if let Some(transactions) = statement {
                for txn in transactions.iter().filter(|txn| {
                    txn.matches_bucket(&code) && in_period(txn.date, previous_date, date)
                }) {
                    entry.add_transaction(allocate(txn));
                }
            }

            debug!(
                bucket = %code,
                opening = %opening,
                balance = %entry.balance(),
                "reconciled entry"
            );
            line.push_entry(entry);
        }

        info!(
            book = %book.name,
            %date,
            bank_balance = %line.total_bank_balance(),
            surplus = %line.calculated_surplus(),
            "reconciled ledger book"
        );
        Ok(book.prepend_line(line))
    }
}

fn in_period(candidate: NaiveDate, previous: Option<NaiveDate>, date: NaiveDate) -> bool {
    candidate <= date && previous.map_or(true, |previous| candidate > previous)
}

fn allocate(txn: &StatementTransaction) -> LedgerTransaction {
    let base = if txn.amount < Decimal::ZERO {
        LedgerTransaction::debit(txn.amount, txn.narrative.clone())
    } else {
        LedgerTransaction::credit(txn.amount, txn.narrative.clone())
    };
    base.with_date(txn.date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::{BucketKind, BudgetBucket};
    use crate::domain::budget::{Expense, Income};
    use crate::domain::ledger::LedgerTransactionKind;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn bucket(code: &str, kind: BucketKind) -> Arc<BudgetBucket> {
        Arc::new(BudgetBucket::new(code, "test bucket", kind).expect("valid bucket"))
    }

    fn test_budget(effective_from: NaiveDate) -> BudgetModel {
        let mut budget = BudgetModel::new("Test Budget", effective_from);
        budget.add_income(Income::new(bucket("SALARY", BucketKind::Income), dec!(2750)));
        budget.add_expense(Expense::new(
            bucket("POWER", BucketKind::SpentPerPeriodExpense),
            dec!(175),
        ));
        budget.add_expense(Expense::new(
            bucket("CAR", BucketKind::SavedUpForExpense),
            dec!(90),
        ));
        budget
    }

    fn tracked_book() -> LedgerBook {
        let mut book = LedgerBook::new("Smith Household");
        book.add_ledger(bucket("POWER", BucketKind::SpentPerPeriodExpense));
        book.add_ledger(bucket("CAR", BucketKind::SavedUpForExpense));
        book
    }

    fn balances(amount: Decimal) -> Vec<BankBalance> {
        vec![BankBalance::new("CHEQUE", amount)]
    }

    #[test]
    fn first_reconciliation_starts_every_bucket_from_zero() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("reconciliation succeeds");

        assert_eq!(line.entries().len(), 2);
        let power = line.entry("POWER").expect("tracked bucket has an entry");
        assert_eq!(power.opening_balance(), Decimal::ZERO);
        assert_eq!(power.balance(), dec!(175));
        let car = line.entry("CAR").expect("tracked bucket has an entry");
        assert_eq!(car.balance(), dec!(90));
    }

    #[test]
    fn budgeted_amount_is_recorded_as_a_budget_credit() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("reconciliation succeeds");

        let car = line.entry("CAR").expect("entry exists");
        assert_eq!(car.transactions().len(), 1);
        let txn = &car.transactions()[0];
        assert_eq!(txn.kind, LedgerTransactionKind::BudgetCredit);
        assert_eq!(txn.amount, dec!(90));
        assert_eq!(txn.narrative, BUDGETED_AMOUNT_NARRATIVE);
    }

    #[test]
    fn buckets_without_budget_lines_get_no_transactions() {
        let mut book = tracked_book();
        book.add_ledger(bucket("HAIR", BucketKind::SavedUpForExpense));
        let budget = test_budget(date(2013, 1, 1));
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("reconciliation succeeds");

        let hair = line.entry("HAIR").expect("entry exists");
        assert!(hair.transactions().is_empty());
        assert_eq!(hair.balance(), Decimal::ZERO);
    }

    #[test]
    fn spent_per_period_resets_while_saved_up_accumulates() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("first reconciliation succeeds");
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 9, 15),
            balances(dec!(1900)),
            &budget,
            None,
        )
        .expect("second reconciliation succeeds");

        // POWER resets to zero and is re-credited; CAR carries forward.
        let power = line.entry("POWER").expect("entry exists");
        assert_eq!(power.opening_balance(), Decimal::ZERO);
        assert_eq!(power.balance(), dec!(175));
        let car = line.entry("CAR").expect("entry exists");
        assert_eq!(car.opening_balance(), dec!(90));
        assert_eq!(car.balance(), dec!(180));
    }

    #[test]
    fn statement_transactions_are_allocated_within_the_period() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("first reconciliation succeeds");

        let statement = vec![
            StatementTransaction::new("CHEQUE", "CAR", dec!(-60), date(2013, 9, 2), "fuel"),
            // Before the period: already covered by the previous line.
            StatementTransaction::new("CHEQUE", "CAR", dec!(-40), date(2013, 8, 10), "fuel"),
            // After the period end.
            StatementTransaction::new("CHEQUE", "CAR", dec!(-75), date(2013, 9, 16), "fuel"),
            // Different bucket.
            StatementTransaction::new("CHEQUE", "GROCERY", dec!(-120), date(2013, 9, 2), "food"),
        ];
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 9, 15),
            balances(dec!(1900)),
            &budget,
            Some(statement.as_slice()),
        )
        .expect("second reconciliation succeeds");

        let car = line.entry("CAR").expect("entry exists");
        assert_eq!(car.transactions().len(), 2);
        assert_eq!(car.balance(), dec!(120));
        let allocated = car
            .transactions()
            .iter()
            .find(|txn| txn.kind == LedgerTransactionKind::Debit)
            .expect("statement debit allocated");
        assert_eq!(allocated.amount, dec!(-60));
        assert_eq!(allocated.date, Some(date(2013, 9, 2)));
    }

    #[test]
    fn period_boundary_is_exclusive_of_previous_and_inclusive_of_current() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("first reconciliation succeeds");

        let statement = vec![
            StatementTransaction::new("CHEQUE", "CAR", dec!(-10), date(2013, 8, 15), "boundary"),
            StatementTransaction::new("CHEQUE", "CAR", dec!(-20), date(2013, 8, 16), "inside"),
            StatementTransaction::new("CHEQUE", "CAR", dec!(-30), date(2013, 9, 15), "inside"),
        ];
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 9, 15),
            balances(dec!(1900)),
            &budget,
            Some(statement.as_slice()),
        )
        .expect("second reconciliation succeeds");

        let car = line.entry("CAR").expect("entry exists");
        // Budget credit plus the two in-period debits; the 8-15 boundary
        // transaction belongs to the previous period.
        assert_eq!(car.transactions().len(), 3);
        assert_eq!(car.balance(), dec!(130));
    }

    #[test]
    fn out_of_order_dates_are_rejected() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("first reconciliation succeeds");

        let err = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(1900)),
            &budget,
            None,
        )
        .expect_err("same-date reconciliation should fail");
        assert!(matches!(
            err,
            LedgerError::ReconciliationOutOfOrder { .. }
        ));
        assert_eq!(book.dated_entries().len(), 1);
    }

    #[test]
    fn budget_must_cover_the_reconciliation_date() {
        let mut book = tracked_book();
        let budget = test_budget(date(2014, 1, 1));
        let err = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect_err("uncovered date should fail");
        assert!(matches!(
            err,
            LedgerError::Budget(BudgetError::DateRangeNotCovered(_))
        ));
    }

    #[test]
    fn surplus_invariant_holds_after_reconciliation() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        let line = ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("reconciliation succeeds");

        assert_eq!(
            line.calculated_surplus(),
            line.total_bank_balance() + line.total_balance_adjustments()
                - line.ledger_balance()
        );
        assert_eq!(line.calculated_surplus(), dec!(1735));
    }

    #[test]
    fn new_line_is_prepended() {
        let mut book = tracked_book();
        let budget = test_budget(date(2013, 1, 1));
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 8, 15),
            balances(dec!(2000)),
            &budget,
            None,
        )
        .expect("first reconciliation succeeds");
        ReconciliationService::reconcile(
            &mut book,
            date(2013, 9, 15),
            balances(dec!(1900)),
            &budget,
            None,
        )
        .expect("second reconciliation succeeds");

        assert_eq!(book.dated_entries().len(), 2);
        assert_eq!(
            book.latest_line().expect("line exists").date,
            date(2013, 9, 15)
        );
        book.validate_dated_order().expect("history stays ordered");
    }
}
