//! Stateless balance calculators over a reconciled ledger book, a date
//! filter, and a statement transaction set. Read-only; safe for
//! concurrent access to a stable book.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::bucket::is_surplus_family_code;
use crate::domain::budget::BudgetCollection;
use crate::domain::ledger::{LedgerBook, LedgerEntryLine};
use crate::domain::statement::{GlobalFilterCriteria, StatementModel};

/// One overspent bucket reported by
/// [`LedgerCalculation::calculate_overspent_ledgers`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverspentLedger {
    pub bucket_code: String,
    /// The (negative) remaining balance for the period.
    pub remaining: Decimal,
}

pub struct LedgerCalculation;

impl LedgerCalculation {
    /// The single line applicable to the filter period: the latest line
    /// dated on or before the filter's begin date. A cleared filter has
    /// no period to anchor to.
    pub fn locate_applicable_ledger_line<'a>(
        book: &'a LedgerBook,
        filter: &GlobalFilterCriteria,
    ) -> Option<&'a LedgerEntryLine> {
        let begin = filter.begin_date?;
        book.dated_entries().iter().find(|line| line.date <= begin)
    }

    /// The applicable line's balance for a bucket. Buckets not under
    /// ledger tracking (or a book with no applicable line yet) degrade
    /// gracefully to the applicable budget's planned amount.
    pub fn locate_applicable_ledger_balance(
        book: &LedgerBook,
        filter: &GlobalFilterCriteria,
        budgets: &BudgetCollection,
        bucket_code: &str,
    ) -> Decimal {
        if book.is_tracked(bucket_code) {
            if let Some(line) = Self::locate_applicable_ledger_line(book, filter) {
                return line
                    .entry(bucket_code)
                    .map(|entry| entry.balance())
                    .unwrap_or(Decimal::ZERO);
            }
        }
        filter
            .begin_date
            .and_then(|begin| budgets.for_date(begin))
            .map(|budget| budget.budgeted_amount(bucket_code))
            .unwrap_or(Decimal::ZERO)
    }

    /// For every bucket tracked in the line: the reconciled balance plus
    /// the statement activity inside the filter window — the remaining
    /// balance including actuals not yet reconciled.
    pub fn calculate_current_period_ledger_balances(
        line: &LedgerEntryLine,
        filter: &GlobalFilterCriteria,
        statement: &StatementModel,
    ) -> HashMap<String, Decimal> {
        line.entries()
            .iter()
            .map(|entry| {
                let activity: Decimal = statement
                    .for_bucket(entry.code(), filter)
                    .map(|txn| txn.amount)
                    .sum();
                (entry.code().to_string(), entry.balance() + activity)
            })
            .collect()
    }

    /// Buckets whose remaining balance for the period is negative beyond
    /// the tolerance, sorted by code.
    pub fn calculate_overspent_ledgers(
        statement: &StatementModel,
        line: &LedgerEntryLine,
        filter: &GlobalFilterCriteria,
        tolerance: Decimal,
    ) -> Vec<OverspentLedger> {
        let mut overspent: Vec<OverspentLedger> =
            Self::calculate_current_period_ledger_balances(line, filter, statement)
                .into_iter()
                .filter(|(_, remaining)| *remaining < -tolerance.abs())
                .map(|(bucket_code, remaining)| OverspentLedger {
                    bucket_code,
                    remaining,
                })
                .collect();
        overspent.sort_by(|a, b| a.bucket_code.cmp(&b.bucket_code));
        overspent
    }

    /// Single-bucket remaining balance including statement activity.
    /// Surplus-family buckets aggregate across the whole family (the
    /// surplus bucket and every `SURPLUS.` project).
    pub fn calculate_current_period_bucket_spend(
        line: &LedgerEntryLine,
        filter: &GlobalFilterCriteria,
        statement: &StatementModel,
        bucket_code: &str,
    ) -> Decimal {
        let family = is_surplus_family_code(bucket_code);
        let matches = |code: &str| {
            if family {
                is_surplus_family_code(code)
            } else {
                code.eq_ignore_ascii_case(bucket_code.trim())
            }
        };
        let reconciled: Decimal = line
            .entries()
            .iter()
            .filter(|entry| matches(entry.code()))
            .map(|entry| entry.balance())
            .sum();
        let activity: Decimal = statement
            .in_window(filter)
            .filter(|txn| matches(&txn.bucket_code))
            .map(|txn| txn.amount)
            .sum();
        reconciled + activity
    }
}
