//! Ledger book aggregate: the period-over-period record of how much
//! remains in each tracked bucket.
//!
//! Derived totals (net amounts, balances, surplus) are recomputed from the
//! raw transaction lists on every call, so every mutation leaves the
//! aggregate consistent without cached sums.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::bucket::BudgetBucket;
use crate::errors::LedgerError;

/// A bank account balance supplied at reconciliation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankBalance {
    pub account: String,
    pub balance: Decimal,
}

impl BankBalance {
    pub fn new(account: impl Into<String>, balance: Decimal) -> Self {
        Self {
            account: account.into(),
            balance,
        }
    }
}

/// A manual credit/debit correction to a line's bank balance, with
/// narrative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankBalanceAdjustment {
    pub id: Uuid,
    pub amount: Decimal,
    pub narrative: String,
}

impl BankBalanceAdjustment {
    pub fn new(amount: Decimal, narrative: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            narrative: narrative.into(),
        }
    }
}

/// Provenance of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTransactionKind {
    /// The automatic credit of the period's budgeted amount.
    BudgetCredit,
    Credit,
    Debit,
}

/// A credit or debit against a bucket's running balance within a line.
///
/// Amounts are stored signed: credits positive, debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub kind: LedgerTransactionKind,
    pub amount: Decimal,
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl LedgerTransaction {
    pub fn credit(amount: Decimal, narrative: impl Into<String>) -> Self {
        Self::build(LedgerTransactionKind::Credit, amount.abs(), narrative)
    }

    pub fn debit(amount: Decimal, narrative: impl Into<String>) -> Self {
        Self::build(LedgerTransactionKind::Debit, -amount.abs(), narrative)
    }

    pub fn budget_credit(amount: Decimal, narrative: impl Into<String>) -> Self {
        Self::build(LedgerTransactionKind::BudgetCredit, amount.abs(), narrative)
    }

    fn build(
        kind: LedgerTransactionKind,
        amount: Decimal,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            narrative: narrative.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// The persistent per-book assignment of a bucket to be tracked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerColumn {
    pub bucket: Arc<BudgetBucket>,
}

impl LedgerColumn {
    pub fn new(bucket: Arc<BudgetBucket>) -> Self {
        Self { bucket }
    }

    pub fn code(&self) -> &str {
        self.bucket.code()
    }
}

/// One bucket's state within a reconciliation line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    column: LedgerColumn,
    opening_balance: Decimal,
    transactions: Vec<LedgerTransaction>,
}

impl LedgerEntry {
    pub fn new(column: LedgerColumn, opening_balance: Decimal) -> Self {
        Self {
            column,
            opening_balance,
            transactions: Vec::new(),
        }
    }

    pub fn column(&self) -> &LedgerColumn {
        &self.column
    }

    pub fn bucket(&self) -> &Arc<BudgetBucket> {
        &self.column.bucket
    }

    pub fn code(&self) -> &str {
        self.column.code()
    }

    pub fn opening_balance(&self) -> Decimal {
        self.opening_balance
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }

    /// Signed sum of this entry's transactions.
    pub fn net_amount(&self) -> Decimal {
        self.transactions.iter().map(|txn| txn.amount).sum()
    }

    /// Running total carried to the next period.
    pub fn balance(&self) -> Decimal {
        self.opening_balance + self.net_amount()
    }

    pub fn add_transaction(&mut self, transaction: LedgerTransaction) {
        self.transactions.push(transaction);
    }

    /// Removes a transaction by id, failing loudly when it does not exist.
    pub fn remove_transaction(
        &mut self,
        transaction_id: Uuid,
    ) -> Result<LedgerTransaction, LedgerError> {
        let index = self
            .transactions
            .iter()
            .position(|txn| txn.id == transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        Ok(self.transactions.remove(index))
    }
}

/// One reconciliation event: a dated snapshot of every tracked bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryLine {
    pub date: NaiveDate,
    bank_balances: Vec<BankBalance>,
    #[serde(default)]
    bank_balance_adjustments: Vec<BankBalanceAdjustment>,
    entries: Vec<LedgerEntry>,
    #[serde(default)]
    pub remarks: String,
}

impl LedgerEntryLine {
    pub fn new(date: NaiveDate, bank_balances: Vec<BankBalance>) -> Self {
        Self {
            date,
            bank_balances,
            bank_balance_adjustments: Vec::new(),
            entries: Vec::new(),
            remarks: String::new(),
        }
    }

    pub(crate) fn push_entry(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entry(&self, bucket_code: &str) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.code().eq_ignore_ascii_case(bucket_code))
    }

    pub fn entry_mut(&mut self, bucket_code: &str) -> Option<&mut LedgerEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.code().eq_ignore_ascii_case(bucket_code))
    }

    pub fn bank_balances(&self) -> &[BankBalance] {
        &self.bank_balances
    }

    pub fn bank_balance_adjustments(&self) -> &[BankBalanceAdjustment] {
        &self.bank_balance_adjustments
    }

    pub fn total_bank_balance(&self) -> Decimal {
        self.bank_balances.iter().map(|bank| bank.balance).sum()
    }

    pub fn total_balance_adjustments(&self) -> Decimal {
        self.bank_balance_adjustments
            .iter()
            .map(|adjustment| adjustment.amount)
            .sum()
    }

    /// Sum of every entry's running balance.
    pub fn ledger_balance(&self) -> Decimal {
        self.entries.iter().map(|entry| entry.balance()).sum()
    }

    /// Bank-balance-derived discretionary funds:
    /// `total bank balance + adjustments - ledger balance`.
    pub fn calculated_surplus(&self) -> Decimal {
        self.total_bank_balance() + self.total_balance_adjustments() - self.ledger_balance()
    }

    /// Appends a signed bank-balance correction and returns its id.
    pub fn balance_adjustment(&mut self, amount: Decimal, narrative: &str) -> Uuid {
        let adjustment = BankBalanceAdjustment::new(amount, narrative);
        let id = adjustment.id;
        self.bank_balance_adjustments.push(adjustment);
        id
    }

    pub fn remove_balance_adjustment(&mut self, adjustment_id: Uuid) -> Result<(), LedgerError> {
        let index = self
            .bank_balance_adjustments
            .iter()
            .position(|adjustment| adjustment.id == adjustment_id)
            .ok_or(LedgerError::TransactionNotFound(adjustment_id))?;
        self.bank_balance_adjustments.remove(index);
        Ok(())
    }

    pub fn update_remarks(&mut self, remarks: impl Into<String>) {
        self.remarks = remarks.into();
    }
}

/// The aggregate tracking, period over period, how much remains in each
/// tracked bucket. Lines are kept newest first; mutation happens only
/// through reconciliation and line-level edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerBook {
    pub name: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    dated_entries: Vec<LedgerEntryLine>,
    #[serde(default)]
    ledgers: Vec<LedgerColumn>,
}

impl LedgerBook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modified: Utc::now(),
            dated_entries: Vec::new(),
            ledgers: Vec::new(),
        }
    }

    /// Reconciliation lines, newest first.
    pub fn dated_entries(&self) -> &[LedgerEntryLine] {
        &self.dated_entries
    }

    pub fn latest_line(&self) -> Option<&LedgerEntryLine> {
        self.dated_entries.first()
    }

    pub fn latest_line_mut(&mut self) -> Option<&mut LedgerEntryLine> {
        self.dated_entries.first_mut()
    }

    pub fn line_mut(&mut self, date: NaiveDate) -> Option<&mut LedgerEntryLine> {
        self.dated_entries.iter_mut().find(|line| line.date == date)
    }

    /// The buckets currently tracked by this book.
    pub fn ledgers(&self) -> &[LedgerColumn] {
        &self.ledgers
    }

    pub fn is_tracked(&self, bucket_code: &str) -> bool {
        self.ledgers
            .iter()
            .any(|column| column.code().eq_ignore_ascii_case(bucket_code))
    }

    /// Starts tracking a bucket. Takes effect from the next
    /// reconciliation; historical lines are untouched. Returns false when
    /// the bucket was already tracked.
    pub fn add_ledger(&mut self, bucket: Arc<BudgetBucket>) -> bool {
        if self.is_tracked(bucket.code()) {
            return false;
        }
        self.ledgers.push(LedgerColumn::new(bucket));
        self.ledgers.sort_by(|a, b| a.bucket.cmp(&b.bucket));
        self.touch();
        true
    }

    pub(crate) fn prepend_line(&mut self, line: LedgerEntryLine) -> &LedgerEntryLine {
        self.dated_entries.insert(0, line);
        self.touch();
        &self.dated_entries[0]
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    /// Checks the newest-first invariant over the line history; loaded
    /// data that violates it is a data-format problem.
    pub fn validate_dated_order(&self) -> Result<(), LedgerError> {
        for window in self.dated_entries.windows(2) {
            if window[0].date <= window[1].date {
                return Err(LedgerError::DataFormat(format!(
                    "ledger book `{}` has out-of-order lines: {} does not precede {}",
                    self.name, window[1].date, window[0].date
                )));
            }
        }
        Ok(())
    }
}
