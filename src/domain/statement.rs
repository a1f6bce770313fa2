//! Bank statement transactions and the date-range filter consumed by the
//! balance query helpers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dated, signed, bucket-tagged transaction produced by statement
/// import. Spend is negative, deposits positive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementTransaction {
    pub id: Uuid,
    pub account: String,
    pub bucket_code: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub narrative: String,
}

impl StatementTransaction {
    pub fn new(
        account: impl Into<String>,
        bucket_code: &str,
        amount: Decimal,
        date: NaiveDate,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: account.into(),
            bucket_code: bucket_code.trim().to_uppercase(),
            amount,
            date,
            narrative: narrative.into(),
        }
    }

    pub fn matches_bucket(&self, bucket_code: &str) -> bool {
        self.bucket_code.eq_ignore_ascii_case(bucket_code.trim())
    }
}

/// A flat list of imported statement transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementModel {
    transactions: Vec<StatementTransaction>,
}

impl StatementModel {
    pub fn new(transactions: Vec<StatementTransaction>) -> Self {
        Self { transactions }
    }

    pub fn transactions(&self) -> &[StatementTransaction] {
        &self.transactions
    }

    pub fn add(&mut self, transaction: StatementTransaction) {
        self.transactions.push(transaction);
    }

    /// Transactions whose date falls inside the filter window.
    pub fn in_window<'a>(
        &'a self,
        filter: &'a GlobalFilterCriteria,
    ) -> impl Iterator<Item = &'a StatementTransaction> + 'a {
        self.transactions
            .iter()
            .filter(move |txn| filter.contains(txn.date))
    }

    /// Transactions for one bucket inside the filter window.
    pub fn for_bucket<'a>(
        &'a self,
        bucket_code: &'a str,
        filter: &'a GlobalFilterCriteria,
    ) -> impl Iterator<Item = &'a StatementTransaction> + 'a {
        self.in_window(filter)
            .filter(move |txn| txn.matches_bucket(bucket_code))
    }
}

/// An inclusive date window selecting the statement subset for a period.
/// A cleared filter (both dates absent) selects everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalFilterCriteria {
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl GlobalFilterCriteria {
    pub fn between(begin_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            begin_date: Some(begin_date),
            end_date: Some(end_date),
        }
    }

    pub fn cleared(&self) -> bool {
        self.begin_date.is_none() && self.end_date.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin_date.map_or(true, |begin| date >= begin)
            && self.end_date.map_or(true, |end| date <= end)
    }
}
