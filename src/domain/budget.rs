//! Versioned, date-effective budget definitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::bucket::BudgetBucket;
use crate::errors::BudgetError;

/// A planned income line tied to a bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Income {
    pub bucket: Arc<BudgetBucket>,
    pub amount: Decimal,
}

impl Income {
    pub fn new(bucket: Arc<BudgetBucket>, amount: Decimal) -> Self {
        Self { bucket, amount }
    }
}

/// A planned expense line tied to a bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub bucket: Arc<BudgetBucket>,
    pub amount: Decimal,
}

impl Expense {
    pub fn new(bucket: Arc<BudgetBucket>, amount: Decimal) -> Self {
        Self { bucket, amount }
    }
}

/// One budget definition, effective from a given date until superseded.
///
/// Income and expense lines are kept ordered by amount descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetModel {
    pub name: String,
    pub effective_from: NaiveDate,
    incomes: Vec<Income>,
    expenses: Vec<Expense>,
}

impl BudgetModel {
    pub fn new(name: impl Into<String>, effective_from: NaiveDate) -> Self {
        Self {
            name: name.into(),
            effective_from,
            incomes: Vec::new(),
            expenses: Vec::new(),
        }
    }

    pub fn add_income(&mut self, income: Income) {
        self.incomes.push(income);
        self.incomes.sort_by(|a, b| b.amount.cmp(&a.amount));
    }

    pub fn add_expense(&mut self, expense: Expense) {
        self.expenses.push(expense);
        self.expenses.sort_by(|a, b| b.amount.cmp(&a.amount));
    }

    pub fn incomes(&self) -> &[Income] {
        &self.incomes
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// Discretionary funds left after all planned expenses.
    pub fn surplus(&self) -> Decimal {
        let income: Decimal = self.incomes.iter().map(|line| line.amount).sum();
        let expense: Decimal = self.expenses.iter().map(|line| line.amount).sum();
        income - expense
    }

    pub fn expense_amount(&self, bucket_code: &str) -> Option<Decimal> {
        self.expenses
            .iter()
            .find(|line| line.bucket.code().eq_ignore_ascii_case(bucket_code))
            .map(|line| line.amount)
    }

    pub fn income_amount(&self, bucket_code: &str) -> Option<Decimal> {
        self.incomes
            .iter()
            .find(|line| line.bucket.code().eq_ignore_ascii_case(bucket_code))
            .map(|line| line.amount)
    }

    /// The planned amount for a bucket; expense lines take precedence over
    /// income lines, and buckets absent from the budget contribute zero.
    pub fn budgeted_amount(&self, bucket_code: &str) -> Decimal {
        self.expense_amount(bucket_code)
            .or_else(|| self.income_amount(bucket_code))
            .unwrap_or(Decimal::ZERO)
    }

    /// Appends a message for each rule the budget breaks and reports
    /// whether it passed.
    pub fn validate(&self, messages: &mut Vec<String>) -> bool {
        let starting = messages.len();
        for line in &self.expenses {
            if line.bucket.is_surplus_family() {
                messages.push(format!(
                    "expense line `{}` must not use the surplus bucket",
                    line.bucket.code()
                ));
            }
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for line in &self.expenses {
            *counts.entry(line.bucket.code()).or_insert(0) += 1;
        }
        for (code, count) in counts {
            if count > 1 {
                messages.push(format!(
                    "bucket `{code}` appears in {count} expense lines"
                ));
            }
        }
        messages.len() == starting
    }
}

/// The ordered set of budget models, newest effective date first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetCollection {
    models: Vec<BudgetModel>,
}

impl BudgetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self) -> &[BudgetModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Inserts a budget, advancing a colliding effective date by one day
    /// until unique. The shift preserves the budget count for historical
    /// imports; the new effective date is returned.
    pub fn add(&mut self, mut model: BudgetModel) -> NaiveDate {
        while self
            .models
            .iter()
            .any(|existing| existing.effective_from == model.effective_from)
        {
            let shifted = model.effective_from + Duration::days(1);
            tracing::warn!(
                budget = %model.name,
                original = %model.effective_from,
                shifted = %shifted,
                "budget effective date collides with an existing budget; shifting by one day"
            );
            model.effective_from = shifted;
        }
        let effective_from = model.effective_from;
        self.models.push(model);
        self.models
            .sort_by(|a, b| b.effective_from.cmp(&a.effective_from));
        effective_from
    }

    /// The latest budget effective on or before the date, if any.
    pub fn for_date(&self, date: NaiveDate) -> Option<&BudgetModel> {
        self.models
            .iter()
            .find(|model| model.effective_from <= date)
    }

    /// Every budget applicable across `[begin, end)`: the one effective at
    /// `begin` plus any that become effective inside the range. Fails when
    /// no budget covers the start of the range.
    pub fn for_dates(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<&BudgetModel>, BudgetError> {
        let anchor = self
            .for_date(begin)
            .ok_or(BudgetError::DateRangeNotCovered(begin))?;
        let mut applicable = vec![anchor];
        for model in self
            .models
            .iter()
            .rev()
            .filter(|model| model.effective_from >= begin && model.effective_from < end)
        {
            if model.effective_from != anchor.effective_from {
                applicable.push(model);
            }
        }
        Ok(applicable)
    }
}
