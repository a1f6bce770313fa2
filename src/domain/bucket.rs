//! Bucket classification model: the named categories that budget line
//! items, statement transactions, and ledger columns are keyed by.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::BudgetError;

/// Code reserved for the system surplus bucket.
pub const SURPLUS_CODE: &str = "SURPLUS";
/// Code reserved for the system credit-card payment bucket.
pub const PAY_CREDIT_CARD_CODE: &str = "PAYCC";
/// Code reserved for the system journal bucket.
pub const JOURNAL_CODE: &str = "JOURNAL";

const MAX_CODE_LENGTH: usize = 7;

/// Whether a bucket's unspent balance survives into the next period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarryForwardPolicy {
    /// Unspent funds accumulate period over period.
    Accumulate,
    /// Unspent funds flow to surplus; the next period starts from zero.
    ResetEachPeriod,
}

/// Closed set of bucket classifications.
///
/// Replaces the subtype hierarchy of the source model with a tagged
/// variant; the carry-forward policy and family relationships are
/// selected by matching on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BucketKind {
    Income,
    SavedUpForExpense,
    SpentPerPeriodExpense,
    SavingsCommitment,
    Surplus,
    FixedBudgetProject {
        fixed_amount: Decimal,
        created: NaiveDate,
    },
    PayCreditCard,
    Journal,
}

impl BucketKind {
    pub fn carry_forward(&self) -> CarryForwardPolicy {
        match self {
            BucketKind::SpentPerPeriodExpense => CarryForwardPolicy::ResetEachPeriod,
            _ => CarryForwardPolicy::Accumulate,
        }
    }

    pub fn is_expense(&self) -> bool {
        matches!(
            self,
            BucketKind::SavedUpForExpense
                | BucketKind::SpentPerPeriodExpense
                | BucketKind::SavingsCommitment
                | BucketKind::PayCreditCard
        )
    }

    /// Surplus and its project sub-allocations are interchangeable for
    /// reporting aggregation, never for direct equality.
    pub fn is_surplus_family(&self) -> bool {
        matches!(
            self,
            BucketKind::Surplus | BucketKind::FixedBudgetProject { .. }
        )
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BucketKind::Income => "Income",
            BucketKind::SavedUpForExpense => "Saved Up For Expense",
            BucketKind::SpentPerPeriodExpense => "Spent Per Period Expense",
            BucketKind::SavingsCommitment => "Savings Commitment",
            BucketKind::Surplus => "Surplus",
            BucketKind::FixedBudgetProject { .. } => "Fixed Budget Project",
            BucketKind::PayCreditCard => "Pay Credit Card",
            BucketKind::Journal => "Journal",
        };
        f.write_str(label)
    }
}

/// A named category for classifying budget line items and transactions.
///
/// Identity, equality, and ordering depend solely on the code, which is
/// normalized to upper-case at every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetBucket {
    code: String,
    pub description: String,
    pub active: bool,
    kind: BucketKind,
}

impl BudgetBucket {
    pub fn new(
        code: &str,
        description: &str,
        kind: BucketKind,
    ) -> Result<Self, BudgetError> {
        let code = normalize_code(code)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(BudgetError::InvalidInput(
                "bucket description must not be blank".into(),
            ));
        }
        Ok(Self {
            code,
            description: description.to_string(),
            active: true,
            kind,
        })
    }

    /// Builds a fixed-budget project bucket: a time-bounded sub-allocation
    /// of surplus with its own target amount. The code is always
    /// `SURPLUS.<SUBCODE>`.
    pub fn fixed_project(
        sub_code: &str,
        description: &str,
        fixed_amount: Decimal,
        created: NaiveDate,
    ) -> Result<Self, BudgetError> {
        if fixed_amount <= Decimal::ZERO {
            return Err(BudgetError::InvalidInput(format!(
                "fixed budget amount must be positive, got {fixed_amount}"
            )));
        }
        let code = fixed_project_code(sub_code)?;
        Self::new(
            &code,
            description,
            BucketKind::FixedBudgetProject {
                fixed_amount,
                created,
            },
        )
    }

    pub(crate) fn surplus() -> Self {
        Self::system(SURPLUS_CODE, "Surplus", BucketKind::Surplus)
    }

    pub(crate) fn pay_credit_card() -> Self {
        Self::system(
            PAY_CREDIT_CARD_CODE,
            "Pay Credit Card",
            BucketKind::PayCreditCard,
        )
    }

    pub(crate) fn journal() -> Self {
        Self::system(JOURNAL_CODE, "Journal", BucketKind::Journal)
    }

    fn system(code: &str, description: &str, kind: BucketKind) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            active: true,
            kind,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replaces the code, normalizing to upper-case.
    pub fn set_code(&mut self, code: &str) -> Result<(), BudgetError> {
        self.code = normalize_code(code)?;
        Ok(())
    }

    pub fn kind(&self) -> &BucketKind {
        &self.kind
    }

    pub fn carry_forward(&self) -> CarryForwardPolicy {
        self.kind.carry_forward()
    }

    pub fn is_surplus_family(&self) -> bool {
        self.kind.is_surplus_family()
    }

    /// The portion of the code after the first `.`, for project buckets.
    pub fn sub_code(&self) -> Option<&str> {
        self.code.split_once('.').map(|(_, rest)| rest)
    }

    /// Appends a message for each data-quality rule the bucket breaks and
    /// reports whether it passed. Deserialized values bypass construction,
    /// so this is a separate pass over the same rules.
    pub fn validate(&self, messages: &mut Vec<String>) -> bool {
        let starting = messages.len();
        if self.code.trim().is_empty() {
            messages.push("bucket code must not be blank".into());
        }
        let limited = match &self.kind {
            // A project code is SURPLUS.<SUBCODE>; the limit applies to
            // the sub-code.
            BucketKind::FixedBudgetProject { .. } => {
                self.sub_code().unwrap_or(&self.code)
            }
            _ => self.code.as_str(),
        };
        if limited.len() > MAX_CODE_LENGTH {
            messages.push(format!(
                "bucket code `{}` exceeds {} characters",
                self.code, MAX_CODE_LENGTH
            ));
        }
        if self.description.trim().is_empty() {
            messages.push(format!("bucket `{}` has a blank description", self.code));
        }
        messages.len() == starting
    }
}

impl PartialEq for BudgetBucket {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for BudgetBucket {}

impl Hash for BudgetBucket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl PartialOrd for BudgetBucket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BudgetBucket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

impl fmt::Display for BudgetBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.description)
    }
}

/// Deterministically builds a fixed-budget project code from a sub-code.
pub fn fixed_project_code(sub_code: &str) -> Result<String, BudgetError> {
    let sub = normalize_code(sub_code)?;
    Ok(format!("{SURPLUS_CODE}.{sub}"))
}

/// True when a code belongs to the surplus family: the surplus bucket
/// itself or any `SURPLUS.`-prefixed project code.
pub fn is_surplus_family_code(code: &str) -> bool {
    let upper = code.trim().to_uppercase();
    upper == SURPLUS_CODE || upper.starts_with("SURPLUS.")
}

fn normalize_code(code: &str) -> Result<String, BudgetError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(BudgetError::InvalidInput(
            "bucket code must not be blank".into(),
        ));
    }
    Ok(trimmed.to_uppercase())
}

/// Persisted bucket-type tag used by deserialization mappers to
/// materialize a concrete bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketTypeTag {
    Income,
    SavedUpForExpense,
    SpentPerPeriodExpense,
    SavingsCommitment,
    Surplus,
    FixedBudgetProject,
    Journal,
    PayCreditCard,
}

/// Builds a bucket from its persisted type tag.
///
/// Surplus and journal buckets are system-managed (the repository injects
/// them at initialise time) and cannot be created through this path.
/// Fixed-budget projects require their amount and creation date.
pub fn materialize(
    tag: BucketTypeTag,
    code: &str,
    description: &str,
    project: Option<(Decimal, NaiveDate)>,
) -> Result<BudgetBucket, BudgetError> {
    let kind = match tag {
        BucketTypeTag::Income => BucketKind::Income,
        BucketTypeTag::SavedUpForExpense => BucketKind::SavedUpForExpense,
        BucketTypeTag::SpentPerPeriodExpense => BucketKind::SpentPerPeriodExpense,
        BucketTypeTag::SavingsCommitment => BucketKind::SavingsCommitment,
        BucketTypeTag::PayCreditCard => BucketKind::PayCreditCard,
        BucketTypeTag::Surplus | BucketTypeTag::Journal => {
            return Err(BudgetError::UnsupportedBucketType(format!("{tag:?}")))
        }
        BucketTypeTag::FixedBudgetProject => {
            let (fixed_amount, created) = project.ok_or_else(|| {
                BudgetError::InvalidInput(
                    "fixed budget project tag requires an amount and creation date".into(),
                )
            })?;
            BucketKind::FixedBudgetProject {
                fixed_amount,
                created,
            }
        }
    };
    BudgetBucket::new(code, description, kind)
}
