//! Engine services: the bucket registry, the reconciliation algorithm,
//! and the read-only balance calculators.

pub mod bucket_repository;
pub mod calculation;
pub mod reconciliation;

pub use bucket_repository::BucketRepository;
pub use calculation::{LedgerCalculation, OverspentLedger};
pub use reconciliation::{ReconciliationService, BUDGETED_AMOUNT_NARRATIVE};
