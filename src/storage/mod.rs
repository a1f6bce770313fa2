//! Persistence for the ledger book and budget collection aggregates.
//! Storage is keyed by an opaque name; the default backend is JSON.

pub mod json_backend;

use std::path::Path;

use crate::domain::budget::BudgetCollection;
use crate::domain::ledger::LedgerBook;
use crate::errors::LedgerError;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Abstraction over persistence backends capable of storing ledger books
/// and budget collections.
pub trait StorageBackend: Send + Sync {
    fn save_book(&self, book: &LedgerBook, name: &str) -> Result<()>;
    fn load_book(&self, name: &str) -> Result<LedgerBook>;
    fn save_budgets(&self, budgets: &BudgetCollection, name: &str) -> Result<()>;
    fn load_budgets(&self, name: &str) -> Result<BudgetCollection>;
    fn list_backups(&self, name: &str) -> Result<Vec<String>>;
    fn backup_book(&self, book: &LedgerBook, name: &str, note: Option<&str>) -> Result<()>;
    fn restore_book(&self, name: &str, backup_name: &str) -> Result<LedgerBook>;

    /// Optional helpers for ad-hoc file operations. Default
    /// implementations forward to the JSON format when not overridden.
    fn save_book_to_path(&self, book: &LedgerBook, path: &Path) -> Result<()> {
        json_backend::save_book_to_path(book, path)
    }

    fn load_book_from_path(&self, path: &Path) -> Result<LedgerBook> {
        json_backend::load_book_from_path(path)
    }
}

pub use json_backend::JsonStorage;
