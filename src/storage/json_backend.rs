use chrono::{DateTime, NaiveDateTime, Utc};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::budget::BudgetCollection;
use crate::domain::ledger::LedgerBook;
use crate::errors::LedgerError;
use crate::utils::{app_data_dir, ensure_dir};

use super::{Result, StorageBackend};

const BACKUP_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";
const TMP_SUFFIX: &str = "tmp";
const DEFAULT_RETENTION: usize = 5;

const BOOKS_DIR: &str = "books";
const BUDGETS_DIR: &str = "budgets";
const BACKUPS_DIR: &str = "backups";

/// JSON file storage with atomic writes and timestamped backups.
#[derive(Clone)]
pub struct JsonStorage {
    books_dir: PathBuf,
    budgets_dir: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl JsonStorage {
    pub fn new(root: Option<PathBuf>, retention: Option<usize>) -> Result<Self> {
        let root = root.unwrap_or_else(app_data_dir);
        ensure_dir(&root)?;
        let books_dir = root.join(BOOKS_DIR);
        let budgets_dir = root.join(BUDGETS_DIR);
        let backups_dir = root.join(BACKUPS_DIR);
        ensure_dir(&books_dir)?;
        ensure_dir(&budgets_dir)?;
        ensure_dir(&backups_dir)?;
        Ok(Self {
            books_dir,
            budgets_dir,
            backups_dir,
            retention: retention.unwrap_or(DEFAULT_RETENTION).max(1),
        })
    }

    pub fn new_default() -> Result<Self> {
        Self::new(None, None)
    }

    pub fn book_path(&self, name: &str) -> PathBuf {
        self.books_dir
            .join(format!("{}.json", canonical_name(name)))
    }

    pub fn budgets_path(&self, name: &str) -> PathBuf {
        self.budgets_dir
            .join(format!("{}.json", canonical_name(name)))
    }

    fn backup_dir(&self, name: &str) -> PathBuf {
        self.backups_dir.join(canonical_name(name))
    }

    pub fn backup_path(&self, name: &str, backup_name: &str) -> PathBuf {
        self.backup_dir(name).join(backup_name)
    }

    fn write_backup_file(
        &self,
        book: &LedgerBook,
        name: &str,
        note: Option<&str>,
    ) -> Result<()> {
        let dir = self.backup_dir(name);
        ensure_dir(&dir)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let mut file_stem = format!("{}_{}", canonical_name(name), timestamp);
        if let Some(label) = sanitize_backup_note(note) {
            file_stem.push('_');
            file_stem.push_str(&label);
        }
        let path = dir.join(format!("{}.{}", file_stem, BACKUP_EXTENSION));
        let json = serde_json::to_string_pretty(book)?;
        write_atomic(&path, &json)?;
        self.prune_backups(name)?;
        Ok(())
    }

    fn prune_backups(&self, name: &str) -> Result<()> {
        let backups = self.list_backups(name)?;
        if backups.len() <= self.retention {
            return Ok(());
        }
        for entry in backups.iter().skip(self.retention) {
            let path = self.backup_path(name, entry);
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

impl StorageBackend for JsonStorage {
    fn save_book(&self, book: &LedgerBook, name: &str) -> Result<()> {
        let path = self.book_path(name);
        save_book_to_path(book, &path)?;
        tracing::info!(book = %book.name, path = %path.display(), "saved ledger book");
        Ok(())
    }

    fn load_book(&self, name: &str) -> Result<LedgerBook> {
        let path = self.book_path(name);
        if !path.exists() {
            return Err(LedgerError::Storage(format!(
                "ledger book `{name}` not found at {}",
                path.display()
            )));
        }
        load_book_from_path(&path)
    }

    fn save_budgets(&self, budgets: &BudgetCollection, name: &str) -> Result<()> {
        let path = self.budgets_path(name);
        let json = serde_json::to_string_pretty(budgets)?;
        let tmp = tmp_path(&path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_budgets(&self, name: &str) -> Result<BudgetCollection> {
        let path = self.budgets_path(name);
        if !path.exists() {
            return Err(LedgerError::Storage(format!(
                "budget collection `{name}` not found at {}",
                path.display()
            )));
        }
        let data = fs::read_to_string(&path)?;
        let budgets: BudgetCollection = serde_json::from_str(&data)?;
        Ok(budgets)
    }

    fn list_backups(&self, name: &str) -> Result<Vec<String>> {
        let dir = self.backup_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }
            let file_name = match path.file_name().and_then(|stem| stem.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            entries.push(file_name);
        }
        entries.sort_by(|a, b| parse_backup_timestamp(b).cmp(&parse_backup_timestamp(a)));
        Ok(entries)
    }

    fn backup_book(&self, book: &LedgerBook, name: &str, note: Option<&str>) -> Result<()> {
        self.write_backup_file(book, name, note)
    }

    fn restore_book(&self, name: &str, backup_name: &str) -> Result<LedgerBook> {
        let backup_path = self.backup_path(name, backup_name);
        if !backup_path.exists() {
            return Err(LedgerError::Storage(format!(
                "backup `{backup_name}` not found"
            )));
        }
        let target = self.book_path(name);
        fs::copy(&backup_path, &target)?;
        load_book_from_path(&target)
    }
}

pub fn save_book_to_path(book: &LedgerBook, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(book)?;
    let tmp = tmp_path(path);
    write_atomic(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a book and re-checks the dated-line ordering invariant; files
/// that violate it surface a data-format error rather than a repaired
/// aggregate.
pub fn load_book_from_path(path: &Path) -> Result<LedgerBook> {
    let data = fs::read_to_string(path)?;
    let book: LedgerBook = serde_json::from_str(&data)?;
    book.validate_dated_order()?;
    Ok(book)
}

fn canonical_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            _ => '_',
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        "book".into()
    } else {
        sanitized
    }
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    if raw.is_empty() {
        return None;
    }
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if ch.is_whitespace() || matches!(ch, '-' | '.') {
            if !sanitized.is_empty() && !last_dash {
                sanitized.push('-');
                last_dash = true;
            }
        }
    }
    let trimmed = sanitized.trim_matches('-').to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 3 {
        return None;
    }
    let date_part = parts.get(parts.len() - 2)?;
    let time_part = parts.last()?;
    if !is_digits(date_part, 8) || !time_part.ends_with(".json") {
        return None;
    }
    let time_digits = &time_part[..time_part.len() - 5];
    if !is_digits(time_digits, 4) {
        return None;
    }
    let raw = format!("{}{}", date_part, time_digits);
    NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::{BucketKind, BudgetBucket};
    use crate::domain::budget::{BudgetModel, Expense};
    use crate::domain::ledger::{BankBalance, LedgerEntryLine};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn storage_with_temp_dir() -> (JsonStorage, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let storage =
            JsonStorage::new(Some(temp.path().to_path_buf()), Some(3)).expect("json storage");
        (storage, temp)
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn sample_book() -> LedgerBook {
        let mut book = LedgerBook::new("Smith Household");
        book.add_ledger(Arc::new(
            BudgetBucket::new("CAR", "Car maintenance", BucketKind::SavedUpForExpense)
                .expect("valid bucket"),
        ));
        book.prepend_line(LedgerEntryLine::new(
            date(2013, 8, 15),
            vec![BankBalance::new("CHEQUE", dec!(2400))],
        ));
        book
    }

    #[test]
    fn save_and_load_book_roundtrip() {
        let (storage, _guard) = storage_with_temp_dir();
        storage
            .save_book(&sample_book(), "household")
            .expect("save book");
        let loaded = storage.load_book("household").expect("load book");
        assert_eq!(loaded.name, "Smith Household");
        assert_eq!(loaded.dated_entries().len(), 1);
        assert!(loaded.is_tracked("CAR"));
    }

    #[test]
    fn load_missing_book_is_a_storage_error() {
        let (storage, _guard) = storage_with_temp_dir();
        let err = storage
            .load_book("nope")
            .expect_err("missing book should fail");
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn save_and_load_budgets_roundtrip() {
        let (storage, _guard) = storage_with_temp_dir();
        let mut budgets = BudgetCollection::new();
        let mut model = BudgetModel::new("Test Budget", date(2014, 1, 1));
        model.add_expense(Expense::new(
            Arc::new(
                BudgetBucket::new("POWER", "Electricity", BucketKind::SpentPerPeriodExpense)
                    .expect("valid bucket"),
            ),
            dec!(175),
        ));
        budgets.add(model);
        storage
            .save_budgets(&budgets, "household")
            .expect("save budgets");

        let loaded = storage.load_budgets("household").expect("load budgets");
        assert_eq!(loaded.len(), 1);
        let found = loaded.for_date(date(2014, 6, 1)).expect("budget applies");
        assert_eq!(found.budgeted_amount("POWER"), dec!(175));
    }

    #[test]
    fn out_of_order_book_files_are_rejected() {
        let (storage, guard) = storage_with_temp_dir();
        let mut book = sample_book();
        // Corrupt the history: append an older line behind the newest by
        // writing the JSON with dates swapped.
        book.prepend_line(LedgerEntryLine::new(
            date(2013, 9, 15),
            vec![BankBalance::new("CHEQUE", dec!(1850.50))],
        ));
        let json = serde_json::to_string_pretty(&book).expect("serialize book");
        let broken = json.replacen("2013-09-15", "2013-01-15", 1);
        let path = guard.path().join("books").join("broken.json");
        fs::write(&path, broken).expect("write broken file");

        let err = storage
            .load_book("broken")
            .expect_err("out-of-order file should fail");
        assert!(matches!(err, LedgerError::DataFormat(_)));
    }

    #[test]
    fn backup_writes_timestamped_files_and_prunes() {
        let (storage, _guard) = storage_with_temp_dir();
        let book = sample_book();
        storage.save_book(&book, "family").expect("save book");
        for round in 0..5 {
            storage
                .backup_book(&book, "family", Some(&format!("round {round}")))
                .expect("create backup");
        }
        let backups = storage.list_backups("family").expect("list backups");
        assert!(!backups.is_empty());
        assert!(backups.len() <= 3, "retention should prune: {backups:?}");
        assert!(backups[0].starts_with("family_"));
    }

    #[test]
    fn restore_replaces_the_managed_file() {
        let (storage, _guard) = storage_with_temp_dir();
        let book = sample_book();
        storage.save_book(&book, "family").expect("save book");
        storage
            .backup_book(&book, "family", None)
            .expect("create backup");
        let backups = storage.list_backups("family").expect("list backups");
        let restored = storage
            .restore_book("family", &backups[0])
            .expect("restore backup");
        assert_eq!(restored.name, "Smith Household");
    }
}
