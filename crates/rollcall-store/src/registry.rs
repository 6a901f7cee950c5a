//! Port traits for the external identity/subject registries and the
//! attendance ledger, plus the row types they exchange.

use chrono::NaiveDate;
use thiserror::Error;

/// A registered student: stable roll number plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub roll_number: String,
    pub name: String,
}

/// A subject as resolved by the academic-records side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
}

/// One attendance row to be created: at most one per
/// (roll_number, subject, day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub roll_number: String,
    pub subject_id: i64,
    pub day: NaiveDate,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry backend: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger backend: {0}")]
    Backend(String),
}

/// Lookup into the user-management subsystem.
pub trait IdentityRegistry {
    fn find_identity(&self, roll_number: &str) -> Result<Option<Identity>, RegistryError>;
}

/// Lookup into the academic-records subsystem.
pub trait SubjectRegistry {
    fn find_subject(&self, name: &str) -> Result<Option<Subject>, RegistryError>;
}

/// The reconciler's sole persistence interface.
pub trait AttendanceLedger {
    /// Whether an entry already exists for the triple.
    fn exists(&self, roll_number: &str, subject_id: i64, day: NaiveDate)
        -> Result<bool, LedgerError>;

    /// Insert entries as a single transaction. Returns, per entry, whether a
    /// row was actually created; `false` means the daily-uniqueness
    /// constraint already held (a concurrent writer got there first).
    fn append(&self, entries: &[AttendanceEntry]) -> Result<Vec<bool>, LedgerError>;
}
