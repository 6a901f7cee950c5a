//! SQLite backing for the identity/subject registries and the attendance
//! ledger.
//!
//! Stands in for the portal's external relational store. The daily-uniqueness
//! invariant lives in the schema itself: `UNIQUE(roll_number, subject_id,
//! day)` means a racing reconcile can never produce a duplicate row, and
//! `append` reports a lost race instead of erroring.

use crate::registry::{
    AttendanceEntry, AttendanceLedger, Identity, IdentityRegistry, LedgerError, RegistryError,
    Subject, SubjectRegistry,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS student (
    roll_number TEXT PRIMARY KEY,
    name        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subject (
    subject_id  INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS attendance (
    record_id   INTEGER PRIMARY KEY,
    roll_number TEXT NOT NULL REFERENCES student(roll_number),
    subject_id  INTEGER NOT NULL REFERENCES subject(subject_id),
    day         TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    present     INTEGER NOT NULL DEFAULT 1,
    UNIQUE (roll_number, subject_id, day)
);
";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared connection wrapper; all access serializes on one mutex, which is
/// plenty for the request-parallel load this portal sees.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database file and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Register a student. Duplicate roll numbers are an error.
    pub fn add_student(&self, roll_number: &str, name: &str) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO student (roll_number, name) VALUES (?1, ?2)",
            (roll_number, name),
        )?;
        tracing::info!(roll_number, name, "student registered");
        Ok(())
    }

    /// Register a subject, returning its id.
    pub fn add_subject(&self, name: &str) -> Result<i64, DbError> {
        let conn = self.lock();
        conn.execute("INSERT INTO subject (name) VALUES (?1)", (name,))?;
        Ok(conn.last_insert_rowid())
    }

    /// Attendance rows for a subject on a day. Test and reporting helper.
    pub fn attendance_count(&self, subject_id: i64, day: NaiveDate) -> Result<u64, DbError> {
        let conn = self.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE subject_id = ?1 AND day = ?2",
            (subject_id, day.to_string()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl IdentityRegistry for Database {
    fn find_identity(&self, roll_number: &str) -> Result<Option<Identity>, RegistryError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT roll_number, name FROM student WHERE roll_number = ?1",
            (roll_number,),
            |row| {
                Ok(Identity {
                    roll_number: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| RegistryError::Backend(e.to_string()))
    }
}

impl SubjectRegistry for Database {
    fn find_subject(&self, name: &str) -> Result<Option<Subject>, RegistryError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT subject_id, name FROM subject WHERE name = ?1",
            (name,),
            |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| RegistryError::Backend(e.to_string()))
    }
}

impl AttendanceLedger for Database {
    fn exists(
        &self,
        roll_number: &str,
        subject_id: i64,
        day: NaiveDate,
    ) -> Result<bool, LedgerError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT 1 FROM attendance WHERE roll_number = ?1 AND subject_id = ?2 AND day = ?3",
            (roll_number, subject_id, day.to_string()),
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| LedgerError::Backend(e.to_string()))
    }

    fn append(&self, entries: &[AttendanceEntry]) -> Result<Vec<bool>, LedgerError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let recorded_at = Utc::now().to_rfc3339();
        let mut inserted = Vec::with_capacity(entries.len());
        for entry in entries {
            // OR IGNORE defers to the uniqueness constraint: a concurrent
            // writer that got there first turns this into a no-op.
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO attendance \
                     (roll_number, subject_id, day, recorded_at, present) \
                     VALUES (?1, ?2, ?3, ?4, 1)",
                    (
                        &entry.roll_number,
                        entry.subject_id,
                        entry.day.to_string(),
                        &recorded_at,
                    ),
                )
                .map_err(|e| LedgerError::Backend(e.to_string()))?;
            inserted.push(changed > 0);
        }

        tx.commit().map_err(|e| LedgerError::Backend(e.to_string()))?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn seeded() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.add_student("s1", "Alice").unwrap();
        db.add_student("s2", "Bob").unwrap();
        let math = db.add_subject("Math").unwrap();
        (db, math)
    }

    #[test]
    fn test_find_identity() {
        let (db, _) = seeded();
        let alice = db.find_identity("s1").unwrap().unwrap();
        assert_eq!(alice.name, "Alice");
        assert!(db.find_identity("nope").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_roll_number_rejected() {
        let (db, _) = seeded();
        assert!(db.add_student("s1", "Mallory").is_err());
    }

    #[test]
    fn test_find_subject() {
        let (db, math) = seeded();
        let subject = db.find_subject("Math").unwrap().unwrap();
        assert_eq!(subject.id, math);
        assert!(db.find_subject("History").unwrap().is_none());
    }

    #[test]
    fn test_append_then_exists() {
        let (db, math) = seeded();
        assert!(!db.exists("s1", math, day()).unwrap());

        let entry = AttendanceEntry {
            roll_number: "s1".into(),
            subject_id: math,
            day: day(),
        };
        assert_eq!(db.append(std::slice::from_ref(&entry)).unwrap(), vec![true]);
        assert!(db.exists("s1", math, day()).unwrap());

        // Same triple again: constraint holds, no second row.
        assert_eq!(db.append(&[entry]).unwrap(), vec![false]);
        assert_eq!(db.attendance_count(math, day()).unwrap(), 1);
    }

    #[test]
    fn test_append_batch_is_per_entry() {
        let (db, math) = seeded();
        let e1 = AttendanceEntry { roll_number: "s1".into(), subject_id: math, day: day() };
        let e2 = AttendanceEntry { roll_number: "s2".into(), subject_id: math, day: day() };

        db.append(std::slice::from_ref(&e1)).unwrap();
        assert_eq!(db.append(&[e1, e2]).unwrap(), vec![false, true]);
        assert_eq!(db.attendance_count(math, day()).unwrap(), 2);
    }

    #[test]
    fn test_same_identity_different_day_allowed() {
        let (db, math) = seeded();
        let monday = AttendanceEntry { roll_number: "s1".into(), subject_id: math, day: day() };
        let tuesday = AttendanceEntry {
            roll_number: "s1".into(),
            subject_id: math,
            day: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        };
        assert_eq!(db.append(&[monday, tuesday]).unwrap(), vec![true, true]);
    }

    #[test]
    fn test_concurrent_append_single_row_survives() {
        let (db, math) = seeded();
        let db = std::sync::Arc::new(db);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let db = std::sync::Arc::clone(&db);
                std::thread::spawn(move || {
                    let entry = AttendanceEntry {
                        roll_number: "s1".into(),
                        subject_id: math,
                        day: day(),
                    };
                    db.append(&[entry]).unwrap()
                })
            })
            .collect();

        let inserted: usize = threads
            .into_iter()
            .map(|t| t.join().unwrap().iter().filter(|&&b| b).count())
            .sum();

        assert_eq!(inserted, 1);
        assert_eq!(db.attendance_count(math, day()).unwrap(), 1);
    }
}
