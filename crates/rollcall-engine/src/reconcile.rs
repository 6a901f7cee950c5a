//! Attendance reconciler: recognized identities in, at-most-one ledger row
//! per (identity, subject, day) out.

use crate::recognize::Recognition;
use chrono::NaiveDate;
use rollcall_store::{
    AttendanceEntry, AttendanceLedger, IdentityRegistry, LedgerError, RegistryError,
    SubjectRegistry,
};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("subject {0:?} not found")]
    SubjectNotFound(String),
    #[error("no known students were recognized with sufficient confidence")]
    NothingRecognized,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkStatus {
    /// A new attendance entry was created by this call.
    Marked,
    /// An entry for this (identity, subject, day) already existed — either
    /// from an earlier call or from a concurrent one that won the race.
    AlreadyMarked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    pub roll_number: String,
    pub name: String,
    pub status: MarkStatus,
}

/// Reconciles recognizer output against the attendance ledger.
pub struct Reconciler<'a> {
    students: &'a dyn IdentityRegistry,
    subjects: &'a dyn SubjectRegistry,
    ledger: &'a dyn AttendanceLedger,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        students: &'a dyn IdentityRegistry,
        subjects: &'a dyn SubjectRegistry,
        ledger: &'a dyn AttendanceLedger,
    ) -> Self {
        Self { students, subjects, ledger }
    }

    /// Record attendance for each recognized identity, once per day.
    ///
    /// Unknown faces are dropped silently. Recognized roll numbers that no
    /// longer resolve in the registry are skipped (stale model). All new
    /// entries commit as one transaction; a concurrent reconcile for the
    /// same triple is resolved by the ledger's uniqueness guarantee and
    /// reported as [`MarkStatus::AlreadyMarked`].
    pub fn reconcile(
        &self,
        subject_name: &str,
        recognitions: &[Recognition],
        day: NaiveDate,
    ) -> Result<Vec<MarkOutcome>, ReconcileError> {
        let subject = self
            .subjects
            .find_subject(subject_name)?
            .ok_or_else(|| ReconcileError::SubjectNotFound(subject_name.to_string()))?;

        // The same student may appear in several detected faces; attendance
        // is per identity, so collapse to the distinct roll numbers.
        let rolls: BTreeSet<&str> = recognitions
            .iter()
            .filter_map(|r| r.roll_number.as_deref())
            .collect();

        let mut outcomes = Vec::new();
        let mut pending: Vec<(usize, AttendanceEntry)> = Vec::new();

        for roll_number in rolls {
            let Some(identity) = self.students.find_identity(roll_number)? else {
                tracing::debug!(roll_number, "recognized label no longer registered, skipping");
                continue;
            };

            if self.ledger.exists(roll_number, subject.id, day)? {
                outcomes.push(MarkOutcome {
                    roll_number: identity.roll_number,
                    name: identity.name,
                    status: MarkStatus::AlreadyMarked,
                });
            } else {
                let index = outcomes.len();
                outcomes.push(MarkOutcome {
                    roll_number: identity.roll_number.clone(),
                    name: identity.name,
                    status: MarkStatus::Marked,
                });
                pending.push((
                    index,
                    AttendanceEntry {
                        roll_number: identity.roll_number,
                        subject_id: subject.id,
                        day,
                    },
                ));
            }
        }

        if outcomes.is_empty() {
            return Err(ReconcileError::NothingRecognized);
        }

        if !pending.is_empty() {
            let entries: Vec<AttendanceEntry> =
                pending.iter().map(|(_, e)| e.clone()).collect();
            let inserted = self.ledger.append(&entries)?;

            // A false flag means another reconcile created the row between
            // our existence check and the insert.
            for ((index, _), created) in pending.iter().zip(inserted) {
                if !created {
                    outcomes[*index].status = MarkStatus::AlreadyMarked;
                }
            }
        }

        tracing::info!(
            subject = subject_name,
            %day,
            marked = outcomes.iter().filter(|o| o.status == MarkStatus::Marked).count(),
            already = outcomes.iter().filter(|o| o.status == MarkStatus::AlreadyMarked).count(),
            "attendance reconciled"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::recognition;
    use rollcall_store::Database;
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.add_student("s1", "Alice").unwrap();
        db.add_student("s2", "Bob").unwrap();
        db.add_subject("Math").unwrap();
        db
    }

    #[test]
    fn test_unknown_subject() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);
        let err = reconciler
            .reconcile("History", &[recognition(Some("s1"))], day())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::SubjectNotFound(_)));
    }

    #[test]
    fn test_marked_then_already_marked() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);

        let first = reconciler
            .reconcile("Math", &[recognition(Some("s1"))], day())
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, MarkStatus::Marked);
        assert_eq!(first[0].name, "Alice");

        let second = reconciler
            .reconcile("Math", &[recognition(Some("s1"))], day())
            .unwrap();
        assert_eq!(second[0].status, MarkStatus::AlreadyMarked);

        let subject = rollcall_store::SubjectRegistry::find_subject(&db, "Math")
            .unwrap()
            .unwrap();
        assert_eq!(db.attendance_count(subject.id, day()).unwrap(), 1);
    }

    #[test]
    fn test_unknown_faces_dropped_silently() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);

        let outcomes = reconciler
            .reconcile(
                "Math",
                &[recognition(None), recognition(Some("s1")), recognition(None)],
                day(),
            )
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].roll_number, "s1");
    }

    #[test]
    fn test_only_unknowns_is_nothing_recognized() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);
        let err = reconciler
            .reconcile("Math", &[recognition(None)], day())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NothingRecognized));
    }

    #[test]
    fn test_stale_label_skipped() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);
        // "s9" was in the model's label space but is no longer registered.
        let err = reconciler
            .reconcile("Math", &[recognition(Some("s9"))], day())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NothingRecognized));
    }

    #[test]
    fn test_duplicate_recognitions_collapse() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);
        let outcomes = reconciler
            .reconcile(
                "Math",
                &[recognition(Some("s1")), recognition(Some("s1"))],
                day(),
            )
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, MarkStatus::Marked);
    }

    #[test]
    fn test_batch_marks_multiple_students() {
        let db = seeded();
        let reconciler = Reconciler::new(&db, &db, &db);
        let outcomes = reconciler
            .reconcile(
                "Math",
                &[recognition(Some("s2")), recognition(Some("s1"))],
                day(),
            )
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == MarkStatus::Marked));
    }

    #[test]
    fn test_concurrent_reconcile_single_entry_survives() {
        let db = Arc::new(seeded());

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    let reconciler = Reconciler::new(&*db, &*db, &*db);
                    reconciler
                        .reconcile("Math", &[recognition(Some("s1"))], day())
                        .unwrap()
                })
            })
            .collect();

        let marked: usize = threads
            .into_iter()
            .map(|t| {
                t.join()
                    .unwrap()
                    .iter()
                    .filter(|o| o.status == MarkStatus::Marked)
                    .count()
            })
            .sum();

        // Exactly one thread creates the row; the rest observe it.
        assert_eq!(marked, 1);
        let subject = rollcall_store::SubjectRegistry::find_subject(&*db, "Math")
            .unwrap()
            .unwrap();
        assert_eq!(db.attendance_count(subject.id, day()).unwrap(), 1);
    }
}
