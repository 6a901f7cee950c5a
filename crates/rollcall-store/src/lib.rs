//! rollcall-store — persistence for the attendance core.
//!
//! Three storage surfaces: the on-disk face Sample Store, the versioned
//! Model Artifact, and the SQLite-backed identity/subject registries and
//! attendance ledger. The registry and ledger are exposed as traits so the
//! engine stays independent of the backing relational store.

pub mod db;
pub mod model;
pub mod registry;
pub mod samples;

pub use db::{Database, DbError};
pub use model::{ModelArtifact, ModelError};
pub use registry::{
    AttendanceEntry, AttendanceLedger, Identity, IdentityRegistry, LedgerError, RegistryError,
    Subject, SubjectRegistry,
};
pub use samples::{SampleStore, SampleStoreError};
