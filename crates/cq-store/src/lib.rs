//! Data-source layer for ClinQuery.
//!
//! The engine reaches stored data only through the `DataSource` trait
//! (`read_rows`, `write_rows`, `get_schema`), submitting structured
//! `RowFilter`s and `Mutation`s rather than backend query syntax.
//! `MemoryStore` is the in-process backend; it applies every mutation
//! atomically and can be seeded from a JSON snapshot or the bundled
//! clinical-trial sample. `checks` and `clarification` turn a dataset into
//! graded findings and the data-clarification requests sent to sites.

pub mod checks;
pub mod clarification;
pub mod error;
pub mod eval;
pub mod memory;
pub mod quality;
pub mod sample;
pub mod source;

pub use checks::{DatasetReport, IssueSeverity, QualityIssue};
pub use clarification::ClarificationRequest;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, TableData};
pub use quality::QualityReport;
pub use source::{DataSource, Mutation, RowFilter};
