//! Instruction translation and safety engine.
//!
//! Turns free-text data-cleaning and query instructions into validated
//! operations on a clinical dataset:
//!
//! ```text
//! screen → classify → extract → compile → estimate → validate
//!                                                       │
//!              read-only ─── execute ◄───── approved ───┤
//!                                                       │
//!              destructive ─ gate ── confirm ── execute ┘
//! ```
//!
//! Every terminal outcome lands in the append-only audit log.

pub mod audit;
pub mod classifier;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod gate;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod safety;
pub mod screen;

pub use audit::{AuditStore, MemoryAuditLog};
pub use classifier::{Classification, IntentClassifier};
pub use compiler::compile;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use executor::{Execution, Executor, TableGuard};
pub use extractor::Extractor;
pub use gate::{ConfirmationGate, PendingPlan};
pub use pipeline::{Engine, Submission};
pub use registry::SchemaRegistry;
pub use safety::{ApprovedPlan, ConfirmationToken, SafetyLimits, SafetyValidator, ScopeEstimate};
