//! REST front end for the instruction engine.
//!
//! Re-exports all modules so the binary (`main.rs`) and `cq-e2e-tests`
//! can reach `AppState`, `build_router` and the audit persistence layer.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
