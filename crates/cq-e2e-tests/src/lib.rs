//! End-to-end tests live under `tests/`; they drive the HTTP router,
//! the engine and the in-memory store together.
