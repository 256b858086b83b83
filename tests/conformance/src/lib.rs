//! Conformance suite support crate.
//!
//! The actual tests live under `tests/`; this library target is empty.
