//! # bongo-api
//!
//! Service layer for bongo-notes: ownership-checked note operations wired to
//! the version-history pipeline. The `bongo-notes` binary in this crate is the
//! operator entry point.

pub mod services;

pub use services::NotesService;
