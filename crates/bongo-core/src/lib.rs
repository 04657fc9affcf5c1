//! # bongo-core
//!
//! Core types, traits, and the error taxonomy for bongo-notes.
//!
//! This crate provides the data structures and trait definitions shared by the
//! content store, the update worker and the notes service.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
