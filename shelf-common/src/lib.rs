//! # Shelf Common Library
//!
//! Shared code for the shelf metadata tooling including:
//! - Error types
//! - Configuration file discovery and TOML loading
//! - Text normalization (cache keys, slugs, term lookup keys)
//! - ISBN normalization and conversion

pub mod config;
pub mod error;
pub mod isbn;
pub mod text;

pub use error::{Error, Result};
