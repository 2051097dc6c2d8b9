//! Shared types

mod error;

pub use error::{CacheError, Result};
