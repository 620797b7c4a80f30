//! Common utilities and types shared across the zkshare crates.
//!
//! This module provides the error taxonomy used by every layer of the
//! client-side key-management core, plus the identifier types that the
//! crypto, storage and client crates exchange.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FileId, GrantPermissions, PrincipalId, SensitiveBytes};
