//! Account and file storage contracts for zkshare.
//!
//! This module provides the async traits the client core talks to
//! ([`AccountDirectory`], [`FileStore`]) along with an in-memory and a
//! local JSON-file implementation.
//!
//! # Design Principles
//! - Zero knowledge: stores only ever hold ciphertext, public keys,
//!   password-sealed private keys and wrapped content keys
//! - One grant per (file, recipient); duplicates are conflicts
//! - Both stores share one policy implementation

pub mod local;
pub mod memory;
pub mod provider;
mod state;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use provider::{
    AccountDirectory, FileFetch, FileMetadata, FileStore, FileUpload, GrantRecord, GrantRequest,
    KeyAccess, LoginResponse, PrincipalRecord, Registration, SharedFile,
};

/// Default upload limit (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
