//! Storage Layer
//!
//! Config file persistence, credential encryption, and advisory locks for
//! the shared state files.

pub mod config;
pub mod credentials;
pub mod lock;

pub use config::*;
pub use credentials::{CredentialCipher, DecryptionError, MachineIdentity};
pub use lock::{FileLock, LockError};
