//! Foundation utilities for the grit object & reference engine.
//!
//! Lock files, temp files, git dates and signatures, and the cancellation
//! token threaded through long-running operations.

pub mod cancel;
pub mod date;
pub mod error;
pub mod lockfile;
pub mod tempfile;

pub use cancel::CancelToken;
pub use error::{LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
