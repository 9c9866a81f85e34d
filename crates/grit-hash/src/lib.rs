//! Object identity for the grit engine.
//!
//! This crate provides the `ObjectId` type — the 20-byte SHA-1 content
//! address every object, packfile, and reference resolves to — along with
//! hex encoding/decoding, streaming hash computation, and the fan-out
//! table used by pack indexes.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use hasher::Hasher;
pub use oid::ObjectId;

/// Length of a raw hash in bytes.
pub const HASH_LEN: usize = 20;

/// Length of a hash in hex form.
pub const HEX_LEN: usize = 40;
