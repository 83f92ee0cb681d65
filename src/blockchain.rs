// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// block types, storage and verification.

pub mod core;
pub use self::core::*;
