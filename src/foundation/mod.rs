//! Shared value types and the error taxonomy.

/// Frame indices, fps, timestamps and dimensions.
pub mod core;
/// Error taxonomy and result alias.
pub mod error;
