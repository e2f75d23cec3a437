//! Ordered image loading.

/// Lazy image decoding with skip-on-failure semantics.
pub mod frames;
