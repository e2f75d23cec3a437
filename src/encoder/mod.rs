//! Encoder lifecycle and output draining.

/// State machine around an [`crate::codec::backend::EncoderBackend`].
pub mod driver;
