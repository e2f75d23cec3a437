//! MP4 muxing of encoded access units, backed by `muxide`.

/// Lifecycle wrapper the encoder driver writes into.
pub mod sink;
