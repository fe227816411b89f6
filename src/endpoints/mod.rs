//! Playback endpoint registry

pub mod manager;

pub use manager::{EndpointManager, SharedEndpoint};
