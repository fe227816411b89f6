//! Client playback: ring buffer feeding, progress tracking and mouth shapes

pub mod endpoint;
pub mod format;
pub mod progress;
pub mod viseme;

pub use endpoint::{AudioVisemeStats, EndpointConfig, PlaybackEndpoint, WeightsCallback};
pub use format::{FormatDecision, FormatSwitch, PendingFormat};
pub use progress::ConsumptionTracker;
pub use viseme::VisemeQueue;
