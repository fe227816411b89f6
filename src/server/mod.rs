//! Server side: stream registry and frame distribution

pub mod distributor;
pub mod registry;

pub use distributor::{DistributorConfig, FrameDistributor, IngestStats, PushSummary};
pub use registry::{LogicalStream, StreamRegistry};
