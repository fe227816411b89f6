//! Client side: clock sync, jitter buffering and media dispatch

pub mod clock_sync;
pub mod jitter;
pub mod session;

pub use clock_sync::ClockOffsetEstimator;
pub use jitter::{ClientStreamState, DrainedMedia, JitterBuffer, JitterStats, PendingFrame, StreamPhase};
pub use session::{ClientSession, ClientStats, MediaSink, SessionConfig};

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::network::Datagram;

/// Periodic jitter drain on the tokio runtime. A late tick only delays release.
pub fn spawn_drain_task(session: Arc<ClientSession>, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            session.drain();
        }
    })
}

/// Decode loop fed by a receive thread (or an in-process loopback). Exits when
/// every sender is gone.
pub fn spawn_decode_loop(session: Arc<ClientSession>, rx: Receiver<Datagram>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("client-decode".into())
        .spawn(move || {
            while let Ok(datagram) = rx.recv() {
                session.handle_datagram(&datagram.data);
            }
            tracing::debug!("Decode loop exiting");
        })?;
    Ok(handle)
}
