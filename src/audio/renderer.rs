//! Clocked render thread
//!
//! Stands in for a host audio device: pulls fixed-duration blocks from the
//! [`PcmConsumer`] at the nominal sample rate and hands them to an output
//! callback, running in its own dedicated thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::ring_buffer::PcmConsumer;
use crate::error::Result;

/// Blocks behind schedule before the deadline is re-anchored instead of caught up
const MAX_LAG_BLOCKS: u32 = 4;

/// Render thread driving a [`PcmConsumer`]
pub struct ClockedRenderer {
    running: Arc<AtomicBool>,
    blocks_rendered: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ClockedRenderer {
    /// Start pulling `block_ms` blocks. `output` receives each block and the
    /// number of leading bytes that were real audio.
    pub fn start<F>(mut consumer: PcmConsumer, block_ms: u32, mut output: F) -> Result<Self>
    where
        F: FnMut(&[u8], usize) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let blocks_rendered = Arc::new(AtomicU64::new(0));
        let block = Duration::from_millis(block_ms.max(1) as u64);

        let running_for_loop = running.clone();
        let blocks_for_loop = blocks_rendered.clone();
        let handle = thread::Builder::new()
            .name("renderer".into())
            .spawn(move || {
                let mut buf = Vec::new();
                let mut deadline = Instant::now();

                while running_for_loop.load(Ordering::Relaxed) {
                    let format = consumer.format();
                    let bytes = format.ms_to_bytes(block_ms.max(1) as f32);
                    buf.resize(bytes, 0);

                    let real = consumer.pull_into(&mut buf);
                    output(&buf, real);
                    blocks_for_loop.fetch_add(1, Ordering::Relaxed);

                    deadline += block;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else if now - deadline > block * MAX_LAG_BLOCKS {
                        tracing::debug!("Renderer fell behind, re-anchoring clock");
                        deadline = now;
                    }
                }
                tracing::debug!("Renderer thread exiting");
            })?;

        tracing::info!("Renderer started ({}ms blocks)", block_ms);
        Ok(Self {
            running,
            blocks_rendered,
            thread_handle: Some(handle),
        })
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClockedRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}
