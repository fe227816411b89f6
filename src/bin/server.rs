//! Lip-Sync Streaming Server
//!
//! Listens for client hellos and streams a sine test tone with cycling mouth
//! shapes under one stream key.

use anyhow::Result;
use crossbeam_channel::bounded;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lipsync_streamer::{
    audio::{PcmFormat, SineGenerator},
    clock::SystemClock,
    config::AppConfig,
    network::{create_socket, Datagram, PacketReceiver, PacketTransport, UdpSender},
    server::{DistributorConfig, FrameDistributor},
};

/// Audio pushed per tick
const TONE_CHUNK_MS: u32 = 100;
const TONE_FREQUENCY_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.3;
/// Steps each mouth shape is held in the test pattern
const SHAPE_HOLD_STEPS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lip-sync server");

    let config = AppConfig::load_or_default()?;
    let key = std::env::args().nth(1).unwrap_or_else(|| "test-tone".to_string());

    let bind = SocketAddr::new(config.network.bind_address, config.network.udp_port);
    let socket = Arc::new(create_socket(bind, config.network.recv_buffer_bytes)?);
    let sender = Arc::new(UdpSender::new(socket.clone()));
    let transport: Arc<dyn PacketTransport> = sender.clone();

    let distributor = Arc::new(FrameDistributor::new(
        DistributorConfig::from(&config),
        SystemClock::shared(),
        Some(transport),
    ));

    // Hellos arrive on the media socket
    let (packet_tx, packet_rx) = bounded::<Datagram>(1024);
    let mut receiver = PacketReceiver::start(socket, packet_tx)?;
    let control = distributor.clone();
    let control_handle = tokio::task::spawn_blocking(move || {
        while let Ok(datagram) = packet_rx.recv() {
            control.handle_datagram(&datagram);
        }
    });

    tracing::info!("Listening on {}, streaming key '{}'", bind, key);

    let format = PcmFormat::new(
        config.playback.default_sample_rate,
        config.playback.default_channels,
    );
    let mut tone = SineGenerator::new(format, TONE_FREQUENCY_HZ, TONE_AMPLITUDE);
    let step_ms = config.viseme.step_ms.max(1) as u64;
    let slot_count = config.viseme.slot_count.max(1);
    let mut audio_ms_sent: u64 = 0;
    let mut steps_sent: u64 = 0;

    let mut tone_ticker = tokio::time::interval(Duration::from_millis(TONE_CHUNK_MS as u64));
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(5));
    stats_ticker.tick().await;

    loop {
        tokio::select! {
            _ = tone_ticker.tick() => {
                let pcm = tone.generate(TONE_CHUNK_MS);
                if let Err(e) = distributor.push(&key, &pcm, Some(format.sample_rate), Some(format.channels)) {
                    tracing::warn!("Push failed for '{}': {}", key, e);
                    continue;
                }
                audio_ms_sent += TONE_CHUNK_MS as u64;

                // One mouth shape per step of audio sent so far
                let due = audio_ms_sent / step_ms;
                let indices: Vec<i32> = (steps_sent..due)
                    .map(|step| ((step as usize / SHAPE_HOLD_STEPS) % slot_count) as i32)
                    .collect();
                steps_sent = due;
                distributor.push_visemes(&key, &indices, &[]);
            }
            _ = stats_ticker.tick() => {
                distributor.log_stats("periodic");
                let stats = sender.stats();
                tracing::info!(
                    "Sender: {} packets, {} bytes, {} errors, {} received",
                    stats.packets_sent.load(Ordering::Relaxed),
                    stats.bytes_sent.load(Ordering::Relaxed),
                    stats.send_errors.load(Ordering::Relaxed),
                    receiver.stats().packets_received.load(Ordering::Relaxed)
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    receiver.stop();
    let _ = control_handle.await;
    distributor.close_stream(&key);
    distributor.log_stats("final");
    Ok(())
}
