//! Lip-Sync Streaming Client
//!
//! Says hello to a server, buffers its streams against the server clock and
//! plays them through a clocked renderer while stepping mouth shapes. Lines
//! typed on stdin are delivered as captions for the playing key.

use anyhow::Result;
use crossbeam_channel::bounded;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lipsync_streamer::{
    audio::ClockedRenderer,
    client::{spawn_decode_loop, spawn_drain_task, ClientSession, SessionConfig},
    clock::SystemClock,
    config::AppConfig,
    endpoints::EndpointManager,
    network::{create_socket, Datagram, PacketReceiver},
    playback::{EndpointConfig, PlaybackEndpoint},
    protocol::hello_packet,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lip-sync client");

    let config = AppConfig::load_or_default()?;
    let mut args = std::env::args().skip(1);
    let server_addr: SocketAddr = match args.next() {
        Some(addr) => addr.parse()?,
        None => config.network.server_addr,
    };
    let preferred_key = args.next().unwrap_or_else(|| "test-tone".to_string());

    let socket = Arc::new(create_socket(
        SocketAddr::new(config.network.bind_address, 0),
        config.network.recv_buffer_bytes,
    )?);
    let clock = SystemClock::shared();

    // Playback endpoint with its renderer
    let mut endpoint = PlaybackEndpoint::new(EndpointConfig::from(&config));
    let consumer = endpoint.take_renderer()?;
    let active_slot = Arc::new(AtomicUsize::new(config.viseme.neutral_index));
    let slot_for_callback = active_slot.clone();
    endpoint.set_weights_callback(move |weights| {
        let slot = weights
            .iter()
            .position(|w| *w > 0.0)
            .unwrap_or(usize::MAX);
        if slot_for_callback.swap(slot, Ordering::Relaxed) != slot {
            tracing::trace!("Mouth shape -> {}", slot);
        }
    });

    let manager = Arc::new(EndpointManager::new());
    let key = manager.register(endpoint, &preferred_key);

    let rendered_bytes = Arc::new(AtomicU64::new(0));
    let rendered_for_output = rendered_bytes.clone();
    let mut renderer = ClockedRenderer::start(consumer, config.playback.render_block_ms, move |_block, real| {
        rendered_for_output.fetch_add(real as u64, Ordering::Relaxed);
    })?;

    // Receive -> decode -> jitter buffer -> endpoint
    let session = Arc::new(ClientSession::new(
        SessionConfig::from(&config),
        clock.clone(),
        manager.clone(),
    ));
    let (packet_tx, packet_rx) = bounded::<Datagram>(4096);
    let mut receiver = PacketReceiver::start(socket.clone(), packet_tx)?;
    let decode_handle = spawn_decode_loop(session.clone(), packet_rx)?;
    let drain_task = spawn_drain_task(session.clone(), config.sync.drain_interval_ms);

    socket.send_to(&hello_packet(None)?, server_addr)?;
    tracing::info!("Hello sent to {}, playing key '{}'", server_addr, key);

    let mut update_ticker =
        tokio::time::interval(Duration::from_millis(config.playback.update_interval_ms.max(1)));
    update_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(5));
    stats_ticker.tick().await;

    // Lines typed on stdin become captions for the endpoint
    let mut captions = BufReader::new(tokio::io::stdin()).lines();
    let mut captions_open = true;

    loop {
        tokio::select! {
            _ = update_ticker.tick() => {
                manager.update_all(clock.now_us());
            }
            line = captions.next_line(), if captions_open => {
                match line {
                    Ok(Some(text)) => session.deliver_text(&key, text.trim()),
                    Ok(None) => captions_open = false,
                    Err(e) => {
                        tracing::warn!("Caption input closed: {}", e);
                        captions_open = false;
                    }
                }
            }
            _ = stats_ticker.tick() => {
                session.log_stats();
                if let Some(endpoint) = manager.get(&key) {
                    let endpoint = endpoint.lock();
                    let stats = endpoint.stats();
                    tracing::info!(
                        "Playback '{}': buffer={:.1}ms audio={:.0}ms (+{:.0}ms pad) visemes={} (+{} pad) delta={:.1}ms underruns={} rendered={}B",
                        key,
                        endpoint.buffered_ms(),
                        stats.audio_ms_received,
                        stats.audio_ms_padded,
                        stats.viseme_steps_received,
                        stats.viseme_steps_padded,
                        stats.delta_ms_total,
                        endpoint.underrun_count(),
                        rendered_bytes.load(Ordering::Relaxed)
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    drain_task.abort();
    receiver.stop();
    let _ = decode_handle.join();
    renderer.stop();
    manager.unregister(&key);
    session.log_stats();
    Ok(())
}
