//! Endpoint registration and media routing

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use uuid::Uuid;

use crate::client::MediaSink;
use crate::playback::PlaybackEndpoint;

/// Endpoint handle shared between the router and the application tick
pub type SharedEndpoint = Arc<Mutex<PlaybackEndpoint>>;

/// Registry of playback endpoints keyed by stream key
pub struct EndpointManager {
    endpoints: DashMap<String, SharedEndpoint>,
    /// Target for media that arrives without a key
    default_key: RwLock<Option<String>>,
}

impl EndpointManager {
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            default_key: RwLock::new(None),
        }
    }

    /// Register an endpoint under `preferred_key`, or under a generated
    /// `aud-<uuid>` key when the preferred one is empty or taken. Returns the key.
    pub fn register(&self, mut endpoint: PlaybackEndpoint, preferred_key: &str) -> String {
        let mut key = preferred_key.to_string();
        loop {
            if key.is_empty() {
                key = format!("aud-{}", Uuid::new_v4().simple());
            }
            match self.endpoints.entry(key.clone()) {
                Entry::Occupied(_) => {
                    tracing::debug!("Endpoint key {} taken, generating one", key);
                    key.clear();
                }
                Entry::Vacant(vacant) => {
                    endpoint.set_key(key.clone());
                    vacant.insert(Arc::new(Mutex::new(endpoint)));
                    break;
                }
            }
        }
        tracing::info!("Playback endpoint registered: {}", key);
        key
    }

    /// Remove an endpoint, stopping its playback. Returns false for an unknown key.
    pub fn unregister(&self, key: &str) -> bool {
        let Some((_, endpoint)) = self.endpoints.remove(key) else {
            return false;
        };
        endpoint.lock().stop();

        let mut default_key = self.default_key.write();
        if default_key.as_deref() == Some(key) {
            *default_key = None;
        }
        tracing::info!("Playback endpoint unregistered: {}", key);
        true
    }

    pub fn get(&self, key: &str) -> Option<SharedEndpoint> {
        self.endpoints.get(key).map(|entry| entry.value().clone())
    }

    pub fn set_default_key(&self, key: Option<String>) {
        *self.default_key.write() = key;
    }

    /// Resolve a routing key. An empty key falls back to the default key, then
    /// to the only registered endpoint.
    pub fn resolve(&self, key: &str) -> Option<SharedEndpoint> {
        if !key.is_empty() {
            return self.get(key);
        }
        if let Some(default_key) = self.default_key.read().as_deref() {
            return self.get(default_key);
        }
        if self.endpoints.len() == 1 {
            return self.endpoints.iter().next().map(|entry| entry.value().clone());
        }
        None
    }

    fn with_endpoint<R>(&self, key: &str, f: impl FnOnce(&mut PlaybackEndpoint) -> R) -> Option<R> {
        match self.resolve(key) {
            Some(endpoint) => {
                let mut guard = endpoint.lock();
                Some(f(&mut guard))
            }
            None => {
                tracing::debug!("No playback endpoint for key '{}'", key);
                None
            }
        }
    }

    pub fn push_pcm(&self, key: &str, pcm: &[u8], sample_rate: u32, channels: u16) -> bool {
        self.with_endpoint(key, |endpoint| {
            endpoint.push_pcm(pcm, sample_rate, channels);
        })
        .is_some()
    }

    pub fn push_text(&self, key: &str, text: &str) -> bool {
        self.with_endpoint(key, |endpoint| endpoint.push_text(text))
            .is_some()
    }

    pub fn push_visemes(&self, key: &str, indices: &[i32], confidence: &[f32]) -> bool {
        self.with_endpoint(key, |endpoint| {
            endpoint.push_visemes(indices, confidence);
        })
        .is_some()
    }

    /// Run the application tick on every endpoint
    pub fn update_all(&self, now_us: u64) {
        for entry in self.endpoints.iter() {
            entry.value().lock().update(now_us);
        }
    }

    pub fn stop_all(&self) {
        for entry in self.endpoints.iter() {
            entry.value().lock().stop();
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.endpoints.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for EndpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSink for EndpointManager {
    fn on_pcm(&self, key: &str, pcm: &[u8], sample_rate: u32, channels: u16) {
        self.push_pcm(key, pcm, sample_rate, channels);
    }

    fn on_text(&self, key: &str, text: &str) {
        self.push_text(key, text);
    }

    fn on_viseme(&self, key: &str, indices: &[i32], confidence: &[f32]) {
        self.push_visemes(key, indices, confidence);
    }
}
