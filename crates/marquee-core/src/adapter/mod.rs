//! Media adapters
//!
//! One [`MediaAdapter`] contract with three implementations:
//!
//! - [`ElementAdapter`]: the platform's generic media element, limited to
//!   containers it decodes natively, no live track switching
//! - [`AdaptiveAdapter`]: manifest-based streams used for Transcode, with
//!   live switching between the manifest's audio renditions
//! - [`NativeAdapter`]: full-fidelity platform passthrough for containers or
//!   dynamic ranges the generic element cannot handle
//!
//! Adapters delegate the actual decoding to a [`MediaSink`] created by the
//! host's [`Platform`]. Which adapter plays a session is decided by
//! [`AdapterKind::select`], a pure table lookup.

mod adaptive;
mod element;
mod native;

pub use adaptive::{parse_audio_renditions, AdaptiveAdapter, AudioRendition};
pub use element::ElementAdapter;
pub use native::NativeAdapter;

use crate::{
    events::AdapterEventSender,
    profile::DeviceCapabilityProfile,
    types::*,
    Result,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Adapter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Generic media element
    Generic,
    /// Adaptive streaming (HLS)
    Adaptive,
    /// Platform-native passthrough
    Native,
}

impl AdapterKind {
    /// Decision table keyed by method, generic container compatibility and
    /// whether the content needs native passthrough.
    ///
    /// | method          | container ok | passthrough | adapter  |
    /// |-----------------|--------------|-------------|----------|
    /// | Transcode       | any          | any         | Adaptive |
    /// | Direct*         | yes          | no          | Generic  |
    /// | Direct*         | no           | any         | Native   |
    /// | Direct*         | any          | yes         | Native   |
    pub fn for_method(
        method: PlaybackMethod,
        container_compatible: bool,
        requires_passthrough: bool,
    ) -> Self {
        match (method, container_compatible, requires_passthrough) {
            (PlaybackMethod::Transcode, _, _) => AdapterKind::Adaptive,
            (_, true, false) => AdapterKind::Generic,
            (_, false, _) | (_, _, true) => AdapterKind::Native,
        }
    }

    /// Pick the adapter for a negotiated source
    pub fn select(
        method: PlaybackMethod,
        source: &MediaSource,
        profile: &DeviceCapabilityProfile,
    ) -> Self {
        Self::for_method(
            method,
            profile.element_supports_container(&source.container()),
            profile.requires_passthrough(source),
        )
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::Generic => write!(f, "generic"),
            AdapterKind::Adaptive => write!(f, "adaptive"),
            AdapterKind::Native => write!(f, "native"),
        }
    }
}

/// Options for [`MediaAdapter::load`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub mime_type: String,
    /// Container of the delivered stream
    pub container: String,
    /// Initial position in seconds within the delivered stream
    pub start_position: f64,
}

/// How a sink should pick a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    /// In-band stream by server index
    Stream(i32),
    /// Manifest audio rendition
    Rendition {
        group_id: String,
        name: String,
        language: Option<String>,
    },
    /// Turn the track type off
    Disabled,
}

/// Platform media primitive an adapter drives
#[async_trait]
pub trait MediaSink: Send {
    /// Open a stream and start buffering
    async fn open(&mut self, url: &Url, options: &LoadOptions) -> Result<()>;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Current position in seconds
    fn position(&self) -> f64;

    /// Duration in seconds when known
    fn duration(&self) -> Option<f64>;

    async fn select_audio(&mut self, track: &TrackSelector) -> Result<()>;

    async fn select_subtitle(&mut self, track: &TrackSelector) -> Result<()>;

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()>;

    /// Release the primitive
    async fn close(&mut self);
}

/// Host factory for media sinks
pub trait Platform: Send + Sync {
    /// Create a sink for an adapter; it reports through `events`
    fn create_sink(&self, kind: AdapterKind, events: AdapterEventSender) -> Box<dyn MediaSink>;
}

/// Playback contract shared by every adapter
#[async_trait]
pub trait MediaAdapter: Send {
    fn kind(&self) -> AdapterKind;

    /// Load a stream; rejection is an `AdapterLoadFailure`
    async fn load(&mut self, url: &Url, options: &LoadOptions) -> Result<()>;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Position in seconds within the delivered stream
    fn current_time(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    /// Whether audio can change without a reload
    fn supports_live_audio_switch(&self) -> bool;

    /// Whether this subtitle can be shown without a reload
    fn supports_live_subtitle_switch(&self, stream: &MediaStream) -> bool;

    async fn select_audio_track(&mut self, stream: &MediaStream) -> Result<()>;

    /// Select a subtitle stream, `None` turns subtitles off
    async fn select_subtitle_track(&mut self, stream: Option<&MediaStream>) -> Result<()>;

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()>;

    /// Release the adapter; it must not be used afterwards
    async fn destroy(&mut self);
}

/// Everything needed to build adapters
#[derive(Clone)]
pub struct AdapterFactory {
    platform: Arc<dyn Platform>,
    profile: DeviceCapabilityProfile,
    manifest_client: Option<Client>,
}

impl AdapterFactory {
    pub fn new(platform: Arc<dyn Platform>, profile: DeviceCapabilityProfile) -> Self {
        Self {
            platform,
            profile,
            manifest_client: None,
        }
    }

    /// Replace the profile used for container checks
    pub fn with_profile(mut self, profile: DeviceCapabilityProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Let adaptive adapters fetch master manifests for audio renditions
    pub fn with_manifest_client(mut self, client: Client) -> Self {
        self.manifest_client = Some(client);
        self
    }

    /// Build an adapter of the given kind
    pub fn create(&self, kind: AdapterKind, events: AdapterEventSender) -> Box<dyn MediaAdapter> {
        let sink = self.platform.create_sink(kind, events);
        match kind {
            AdapterKind::Generic => Box::new(ElementAdapter::new(
                sink,
                self.profile.element_containers.clone(),
            )),
            AdapterKind::Adaptive => {
                Box::new(AdaptiveAdapter::new(sink, self.manifest_client.clone()))
            }
            AdapterKind::Native => Box::new(NativeAdapter::new(sink)),
        }
    }
}
