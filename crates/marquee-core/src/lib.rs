//! Marquee Core - Adaptive Playback Engine
//!
//! This crate turns "play this item" into a working playback session
//! against a Jellyfin-compatible media server:
//! - Capability negotiation and playback method selection
//! - Adapter selection with ordered fallback when a stream stalls
//! - Health watchdog for sessions that load but never advance
//! - Live or reload-based audio and subtitle switching
//! - Intro/credits skipping and trickplay scrub previews
//! - Start, progress and stop reporting per play session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Marquee Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  PlayerHandle ──commands──┐        ┌──adapter events / timers   │
//! │                           v        v                            │
//! │                    ┌──────────────────────┐                     │
//! │                    │   PlaybackEngine     │                     │
//! │                    │  (single tokio task) │                     │
//! │                    └──────────┬───────────┘                     │
//! │                               │                                 │
//! │                    ┌──────────┴───────────┐                     │
//! │                    │ PlaybackCoordinator  │                     │
//! │                    └──────────┬───────────┘                     │
//! │                               │                                 │
//! │  ┌─────────────┐  ┌───────────┴──┐  ┌──────────────┐            │
//! │  │ Negotiator  │  │   Adapters   │  │   Watchdog   │            │
//! │  │ + StreamUrl │  │ generic/hls/ │  │  + Fallback  │            │
//! │  └─────────────┘  │    native    │  └──────────────┘            │
//! │                   └──────────────┘                              │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Tracks    │  │   Segments   │  │  Trickplay   │            │
//! │  └─────────────┘  └──────────────┘  └──────────────┘            │
//! │                                                                 │
//! │                    ┌──────────────────────┐                     │
//! │                    │ MediaServer (HTTP) + │                     │
//! │                    │  ProgressReporter    │                     │
//! │                    └──────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod profile;
pub mod api;
pub mod negotiator;
pub mod stream_url;
pub mod events;
pub mod adapter;
pub mod watchdog;
pub mod tracks;
pub mod segments;
pub mod trickplay;
pub mod reporter;
pub mod coordinator;
pub mod engine;

pub use error::{Error, PlaybackFailure, Result};
pub use types::*;
pub use config::EngineConfig;
pub use profile::DeviceCapabilityProfile;
pub use api::{HttpMediaServer, MediaServer, PlaybackInfo, PlaybackInfoRequest, PlaybackReport};
pub use negotiator::{CapabilityNegotiator, NegotiatedPlayback, NegotiationParams};
pub use stream_url::{StreamUrl, StreamUrlBuilder};
pub use events::{AdapterEvent, AdapterEventSender, EngineEvent};
pub use adapter::{AdapterKind, MediaAdapter, MediaSink, Platform};
pub use watchdog::{FallbackChain, HealthWatchdog, Verdict};
pub use tracks::{TrackChange, TrackInfo};
pub use segments::{SegmentSkipEngine, SkipAction, SkipTarget};
pub use trickplay::{ScrubPreview, TrickplayScrubber};
pub use reporter::ProgressReporter;
pub use coordinator::PlaybackCoordinator;
pub use engine::{NoopObserver, PlaybackEngine, PlayerHandle, PlayerObserver, PlayerStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library startup
pub fn init() {
    tracing::info!(version = VERSION, "Marquee Core initialized");
}
