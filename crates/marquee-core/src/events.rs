//! Engine event plumbing
//!
//! Adapter notifications and timer ticks both reach the coordinator as
//! [`EngineEvent`]s on one channel. Each carries the generation of the
//! session that produced it so late arrivals from a superseded session are
//! dropped instead of acted on.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notification raised by a media adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// Media metadata loaded, playback can begin
    Loaded { duration: Option<f64> },

    /// Buffering started or finished
    Buffering { active: bool },

    /// Playback position moved
    TimeUpdate { seconds: f64 },

    /// Adaptive variant changed
    QualityChange { bitrate: Option<u64> },

    /// Audio rendition changed
    AudioTrackChange { index: i32 },

    /// Natural end of media
    Ended,

    /// Platform media error
    Error { message: String },
}

/// Periodic work scheduled by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Playback health check
    WatchdogCheck,
    /// Progress report heartbeat
    Heartbeat,
}

/// Message delivered to the coordinator's owning task
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Adapter { generation: u64, event: AdapterEvent },
    Timer { generation: u64, timer: TimerKind },
}

impl EngineEvent {
    /// Session generation that produced this event
    pub fn generation(&self) -> u64 {
        match self {
            EngineEvent::Adapter { generation, .. } | EngineEvent::Timer { generation, .. } => {
                *generation
            }
        }
    }
}

/// Sender half of the engine event channel
pub type EngineEventTx = mpsc::UnboundedSender<EngineEvent>;

/// Receiver half of the engine event channel
pub type EngineEventRx = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the engine event channel
pub fn channel() -> (EngineEventTx, EngineEventRx) {
    mpsc::unbounded_channel()
}

/// Event sender handed to one adapter, stamped with its session generation
#[derive(Debug, Clone)]
pub struct AdapterEventSender {
    generation: u64,
    tx: EngineEventTx,
}

impl AdapterEventSender {
    pub fn new(generation: u64, tx: EngineEventTx) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Send an event; a closed channel means the engine is gone
    pub fn send(&self, event: AdapterEvent) {
        let _ = self.tx.send(EngineEvent::Adapter {
            generation: self.generation,
            event,
        });
    }
}
