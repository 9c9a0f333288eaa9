//! Session progress reporting
//!
//! One reporter per playback session. Notifications are fire-and-forget:
//! each is sent on its own task, failures are logged and dropped, and
//! nothing is retried. The stop notification consumes the reporter so it
//! can only be sent once.

use crate::{
    api::{MediaServer, PlaybackReport},
    types::*,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Player state included in every notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub position_ticks: i64,
    pub is_paused: bool,
    pub is_muted: bool,
    /// 0..=100
    pub volume_level: u32,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            position_ticks: 0,
            is_paused: false,
            is_muted: false,
            volume_level: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Notification {
    Start,
    Progress,
    Stop,
}

/// Sends start/progress/stop notifications for one session
pub struct ProgressReporter {
    server: Arc<dyn MediaServer>,
    template: PlaybackReport,
    started: bool,
    in_flight: Vec<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn new(server: Arc<dyn MediaServer>, session: &PlaybackSession) -> Self {
        Self {
            server,
            template: PlaybackReport {
                item_id: session.item_id.clone(),
                media_source_id: session.media_source_id.clone(),
                play_session_id: session.play_session_id.to_string(),
                position_ticks: session.start_position_ticks,
                is_paused: false,
                is_muted: false,
                volume_level: 100,
                audio_stream_index: session.audio_stream_index,
                subtitle_stream_index: session.subtitle_stream_index,
                play_method: session.method,
                can_seek: true,
            },
            started: false,
            in_flight: Vec::new(),
        }
    }

    pub fn play_session_id(&self) -> &str {
        &self.template.play_session_id
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Keep reported track indices in line after a live switch
    pub fn set_tracks(&mut self, tracks: TrackIndices) {
        self.template.audio_stream_index = tracks.audio;
        self.template.subtitle_stream_index = tracks.subtitle;
    }

    /// Build the notification body for a snapshot
    pub fn report(&self, snapshot: PlaybackSnapshot) -> PlaybackReport {
        PlaybackReport {
            position_ticks: snapshot.position_ticks,
            is_paused: snapshot.is_paused,
            is_muted: snapshot.is_muted,
            volume_level: snapshot.volume_level.min(100),
            ..self.template.clone()
        }
    }

    /// Send "start"; later calls do nothing. Returns whether it was sent.
    pub fn report_start(&mut self, snapshot: PlaybackSnapshot) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        let handle = self.spawn(Notification::Start, snapshot);
        self.track(handle);
        true
    }

    /// Send a progress heartbeat; ignored before "start"
    pub fn report_progress(&mut self, snapshot: PlaybackSnapshot) {
        if !self.started {
            return;
        }
        let handle = self.spawn(Notification::Progress, snapshot);
        self.track(handle);
    }

    /// Send "stop", ending this reporter
    pub fn report_stop(self, snapshot: PlaybackSnapshot) -> JoinHandle<()> {
        self.spawn(Notification::Stop, snapshot)
    }

    /// Wait for outstanding start/progress notifications
    pub async fn drain(&mut self) {
        for handle in self.in_flight.drain(..) {
            let _ = handle.await;
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }

    fn spawn(&self, kind: Notification, snapshot: PlaybackSnapshot) -> JoinHandle<()> {
        let server = self.server.clone();
        let report = self.report(snapshot);
        tokio::spawn(async move {
            let result = match kind {
                Notification::Start => server.report_start(&report).await,
                Notification::Progress => server.report_progress(&report).await,
                Notification::Stop => server.report_stop(&report).await,
            };
            match result {
                Ok(()) => debug!(
                    notification = ?kind,
                    play_session_id = %report.play_session_id,
                    position_ticks = report.position_ticks,
                    "Reported"
                ),
                Err(e) => warn!(
                    notification = ?kind,
                    play_session_id = %report.play_session_id,
                    error = %e,
                    "Session notification failed"
                ),
            }
        })
    }
}
