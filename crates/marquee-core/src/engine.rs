//! Playback engine task and UI handle
//!
//! [`PlaybackEngine`] owns the [`PlaybackCoordinator`] on a single tokio
//! task. UI commands arrive through a cloneable [`PlayerHandle`]; adapter
//! events and timer ticks arrive on the engine event channel. Both are
//! processed one at a time, so the coordinator never sees concurrent calls.

use crate::{
    adapter::{AdapterKind, Platform},
    api::MediaServer,
    config::EngineConfig,
    coordinator::PlaybackCoordinator,
    error::PlaybackFailure,
    events::{self, EngineEventRx},
    profile::DeviceCapabilityProfile,
    segments::SkipAction,
    tracks::TrackInfo,
    trickplay::ScrubPreview,
    types::*,
    Error, Result,
};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use url::Url;

/// Callbacks for the UI collaborator; all default to no-ops
pub trait PlayerObserver: Send + Sync {
    fn on_state_change(&self, from: PlayerState, to: PlayerState) {
        let _ = (from, to);
    }

    /// Playback confirmed for a session
    fn on_ready(&self, session: &PlaybackSession) {
        let _ = session;
    }

    fn on_time_update(&self, position_ticks: i64, duration_ticks: Option<i64>) {
        let _ = (position_ticks, duration_ticks);
    }

    /// Terminal failure to show as a dialog
    fn on_error(&self, failure: &PlaybackFailure) {
        let _ = failure;
    }

    /// Skip action shown (`Some`) or hidden (`None`)
    fn on_segment_active(&self, action: Option<&SkipAction>) {
        let _ = action;
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PlayerObserver for NoopObserver {}

/// Point-in-time view of the player
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub session: Option<PlaybackSession>,
    pub adapter: Option<AdapterKind>,
    pub stream_url: Option<Url>,
    pub position_ticks: Option<i64>,
    pub paused: bool,
    pub restarts: u32,
    pub active_skip: Option<SkipAction>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Load(LoadRequest, Reply<()>),
    Play(Reply<()>),
    Pause(Reply<()>),
    Seek(i64, Reply<()>),
    SetVolume(u32, Reply<()>),
    SetMuted(bool, Reply<()>),
    SelectAudio(i32, Reply<()>),
    SelectSubtitle(i32, Reply<()>),
    Skip(Reply<()>),
    ScrubPreview(i64, Reply<ScrubPreview>),
    AudioTracks(Reply<Vec<TrackInfo>>),
    SubtitleTracks(Reply<Vec<TrackInfo>>),
    Status(Reply<PlayerStatus>),
    SetPreferences(UserPreferences, Reply<()>),
    Exit(Reply<()>),
    Shutdown(Reply<()>),
}

/// Cloneable handle the UI drives the engine with
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Command>,
}

impl PlayerHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| Error::Internal("playback engine stopped".into()))?;
        rx.await
            .map_err(|_| Error::Internal("playback engine dropped the request".into()))?
    }

    pub async fn load(&self, request: LoadRequest) -> Result<()> {
        self.request(|r| Command::Load(request, r)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn seek(&self, position_ticks: i64) -> Result<()> {
        self.request(|r| Command::Seek(position_ticks, r)).await
    }

    pub async fn set_volume(&self, level: u32) -> Result<()> {
        self.request(|r| Command::SetVolume(level, r)).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.request(|r| Command::SetMuted(muted, r)).await
    }

    pub async fn select_audio(&self, index: i32) -> Result<()> {
        self.request(|r| Command::SelectAudio(index, r)).await
    }

    pub async fn select_subtitle(&self, index: i32) -> Result<()> {
        self.request(|r| Command::SelectSubtitle(index, r)).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.request(Command::Skip).await
    }

    pub async fn scrub_preview(&self, position_ticks: i64) -> Result<ScrubPreview> {
        self.request(|r| Command::ScrubPreview(position_ticks, r))
            .await
    }

    pub async fn audio_tracks(&self) -> Result<Vec<TrackInfo>> {
        self.request(Command::AudioTracks).await
    }

    pub async fn subtitle_tracks(&self) -> Result<Vec<TrackInfo>> {
        self.request(Command::SubtitleTracks).await
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        self.request(Command::Status).await
    }

    pub async fn set_preferences(&self, preferences: UserPreferences) -> Result<()> {
        self.request(|r| Command::SetPreferences(preferences, r))
            .await
    }

    /// Stop playback; the engine keeps running
    pub async fn exit(&self) -> Result<()> {
        self.request(Command::Exit).await
    }

    /// Stop playback and end the engine task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

/// Task owning one player's coordinator
pub struct PlaybackEngine {
    coordinator: PlaybackCoordinator,
    commands: mpsc::Receiver<Command>,
    events: EngineEventRx,
}

impl PlaybackEngine {
    /// Create the engine and its handle; call [`run`](Self::run) or
    /// [`spawn`](Self::spawn) to start processing
    pub fn new(
        config: EngineConfig,
        server: Arc<dyn MediaServer>,
        platform: Arc<dyn Platform>,
    ) -> (Self, PlayerHandle) {
        let (events_tx, events) = events::channel();
        let (tx, commands) = mpsc::channel(32);
        let coordinator = PlaybackCoordinator::new(config, server, platform, events_tx);
        (
            Self {
                coordinator,
                commands,
                events,
            },
            PlayerHandle { tx },
        )
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlayerObserver>) -> Self {
        self.coordinator = self.coordinator.with_observer(observer);
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.coordinator = self.coordinator.with_preferences(preferences);
        self
    }

    pub fn with_profile(mut self, profile: DeviceCapabilityProfile) -> Self {
        self.coordinator = self.coordinator.with_profile(profile);
        self
    }

    pub fn with_manifest_client(mut self, client: Client) -> Self {
        self.coordinator = self.coordinator.with_manifest_client(client);
        self
    }

    /// Run on a new tokio task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands and events until shutdown or every handle is dropped
    pub async fn run(mut self) {
        info!(version = crate::VERSION, "Playback engine started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.dispatch(command).await {
                            break;
                        }
                    }
                    None => {
                        let _ = self.coordinator.exit().await;
                        break;
                    }
                },
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.coordinator.handle_event(event).await {
                        debug!(error = %e, "Event handling finished with error");
                    }
                }
            }
        }
        info!("Playback engine stopped");
    }

    /// Apply one command; returns true when the engine should stop
    async fn dispatch(&mut self, command: Command) -> bool {
        let c = &mut self.coordinator;
        match command {
            Command::Load(request, reply) => {
                let _ = reply.send(c.load(request).await);
            }
            Command::Play(reply) => {
                let _ = reply.send(c.play().await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(c.pause().await);
            }
            Command::Seek(ticks, reply) => {
                let _ = reply.send(c.seek(ticks).await);
            }
            Command::SetVolume(level, reply) => {
                let _ = reply.send(c.set_volume(level).await);
            }
            Command::SetMuted(muted, reply) => {
                let _ = reply.send(c.set_muted(muted).await);
            }
            Command::SelectAudio(index, reply) => {
                let _ = reply.send(c.select_audio(index).await);
            }
            Command::SelectSubtitle(index, reply) => {
                let _ = reply.send(c.select_subtitle(index).await);
            }
            Command::Skip(reply) => {
                let _ = reply.send(c.skip().await);
            }
            Command::ScrubPreview(ticks, reply) => {
                let _ = reply.send(c.scrub_preview(ticks));
            }
            Command::AudioTracks(reply) => {
                let _ = reply.send(Ok(c.audio_tracks()));
            }
            Command::SubtitleTracks(reply) => {
                let _ = reply.send(Ok(c.subtitle_tracks()));
            }
            Command::Status(reply) => {
                let _ = reply.send(Ok(PlayerStatus {
                    state: c.state(),
                    session: c.session().cloned(),
                    adapter: c.adapter_kind(),
                    stream_url: c.stream_url().cloned(),
                    position_ticks: c.position_ticks(),
                    paused: c.is_paused(),
                    restarts: c.restarts(),
                    active_skip: c.active_skip().cloned(),
                }));
            }
            Command::SetPreferences(preferences, reply) => {
                c.set_preferences(preferences);
                let _ = reply.send(Ok(()));
            }
            Command::Exit(reply) => {
                let _ = reply.send(c.exit().await);
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(c.exit().await);
                return true;
            }
        }
        false
    }
}
