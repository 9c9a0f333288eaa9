//! Playback session coordinator
//!
//! Owns everything about the current item: the negotiated source, the one
//! live adapter, its session, timers, watchdog and reporter. All entry
//! points take `&mut self`; the [`PlaybackEngine`](crate::engine::PlaybackEngine)
//! task serializes UI commands, adapter events and timer ticks into them.
//!
//! ```text
//! Idle -> Initializing -> Loading -> Ready
//!              |             |  ^      |
//!              v             v  |      v
//!            Error <---------+  +---- (track reload / fallback)
//! ```

use crate::{
    adapter::{AdapterFactory, AdapterKind, LoadOptions, MediaAdapter, Platform},
    api::MediaServer,
    config::EngineConfig,
    engine::{NoopObserver, PlayerObserver},
    error::PlaybackFailure,
    events::{AdapterEvent, AdapterEventSender, EngineEvent, EngineEventTx, TimerKind},
    negotiator::{CapabilityNegotiator, NegotiatedPlayback, NegotiationParams},
    profile::DeviceCapabilityProfile,
    reporter::{PlaybackSnapshot, ProgressReporter},
    segments::{SegmentSkipEngine, SkipAction, SkipTarget},
    stream_url::{StreamUrl, StreamUrlBuilder},
    tracks::{self, RestartPlan, RestartReason, TrackChange, TrackInfo, TrackSync},
    trickplay::{ScrubPreview, TrickplayScrubber},
    types::*,
    watchdog::{FallbackChain, FallbackStep, HealthSample, HealthWatchdog, Verdict},
    Error, Result,
};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Timer tasks of one session, aborted on drop
#[derive(Default)]
struct SessionTimers {
    handles: HashMap<TimerKind, JoinHandle<()>>,
}

impl SessionTimers {
    fn arm(
        &mut self,
        kind: TimerKind,
        generation: u64,
        tx: EngineEventTx,
        delay: Duration,
        period: Duration,
    ) {
        self.cancel(kind);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if tx
                    .send(EngineEvent::Timer {
                        generation,
                        timer: kind,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        self.handles.insert(kind, handle);
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.handles.remove(&kind) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// The live session and everything bound to it
struct ActiveSession {
    session: PlaybackSession,
    adapter: Box<dyn MediaAdapter>,
    reporter: ProgressReporter,
    watchdog: Option<HealthWatchdog>,
    fallback: FallbackChain,
    timers: SessionTimers,
    stream: StreamUrl,
    paused: bool,
    loaded: bool,
    progress_confirmed: bool,
    start_seconds: f64,
}

impl ActiveSession {
    fn position_ticks(&self) -> i64 {
        self.stream.offset_ticks + seconds_to_ticks(self.adapter.current_time())
    }
}

/// Item-level state that survives session restarts
struct ItemContext {
    details: ItemDetails,
    source: MediaSource,
    segments: SegmentSkipEngine,
    scrubber: TrickplayScrubber,
}

/// A session about to be started
struct Attempt {
    session: PlaybackSession,
    adapter: AdapterKind,
    stream: StreamUrl,
    fallback: FallbackChain,
    /// Open without starting playback
    paused: bool,
}

/// A session that failed to start
struct FailedAttempt {
    error: Error,
    session: PlaybackSession,
    fallback: FallbackChain,
}

/// Single owner of playback state for one player
pub struct PlaybackCoordinator {
    config: EngineConfig,
    preferences: UserPreferences,
    server: Arc<dyn MediaServer>,
    negotiator: CapabilityNegotiator,
    adapters: AdapterFactory,
    urls: StreamUrlBuilder,
    observer: Arc<dyn PlayerObserver>,
    events: EngineEventTx,
    state: PlayerState,
    generation: u64,
    attempts: u32,
    volume: u32,
    muted: bool,
    item: Option<ItemContext>,
    active: Option<ActiveSession>,
}

impl PlaybackCoordinator {
    /// Create a coordinator; adapter events and timer ticks go to `events`
    pub fn new(
        config: EngineConfig,
        server: Arc<dyn MediaServer>,
        platform: Arc<dyn Platform>,
        events: EngineEventTx,
    ) -> Self {
        let profile = DeviceCapabilityProfile::smart_tv();
        let negotiator =
            CapabilityNegotiator::new(server.clone(), profile.clone(), &config.server.user_id);
        let urls = StreamUrlBuilder::new(&config.server, config.transcode.clone());

        Self {
            preferences: UserPreferences::default(),
            negotiator,
            adapters: AdapterFactory::new(platform, profile),
            urls,
            observer: Arc::new(NoopObserver),
            events,
            state: PlayerState::Idle,
            generation: 0,
            attempts: 0,
            volume: 100,
            muted: false,
            item: None,
            active: None,
            server,
            config,
        }
    }

    /// Use a different device profile
    pub fn with_profile(mut self, profile: DeviceCapabilityProfile) -> Self {
        self.negotiator = CapabilityNegotiator::new(
            self.server.clone(),
            profile.clone(),
            &self.config.server.user_id,
        );
        self.adapters = self.adapters.with_profile(profile);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PlayerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Let adaptive adapters inspect master manifests
    pub fn with_manifest_client(mut self, client: Client) -> Self {
        self.adapters = self.adapters.with_manifest_client(client);
        self
    }

    // ---- accessors ----

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn adapter_kind(&self) -> Option<AdapterKind> {
        self.active.as_ref().map(|a| a.adapter.kind())
    }

    pub fn stream_url(&self) -> Option<&Url> {
        self.active.as_ref().map(|a| &a.stream.url)
    }

    pub fn item(&self) -> Option<&ItemDetails> {
        self.item.as_ref().map(|i| &i.details)
    }

    pub fn media_source(&self) -> Option<&MediaSource> {
        self.item.as_ref().map(|i| &i.source)
    }

    pub fn position_ticks(&self) -> Option<i64> {
        self.active.as_ref().map(|a| a.position_ticks())
    }

    pub fn is_paused(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.paused)
    }

    /// Sessions started for the current item after the first
    pub fn restarts(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Generation of the newest session; events from older ones are ignored
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    /// Replace preferences; they are read again on every use
    pub fn set_preferences(&mut self, preferences: UserPreferences) {
        self.preferences = preferences;
    }

    pub fn audio_tracks(&self) -> Vec<TrackInfo> {
        self.item
            .as_ref()
            .map(|i| tracks::audio_tracks(&i.source, self.session()))
            .unwrap_or_default()
    }

    pub fn subtitle_tracks(&self) -> Vec<TrackInfo> {
        self.item
            .as_ref()
            .map(|i| tracks::subtitle_tracks(&i.source, self.session()))
            .unwrap_or_default()
    }

    /// Skip action currently offered
    pub fn active_skip(&self) -> Option<&SkipAction> {
        self.item.as_ref().and_then(|i| i.segments.active())
    }

    // ---- UI operations ----

    /// Start an item from scratch
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    pub async fn load(&mut self, request: LoadRequest) -> Result<()> {
        if let Some(active) = self.active.take() {
            self.teardown(active, false).await;
        }
        self.item = None;
        self.attempts = 0;
        self.set_state(PlayerState::Initializing)?;

        let details = match self.server.item(&request.item_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!(error = %e, "Item details unavailable");
                ItemDetails {
                    id: request.item_id.clone(),
                    ..Default::default()
                }
            }
        };

        let start = request.start_position_ticks.unwrap_or(0).max(0);
        let params = NegotiationParams {
            item_id: request.item_id.clone(),
            start_position_ticks: (start > 0).then_some(start),
            audio_stream_index: request.audio_stream_index,
            subtitle_stream_index: request.subtitle_stream_index,
            forced_method: self.preferences.forced_method,
            max_bitrate: self.preferences.max_bitrate,
            ..Default::default()
        };
        let negotiated = match self.negotiator.negotiate(&params).await {
            Ok(negotiated) => negotiated,
            Err(e) => return Err(self.fail(e).await),
        };

        let segments = match self.server.media_segments(&request.item_id).await {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, "Media segments unavailable");
                Vec::new()
            }
        };
        let next_item = match self.server.next_item(&details).await {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Next item lookup failed");
                None
            }
        };

        let initial = tracks::initial_tracks(&negotiated.source, &request);
        let scrubber = TrickplayScrubber::new(
            &request.item_id,
            &negotiated.source.id,
            details.trickplay.as_ref(),
            self.config.device_pixel_width,
        );
        self.item = Some(ItemContext {
            details,
            source: negotiated.source.clone(),
            segments: SegmentSkipEngine::new(segments).with_next_item(next_item),
            scrubber,
        });

        let attempt = match self.initial_attempt(negotiated, initial, start, true) {
            Ok(attempt) => attempt,
            Err(e) => return Err(self.fail(e).await),
        };
        self.launch(attempt).await
    }

    /// Resume playback
    #[instrument(skip(self))]
    pub async fn play(&mut self) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NoActiveSession)?;
        active.adapter.play().await?;
        active.paused = false;
        self.report_progress_now();
        Ok(())
    }

    /// Pause playback
    #[instrument(skip(self))]
    pub async fn pause(&mut self) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NoActiveSession)?;
        active.adapter.pause().await?;
        active.paused = true;
        self.report_progress_now();
        Ok(())
    }

    /// Seek to a media position
    #[instrument(skip(self))]
    pub async fn seek(&mut self, position_ticks: i64) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NoActiveSession)?;
        let mut target = position_ticks.max(0);
        if let Some(run_time) = self.item.as_ref().and_then(|i| i.source.run_time_ticks) {
            target = target.min(run_time);
        }

        // A transcode starting later than the target cannot seek back into it
        if target < active.stream.offset_ticks {
            let plan = RestartPlan::new(
                &active.session,
                active.session.tracks(),
                target,
                RestartReason::Seek,
            );
            return self.restart(plan).await;
        }

        active
            .adapter
            .seek(ticks_to_seconds(target - active.stream.offset_ticks))
            .await?;
        debug!(position_ticks = target, "Seeked");
        self.report_progress_now();
        self.update_position(target);
        Ok(())
    }

    pub async fn set_volume(&mut self, level: u32) -> Result<()> {
        self.volume = level.min(100);
        self.apply_volume().await
    }

    pub async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        self.apply_volume().await
    }

    /// Stop playback and release the adapter
    #[instrument(skip(self))]
    pub async fn exit(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            self.teardown(active, true).await;
        }
        self.item = None;
        if self.state != PlayerState::Idle {
            self.set_state(PlayerState::Idle)?;
        }
        Ok(())
    }

    /// Select an audio stream by server index
    #[instrument(skip(self))]
    pub async fn select_audio(&mut self, index: i32) -> Result<()> {
        let (change, stream) = {
            let item = self.item.as_ref().ok_or(Error::NoActiveSession)?;
            let active = self.active.as_ref().ok_or(Error::NoActiveSession)?;
            let live = active.adapter.supports_live_audio_switch();
            let change = tracks::plan_audio_switch(
                &active.session,
                &item.source,
                live,
                index,
                active.position_ticks(),
            )?;
            (change, item.source.stream(index).cloned())
        };

        match change {
            TrackChange::Unchanged => Ok(()),
            TrackChange::Reload(plan) => self.restart(plan).await,
            TrackChange::Live { fallback } => {
                let active = self.active.as_mut().ok_or(Error::NoActiveSession)?;
                let stream = stream.ok_or(Error::UnknownStream { index })?;
                match active.adapter.select_audio_track(&stream).await {
                    Ok(()) => {
                        active.session.audio_stream_index = Some(index);
                        let tracks = active.session.tracks();
                        active.reporter.set_tracks(tracks);
                        info!(index, "Audio switched live");
                        self.report_progress_now();
                        Ok(())
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Live audio switch rejected, reloading");
                        self.restart(fallback).await
                    }
                }
            }
        }
    }

    /// Select a subtitle stream by server index, `SUBTITLES_DISABLED` for none
    #[instrument(skip(self))]
    pub async fn select_subtitle(&mut self, index: i32) -> Result<()> {
        let (change, stream) = {
            let item = self.item.as_ref().ok_or(Error::NoActiveSession)?;
            let active = self.active.as_ref().ok_or(Error::NoActiveSession)?;
            let stream = item.source.stream(index).cloned();
            let live = stream
                .as_ref()
                .map(|s| active.adapter.supports_live_subtitle_switch(s))
                .unwrap_or(true);
            let change = tracks::plan_subtitle_switch(
                &active.session,
                &item.source,
                live,
                index,
                active.position_ticks(),
            )?;
            (change, stream)
        };

        match change {
            TrackChange::Unchanged => Ok(()),
            TrackChange::Reload(plan) => self.restart(plan).await,
            TrackChange::Live { fallback } => {
                let active = self.active.as_mut().ok_or(Error::NoActiveSession)?;
                match active.adapter.select_subtitle_track(stream.as_ref()).await {
                    Ok(()) => {
                        active.session.subtitle_stream_index = index;
                        let tracks = active.session.tracks();
                        active.reporter.set_tracks(tracks);
                        info!(index, "Subtitles switched live");
                        self.report_progress_now();
                        Ok(())
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Live subtitle switch rejected, reloading");
                        self.restart(fallback).await
                    }
                }
            }
        }
    }

    /// Invoke the offered skip action
    #[instrument(skip(self))]
    pub async fn skip(&mut self) -> Result<()> {
        let Some(action) = self.item.as_mut().and_then(|i| i.segments.take_active()) else {
            debug!("No skip action offered");
            return Ok(());
        };
        self.observer.on_segment_active(None);
        info!(segment = %action.segment.segment_type, label = %action.label, "Skipping");

        match action.target {
            SkipTarget::Seek { position_ticks } => self.seek(position_ticks).await,
            SkipTarget::PlayNext { item_id } => self.load(LoadRequest::new(item_id)).await,
        }
    }

    /// Thumbnail and time label for a scrub position
    pub fn scrub_preview(&self, position_ticks: i64) -> Result<ScrubPreview> {
        let item = self.item.as_ref().ok_or(Error::NoActiveSession)?;
        item.scrubber.preview(position_ticks, &self.urls)
    }

    // ---- event and timer entry points ----

    /// Dispatch an engine event
    pub async fn handle_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Adapter { generation, event } => {
                self.handle_adapter_event(generation, event).await
            }
            EngineEvent::Timer { generation, timer } => self.handle_timer(generation, timer).await,
        }
    }

    /// React to an adapter notification
    pub async fn handle_adapter_event(&mut self, generation: u64, event: AdapterEvent) -> Result<()> {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, ?event, "Stale adapter event dropped");
            return Ok(());
        }

        match event {
            AdapterEvent::Loaded { duration } => {
                debug!(?duration, "Adapter loaded");
                if let Some(active) = self.active.as_mut() {
                    active.loaded = true;
                }
                self.become_ready();
                Ok(())
            }
            AdapterEvent::Buffering { active } => {
                debug!(buffering = active, "Buffering");
                Ok(())
            }
            AdapterEvent::TimeUpdate { seconds } => {
                let Some(active) = self.active.as_ref() else {
                    return Ok(());
                };
                let position = active.stream.offset_ticks + seconds_to_ticks(seconds);
                let advanced =
                    seconds - active.start_seconds > self.config.watchdog.progress_epsilon;
                if advanced && !active.progress_confirmed {
                    self.confirm_progress();
                }
                self.update_position(position);
                Ok(())
            }
            AdapterEvent::QualityChange { bitrate } => {
                debug!(?bitrate, "Quality changed");
                Ok(())
            }
            AdapterEvent::AudioTrackChange { index } => {
                debug!(index, "Adapter audio track changed");
                Ok(())
            }
            AdapterEvent::Ended => self.handle_ended().await,
            AdapterEvent::Error { message } => {
                warn!(error = %message, "Adapter error");
                self.fall_back(Error::adapter(message)).await
            }
        }
    }

    /// React to a timer tick
    pub async fn handle_timer(&mut self, generation: u64, timer: TimerKind) -> Result<()> {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, ?timer, "Stale timer tick dropped");
            return Ok(());
        }

        match timer {
            TimerKind::WatchdogCheck => self.check_health().await,
            TimerKind::Heartbeat => {
                self.report_progress_now();
                Ok(())
            }
        }
    }

    // ---- internals ----

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.active.is_some()
    }

    fn set_state(&mut self, to: PlayerState) -> Result<()> {
        let from = self.state;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        info!(from = %from, to = %to, "State transition");
        self.observer.on_state_change(from, to);
        Ok(())
    }

    fn become_ready(&mut self) {
        if self.state != PlayerState::Loading {
            return;
        }
        if self.set_state(PlayerState::Ready).is_ok() {
            if let Some(active) = self.active.as_ref() {
                self.observer.on_ready(&active.session);
            }
        }
    }

    fn snapshot_of(&self, active: &ActiveSession) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position_ticks: active.position_ticks(),
            is_paused: active.paused,
            is_muted: self.muted,
            volume_level: self.volume,
        }
    }

    fn report_progress_now(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let snapshot = self.snapshot_of(active);
        if let Some(active) = self.active.as_mut() {
            active.reporter.report_progress(snapshot);
        }
    }

    async fn apply_volume(&mut self) -> Result<()> {
        let (volume, muted) = (self.volume, self.muted);
        if let Some(active) = self.active.as_mut() {
            active.adapter.set_volume(volume as f64 / 100.0, muted).await?;
        }
        self.report_progress_now();
        Ok(())
    }

    fn update_position(&mut self, position_ticks: i64) {
        let duration = self.item.as_ref().and_then(|i| i.source.run_time_ticks);
        self.observer.on_time_update(position_ticks, duration);

        let enabled = self.preferences.skip_segments_enabled;
        if let Some(item) = self.item.as_mut() {
            if let Some(change) = item.segments.update(position_ticks, enabled) {
                self.observer.on_segment_active(change.as_ref());
            }
        }
    }

    /// Progress confirmed: stop watching, send "start", begin heartbeats
    fn confirm_progress(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.progress_confirmed {
            return;
        }
        let snapshot = self.snapshot_of(active);
        let generation = self.generation;
        let tx = self.events.clone();
        let heartbeat = self.config.reporter.heartbeat_interval();

        if let Some(active) = self.active.as_mut() {
            active.progress_confirmed = true;
            active.watchdog = None;
            active.timers.cancel(TimerKind::WatchdogCheck);
            active.reporter.report_start(snapshot);
            active
                .timers
                .arm(TimerKind::Heartbeat, generation, tx, heartbeat, heartbeat);
            info!(
                play_session_id = %active.session.play_session_id,
                position_ticks = snapshot.position_ticks,
                "Playback progressing"
            );
        }
        self.become_ready();
    }

    async fn check_health(&mut self) -> Result<()> {
        let verdict = {
            let Some(active) = self.active.as_mut() else {
                return Ok(());
            };
            let sample = HealthSample {
                position: active.adapter.current_time(),
                paused: active.paused,
                loaded: active.loaded,
            };
            match active.watchdog.as_mut() {
                Some(watchdog) => watchdog.check(sample),
                None => return Ok(()),
            }
        };

        match verdict {
            Verdict::Pending => Ok(()),
            Verdict::Progressing => {
                self.confirm_progress();
                Ok(())
            }
            Verdict::ResumeAttempt => {
                if let Some(active) = self.active.as_mut() {
                    info!(adapter = %active.adapter.kind(), "Playback not advancing, retrying play");
                    if let Err(e) = active.adapter.play().await {
                        warn!(error = %e, "Resume attempt failed");
                    }
                }
                Ok(())
            }
            Verdict::Stuck { position } => {
                warn!(position, "Playback stalled");
                self.fall_back(Error::PlaybackStalled { position }).await
            }
        }
    }

    async fn handle_ended(&mut self) -> Result<()> {
        let next = if self.preferences.auto_play {
            self.item
                .as_ref()
                .and_then(|i| i.segments.next_item_id())
                .map(str::to_string)
        } else {
            None
        };

        if let Some(active) = self.active.take() {
            self.teardown(active, false).await;
        }
        info!(next_item = ?next, "Playback ended");

        match next {
            Some(item_id) => self.load(LoadRequest::new(item_id)).await,
            None => {
                self.item = None;
                self.set_state(PlayerState::Idle)
            }
        }
    }

    /// Stop the session: timers, "stop" notification, adapter
    async fn teardown(
        &mut self,
        active: ActiveSession,
        wait_for_stop: bool,
    ) -> (PlaybackSession, FallbackChain) {
        let snapshot = self.snapshot_of(&active);
        let ActiveSession {
            session,
            mut adapter,
            reporter,
            mut timers,
            fallback,
            ..
        } = active;

        timers.cancel_all();
        let stop = reporter.report_stop(snapshot);
        adapter.destroy().await;

        if wait_for_stop {
            let timeout = self.config.reporter.stop_timeout();
            if tokio::time::timeout(timeout, stop).await.is_err() {
                warn!("Stop notification still pending at exit");
            }
        }

        debug!(play_session_id = %session.play_session_id, "Session torn down");
        (session, fallback)
    }

    /// Surface a terminal error
    async fn fail(&mut self, error: Error) -> Error {
        if let Some(active) = self.active.take() {
            self.teardown(active, false).await;
        }
        error!(code = error.error_code(), error = %error, "Playback failed");
        if let Err(e) = self.set_state(PlayerState::Error) {
            warn!(error = %e, "Could not enter error state");
        }
        self.observer.on_error(&PlaybackFailure::from_error(&error));
        error
    }

    fn initial_attempt(
        &self,
        negotiated: NegotiatedPlayback,
        tracks: TrackIndices,
        start_position_ticks: i64,
        initial: bool,
    ) -> Result<Attempt> {
        let NegotiatedPlayback {
            source,
            method,
            play_session_id,
        } = negotiated;

        let item_id = self
            .item
            .as_ref()
            .map(|i| i.details.id.clone())
            .unwrap_or_default();
        let mut session =
            PlaybackSession::new(item_id, &source.id, method, tracks, start_position_ticks)
                .with_forced_method(self.preferences.forced_method);
        session.play_session_id = play_session_id;

        let adapter = AdapterKind::select(method, &source, self.negotiator.profile());
        let fallback = FallbackChain::after(
            FallbackStep { adapter, method },
            source.supports_transcoding,
        );

        let stream = match (&source.transcoding_url, method) {
            (Some(url), PlaybackMethod::Transcode) if initial && !tracks.burn_in => {
                self.urls.server_transcode(&session, url)?
            }
            _ => self
                .urls
                .for_session(&session, &source, self.preferences.max_bitrate)?,
        };

        Ok(Attempt {
            session,
            adapter,
            stream,
            fallback,
            paused: false,
        })
    }

    fn next_attempt(
        &self,
        previous: &PlaybackSession,
        start_position_ticks: i64,
        step: FallbackStep,
        fallback: FallbackChain,
        paused: bool,
    ) -> Result<Attempt> {
        let source = &self.item.as_ref().ok_or(Error::NoActiveSession)?.source;
        let session = PlaybackSession::new(
            &previous.item_id,
            &source.id,
            step.method,
            previous.tracks(),
            start_position_ticks,
        )
        .with_forced_method(previous.forced_method);
        let stream = self
            .urls
            .for_session(&session, source, self.preferences.max_bitrate)?;

        Ok(Attempt {
            session,
            adapter: step.adapter,
            stream,
            fallback,
            paused,
        })
    }

    /// Start attempts until one loads, the chain runs out, or a
    /// non-recoverable error occurs
    async fn start_with_fallback(&mut self, mut attempt: Attempt) -> Result<()> {
        loop {
            let paused = attempt.paused;
            let failed = match self.start_attempt(attempt).await {
                Ok(()) => return Ok(()),
                Err(failed) => failed,
            };

            if !failed.error.is_recoverable() {
                return Err(self.fail(failed.error).await);
            }

            let FailedAttempt {
                error,
                session,
                mut fallback,
            } = failed;
            attempt = match fallback.next_step() {
                Some(step) => {
                    warn!(error = %error, next = %step, "Falling back");
                    let start = session.start_position_ticks;
                    match self.next_attempt(&session, start, step, fallback, paused) {
                        Ok(next) => next,
                        Err(e) => return Err(self.fail(e).await),
                    }
                }
                None => {
                    return Err(self
                        .fail(Error::PlaybackFailed {
                            last_method: session.method,
                            reason: error.to_string(),
                        })
                        .await)
                }
            };
        }
    }

    async fn start_attempt(&mut self, attempt: Attempt) -> std::result::Result<(), FailedAttempt> {
        let Attempt {
            session,
            adapter: kind,
            stream,
            fallback,
            paused,
        } = attempt;

        if let Err(error) = self.set_state(PlayerState::Loading) {
            return Err(FailedAttempt {
                error,
                session,
                fallback,
            });
        }
        self.attempts += 1;
        self.generation += 1;
        let generation = self.generation;
        let sender = AdapterEventSender::new(generation, self.events.clone());
        let mut adapter = self.adapters.create(kind, sender);
        let reporter = ProgressReporter::new(self.server.clone(), &session);

        let container = if session.is_transcoding() {
            "ts".to_string()
        } else {
            self.item
                .as_ref()
                .map(|i| i.source.container())
                .unwrap_or_default()
        };
        let options = LoadOptions {
            mime_type: stream.mime_type.clone(),
            container,
            start_position: ticks_to_seconds(
                (session.start_position_ticks - stream.offset_ticks).max(0),
            ),
        };

        info!(
            play_session_id = %session.play_session_id,
            method = %session.method,
            adapter = %kind,
            url = %stream.url,
            start = options.start_position,
            "Starting session"
        );

        let started = match adapter.load(&stream.url, &options).await {
            Ok(()) => {
                if let Err(e) = adapter
                    .set_volume(self.volume as f64 / 100.0, self.muted)
                    .await
                {
                    warn!(error = %e, "Volume not applied");
                }
                if paused {
                    Ok(())
                } else {
                    adapter.play().await
                }
            }
            Err(e) => Err(e),
        };

        if let Err(error) = started {
            warn!(adapter = %kind, error = %error, "Adapter failed to start");
            let snapshot = PlaybackSnapshot {
                position_ticks: session.start_position_ticks,
                is_muted: self.muted,
                volume_level: self.volume,
                ..Default::default()
            };
            drop(reporter.report_stop(snapshot));
            adapter.destroy().await;
            return Err(FailedAttempt {
                error,
                session,
                fallback,
            });
        }

        let watchdog = HealthWatchdog::new(
            &self.config.watchdog,
            session.method,
            kind,
            options.start_position,
        );
        let mut timers = SessionTimers::default();
        timers.arm(
            TimerKind::WatchdogCheck,
            generation,
            self.events.clone(),
            self.config.watchdog.initial_delay(),
            self.config.watchdog.check_interval(),
        );

        self.active = Some(ActiveSession {
            session,
            adapter,
            reporter,
            watchdog: Some(watchdog),
            fallback,
            timers,
            stream,
            paused,
            loaded: false,
            progress_confirmed: false,
            start_seconds: options.start_position,
        });
        Ok(())
    }

    /// Replace the live session after a stall or adapter error
    async fn fall_back(&mut self, reason: Error) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let position = active.position_ticks();
        let paused = active.paused;
        let (session, mut fallback) = self.teardown(active, false).await;

        let Some(step) = fallback.next_step() else {
            return Err(self
                .fail(Error::PlaybackFailed {
                    last_method: session.method,
                    reason: reason.to_string(),
                })
                .await);
        };

        warn!(error = %reason, next = %step, "Falling back");
        let attempt = match self.next_attempt(&session, position, step, fallback, paused) {
            Ok(attempt) => attempt,
            Err(e) => return Err(self.fail(e).await),
        };
        self.launch(attempt).await
    }

    /// Start a session, then restart it once more if its adapter cannot
    /// present the selected tracks
    async fn launch(&mut self, attempt: Attempt) -> Result<()> {
        self.start_with_fallback(attempt).await?;
        match self.sync_tracks().await {
            Some(plan) => self.restart(plan).await,
            None => Ok(()),
        }
    }

    /// Bring a freshly started adapter in line with the session's tracks.
    /// Returns a plan when only a new session can deliver them.
    async fn sync_tracks(&mut self) -> Option<RestartPlan> {
        let (sync, audio, subtitle) = {
            let item = self.item.as_ref()?;
            let active = self.active.as_ref()?;
            let session = &active.session;
            let live_subtitle = item
                .source
                .stream(session.subtitle_stream_index)
                .is_some_and(|s| active.adapter.supports_live_subtitle_switch(s));
            let sync = tracks::plan_track_sync(
                session,
                &item.source,
                active.adapter.supports_live_audio_switch(),
                live_subtitle,
                active.position_ticks(),
            );
            let (audio, subtitle) = match &sync {
                TrackSync::Live {
                    audio, subtitle, ..
                } => (
                    audio.and_then(|i| item.source.stream(i).cloned()),
                    subtitle.and_then(|i| item.source.stream(i).cloned()),
                ),
                _ => (None, None),
            };
            (sync, audio, subtitle)
        };

        let fallback = match sync {
            TrackSync::InStream => return None,
            TrackSync::Reload(plan) => {
                info!(reason = ?plan.reason, "Stream cannot carry the selected tracks");
                return Some(plan);
            }
            TrackSync::Live { fallback, .. } => fallback,
        };

        let active = self.active.as_mut()?;
        if let Some(stream) = audio {
            if let Err(e) = active.adapter.select_audio_track(&stream).await {
                warn!(index = stream.index, error = %e, "Initial audio rejected, reloading");
                return Some(fallback);
            }
        }
        if let Some(stream) = subtitle {
            if let Err(e) = active.adapter.select_subtitle_track(Some(&stream)).await {
                warn!(index = stream.index, error = %e, "Initial subtitles rejected, reloading");
                return Some(fallback);
            }
        }
        debug!("Selected tracks applied on the adapter");
        None
    }

    /// Restart the current item with new tracks or start position
    async fn restart(&mut self, plan: RestartPlan) -> Result<()> {
        let mut plan = plan;
        let mut reloads = 0;
        loop {
            let active = self.active.take().ok_or(Error::NoActiveSession)?;
            info!(reason = ?plan.reason, start = plan.start_position_ticks, "Restarting session");
            let paused = active.paused;
            let (previous, _) = self.teardown(active, false).await;
            self.set_state(PlayerState::Loading)?;

            let params = NegotiationParams {
                item_id: plan.item_id.clone(),
                start_position_ticks: Some(plan.start_position_ticks),
                audio_stream_index: plan.tracks.audio,
                subtitle_stream_index: Some(plan.tracks.subtitle),
                forced_method: previous.forced_method,
                max_bitrate: self.preferences.max_bitrate,
                transcode_only: plan.transcode_only,
                disable_direct_play: plan.disable_direct_play,
            };
            let negotiated = match self.negotiator.negotiate(&params).await {
                Ok(negotiated) => negotiated,
                Err(e) => return Err(self.fail(e).await),
            };
            if let Some(item) = self.item.as_mut() {
                item.source = negotiated.source.clone();
            }

            let mut attempt = match self.initial_attempt(
                negotiated,
                plan.tracks,
                plan.start_position_ticks,
                false,
            ) {
                Ok(attempt) => attempt,
                Err(e) => return Err(self.fail(e).await),
            };
            attempt.paused = paused;
            self.start_with_fallback(attempt).await?;

            let Some(next) = self.sync_tracks().await else {
                return Ok(());
            };
            reloads += 1;
            if reloads > 1 {
                warn!(reason = ?next.reason, "Selected tracks still not presentable, keeping session");
                return Ok(());
            }
            plan = next;
        }
    }
}
