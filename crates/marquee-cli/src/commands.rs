//! CLI command implementations

use crate::headless::HeadlessPlatform;
use crate::output::{self, OutputFormat};
use anyhow::Context;
use marquee_core::{
    tracks,
    watchdog::FallbackStep,
    AdapterKind, CapabilityNegotiator, DeviceCapabilityProfile, EngineConfig, FallbackChain,
    HttpMediaServer, LoadRequest, MediaServer, NegotiationParams, PlaybackEngine,
    PlaybackFailure, PlaybackMethod, PlaybackSession, PlayerObserver, PlayerState,
    SkipAction, StreamUrlBuilder, TrickplayScrubber, UserPreferences, seconds_to_ticks,
    ticks_to_seconds,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Values from flags or `MARQUEE_*` variables that win over the config file
pub struct Overrides {
    pub server: Option<Url>,
    pub token: Option<String>,
    pub user: Option<String>,
}

/// Load the engine configuration and apply overrides
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(server) = &overrides.server {
        config.server.base_url = server.clone();
    }
    if let Some(token) = &overrides.token {
        config.server.access_token = token.clone();
    }
    if let Some(user) = &overrides.user {
        config.server.user_id = user.clone();
    }
    config.validate().context("invalid configuration")?;

    if config.server.access_token.is_empty() {
        warn!("No access token configured; the server will likely reject requests");
    }
    debug!(server = %config.server.base_url, device_id = %config.server.device_id, "Configuration loaded");
    Ok(config)
}

fn parse_method(method: Option<String>) -> anyhow::Result<Option<PlaybackMethod>> {
    method
        .map(|m| m.parse::<PlaybackMethod>())
        .transpose()
        .context("invalid --method")
}

fn server(config: &EngineConfig) -> anyhow::Result<Arc<HttpMediaServer>> {
    Ok(Arc::new(
        HttpMediaServer::new(config.server.clone()).context("failed to build HTTP client")?,
    ))
}

// =============================================================================
// negotiate
// =============================================================================

#[derive(Serialize)]
struct NegotiationReport {
    item_id: String,
    media_source_id: String,
    container: String,
    method: PlaybackMethod,
    adapter: AdapterKind,
    play_session_id: String,
    stream_url: Url,
    mime_type: String,
    offset_ticks: i64,
    fallback: Vec<String>,
    streams: Vec<marquee_core::MediaStream>,
}

/// Negotiate an item and show method, adapter, URL and streams
pub async fn negotiate(
    config: EngineConfig,
    item: &str,
    start: Option<f64>,
    method: Option<String>,
    audio: Option<i32>,
    subtitle: Option<i32>,
    format: &str,
) -> anyhow::Result<()> {
    let server = server(&config)?;
    let profile = DeviceCapabilityProfile::smart_tv();
    let negotiator = CapabilityNegotiator::new(server, profile.clone(), &config.server.user_id);

    let start_ticks = start.map(seconds_to_ticks);
    let params = NegotiationParams {
        item_id: item.to_string(),
        start_position_ticks: start_ticks,
        audio_stream_index: audio,
        subtitle_stream_index: subtitle,
        forced_method: parse_method(method)?,
        ..Default::default()
    };
    let negotiated = negotiator
        .negotiate(&params)
        .await
        .with_context(|| format!("negotiation failed for {}", item))?;
    let source = &negotiated.source;

    let mut request = LoadRequest::new(item);
    request.audio_stream_index = audio;
    request.subtitle_stream_index = subtitle;
    let initial = tracks::initial_tracks(source, &request);

    let mut session = PlaybackSession::new(
        item,
        &source.id,
        negotiated.method,
        initial,
        start_ticks.unwrap_or(0),
    );
    session.play_session_id = negotiated.play_session_id;

    let adapter = AdapterKind::select(negotiated.method, source, &profile);
    let urls = StreamUrlBuilder::new(&config.server, config.transcode.clone());
    let stream = match (&source.transcoding_url, negotiated.method) {
        (Some(url), PlaybackMethod::Transcode) => urls.server_transcode(&session, url)?,
        _ => urls.for_session(&session, source, None)?,
    };

    let mut chain = FallbackChain::after(
        FallbackStep {
            adapter,
            method: negotiated.method,
        },
        source.supports_transcoding,
    );
    let fallback = std::iter::from_fn(|| chain.next_step())
        .map(|step| step.to_string())
        .collect::<Vec<_>>();

    let report = NegotiationReport {
        item_id: item.to_string(),
        media_source_id: source.id.clone(),
        container: source.container(),
        method: negotiated.method,
        adapter,
        play_session_id: session.play_session_id.to_string(),
        stream_url: stream.url,
        mime_type: stream.mime_type,
        offset_ticks: stream.offset_ticks,
        fallback,
        streams: source.media_streams.clone(),
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        return output::print_json(&report);
    }

    println!("Negotiated {}:", item);
    println!("  Source:    {} ({})", report.media_source_id, report.container);
    println!("  Method:    {}", report.method);
    println!("  Adapter:   {}", report.adapter);
    println!("  Session:   {}", report.play_session_id);
    println!("  URL:       {}", report.stream_url);
    println!("  MIME:      {}", report.mime_type);
    if report.offset_ticks > 0 {
        println!("  Offset:    {:.1}s", ticks_to_seconds(report.offset_ticks));
    }
    if report.fallback.is_empty() {
        println!("  Fallback:  none");
    } else {
        println!("  Fallback:  {}", report.fallback.join(" -> "));
    }
    println!("\n{}", output::streams_table(&report.streams));
    Ok(())
}

// =============================================================================
// play
// =============================================================================

/// Logs engine callbacks to the console
struct ConsoleObserver;

impl PlayerObserver for ConsoleObserver {
    fn on_state_change(&self, from: PlayerState, to: PlayerState) {
        info!(%from, %to, "Player state");
    }

    fn on_ready(&self, session: &PlaybackSession) {
        info!(
            play_session_id = %session.play_session_id,
            method = %session.method,
            "Playback ready"
        );
    }

    fn on_time_update(&self, position_ticks: i64, duration_ticks: Option<i64>) {
        debug!(
            position = ticks_to_seconds(position_ticks),
            duration = ?duration_ticks.map(ticks_to_seconds),
            "Time update"
        );
    }

    fn on_error(&self, failure: &PlaybackFailure) {
        eprintln!("\n{}", failure.title);
        eprintln!("  {}", failure.message);
        eprintln!("  [{}] {}", failure.code, failure.detail);
    }

    fn on_segment_active(&self, action: Option<&SkipAction>) {
        match action {
            Some(action) => info!(label = %action.label, "Skip offered"),
            None => info!("Skip hidden"),
        }
    }
}

/// Run a real session against the server with a simulated sink
pub async fn play(
    config: EngineConfig,
    item: &str,
    duration: u64,
    start: Option<f64>,
    method: Option<String>,
    stall: bool,
    format: &str,
) -> anyhow::Result<()> {
    let preferences = UserPreferences {
        forced_method: parse_method(method)?,
        ..Default::default()
    };
    let (engine, handle) = PlaybackEngine::new(
        config.clone(),
        server(&config)?,
        Arc::new(HeadlessPlatform::new(stall)),
    );
    let task = engine
        .with_observer(Arc::new(ConsoleObserver))
        .with_preferences(preferences)
        .spawn();

    let mut request = LoadRequest::new(item);
    if let Some(start) = start {
        request = request.starting_at(seconds_to_ticks(start));
    }

    if let Err(e) = handle.load(request).await {
        let _ = handle.shutdown().await;
        let _ = task.await;
        return Err(e).with_context(|| format!("could not play {}", item));
    }

    let wait = async {
        if duration == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(duration)).await
        }
    };
    tokio::select! {
        _ = wait => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let status = handle.status().await?;
    let audio = handle.audio_tracks().await?;
    let subtitles = handle.subtitle_tracks().await?;
    handle.shutdown().await?;
    task.await.context("engine task panicked")?;

    if OutputFormat::from(format) == OutputFormat::Json {
        return output::print_json(&status);
    }

    println!("\nSession summary:");
    println!("  State:     {}", status.state);
    if let Some(session) = &status.session {
        println!("  Method:    {}", session.method);
        println!("  Session:   {}", session.play_session_id);
    }
    if let Some(adapter) = status.adapter {
        println!("  Adapter:   {}", adapter);
    }
    if let Some(position) = status.position_ticks {
        println!("  Position:  {:.1}s", ticks_to_seconds(position));
    }
    println!("  Restarts:  {}", status.restarts);
    if !audio.is_empty() {
        println!("\nAudio:\n{}", output::tracks_table(&audio));
    }
    if !subtitles.is_empty() {
        println!("\nSubtitles:\n{}", output::tracks_table(&subtitles));
    }
    Ok(())
}

// =============================================================================
// segments
// =============================================================================

#[derive(Serialize)]
struct SegmentReport {
    item_id: String,
    name: String,
    next_item_id: Option<String>,
    segments: Vec<marquee_core::MediaSegment>,
}

/// List skip segments and the next item
pub async fn segments(config: EngineConfig, item: &str, format: &str) -> anyhow::Result<()> {
    let server = server(&config)?;
    let details = server
        .item(item)
        .await
        .with_context(|| format!("failed to fetch item {}", item))?;
    let segments = server
        .media_segments(item)
        .await
        .context("failed to fetch media segments")?;
    let next = match server.next_item(&details).await {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "Next item lookup failed");
            None
        }
    };

    let report = SegmentReport {
        item_id: details.id.clone(),
        name: details.name.clone(),
        next_item_id: next,
        segments,
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        return output::print_json(&report);
    }

    println!("Segments for {} ({}):", report.name, report.item_id);
    if report.segments.is_empty() {
        println!("  none");
    } else {
        println!("{}", output::segments_table(&report.segments));
    }
    println!(
        "Next item: {}",
        report.next_item_id.as_deref().unwrap_or("none")
    );
    Ok(())
}

// =============================================================================
// trickplay
// =============================================================================

/// Compute a scrub preview and optionally save its sprite sheet
pub async fn trickplay(
    config: EngineConfig,
    item: &str,
    at: f64,
    source: Option<String>,
    output_path: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let server = server(&config)?;
    let details = server
        .item(item)
        .await
        .with_context(|| format!("failed to fetch item {}", item))?;
    let source = source.unwrap_or_else(|| item.to_string());

    let scrubber = TrickplayScrubber::new(
        item,
        &source,
        details.trickplay.as_ref(),
        config.device_pixel_width,
    );
    let urls = StreamUrlBuilder::new(&config.server, config.transcode.clone());
    let preview = scrubber.preview(seconds_to_ticks(at), &urls)?;

    if OutputFormat::from(format) == OutputFormat::Json {
        output::print_json(&preview)?;
    } else {
        println!("Preview at {}:", preview.time_label);
        match (&preview.tile, scrubber.tier()) {
            (Some(tile), Some((width, _))) => {
                println!("  Tier:      {}px", width);
                println!("  Sheet:     {}", tile.position.sheet_index);
                println!("  Cell:      col {} row {}", tile.position.column, tile.position.row);
                println!("  Offset:    {}", tile.background_position);
                println!("  URL:       {}", tile.url);
            }
            _ => println!("  No trickplay data for source {}", source),
        }
    }

    if let Some(path) = output_path {
        let (Some(tile), Some((width, _))) = (&preview.tile, scrubber.tier()) else {
            anyhow::bail!("no trickplay tile to download");
        };
        let bytes = server
            .trickplay_tile(item, &source, *width, tile.position.sheet_index)
            .await
            .context("failed to download sprite sheet")?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved {} bytes to {}", bytes.len(), path.display());
    }
    Ok(())
}

// =============================================================================
// profile
// =============================================================================

/// Print the device capability profile sent during negotiation
pub fn profile() -> anyhow::Result<()> {
    output::print_json(&DeviceCapabilityProfile::smart_tv())
}
