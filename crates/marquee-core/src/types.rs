//! Core types for Marquee

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Server time unit: 100ns ticks
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per millisecond
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Subtitle stream index meaning "no subtitles"
pub const SUBTITLES_DISABLED: i32 = -1;

/// Convert server ticks to seconds
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// Convert seconds to server ticks
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds.max(0.0) * TICKS_PER_SECOND as f64).round() as i64
}

/// Opaque identifier correlating one continuous playback attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaySessionId(pub Uuid);

impl PlaySessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlaySessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlaySessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// How the server delivers the media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlaybackMethod {
    /// Original file served unmodified
    DirectPlay,
    /// Container remuxed without re-encoding
    DirectStream,
    /// Re-encoded into a segmented adaptive stream
    Transcode,
}

impl PlaybackMethod {
    /// Preference order, most faithful first
    pub const ORDER: [PlaybackMethod; 3] = [
        PlaybackMethod::DirectPlay,
        PlaybackMethod::DirectStream,
        PlaybackMethod::Transcode,
    ];

    /// Whether the server serves the original bitstream
    pub fn is_direct(&self) -> bool {
        !matches!(self, PlaybackMethod::Transcode)
    }

    /// Next method down the preference order
    pub fn degrade(&self) -> Option<PlaybackMethod> {
        match self {
            PlaybackMethod::DirectPlay => Some(PlaybackMethod::DirectStream),
            PlaybackMethod::DirectStream => Some(PlaybackMethod::Transcode),
            PlaybackMethod::Transcode => None,
        }
    }
}

impl std::fmt::Display for PlaybackMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMethod::DirectPlay => write!(f, "DirectPlay"),
            PlaybackMethod::DirectStream => write!(f, "DirectStream"),
            PlaybackMethod::Transcode => write!(f, "Transcode"),
        }
    }
}

impl std::str::FromStr for PlaybackMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "directplay" | "direct" => Ok(PlaybackMethod::DirectPlay),
            "directstream" | "remux" => Ok(PlaybackMethod::DirectStream),
            "transcode" => Ok(PlaybackMethod::Transcode),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown playback method '{}'",
                other
            ))),
        }
    }
}

/// Kind of elementary stream inside a media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    #[serde(other)]
    Other,
}

/// One stream of a media source as reported by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaStream {
    /// Stream kind
    #[serde(rename = "Type")]
    pub stream_type: Option<StreamType>,
    /// Server-wide stream index within the source
    pub index: i32,
    /// Codec name (h264, aac, subrip, ...)
    pub codec: Option<String>,
    /// ISO 639 language code
    pub language: Option<String>,
    /// Server-provided display title
    pub display_title: Option<String>,
    /// Codec profile
    pub profile: Option<String>,
    /// Bitrate in bps
    pub bit_rate: Option<u64>,
    /// Audio channel count
    pub channels: Option<u32>,
    /// Video width
    pub width: Option<u32>,
    /// Video height
    pub height: Option<u32>,
    /// Dynamic range type (SDR, HDR10, DOVI, ...)
    pub video_range_type: Option<String>,
    /// Default track flag
    pub is_default: bool,
    /// Forced track flag
    pub is_forced: bool,
    /// Delivered as a separate file
    pub is_external: bool,
    /// Text (not bitmap) subtitle
    pub is_text_subtitle_stream: bool,
}

impl MediaStream {
    pub fn is_audio(&self) -> bool {
        self.stream_type == Some(StreamType::Audio)
    }

    pub fn is_subtitle(&self) -> bool {
        self.stream_type == Some(StreamType::Subtitle)
    }

    pub fn is_video(&self) -> bool {
        self.stream_type == Some(StreamType::Video)
    }

    /// Human-readable label for track menus
    pub fn label(&self) -> String {
        if let Some(title) = &self.display_title {
            return title.clone();
        }
        match (&self.language, &self.codec) {
            (Some(lang), Some(codec)) => format!("{} ({})", lang, codec.to_uppercase()),
            (Some(lang), None) => lang.clone(),
            (None, Some(codec)) => codec.to_uppercase(),
            (None, None) => format!("Track {}", self.index),
        }
    }
}

/// One playable variant of an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaSource {
    /// Media source id
    pub id: String,
    /// Container (mkv, mp4, ...)
    pub container: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Total duration in ticks
    pub run_time_ticks: Option<i64>,
    /// Total bitrate in bps
    pub bitrate: Option<u64>,
    /// Streams contained in this source
    pub media_streams: Vec<MediaStream>,
    /// Server can serve the file untouched
    pub supports_direct_play: bool,
    /// Server can remux the container
    pub supports_direct_stream: bool,
    /// Server can transcode
    pub supports_transcoding: bool,
    /// Server-issued transcoding URL (relative to the server base)
    pub transcoding_url: Option<String>,
    /// Default audio stream index
    pub default_audio_stream_index: Option<i32>,
    /// Default subtitle stream index
    pub default_subtitle_stream_index: Option<i32>,
}

impl MediaSource {
    /// Container in lower case, empty when unknown
    pub fn container(&self) -> String {
        self.container
            .as_deref()
            .and_then(|c| c.split(',').next())
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Whether the server allows a method for this source
    pub fn supports(&self, method: PlaybackMethod) -> bool {
        match method {
            PlaybackMethod::DirectPlay => self.supports_direct_play,
            PlaybackMethod::DirectStream => self.supports_direct_stream,
            PlaybackMethod::Transcode => self.supports_transcoding,
        }
    }

    /// First video stream
    pub fn video_stream(&self) -> Option<&MediaStream> {
        self.media_streams.iter().find(|s| s.is_video())
    }

    /// Audio streams in server order
    pub fn audio_streams(&self) -> impl Iterator<Item = &MediaStream> {
        self.media_streams.iter().filter(|s| s.is_audio())
    }

    /// Subtitle streams in server order
    pub fn subtitle_streams(&self) -> impl Iterator<Item = &MediaStream> {
        self.media_streams.iter().filter(|s| s.is_subtitle())
    }

    /// Look up a stream by its server index
    pub fn stream(&self, index: i32) -> Option<&MediaStream> {
        self.media_streams.iter().find(|s| s.index == index)
    }
}

/// Skippable segment kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    Intro,
    Outro,
    Credits,
    Preview,
    Recap,
}

impl SegmentType {
    /// Parse a server segment type; unsupported kinds yield None
    pub fn from_server(kind: &str) -> Option<Self> {
        match kind {
            "Intro" => Some(SegmentType::Intro),
            "Outro" => Some(SegmentType::Outro),
            "Credits" => Some(SegmentType::Credits),
            "Preview" => Some(SegmentType::Preview),
            "Recap" => Some(SegmentType::Recap),
            _ => None,
        }
    }

    /// Segments that end an episode
    pub fn is_ending(&self) -> bool {
        matches!(self, SegmentType::Outro | SegmentType::Credits)
    }
}

impl std::fmt::Display for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentType::Intro => write!(f, "intro"),
            SegmentType::Outro => write!(f, "outro"),
            SegmentType::Credits => write!(f, "credits"),
            SegmentType::Preview => write!(f, "preview"),
            SegmentType::Recap => write!(f, "recap"),
        }
    }
}

/// Server-identified time range eligible for skipping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSegment {
    pub segment_type: SegmentType,
    pub start_ticks: i64,
    pub end_ticks: i64,
}

impl MediaSegment {
    pub fn new(segment_type: SegmentType, start_ticks: i64, end_ticks: i64) -> Self {
        Self {
            segment_type,
            start_ticks,
            end_ticks,
        }
    }

    /// Duration in ticks
    pub fn duration_ticks(&self) -> i64 {
        self.end_ticks - self.start_ticks
    }

    /// Half-open containment so adjacent segments never overlap
    pub fn contains(&self, ticks: i64) -> bool {
        ticks >= self.start_ticks && ticks < self.end_ticks
    }
}

/// Sprite-sheet layout for one trickplay resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrickplayInfo {
    /// Thumbnail width in pixels
    #[serde(rename = "Width")]
    pub thumb_width: u32,
    /// Thumbnail height in pixels
    #[serde(rename = "Height")]
    pub thumb_height: u32,
    /// Thumbnails per sheet row
    pub tile_width: u32,
    /// Thumbnail rows per sheet
    pub tile_height: u32,
    /// Total thumbnails across all sheets
    #[serde(default)]
    pub thumbnail_count: u32,
    /// Milliseconds between thumbnails
    #[serde(rename = "Interval")]
    pub interval_ms: u32,
}

impl TrickplayInfo {
    /// Thumbnails held by one sprite sheet
    pub fn tiles_per_sheet(&self) -> u32 {
        self.tile_width * self.tile_height
    }
}

/// Trickplay tiers keyed by media source id, then by tier width
pub type TrickplayManifest = HashMap<String, HashMap<String, TrickplayInfo>>;

/// Item metadata the engine needs beyond playback info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemDetails {
    pub id: String,
    pub name: String,
    /// Item kind (Movie, Episode, ...)
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    pub series_id: Option<String>,
    pub run_time_ticks: Option<i64>,
    pub trickplay: Option<TrickplayManifest>,
}

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerState {
    /// No item loaded
    Idle,
    /// Negotiating with the server
    Initializing,
    /// Adapter loading the stream
    Loading,
    /// Playback confirmed
    Ready,
    /// Terminal until the next load
    Error,
}

impl PlayerState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlayerState) -> bool {
        use PlayerState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Initializing) |
            // From Initializing
            (Initializing, Loading) | (Initializing, Error) | (Initializing, Idle) |
            // From Loading
            (Loading, Loading) | (Loading, Ready) | (Loading, Error) | (Loading, Idle) |
            (Loading, Initializing) |
            // From Ready
            (Ready, Loading) | (Ready, Error) | (Ready, Idle) | (Ready, Initializing) |
            // From Error
            (Error, Initializing) | (Error, Idle)
        )
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Initializing => write!(f, "initializing"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Ready => write!(f, "ready"),
            PlayerState::Error => write!(f, "error"),
        }
    }
}

/// One continuous playback attempt; replaced, never mutated, on restart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub item_id: String,
    pub media_source_id: String,
    pub play_session_id: PlaySessionId,
    pub method: PlaybackMethod,
    pub forced_method: Option<PlaybackMethod>,
    pub audio_stream_index: Option<i32>,
    /// `SUBTITLES_DISABLED` when off
    pub subtitle_stream_index: i32,
    /// Subtitles rendered into the video by the server
    pub burn_in_subtitles: bool,
    pub start_position_ticks: i64,
    pub created_at: DateTime<Utc>,
}

impl PlaybackSession {
    /// Start a session with a freshly minted id
    pub fn new(
        item_id: impl Into<String>,
        media_source_id: impl Into<String>,
        method: PlaybackMethod,
        tracks: TrackIndices,
        start_position_ticks: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            media_source_id: media_source_id.into(),
            play_session_id: PlaySessionId::new(),
            method,
            forced_method: None,
            audio_stream_index: tracks.audio,
            subtitle_stream_index: tracks.subtitle,
            burn_in_subtitles: tracks.burn_in,
            start_position_ticks,
            created_at: Utc::now(),
        }
    }

    /// Set the user's forced method override
    pub fn with_forced_method(mut self, forced: Option<PlaybackMethod>) -> Self {
        self.forced_method = forced;
        self
    }

    pub fn is_transcoding(&self) -> bool {
        self.method == PlaybackMethod::Transcode
    }

    pub fn subtitles_enabled(&self) -> bool {
        self.subtitle_stream_index != SUBTITLES_DISABLED
    }

    pub fn tracks(&self) -> TrackIndices {
        TrackIndices {
            audio: self.audio_stream_index,
            subtitle: self.subtitle_stream_index,
            burn_in: self.burn_in_subtitles,
        }
    }
}

/// Audio/subtitle selection carried across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIndices {
    pub audio: Option<i32>,
    pub subtitle: i32,
    pub burn_in: bool,
}

impl Default for TrackIndices {
    fn default() -> Self {
        Self {
            audio: None,
            subtitle: SUBTITLES_DISABLED,
            burn_in: false,
        }
    }
}

/// Preferences persisted by the UI and read by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Continue with the next item on natural end
    pub auto_play: bool,
    /// Offer skip actions for intro/outro/recap/preview
    pub skip_segments_enabled: bool,
    /// Forced playback method, if any
    pub forced_method: Option<PlaybackMethod>,
    /// Bitrate ceiling in bps
    pub max_bitrate: Option<u64>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            auto_play: true,
            skip_segments_enabled: true,
            forced_method: None,
            max_bitrate: None,
        }
    }
}

/// UI request to start an item
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub item_id: String,
    /// Start position override in ticks
    pub start_position_ticks: Option<i64>,
    /// Explicit audio stream
    pub audio_stream_index: Option<i32>,
    /// Explicit subtitle stream (`SUBTITLES_DISABLED` for none)
    pub subtitle_stream_index: Option<i32>,
}

impl LoadRequest {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            ..Default::default()
        }
    }

    /// Start at a position in ticks
    pub fn starting_at(mut self, ticks: i64) -> Self {
        self.start_position_ticks = Some(ticks);
        self
    }
}
