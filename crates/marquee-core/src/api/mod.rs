//! Media server API
//!
//! The engine talks to the server only through [`MediaServer`], so the
//! coordinator can run against the HTTP client or an in-memory double.

mod http;

pub use http::HttpMediaServer;

use crate::{
    profile::DeviceCapabilityProfile,
    types::*,
    Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Capability negotiation request for one item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackInfoRequest {
    /// Item being negotiated (sent in the path)
    #[serde(skip)]
    pub item_id: String,
    pub user_id: String,
    pub device_profile: DeviceCapabilityProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_streaming_bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_ticks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_stream_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source_id: Option<String>,
    pub enable_direct_play: bool,
    pub enable_direct_stream: bool,
    pub enable_transcoding: bool,
    pub allow_video_stream_copy: bool,
    pub allow_audio_stream_copy: bool,
    pub auto_open_live_stream: bool,
}

impl PlaybackInfoRequest {
    /// Request allowing every delivery method
    pub fn new(
        item_id: impl Into<String>,
        user_id: impl Into<String>,
        device_profile: DeviceCapabilityProfile,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            user_id: user_id.into(),
            device_profile,
            max_streaming_bitrate: None,
            start_time_ticks: None,
            audio_stream_index: None,
            subtitle_stream_index: None,
            media_source_id: None,
            enable_direct_play: true,
            enable_direct_stream: true,
            enable_transcoding: true,
            allow_video_stream_copy: true,
            allow_audio_stream_copy: true,
            auto_open_live_stream: true,
        }
    }
}

/// Negotiation response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlaybackInfo {
    /// Playable variants, first entry authoritative
    pub media_sources: Vec<MediaSource>,
    /// Server-side failure reason
    pub error_code: Option<String>,
}

/// Body of start/progress/stop notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackReport {
    pub item_id: String,
    pub media_source_id: String,
    pub play_session_id: String,
    pub position_ticks: i64,
    pub is_paused: bool,
    pub is_muted: bool,
    pub volume_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_index: Option<i32>,
    pub subtitle_stream_index: i32,
    pub play_method: PlaybackMethod,
    pub can_seek: bool,
}

/// Segment list wire shape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct SegmentList {
    pub items: Vec<SegmentDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct SegmentDto {
    #[serde(rename = "Type")]
    pub segment_type: String,
    pub start_ticks: i64,
    pub end_ticks: i64,
}

impl SegmentList {
    /// Keep only segment kinds the engine can skip
    pub fn into_segments(self) -> Vec<MediaSegment> {
        self.items
            .into_iter()
            .filter_map(|dto| {
                SegmentType::from_server(&dto.segment_type)
                    .map(|kind| MediaSegment::new(kind, dto.start_ticks, dto.end_ticks))
            })
            .collect()
    }
}

/// Everything the engine needs from the media server
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Negotiate delivery for an item
    async fn playback_info(&self, request: &PlaybackInfoRequest) -> Result<PlaybackInfo>;

    /// Item metadata including the trickplay manifest
    async fn item(&self, item_id: &str) -> Result<ItemDetails>;

    /// Skip segments for an item
    async fn media_segments(&self, item_id: &str) -> Result<Vec<MediaSegment>>;

    /// Item that follows this one (next episode), if any
    async fn next_item(&self, item: &ItemDetails) -> Result<Option<String>>;

    /// Playback started notification
    async fn report_start(&self, report: &PlaybackReport) -> Result<()>;

    /// Periodic progress notification
    async fn report_progress(&self, report: &PlaybackReport) -> Result<()>;

    /// Playback stopped notification
    async fn report_stop(&self, report: &PlaybackReport) -> Result<()>;

    /// One trickplay sprite sheet
    async fn trickplay_tile(
        &self,
        item_id: &str,
        media_source_id: &str,
        width: u32,
        sheet_index: u32,
    ) -> Result<Bytes>;
}
