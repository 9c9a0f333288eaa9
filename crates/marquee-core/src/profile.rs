//! Device capability profile
//!
//! Describes what the running device can consume directly. The serialized
//! part is sent to the server during negotiation in its DeviceProfile shape;
//! the platform traits (which containers the generic media element decodes,
//! which dynamic ranges need native passthrough) stay local and drive
//! adapter selection.

use crate::types::MediaSource;
use serde::{Deserialize, Serialize};

/// Direct play rule for one container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectPlayProfile {
    pub container: String,
    #[serde(rename = "Type")]
    pub media_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

/// Transcoding target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscodingProfile {
    pub container: String,
    #[serde(rename = "Type")]
    pub media_type: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub protocol: String,
    pub context: String,
    pub max_audio_channels: String,
    pub min_segments: u32,
    pub break_on_non_key_frames: bool,
}

/// How a subtitle format is delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubtitleProfile {
    pub format: String,
    pub method: String,
}

/// Static description of the device's decode capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceCapabilityProfile {
    pub name: String,
    pub max_streaming_bitrate: u64,
    pub max_static_bitrate: u64,
    pub music_streaming_transcoding_bitrate: u64,
    pub direct_play_profiles: Vec<DirectPlayProfile>,
    pub transcoding_profiles: Vec<TranscodingProfile>,
    pub subtitle_profiles: Vec<SubtitleProfile>,
    /// Containers the generic media element decodes natively
    #[serde(skip)]
    pub element_containers: Vec<String>,
    /// Video range types only the native adapter can pass through
    #[serde(skip)]
    pub passthrough_ranges: Vec<String>,
}

impl DeviceCapabilityProfile {
    /// Profile for a typical smart-TV class device
    pub fn smart_tv() -> Self {
        let direct = |container: &str, video: &str, audio: &str| DirectPlayProfile {
            container: container.to_string(),
            media_type: "Video".to_string(),
            video_codec: Some(video.to_string()),
            audio_codec: Some(audio.to_string()),
        };

        Self {
            name: "Marquee".to_string(),
            max_streaming_bitrate: 120_000_000,
            max_static_bitrate: 100_000_000,
            music_streaming_transcoding_bitrate: 384_000,
            direct_play_profiles: vec![
                direct("mp4,m4v", "h264,hevc,av1", "aac,ac3,eac3,mp3,flac"),
                direct("mkv", "h264,hevc,av1,vp9", "aac,ac3,eac3,dts,mp3,flac,opus"),
                direct("webm", "vp8,vp9,av1", "vorbis,opus"),
                direct("ts,mpegts", "h264,hevc", "aac,ac3,eac3,mp3"),
            ],
            transcoding_profiles: vec![TranscodingProfile {
                container: "ts".to_string(),
                media_type: "Video".to_string(),
                video_codec: "h264".to_string(),
                audio_codec: "aac,ac3".to_string(),
                protocol: "hls".to_string(),
                context: "Streaming".to_string(),
                max_audio_channels: "6".to_string(),
                min_segments: 1,
                break_on_non_key_frames: false,
            }],
            subtitle_profiles: vec![
                SubtitleProfile { format: "vtt".into(), method: "External".into() },
                SubtitleProfile { format: "srt".into(), method: "External".into() },
                SubtitleProfile { format: "subrip".into(), method: "Embed".into() },
                SubtitleProfile { format: "ass".into(), method: "Encode".into() },
                SubtitleProfile { format: "pgssub".into(), method: "Encode".into() },
                SubtitleProfile { format: "dvdsub".into(), method: "Encode".into() },
            ],
            element_containers: ["mp4", "m4v", "webm", "mov"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            passthrough_ranges: ["DOVI", "DOVIWithHDR10", "DOVIWithHLG", "DOVIWithSDR", "HDR10Plus"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Cap the streaming bitrate to a user ceiling
    pub fn with_max_bitrate(mut self, max_bitrate: Option<u64>) -> Self {
        if let Some(cap) = max_bitrate {
            self.max_streaming_bitrate = self.max_streaming_bitrate.min(cap);
        }
        self
    }

    /// Whether the generic media element decodes this container natively
    pub fn element_supports_container(&self, container: &str) -> bool {
        let container = container.to_ascii_lowercase();
        self.element_containers.iter().any(|c| *c == container)
    }

    /// Whether the source's video needs native passthrough for full fidelity
    pub fn requires_passthrough(&self, source: &MediaSource) -> bool {
        source
            .video_stream()
            .and_then(|v| v.video_range_type.as_deref())
            .map(|range| self.passthrough_ranges.iter().any(|r| r == range))
            .unwrap_or(false)
    }
}

impl Default for DeviceCapabilityProfile {
    fn default() -> Self {
        Self::smart_tv()
    }
}
