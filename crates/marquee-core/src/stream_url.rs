//! Stream URL construction
//!
//! DirectPlay and DirectStream use the static stream endpoint; Transcode
//! uses the adaptive master manifest with the configured codec and size
//! ceilings. Every URL carries the session's PlaySessionId so the server
//! can correlate the stream with session notifications.

use crate::{
    config::{ServerConfig, TranscodeConfig},
    types::*,
    Result,
};
use url::Url;

/// MIME type for adaptive manifests
pub const HLS_MIME_TYPE: &str = "application/x-mpegURL";

/// Resolved stream location for an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUrl {
    pub url: Url,
    pub mime_type: String,
    /// Media position the stream begins at, in ticks
    pub offset_ticks: i64,
}

/// Map a container to the MIME type handed to the adapter
pub fn container_mime_type(container: &str) -> String {
    match container {
        "mkv" => "video/x-matroska".to_string(),
        "mov" => "video/quicktime".to_string(),
        "ts" | "mpegts" => "video/mp2t".to_string(),
        "m4v" => "video/mp4".to_string(),
        "avi" => "video/x-msvideo".to_string(),
        "" => "video/mp4".to_string(),
        other => format!("video/{}", other),
    }
}

/// Builds stream and tile URLs against one server
#[derive(Debug, Clone)]
pub struct StreamUrlBuilder {
    base: Url,
    device_id: String,
    api_key: String,
    transcode: TranscodeConfig,
}

impl StreamUrlBuilder {
    pub fn new(server: &ServerConfig, transcode: TranscodeConfig) -> Self {
        Self {
            base: server.base(),
            device_id: server.device_id.clone(),
            api_key: server.access_token.clone(),
            transcode,
        }
    }

    /// URL for a session, following its delivery method
    pub fn for_session(
        &self,
        session: &PlaybackSession,
        source: &MediaSource,
        max_bitrate: Option<u64>,
    ) -> Result<StreamUrl> {
        match session.method {
            PlaybackMethod::Transcode => self.transcode(session, source, max_bitrate),
            PlaybackMethod::DirectPlay | PlaybackMethod::DirectStream => {
                self.static_stream(session, source)
            }
        }
    }

    /// Static stream, original file or remuxed container
    pub fn static_stream(
        &self,
        session: &PlaybackSession,
        source: &MediaSource,
    ) -> Result<StreamUrl> {
        let container = source.container();
        let path = if container.is_empty() {
            format!("Videos/{}/stream", session.item_id)
        } else {
            format!("Videos/{}/stream.{}", session.item_id, container)
        };
        let mut url = self.base.join(&path)?;
        let is_static = session.method == PlaybackMethod::DirectPlay;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("Static", if is_static { "true" } else { "false" })
                .append_pair("mediaSourceId", &session.media_source_id)
                .append_pair("deviceId", &self.device_id)
                .append_pair("api_key", &self.api_key)
                .append_pair("PlaySessionId", &session.play_session_id.to_string());

            // A remux only carries the streams it is asked for
            if !is_static {
                if let Some(audio) = session.audio_stream_index {
                    query.append_pair("AudioStreamIndex", &audio.to_string());
                }
                if session.subtitles_enabled() {
                    query.append_pair(
                        "SubtitleStreamIndex",
                        &session.subtitle_stream_index.to_string(),
                    );
                }
            }
        }

        Ok(StreamUrl {
            url,
            mime_type: container_mime_type(&container),
            offset_ticks: 0,
        })
    }

    /// Adaptive master manifest for a transcode
    pub fn transcode(
        &self,
        session: &PlaybackSession,
        source: &MediaSource,
        max_bitrate: Option<u64>,
    ) -> Result<StreamUrl> {
        let mut url = self
            .base
            .join(&format!("Videos/{}/master.m3u8", session.item_id))?;
        let bitrate = max_bitrate.unwrap_or(self.transcode.default_max_bitrate);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("MediaSourceId", &source.id)
                .append_pair("DeviceId", &self.device_id)
                .append_pair("api_key", &self.api_key)
                .append_pair("PlaySessionId", &session.play_session_id.to_string())
                .append_pair("VideoCodec", &self.transcode.video_codec)
                .append_pair("AudioCodec", &self.transcode.audio_codec)
                .append_pair("MaxStreamingBitrate", &bitrate.to_string())
                .append_pair("MaxWidth", &self.transcode.max_width.to_string())
                .append_pair("MaxHeight", &self.transcode.max_height.to_string())
                .append_pair("SegmentLength", &self.transcode.segment_length.to_string())
                .append_pair(
                    "TranscodingMaxAudioChannels",
                    &self.transcode.max_audio_channels.to_string(),
                );

            if let Some(audio) = session.audio_stream_index {
                query.append_pair("AudioStreamIndex", &audio.to_string());
            }
            if session.subtitles_enabled() {
                query.append_pair(
                    "SubtitleStreamIndex",
                    &session.subtitle_stream_index.to_string(),
                );
                if session.burn_in_subtitles {
                    query.append_pair("SubtitleMethod", "Encode");
                }
            }
            if session.start_position_ticks > 0 {
                query.append_pair("StartTimeTicks", &session.start_position_ticks.to_string());
            }
        }

        Ok(StreamUrl {
            url,
            mime_type: HLS_MIME_TYPE.to_string(),
            offset_ticks: session.start_position_ticks.max(0),
        })
    }

    /// Server-issued transcoding URL rebound to this session's id
    pub fn server_transcode(
        &self,
        session: &PlaybackSession,
        transcoding_url: &str,
    ) -> Result<StreamUrl> {
        let mut url = self.base.join(transcoding_url.trim_start_matches('/'))?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !key.eq_ignore_ascii_case("PlaySessionId"))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let offset_ticks = pairs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("StartTimeTicks"))
            .and_then(|(_, value)| value.parse::<i64>().ok())
            .unwrap_or(0);

        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .append_pair("PlaySessionId", &session.play_session_id.to_string());

        Ok(StreamUrl {
            url,
            mime_type: HLS_MIME_TYPE.to_string(),
            offset_ticks,
        })
    }

    /// One trickplay sprite sheet
    pub fn trickplay_tile(
        &self,
        item_id: &str,
        media_source_id: &str,
        width: u32,
        sheet_index: u32,
    ) -> Result<Url> {
        let mut url = self.base.join(&format!(
            "Videos/{}/Trickplay/{}/{}.jpg",
            item_id, width, sheet_index
        ))?;
        url.query_pairs_mut()
            .append_pair("MediaSourceId", media_source_id)
            .append_pair("api_key", &self.api_key);
        Ok(url)
    }
}
