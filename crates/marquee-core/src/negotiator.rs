//! Capability negotiation
//!
//! Asks the server which media sources exist for an item and picks the
//! delivery method: DirectPlay, else DirectStream, else Transcode. A forced
//! method from the user's preferences narrows the choice and degrades down
//! the same ordering when the server cannot honour it.

use crate::{
    api::{MediaServer, PlaybackInfoRequest},
    profile::DeviceCapabilityProfile,
    types::*,
    Error, Result,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Inputs for one negotiation
#[derive(Debug, Clone, Default)]
pub struct NegotiationParams {
    pub item_id: String,
    pub start_position_ticks: Option<i64>,
    pub audio_stream_index: Option<i32>,
    pub subtitle_stream_index: Option<i32>,
    pub forced_method: Option<PlaybackMethod>,
    pub max_bitrate: Option<u64>,
    /// Only a transcode is acceptable (server-side subtitle burn-in)
    pub transcode_only: bool,
    /// Serving the original file untouched is not acceptable
    pub disable_direct_play: bool,
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone)]
pub struct NegotiatedPlayback {
    /// Authoritative media source
    pub source: MediaSource,
    /// Chosen delivery method
    pub method: PlaybackMethod,
    /// Freshly minted for this negotiation
    pub play_session_id: PlaySessionId,
}

/// Pick the delivery method for a source.
///
/// Without an override the first supported method in
/// [`PlaybackMethod::ORDER`] wins. With one, the requested method is tried
/// first, then each lower method in turn; an override nothing at or below
/// can satisfy falls back to the unforced ordering.
pub fn choose_method(
    source: &MediaSource,
    forced: Option<PlaybackMethod>,
) -> Option<PlaybackMethod> {
    if let Some(requested) = forced {
        let mut candidate = Some(requested);
        while let Some(method) = candidate {
            if source.supports(method) {
                if method != requested {
                    warn!(
                        requested = %requested,
                        using = %method,
                        source_id = %source.id,
                        "Forced playback method unsupported, degraded"
                    );
                }
                return Some(method);
            }
            candidate = method.degrade();
        }
        warn!(
            requested = %requested,
            source_id = %source.id,
            "Forced playback method unsatisfiable, using default order"
        );
    }

    PlaybackMethod::ORDER
        .into_iter()
        .find(|method| source.supports(*method))
}

/// Negotiates delivery with the media server
pub struct CapabilityNegotiator {
    server: Arc<dyn MediaServer>,
    profile: DeviceCapabilityProfile,
    user_id: String,
}

impl CapabilityNegotiator {
    pub fn new(
        server: Arc<dyn MediaServer>,
        profile: DeviceCapabilityProfile,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            server,
            profile,
            user_id: user_id.into(),
        }
    }

    /// Device profile sent with every negotiation
    pub fn profile(&self) -> &DeviceCapabilityProfile {
        &self.profile
    }

    /// Build the server request for these parameters
    pub fn request(&self, params: &NegotiationParams) -> PlaybackInfoRequest {
        let profile = self.profile.clone().with_max_bitrate(params.max_bitrate);
        let mut request = PlaybackInfoRequest::new(&params.item_id, &self.user_id, profile);
        request.max_streaming_bitrate = params.max_bitrate;
        request.start_time_ticks = params.start_position_ticks;
        request.audio_stream_index = params.audio_stream_index;
        request.subtitle_stream_index = params.subtitle_stream_index;
        if params.transcode_only || params.disable_direct_play {
            request.enable_direct_play = false;
        }
        if params.transcode_only {
            request.enable_direct_stream = false;
        }
        request
    }

    /// Negotiate delivery for an item
    #[instrument(skip(self, params), fields(item_id = %params.item_id))]
    pub async fn negotiate(&self, params: &NegotiationParams) -> Result<NegotiatedPlayback> {
        let request = self.request(params);
        let info = self.server.playback_info(&request).await.map_err(|e| match e {
            Error::NegotiationFailure(_) => e,
            other => Error::negotiation(other.to_string()),
        })?;

        if let Some(code) = info.error_code {
            return Err(Error::negotiation(format!("server refused playback: {}", code)));
        }

        let mut source = info
            .media_sources
            .into_iter()
            .next()
            .ok_or_else(|| Error::negotiation("server returned no media sources"))?;

        // Servers may still advertise methods the request disabled
        if !request.enable_direct_play {
            source.supports_direct_play = false;
        }
        if !request.enable_direct_stream {
            source.supports_direct_stream = false;
        }

        let method = choose_method(&source, params.forced_method).ok_or_else(|| {
            Error::NoPlayableSource {
                item_id: params.item_id.clone(),
            }
        })?;

        let play_session_id = PlaySessionId::new();
        info!(
            source_id = %source.id,
            container = %source.container(),
            method = %method,
            play_session_id = %play_session_id,
            "Negotiated playback"
        );

        Ok(NegotiatedPlayback {
            source,
            method,
            play_session_id,
        })
    }
}
