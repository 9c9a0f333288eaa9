//! Track selection
//!
//! Lists the audio and subtitle streams of the active source and decides
//! whether a selection can be applied live by the adapter or needs the
//! session restarted with new stream indices.

use crate::{types::*, Error, Result};
use serde::Serialize;

/// Track entry for UI menus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackInfo {
    pub index: i32,
    pub label: String,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub is_default: bool,
    pub is_forced: bool,
    pub is_external: bool,
    pub selected: bool,
}

impl TrackInfo {
    fn from_stream(stream: &MediaStream, selected: bool) -> Self {
        Self {
            index: stream.index,
            label: stream.label(),
            language: stream.language.clone(),
            codec: stream.codec.clone(),
            is_default: stream.is_default,
            is_forced: stream.is_forced,
            is_external: stream.is_external,
            selected,
        }
    }
}

/// Why a session is being restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    AudioChange,
    SubtitleChange,
    Seek,
}

/// Everything needed to restart the current item in a new session
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPlan {
    pub item_id: String,
    pub tracks: TrackIndices,
    pub start_position_ticks: i64,
    /// Only a transcode can deliver the requested tracks
    pub transcode_only: bool,
    /// The original file cannot deliver the requested tracks
    pub disable_direct_play: bool,
    pub reason: RestartReason,
}

impl RestartPlan {
    pub fn new(
        session: &PlaybackSession,
        tracks: TrackIndices,
        position_ticks: i64,
        reason: RestartReason,
    ) -> Self {
        Self {
            item_id: session.item_id.clone(),
            tracks,
            start_position_ticks: position_ticks.max(0),
            transcode_only: tracks.burn_in,
            disable_direct_play: false,
            reason,
        }
    }
}

/// Outcome of a track selection request
#[derive(Debug, Clone, PartialEq)]
pub enum TrackChange {
    /// Already selected
    Unchanged,
    /// Ask the adapter; restart with `fallback` if it refuses
    Live { fallback: RestartPlan },
    /// Restart the session
    Reload(RestartPlan),
}

/// Audio streams of a source, marking the active one
pub fn audio_tracks(source: &MediaSource, session: Option<&PlaybackSession>) -> Vec<TrackInfo> {
    let active = session.and_then(|s| s.audio_stream_index);
    source
        .audio_streams()
        .map(|s| TrackInfo::from_stream(s, Some(s.index) == active))
        .collect()
}

/// Subtitle streams of a source, marking the active one
pub fn subtitle_tracks(
    source: &MediaSource,
    session: Option<&PlaybackSession>,
) -> Vec<TrackInfo> {
    let active = session
        .map(|s| s.subtitle_stream_index)
        .unwrap_or(SUBTITLES_DISABLED);
    source
        .subtitle_streams()
        .map(|s| TrackInfo::from_stream(s, s.index == active))
        .collect()
}

/// Audio stream a player picks on its own: the server default, else the
/// stream flagged default, else the first
pub fn default_audio_index(source: &MediaSource) -> Option<i32> {
    source.default_audio_stream_index.or_else(|| {
        source
            .audio_streams()
            .find(|s| s.is_default)
            .or_else(|| source.audio_streams().next())
            .map(|s| s.index)
    })
}

/// Tracks to start an item with: explicit request, else the source defaults
pub fn initial_tracks(source: &MediaSource, request: &LoadRequest) -> TrackIndices {
    let audio = request
        .audio_stream_index
        .or_else(|| default_audio_index(source));

    let subtitle = request
        .subtitle_stream_index
        .or(source.default_subtitle_stream_index)
        .unwrap_or(SUBTITLES_DISABLED);

    TrackIndices {
        audio,
        subtitle,
        burn_in: false,
    }
}

/// Adapter work needed so a freshly started session plays its selected tracks
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSync {
    /// The delivered stream already carries the selection
    InStream,
    /// Select these on the adapter; restart with `fallback` if it refuses
    Live {
        audio: Option<i32>,
        subtitle: Option<i32>,
        fallback: RestartPlan,
    },
    /// The adapter cannot present the selection; restart the session
    Reload(RestartPlan),
}

/// Reconcile a started session's tracks with what its stream delivers.
///
/// A transcode and a remux are built with the selected indices. The
/// original file plays its default audio, and subtitles of a direct stream
/// always need the adapter to show them.
pub fn plan_track_sync(
    session: &PlaybackSession,
    source: &MediaSource,
    live_audio: bool,
    live_subtitle: bool,
    position_ticks: i64,
) -> TrackSync {
    if session.is_transcoding() {
        return TrackSync::InStream;
    }

    let audio = session.audio_stream_index.filter(|index| {
        session.method == PlaybackMethod::DirectPlay
            && Some(*index) != default_audio_index(source)
            && source.stream(*index).is_some_and(|s| s.is_audio())
    });
    let subtitle = Some(session.subtitle_stream_index).filter(|index| {
        session.subtitles_enabled() && source.stream(*index).is_some_and(|s| s.is_subtitle())
    });
    if audio.is_none() && subtitle.is_none() {
        return TrackSync::InStream;
    }

    let tracks = TrackIndices {
        burn_in: subtitle.is_some(),
        ..session.tracks()
    };
    let reason = if audio.is_some() {
        RestartReason::AudioChange
    } else {
        RestartReason::SubtitleChange
    };
    let mut plan = RestartPlan::new(session, tracks, position_ticks, reason);
    plan.disable_direct_play = audio.is_some();

    let audio_ok = audio.is_none() || live_audio;
    let subtitle_ok = subtitle.is_none() || live_subtitle;
    if audio_ok && subtitle_ok {
        TrackSync::Live {
            audio,
            subtitle,
            fallback: plan,
        }
    } else {
        // Only ask the server for what the adapter cannot do itself
        if audio_ok {
            plan.disable_direct_play = false;
        }
        if subtitle_ok {
            plan.tracks.burn_in = false;
            plan.transcode_only = false;
        }
        plan.reason = if audio_ok {
            RestartReason::SubtitleChange
        } else {
            RestartReason::AudioChange
        };
        TrackSync::Reload(plan)
    }
}

/// Decide how to apply an audio selection
pub fn plan_audio_switch(
    session: &PlaybackSession,
    source: &MediaSource,
    live_capable: bool,
    index: i32,
    position_ticks: i64,
) -> Result<TrackChange> {
    if !source.stream(index).is_some_and(|s| s.is_audio()) {
        return Err(Error::UnknownStream { index });
    }
    if session.audio_stream_index == Some(index) {
        return Ok(TrackChange::Unchanged);
    }

    let tracks = TrackIndices {
        audio: Some(index),
        ..session.tracks()
    };
    let mut plan = RestartPlan::new(session, tracks, position_ticks, RestartReason::AudioChange);
    // A static file always plays its default audio; ask for a remux instead
    plan.disable_direct_play = session.method == PlaybackMethod::DirectPlay;

    if live_capable && !session.is_transcoding() {
        Ok(TrackChange::Live { fallback: plan })
    } else {
        Ok(TrackChange::Reload(plan))
    }
}

/// Decide how to apply a subtitle selection; `SUBTITLES_DISABLED` turns
/// subtitles off
pub fn plan_subtitle_switch(
    session: &PlaybackSession,
    source: &MediaSource,
    live_capable: bool,
    index: i32,
    position_ticks: i64,
) -> Result<TrackChange> {
    if index != SUBTITLES_DISABLED && !source.stream(index).is_some_and(|s| s.is_subtitle()) {
        return Err(Error::UnknownStream { index });
    }
    if session.subtitle_stream_index == index {
        return Ok(TrackChange::Unchanged);
    }

    // Turning subtitles off never needs the server to render anything
    let burn_in = index != SUBTITLES_DISABLED;
    let tracks = TrackIndices {
        audio: session.audio_stream_index,
        subtitle: index,
        burn_in,
    };
    let plan = RestartPlan::new(session, tracks, position_ticks, RestartReason::SubtitleChange);

    let live = if burn_in {
        live_capable
    } else {
        !session.burn_in_subtitles
    };

    if live && !session.is_transcoding() {
        Ok(TrackChange::Live { fallback: plan })
    } else {
        Ok(TrackChange::Reload(plan))
    }
}
