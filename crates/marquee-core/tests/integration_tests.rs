//! Integration tests for Marquee Core

mod common;

use common::*;
use marquee_core::{
    events::TimerKind,
    AdapterEvent, AdapterKind, EngineEvent, LoadRequest, MediaSegment, MediaSource, MediaStream,
    PlaybackEngine, PlaybackFailure, PlaybackMethod, PlayerObserver, PlayerState, SegmentType,
    SkipAction, SkipTarget, StreamType, UserPreferences, SUBTITLES_DISABLED,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn dovi_mp4() -> MediaSource {
    let mut source = source("mp4");
    source.media_streams[0] = MediaStream {
        video_range_type: Some("DOVI".into()),
        ..stream(0, StreamType::Video, "hevc", "und")
    };
    source
}

fn transcode_only(container: &str) -> MediaSource {
    MediaSource {
        supports_direct_play: false,
        supports_direct_stream: false,
        ..source(container)
    }
}

#[derive(Default)]
struct RecordingObserver {
    states: Mutex<Vec<(PlayerState, PlayerState)>>,
    failures: Mutex<Vec<PlaybackFailure>>,
    skips: Mutex<Vec<Option<String>>>,
}

impl PlayerObserver for RecordingObserver {
    fn on_state_change(&self, from: PlayerState, to: PlayerState) {
        self.states.lock().unwrap().push((from, to));
    }

    fn on_error(&self, failure: &PlaybackFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }

    fn on_segment_active(&self, action: Option<&SkipAction>) {
        self.skips
            .lock()
            .unwrap()
            .push(action.map(|a| a.label.clone()));
    }
}

// =============================================================================
// Negotiation and Startup
// =============================================================================

#[tokio::test]
async fn test_direct_play_starts_without_restarts() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform.clone());

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.state(), PlayerState::Ready);
    assert_eq!(coordinator.restarts(), 0);
    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Generic));

    let session = coordinator.session().unwrap();
    assert_eq!(session.method, PlaybackMethod::DirectPlay);
    assert_eq!(session.audio_stream_index, Some(1));
    assert_eq!(session.subtitle_stream_index, SUBTITLES_DISABLED);

    let url = coordinator.stream_url().unwrap();
    assert_eq!(url.path(), "/Videos/movie/stream.mp4");
    assert_eq!(query(url, "Static").as_deref(), Some("true"));
    assert_eq!(
        query(url, "PlaySessionId"),
        Some(session.play_session_id.to_string())
    );

    let starts = server.wait_for(ReportKind::Start, 1).await;
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].play_session_id, session.play_session_id.to_string());
}

#[tokio::test]
async fn test_transcode_only_source_uses_manifest() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("show", transcode_only("avi"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform.clone());

    coordinator.load(LoadRequest::new("show")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    let session = coordinator.session().unwrap();
    assert!(session.is_transcoding());
    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Adaptive));

    let url = coordinator.stream_url().unwrap();
    assert!(url.path().ends_with("/master.m3u8"));
    assert_eq!(query(url, "MediaSourceId").as_deref(), Some("src1"));
    assert_eq!(query(url, "AudioStreamIndex").as_deref(), Some("1"));
    assert!(query(url, "SubtitleStreamIndex").is_none());
    assert!(query(url, "StartTimeTicks").is_none());
    assert_eq!(coordinator.state(), PlayerState::Ready);
}

#[tokio::test]
async fn test_server_transcoding_url_gets_our_session_id() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item(
        "show",
        MediaSource {
            transcoding_url: Some(
                "/videos/show/master.m3u8?MediaSourceId=src1&PlaySessionId=server&StartTimeTicks=600000000"
                    .into(),
            ),
            ..transcode_only("avi")
        },
    );
    let (mut coordinator, _tx, _rx) = coordinator(server, platform.clone());

    coordinator
        .load(LoadRequest::new("show").starting_at(60 * SECOND))
        .await
        .unwrap();

    let session = coordinator.session().unwrap().clone();
    let url = platform.last_url();
    assert_eq!(
        query(&url, "PlaySessionId"),
        Some(session.play_session_id.to_string())
    );
    assert_eq!(url.query_pairs().filter(|(k, _)| k == "PlaySessionId").count(), 1);
    // The manifest starts at the offset and the sink has played one second
    assert_eq!(coordinator.position_ticks(), Some(61 * SECOND));
}

#[tokio::test]
async fn test_forced_method_degrades() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item(
        "movie",
        MediaSource {
            supports_direct_play: false,
            ..source("mkv")
        },
    );
    let (coordinator, _tx, _rx) = coordinator(server, platform);
    let mut coordinator = coordinator.with_preferences(UserPreferences {
        forced_method: Some(PlaybackMethod::DirectPlay),
        ..Default::default()
    });

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    let session = coordinator.session().unwrap();
    assert_eq!(session.method, PlaybackMethod::DirectStream);
    assert_eq!(session.forced_method, Some(PlaybackMethod::DirectPlay));
}

#[tokio::test]
async fn test_unplayable_item_surfaces_failure() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item(
        "movie",
        MediaSource {
            supports_direct_play: false,
            supports_direct_stream: false,
            supports_transcoding: false,
            ..source("mkv")
        },
    );
    let observer = Arc::new(RecordingObserver::default());
    let (coordinator, _tx, _rx) = coordinator(server, platform.clone());
    let mut coordinator = coordinator.with_observer(observer.clone());

    let err = coordinator.load(LoadRequest::new("movie")).await.unwrap_err();
    assert_eq!(err.error_code(), "NO_PLAYABLE_SOURCE");
    assert_eq!(coordinator.state(), PlayerState::Error);
    assert!(platform.records().is_empty());
    assert_eq!(
        observer.states.lock().unwrap().last(),
        Some(&(PlayerState::Initializing, PlayerState::Error))
    );

    let failures = observer.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].title, "Unsupported Media");
}

#[tokio::test]
async fn test_unknown_item_is_negotiation_failure() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    let (mut coordinator, _tx, _rx) = coordinator(server, platform);

    let err = coordinator.load(LoadRequest::new("missing")).await.unwrap_err();
    assert_eq!(err.error_code(), "NEGOTIATION_FAILED");
    assert_eq!(coordinator.state(), PlayerState::Error);

    // Error is left by the next load
    assert!(coordinator.load(LoadRequest::new("missing")).await.is_err());
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_native_falls_back_once_to_generic() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    platform.set_behaviour(AdapterKind::Native, SinkBehaviour::Stuck);
    server.add_item("movie", dovi_mp4());
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform.clone());

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Native));
    let first_id = coordinator.session().unwrap().play_session_id;

    for _ in 0..100 {
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = coordinator.handle_event(event).await;
        if coordinator.state() == PlayerState::Ready {
            break;
        }
    }

    assert_eq!(coordinator.state(), PlayerState::Ready);
    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Generic));
    assert_eq!(coordinator.restarts(), 1);
    assert_eq!(
        platform.opened_kinds(),
        vec![AdapterKind::Native, AdapterKind::Generic]
    );

    let session = coordinator.session().unwrap();
    assert_eq!(session.method, PlaybackMethod::DirectPlay);
    assert_ne!(session.play_session_id, first_id);

    // The stuck native pipeline got exactly one resume attempt
    let native = &platform.records()[0];
    assert_eq!(native.calls.iter().filter(|c| *c == "play").count(), 2);
    assert!(native.calls.contains(&"close".to_string()));

    let stops = server.wait_for(ReportKind::Stop, 1).await;
    assert_eq!(stops[0].play_session_id, first_id.to_string());
}

#[tokio::test]
async fn test_rejected_adapters_walk_the_chain_to_transcode() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    platform.set_behaviour(AdapterKind::Native, SinkBehaviour::Reject);
    platform.set_behaviour(AdapterKind::Generic, SinkBehaviour::Reject);
    server.add_item("movie", dovi_mp4());
    let (mut coordinator, _tx, mut rx) = coordinator(server, platform.clone());

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Adaptive));
    assert!(coordinator.session().unwrap().is_transcoding());
    assert_eq!(coordinator.restarts(), 2);
    assert_eq!(coordinator.state(), PlayerState::Ready);
}

#[tokio::test]
async fn test_exhausted_chain_is_terminal() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    platform.set_behaviour(AdapterKind::Adaptive, SinkBehaviour::Reject);
    server.add_item("show", transcode_only("avi"));
    let observer = Arc::new(RecordingObserver::default());
    let (coordinator, _tx, _rx) = coordinator(server, platform);
    let mut coordinator = coordinator.with_observer(observer.clone());

    let err = coordinator.load(LoadRequest::new("show")).await.unwrap_err();
    assert_eq!(err.error_code(), "PLAYBACK_FAILED");
    assert_eq!(coordinator.state(), PlayerState::Error);
    assert!(coordinator.session().is_none());
    assert_eq!(observer.failures.lock().unwrap().len(), 1);
}

// =============================================================================
// Track Switching
// =============================================================================

#[tokio::test]
async fn test_subtitle_during_transcode_restarts_with_burn_in() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("show", transcode_only("avi"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform.clone());

    let mut request = LoadRequest::new("show");
    request.audio_stream_index = Some(2);
    coordinator.load(request).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    let old_id = coordinator.session().unwrap().play_session_id;

    coordinator.select_subtitle(4).await.unwrap();

    let session = coordinator.session().unwrap().clone();
    assert_ne!(session.play_session_id, old_id);
    assert!(session.burn_in_subtitles);
    assert_eq!(session.subtitle_stream_index, 4);
    assert_eq!(session.audio_stream_index, Some(2));

    let url = coordinator.stream_url().unwrap();
    assert_eq!(query(url, "SubtitleStreamIndex").as_deref(), Some("4"));
    assert_eq!(query(url, "SubtitleMethod").as_deref(), Some("Encode"));
    assert_eq!(query(url, "AudioStreamIndex").as_deref(), Some("2"));
    assert_eq!(
        query(url, "PlaySessionId"),
        Some(session.play_session_id.to_string())
    );

    let request = server.last_request();
    assert!(!request.enable_direct_play);
    assert!(!request.enable_direct_stream);
    assert_eq!(request.subtitle_stream_index, Some(4));

    let stops = server.wait_for(ReportKind::Stop, 1).await;
    assert_eq!(stops[0].play_session_id, old_id.to_string());
}

#[tokio::test]
async fn test_live_audio_switch_keeps_session() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mkv"));
    let (mut coordinator, _tx, mut rx) = coordinator(server, platform.clone());

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Native));
    let id = coordinator.session().unwrap().play_session_id;

    assert_ok!(coordinator.select_audio(2).await);

    let session = coordinator.session().unwrap();
    assert_eq!(session.play_session_id, id);
    assert_eq!(session.audio_stream_index, Some(2));
    assert_eq!(coordinator.restarts(), 0);
    assert!(platform.records()[0]
        .calls
        .contains(&"audio Stream(2)".to_string()));

    let tracks = coordinator.audio_tracks();
    assert!(tracks.iter().find(|t| t.index == 2).unwrap().selected);
}

#[tokio::test]
async fn test_generic_audio_switch_reloads_as_remux() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform);

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    let id = coordinator.session().unwrap().play_session_id;

    coordinator.select_audio(2).await.unwrap();

    let session = coordinator.session().unwrap();
    assert_ne!(session.play_session_id, id);
    assert_eq!(session.method, PlaybackMethod::DirectStream);
    assert_eq!(session.audio_stream_index, Some(2));
    assert!(!server.last_request().enable_direct_play);
    assert_eq!(coordinator.restarts(), 1);

    let url = coordinator.stream_url().unwrap();
    assert_eq!(query(url, "Static").as_deref(), Some("false"));
    assert_eq!(query(url, "AudioStreamIndex").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_requested_tracks_applied_on_native_start() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mkv"));
    let (mut coordinator, _tx, mut rx) = coordinator(server, platform.clone());

    let mut request = LoadRequest::new("movie");
    request.audio_stream_index = Some(2);
    request.subtitle_stream_index = Some(3);
    coordinator.load(request).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.adapter_kind(), Some(AdapterKind::Native));
    assert_eq!(coordinator.session().unwrap().method, PlaybackMethod::DirectPlay);
    assert_eq!(coordinator.restarts(), 0);

    let calls = &platform.records()[0].calls;
    assert!(calls.contains(&"audio Stream(2)".to_string()));
    assert!(calls.contains(&"subtitle Stream(3)".to_string()));
}

#[tokio::test]
async fn test_requested_audio_on_generic_starts_as_remux() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform.clone());

    let mut request = LoadRequest::new("movie");
    request.audio_stream_index = Some(2);
    coordinator.load(request).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    let session = coordinator.session().unwrap();
    assert_eq!(session.method, PlaybackMethod::DirectStream);
    assert_eq!(session.audio_stream_index, Some(2));
    assert_eq!(coordinator.restarts(), 1);
    assert!(!server.last_request().enable_direct_play);
    assert_eq!(
        platform.opened_kinds(),
        vec![AdapterKind::Generic, AdapterKind::Generic]
    );
    assert_eq!(
        query(coordinator.stream_url().unwrap(), "AudioStreamIndex").as_deref(),
        Some("2")
    );
    assert_eq!(coordinator.state(), PlayerState::Ready);
}

#[tokio::test]
async fn test_reload_while_paused_stays_paused() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, mut rx) = coordinator(server, platform.clone());

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    coordinator.pause().await.unwrap();

    coordinator.select_audio(2).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.restarts(), 1);
    assert!(coordinator.is_paused());
    let reloaded = platform.records().last().cloned().unwrap();
    assert!(reloaded.url.is_some());
    assert!(!reloaded.calls.contains(&"play".to_string()));

    coordinator.play().await.unwrap();
    assert!(!coordinator.is_paused());
    let reloaded = platform.records().last().cloned().unwrap();
    assert!(reloaded.calls.contains(&"play".to_string()));
}

#[tokio::test]
async fn test_unknown_track_index_rejected() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, _rx) = coordinator(server, platform);

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    let err = coordinator.select_audio(3).await.unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_STREAM");
    assert_eq!(coordinator.restarts(), 0);
}

#[tokio::test]
async fn test_stale_events_are_ignored() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("show", transcode_only("avi"));
    let (mut coordinator, tx, mut rx) = coordinator(server, platform);

    coordinator.load(LoadRequest::new("show")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    let old_generation = coordinator.generation();

    coordinator.select_subtitle(3).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    assert!(coordinator.generation() > old_generation);

    tx.send(EngineEvent::Adapter {
        generation: old_generation,
        event: AdapterEvent::Ended,
    })
    .unwrap();
    tx.send(EngineEvent::Adapter {
        generation: old_generation,
        event: AdapterEvent::Error {
            message: "decoder died".into(),
        },
    })
    .unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.state(), PlayerState::Ready);
    assert_eq!(coordinator.restarts(), 1);
    assert!(coordinator.session().is_some());
}

// =============================================================================
// Progress Reporting
// =============================================================================

/// Handle events until `count` heartbeats of the live session went through
async fn run_heartbeats(
    coordinator: &mut marquee_core::PlaybackCoordinator,
    rx: &mut marquee_core::events::EngineEventRx,
    count: usize,
) {
    let mut beats = 0;
    while beats < count {
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let EngineEvent::Timer {
            generation,
            timer: TimerKind::Heartbeat,
        } = event
        {
            if generation == coordinator.generation() {
                beats += 1;
            }
        }
        let _ = coordinator.handle_event(event).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_follows_only_the_live_session() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (mut coordinator, _tx, mut rx) = coordinator(server.clone(), platform);

    coordinator.load(LoadRequest::new("movie")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    let old_id = coordinator.session().unwrap().play_session_id.to_string();
    assert_eq!(server.wait_for(ReportKind::Start, 1).await.len(), 1);

    run_heartbeats(&mut coordinator, &mut rx, 2).await;
    let progress = server.wait_for(ReportKind::Progress, 2).await;
    assert!(progress.len() >= 2);
    assert!(progress.iter().all(|r| r.play_session_id == old_id));

    // Reload: the old heartbeat must stop with the old session
    coordinator.select_audio(2).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    let new_id = coordinator.session().unwrap().play_session_id.to_string();
    assert_ne!(new_id, old_id);

    run_heartbeats(&mut coordinator, &mut rx, 3).await;
    server.wait_for(ReportKind::Progress, 5).await;

    let reports = server.reports.lock().unwrap().clone();
    let stopped_at = reports
        .iter()
        .position(|(kind, r)| *kind == ReportKind::Stop && r.play_session_id == old_id)
        .unwrap();
    let after_stop = &reports[stopped_at..];
    assert!(!after_stop
        .iter()
        .any(|(kind, r)| *kind == ReportKind::Progress && r.play_session_id == old_id));
    let new_progress = after_stop
        .iter()
        .filter(|(kind, r)| *kind == ReportKind::Progress && r.play_session_id == new_id)
        .count();
    assert!(new_progress >= 3);
}

// =============================================================================
// Segments, Seeking and End of Item
// =============================================================================

#[tokio::test]
async fn test_skip_outro_plays_next_item() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("ep1", source("mp4"));
    server.add_item("ep2", source("mp4"));
    server.set_next("ep1", "ep2");
    server.set_segments(
        "ep1",
        vec![MediaSegment::new(SegmentType::Outro, 1700 * SECOND, 1800 * SECOND)],
    );
    let observer = Arc::new(RecordingObserver::default());
    let (coordinator, tx, mut rx) = coordinator(server, platform.clone());
    let mut coordinator = coordinator.with_observer(observer.clone());

    coordinator.load(LoadRequest::new("ep1")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    tx.send(EngineEvent::Adapter {
        generation: coordinator.generation(),
        event: AdapterEvent::TimeUpdate { seconds: 1710.0 },
    })
    .unwrap();
    drain(&mut coordinator, &mut rx).await;

    let action = coordinator.active_skip().cloned().unwrap();
    assert_eq!(action.label, "Play Next Episode");
    assert_eq!(
        action.target,
        SkipTarget::PlayNext {
            item_id: "ep2".into()
        }
    );

    coordinator.skip().await.unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.item().unwrap().id, "ep2");
    assert_eq!(coordinator.session().unwrap().item_id, "ep2");
    let first = &platform.records()[0];
    assert!(!first.calls.iter().any(|c| c.starts_with("seek")));
    assert_eq!(
        observer.skips.lock().unwrap().first().cloned(),
        Some(Some("Play Next Episode".to_string()))
    );
}

#[tokio::test]
async fn test_skip_intro_seeks_past_segment() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("ep1", source("mp4"));
    server.set_segments(
        "ep1",
        vec![MediaSegment::new(SegmentType::Intro, 0, 90 * SECOND)],
    );
    let (mut coordinator, _tx, mut rx) = coordinator(server, platform.clone());

    coordinator.load(LoadRequest::new("ep1")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    assert_eq!(coordinator.active_skip().unwrap().label, "Skip Intro");

    coordinator.skip().await.unwrap();

    assert!(coordinator.active_skip().is_none());
    assert_eq!(coordinator.position_ticks(), Some(90 * SECOND));
    assert!(platform.records()[0].calls.contains(&"seek 90".to_string()));
}

#[tokio::test]
async fn test_seek_before_transcode_offset_restarts() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("show", transcode_only("avi"));
    let (mut coordinator, _tx, _rx) = coordinator(server, platform);

    coordinator
        .load(LoadRequest::new("show").starting_at(600 * SECOND))
        .await
        .unwrap();
    let id = coordinator.session().unwrap().play_session_id;

    coordinator.seek(700 * SECOND).await.unwrap();
    assert_eq!(coordinator.session().unwrap().play_session_id, id);

    coordinator.seek(100 * SECOND).await.unwrap();
    let session = coordinator.session().unwrap();
    assert_ne!(session.play_session_id, id);
    assert_eq!(session.start_position_ticks, 100 * SECOND);
    assert_eq!(
        query(coordinator.stream_url().unwrap(), "StartTimeTicks"),
        Some((100 * SECOND).to_string())
    );
}

#[tokio::test]
async fn test_natural_end_without_autoplay_goes_idle() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("ep1", source("mp4"));
    server.add_item("ep2", source("mp4"));
    server.set_next("ep1", "ep2");
    let (coordinator, tx, mut rx) = coordinator(server.clone(), platform);
    let mut coordinator = coordinator.with_preferences(UserPreferences {
        auto_play: false,
        ..Default::default()
    });

    coordinator.load(LoadRequest::new("ep1")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    tx.send(EngineEvent::Adapter {
        generation: coordinator.generation(),
        event: AdapterEvent::Ended,
    })
    .unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.state(), PlayerState::Idle);
    assert!(coordinator.session().is_none());
    assert_eq!(server.wait_for(ReportKind::Stop, 1).await.len(), 1);
}

#[tokio::test]
async fn test_natural_end_with_autoplay_loads_next() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("ep1", source("mp4"));
    server.add_item("ep2", source("mp4"));
    server.set_next("ep1", "ep2");
    let (mut coordinator, tx, mut rx) = coordinator(server, platform);

    coordinator.load(LoadRequest::new("ep1")).await.unwrap();
    drain(&mut coordinator, &mut rx).await;
    tx.send(EngineEvent::Adapter {
        generation: coordinator.generation(),
        event: AdapterEvent::Ended,
    })
    .unwrap();
    drain(&mut coordinator, &mut rx).await;

    assert_eq!(coordinator.item().unwrap().id, "ep2");
    assert_eq!(coordinator.restarts(), 0);
}

// =============================================================================
// Engine Task
// =============================================================================

#[tokio::test]
async fn test_engine_handle_drives_playback() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    server.add_item("movie", source("mp4"));
    let (engine, handle) = PlaybackEngine::new(config(), server.clone(), platform);
    let task = engine.spawn();

    handle.load(LoadRequest::new("movie")).await.unwrap();

    let mut status = handle.status().await.unwrap();
    for _ in 0..50 {
        if status.state == PlayerState::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        status = handle.status().await.unwrap();
    }
    assert_eq!(status.state, PlayerState::Ready);
    assert_eq!(status.adapter, Some(AdapterKind::Generic));
    assert_eq!(status.restarts, 0);

    handle.pause().await.unwrap();
    assert!(handle.status().await.unwrap().paused);
    assert_eq!(handle.subtitle_tracks().await.unwrap().len(), 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(server.wait_for(ReportKind::Stop, 1).await.len(), 1);

    // The engine is gone; commands fail instead of hanging
    assert!(handle.play().await.is_err());
}

#[tokio::test]
async fn test_commands_without_session() {
    let server = MockServer::new();
    let platform = FakePlatform::new();
    let (engine, handle) = PlaybackEngine::new(config(), server, platform);
    let task = engine.spawn();

    let err = handle.play().await.unwrap_err();
    assert_eq!(err.error_code(), "NO_SESSION");
    assert_err!(handle.scrub_preview(0).await);
    assert!(handle.audio_tracks().await.unwrap().is_empty());
    assert_ok!(handle.exit().await);

    drop(handle);
    task.await.unwrap();
}
