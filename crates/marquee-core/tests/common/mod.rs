//! Shared doubles for integration tests: an in-memory media server and a
//! scripted platform whose sinks report through the real event channel.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use marquee_core::{
    adapter::{LoadOptions, TrackSelector},
    config::ServerConfig,
    events::{EngineEventRx, EngineEventTx},
    AdapterEvent, AdapterEventSender, AdapterKind, EngineConfig, Error, ItemDetails, MediaSegment,
    MediaServer, MediaSink, MediaSource, MediaStream, PlaybackCoordinator, PlaybackInfo,
    PlaybackInfoRequest, PlaybackReport, Platform, Result, StreamType,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const SECOND: i64 = 10_000_000;

// =============================================================================
// Media server
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Start,
    Progress,
    Stop,
}

#[derive(Default)]
pub struct MockServer {
    sources: Mutex<HashMap<String, MediaSource>>,
    segments: Mutex<HashMap<String, Vec<MediaSegment>>>,
    next: Mutex<HashMap<String, String>>,
    pub requests: Mutex<Vec<PlaybackInfoRequest>>,
    pub reports: Mutex<Vec<(ReportKind, PlaybackReport)>>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_item(&self, item_id: &str, source: MediaSource) {
        self.sources
            .lock()
            .unwrap()
            .insert(item_id.to_string(), source);
    }

    pub fn set_segments(&self, item_id: &str, segments: Vec<MediaSegment>) {
        self.segments
            .lock()
            .unwrap()
            .insert(item_id.to_string(), segments);
    }

    pub fn set_next(&self, item_id: &str, next_id: &str) {
        self.next
            .lock()
            .unwrap()
            .insert(item_id.to_string(), next_id.to_string());
    }

    pub fn last_request(&self) -> PlaybackInfoRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn reports_of(&self, kind: ReportKind) -> Vec<PlaybackReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Notifications are sent from spawned tasks; give them time to land
    pub async fn wait_for(&self, kind: ReportKind, count: usize) -> Vec<PlaybackReport> {
        for _ in 0..200 {
            let reports = self.reports_of(kind);
            if reports.len() >= count {
                return reports;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.reports_of(kind)
    }

    fn record(&self, kind: ReportKind, report: &PlaybackReport) {
        self.reports.lock().unwrap().push((kind, report.clone()));
    }
}

#[async_trait]
impl MediaServer for MockServer {
    async fn playback_info(&self, request: &PlaybackInfoRequest) -> Result<PlaybackInfo> {
        self.requests.lock().unwrap().push(request.clone());
        let source = self
            .sources
            .lock()
            .unwrap()
            .get(&request.item_id)
            .cloned()
            .ok_or_else(|| Error::ServerStatus {
                endpoint: format!("Items/{}/PlaybackInfo", request.item_id),
                status: 404,
            })?;
        Ok(PlaybackInfo {
            media_sources: vec![source],
            error_code: None,
        })
    }

    async fn item(&self, item_id: &str) -> Result<ItemDetails> {
        Ok(ItemDetails {
            id: item_id.to_string(),
            name: format!("Item {}", item_id),
            item_type: Some("Episode".into()),
            ..Default::default()
        })
    }

    async fn media_segments(&self, item_id: &str) -> Result<Vec<MediaSegment>> {
        Ok(self
            .segments
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn next_item(&self, item: &ItemDetails) -> Result<Option<String>> {
        Ok(self.next.lock().unwrap().get(&item.id).cloned())
    }

    async fn report_start(&self, report: &PlaybackReport) -> Result<()> {
        self.record(ReportKind::Start, report);
        Ok(())
    }

    async fn report_progress(&self, report: &PlaybackReport) -> Result<()> {
        self.record(ReportKind::Progress, report);
        Ok(())
    }

    async fn report_stop(&self, report: &PlaybackReport) -> Result<()> {
        self.record(ReportKind::Stop, report);
        Ok(())
    }

    async fn trickplay_tile(&self, _: &str, _: &str, _: u32, _: u32) -> Result<Bytes> {
        Ok(Bytes::from_static(b"jpeg"))
    }
}

// =============================================================================
// Platform
// =============================================================================

/// How sinks of one adapter kind behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehaviour {
    /// Loads and advances one second per play call
    Advance,
    /// Opens but never loads or moves
    Stuck,
    /// Refuses to open
    Reject,
}

#[derive(Debug, Clone)]
pub struct SinkRecord {
    pub kind: AdapterKind,
    pub url: Option<Url>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct FakePlatform {
    behaviours: Mutex<HashMap<AdapterKind, SinkBehaviour>>,
    pub sinks: Arc<Mutex<Vec<SinkRecord>>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_behaviour(&self, kind: AdapterKind, behaviour: SinkBehaviour) {
        self.behaviours.lock().unwrap().insert(kind, behaviour);
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.sinks.lock().unwrap().clone()
    }

    pub fn opened_kinds(&self) -> Vec<AdapterKind> {
        self.records()
            .into_iter()
            .filter(|r| r.url.is_some())
            .map(|r| r.kind)
            .collect()
    }

    pub fn last_url(&self) -> Url {
        self.records()
            .into_iter()
            .rev()
            .find_map(|r| r.url)
            .unwrap()
    }
}

impl Platform for FakePlatform {
    fn create_sink(&self, kind: AdapterKind, events: AdapterEventSender) -> Box<dyn MediaSink> {
        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(SinkBehaviour::Advance);
        let mut sinks = self.sinks.lock().unwrap();
        sinks.push(SinkRecord {
            kind,
            url: None,
            calls: Vec::new(),
        });
        Box::new(FakeSink {
            slot: sinks.len() - 1,
            log: self.sinks.clone(),
            behaviour,
            events,
            position: 0.0,
        })
    }
}

struct FakeSink {
    slot: usize,
    log: Arc<Mutex<Vec<SinkRecord>>>,
    behaviour: SinkBehaviour,
    events: AdapterEventSender,
    position: f64,
}

impl FakeSink {
    fn record(&self, call: String) {
        self.log.lock().unwrap()[self.slot].calls.push(call);
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    async fn open(&mut self, url: &Url, options: &LoadOptions) -> Result<()> {
        self.record(format!("open {}", options.start_position));
        if self.behaviour == SinkBehaviour::Reject {
            return Err(Error::adapter("format not supported"));
        }
        self.log.lock().unwrap()[self.slot].url = Some(url.clone());
        self.position = options.start_position;
        if self.behaviour == SinkBehaviour::Advance {
            self.events.send(AdapterEvent::Loaded {
                duration: Some(1800.0),
            });
        }
        Ok(())
    }

    async fn play(&mut self) -> Result<()> {
        self.record("play".into());
        if self.behaviour == SinkBehaviour::Advance {
            self.position += 1.0;
            self.events.send(AdapterEvent::TimeUpdate {
                seconds: self.position,
            });
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.record("pause".into());
        Ok(())
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        self.record(format!("seek {}", seconds));
        self.position = seconds;
        Ok(())
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> Option<f64> {
        Some(1800.0)
    }

    async fn select_audio(&mut self, track: &TrackSelector) -> Result<()> {
        self.record(format!("audio {:?}", track));
        Ok(())
    }

    async fn select_subtitle(&mut self, track: &TrackSelector) -> Result<()> {
        self.record(format!("subtitle {:?}", track));
        Ok(())
    }

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()> {
        self.record(format!("volume {} {}", volume, muted));
        Ok(())
    }

    async fn close(&mut self) {
        self.record("close".into());
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn stream(index: i32, stream_type: StreamType, codec: &str, language: &str) -> MediaStream {
    MediaStream {
        index,
        stream_type: Some(stream_type),
        codec: Some(codec.into()),
        language: Some(language.into()),
        ..Default::default()
    }
}

/// Two audio tracks and two subtitles; capabilities set by the caller
pub fn source(container: &str) -> MediaSource {
    MediaSource {
        id: "src1".into(),
        container: Some(container.into()),
        run_time_ticks: Some(1800 * SECOND),
        media_streams: vec![
            stream(0, StreamType::Video, "h264", "und"),
            MediaStream {
                is_default: true,
                ..stream(1, StreamType::Audio, "aac", "eng")
            },
            stream(2, StreamType::Audio, "ac3", "jpn"),
            MediaStream {
                is_text_subtitle_stream: true,
                ..stream(3, StreamType::Subtitle, "subrip", "eng")
            },
            stream(4, StreamType::Subtitle, "pgssub", "fre"),
        ],
        supports_direct_play: true,
        supports_direct_stream: true,
        supports_transcoding: true,
        ..Default::default()
    }
}

pub fn config() -> EngineConfig {
    EngineConfig {
        server: ServerConfig {
            base_url: Url::parse("https://media.example.com/").unwrap(),
            user_id: "user1".into(),
            access_token: "token".into(),
            device_id: "tv-1".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn coordinator(
    server: Arc<MockServer>,
    platform: Arc<FakePlatform>,
) -> (PlaybackCoordinator, EngineEventTx, EngineEventRx) {
    let (tx, rx) = marquee_core::events::channel();
    let coordinator = PlaybackCoordinator::new(config(), server, platform, tx.clone());
    (coordinator, tx, rx)
}

/// Feed every queued adapter event to the coordinator
pub async fn drain(coordinator: &mut PlaybackCoordinator, rx: &mut EngineEventRx) {
    while let Ok(event) = rx.try_recv() {
        let _ = coordinator.handle_event(event).await;
    }
}

pub fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
