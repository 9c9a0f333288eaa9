//! Simulated media sink for headless playback
//!
//! Nothing is decoded. The sink keeps a clock that advances one second per
//! second while playing and reports it through the engine's event channel,
//! which is enough to drive negotiation, watchdog, reporting and segment
//! logic against a real server.

use async_trait::async_trait;
use marquee_core::{
    adapter::{LoadOptions, TrackSelector},
    AdapterEvent, AdapterEventSender, AdapterKind, MediaSink, Platform, Result,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Creates headless sinks; `stall` makes direct-play sinks freeze so the
/// fallback chain can be exercised
pub struct HeadlessPlatform {
    stall: bool,
}

impl HeadlessPlatform {
    pub fn new(stall: bool) -> Self {
        Self { stall }
    }
}

impl Platform for HeadlessPlatform {
    fn create_sink(&self, kind: AdapterKind, events: AdapterEventSender) -> Box<dyn MediaSink> {
        let stalled = self.stall && kind != AdapterKind::Adaptive;
        Box::new(HeadlessSink {
            kind,
            events,
            stalled,
            clock: Arc::new(Mutex::new(Clock::default())),
            ticker: None,
        })
    }
}

#[derive(Debug, Default)]
struct Clock {
    position: f64,
    playing: bool,
}

struct HeadlessSink {
    kind: AdapterKind,
    events: AdapterEventSender,
    stalled: bool,
    clock: Arc<Mutex<Clock>>,
    ticker: Option<JoinHandle<()>>,
}

impl HeadlessSink {
    fn set_playing(&self, playing: bool) {
        if let Ok(mut clock) = self.clock.lock() {
            clock.playing = playing;
        }
    }

    fn start_ticker(&mut self) {
        if self.stalled || self.ticker.is_some() {
            return;
        }
        let clock = self.clock.clone();
        let events = self.events.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                let position = match clock.lock() {
                    Ok(mut clock) if clock.playing => {
                        clock.position += 1.0;
                        clock.position
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                };
                events.send(AdapterEvent::TimeUpdate { seconds: position });
            }
        }));
    }
}

#[async_trait]
impl MediaSink for HeadlessSink {
    async fn open(&mut self, url: &Url, options: &LoadOptions) -> Result<()> {
        info!(
            adapter = %self.kind,
            mime_type = %options.mime_type,
            start = options.start_position,
            stalled = self.stalled,
            "Opening {}",
            url.path()
        );
        if let Ok(mut clock) = self.clock.lock() {
            clock.position = options.start_position;
        }
        if !self.stalled {
            self.events.send(AdapterEvent::Loaded { duration: None });
        }
        Ok(())
    }

    async fn play(&mut self) -> Result<()> {
        self.set_playing(true);
        self.start_ticker();
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.set_playing(false);
        Ok(())
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        if let Ok(mut clock) = self.clock.lock() {
            clock.position = seconds.max(0.0);
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        self.clock.lock().map(|c| c.position).unwrap_or_default()
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    async fn select_audio(&mut self, track: &TrackSelector) -> Result<()> {
        debug!(?track, "Audio track selected");
        Ok(())
    }

    async fn select_subtitle(&mut self, track: &TrackSelector) -> Result<()> {
        debug!(?track, "Subtitle track selected");
        Ok(())
    }

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()> {
        debug!(volume, muted, "Volume set");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.set_playing(false);
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
