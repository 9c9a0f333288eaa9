//! Generic media-element adapter

use super::{AdapterKind, LoadOptions, MediaAdapter, MediaSink, TrackSelector};
use crate::{types::MediaStream, Error, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Plays natively decodable containers through the platform media element
pub struct ElementAdapter {
    sink: Box<dyn MediaSink>,
    containers: Vec<String>,
}

impl ElementAdapter {
    pub fn new(sink: Box<dyn MediaSink>, containers: Vec<String>) -> Self {
        Self { sink, containers }
    }

    fn accepts(&self, container: &str) -> bool {
        let container = container.to_ascii_lowercase();
        self.containers.iter().any(|c| *c == container)
    }
}

#[async_trait]
impl MediaAdapter for ElementAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Generic
    }

    async fn load(&mut self, url: &Url, options: &LoadOptions) -> Result<()> {
        if !self.accepts(&options.container) {
            return Err(Error::adapter(format!(
                "media element cannot decode '{}' containers",
                options.container
            )));
        }
        debug!(container = %options.container, "Media element loading");
        self.sink.open(url, options).await
    }

    async fn play(&mut self) -> Result<()> {
        self.sink.play().await
    }

    async fn pause(&mut self) -> Result<()> {
        self.sink.pause().await
    }

    async fn seek(&mut self, seconds: f64) -> Result<()> {
        self.sink.seek(seconds).await
    }

    fn current_time(&self) -> f64 {
        self.sink.position()
    }

    fn duration(&self) -> Option<f64> {
        self.sink.duration()
    }

    fn supports_live_audio_switch(&self) -> bool {
        false
    }

    fn supports_live_subtitle_switch(&self, _stream: &MediaStream) -> bool {
        false
    }

    async fn select_audio_track(&mut self, stream: &MediaStream) -> Result<()> {
        Err(Error::TrackSwitchFailure(format!(
            "media element cannot switch to audio stream {}",
            stream.index
        )))
    }

    async fn select_subtitle_track(&mut self, stream: Option<&MediaStream>) -> Result<()> {
        match stream {
            // Nothing is rendered in-band, so off is always honoured
            None => self.sink.select_subtitle(&TrackSelector::Disabled).await,
            Some(stream) => Err(Error::TrackSwitchFailure(format!(
                "media element cannot switch to subtitle stream {}",
                stream.index
            ))),
        }
    }

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()> {
        self.sink.set_volume(volume, muted).await
    }

    async fn destroy(&mut self) {
        self.sink.close().await;
    }
}
