//! Platform-native passthrough adapter

use super::{AdapterKind, LoadOptions, MediaAdapter, MediaSink, TrackSelector};
use crate::{types::MediaStream, Error, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Hands the untouched stream to the platform's native pipeline.
///
/// Plays any container the platform understands and passes HDR formats
/// through. Audio and in-band text subtitles switch live.
pub struct NativeAdapter {
    sink: Box<dyn MediaSink>,
}

impl NativeAdapter {
    pub fn new(sink: Box<dyn MediaSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MediaAdapter for NativeAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Native
    }

    async fn load(&mut self, url: &Url, options: &LoadOptions) -> Result<()> {
        debug!(container = %options.container, "Native pipeline loading");
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
        true
    }

    fn supports_live_subtitle_switch(&self, stream: &MediaStream) -> bool {
        stream.is_text_subtitle_stream && !stream.is_external
    }

    async fn select_audio_track(&mut self, stream: &MediaStream) -> Result<()> {
        self.sink.select_audio(&TrackSelector::Stream(stream.index)).await
    }

    async fn select_subtitle_track(&mut self, stream: Option<&MediaStream>) -> Result<()> {
        match stream {
            None => self.sink.select_subtitle(&TrackSelector::Disabled).await,
            Some(stream) if self.supports_live_subtitle_switch(stream) => {
                self.sink
                    .select_subtitle(&TrackSelector::Stream(stream.index))
                    .await
            }
            Some(stream) => Err(Error::TrackSwitchFailure(format!(
                "subtitle stream {} is not an in-band text track",
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
