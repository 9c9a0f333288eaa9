//! Adaptive streaming adapter
//!
//! Plays the server's HLS transcode. The master manifest is inspected for
//! `EXT-X-MEDIA` audio renditions so audio can change by language without
//! a reload. Subtitles are rendered out-of-band by the server and always
//! need one.

use super::{AdapterKind, LoadOptions, MediaAdapter, MediaSink, TrackSelector};
use crate::{types::MediaStream, Error, Result};
use async_trait::async_trait;
use m3u8_rs::{AlternativeMediaType, MasterPlaylist};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

/// Audio rendition advertised by a master manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRendition {
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    pub is_default: bool,
}

impl AudioRendition {
    fn matches(&self, stream: &MediaStream) -> bool {
        let language = match (&self.language, &stream.language) {
            (Some(ours), Some(theirs)) => ours.eq_ignore_ascii_case(theirs),
            _ => false,
        };
        language || stream.display_title.as_deref() == Some(self.name.as_str())
    }

    fn selector(&self) -> TrackSelector {
        TrackSelector::Rendition {
            group_id: self.group_id.clone(),
            name: self.name.clone(),
            language: self.language.clone(),
        }
    }
}

/// Extract audio renditions from a master playlist
pub fn parse_audio_renditions(content: &[u8]) -> Result<Vec<AudioRendition>> {
    let master: MasterPlaylist = m3u8_rs::parse_master_playlist_res(content)
        .map_err(|e| Error::adapter(format!("Failed to parse HLS master: {:?}", e)))?;

    Ok(master
        .alternatives
        .into_iter()
        .filter(|alt| alt.media_type == AlternativeMediaType::Audio)
        .map(|alt| AudioRendition {
            group_id: alt.group_id,
            name: alt.name,
            language: alt.language,
            is_default: alt.default,
        })
        .collect())
}

/// Manifest-driven adapter for transcoded streams
pub struct AdaptiveAdapter {
    sink: Box<dyn MediaSink>,
    client: Option<Client>,
    renditions: Vec<AudioRendition>,
}

impl AdaptiveAdapter {
    /// `client` enables manifest inspection; without it no renditions are known
    pub fn new(sink: Box<dyn MediaSink>, client: Option<Client>) -> Self {
        Self {
            sink,
            client,
            renditions: Vec::new(),
        }
    }

    /// Audio renditions from the last loaded manifest
    pub fn renditions(&self) -> &[AudioRendition] {
        &self.renditions
    }

    /// Replace the known renditions
    pub fn set_renditions(&mut self, renditions: Vec<AudioRendition>) {
        self.renditions = renditions;
    }

    async fn fetch_renditions(client: &Client, url: &Url) -> Result<Vec<AudioRendition>> {
        let response = client.get(url.clone()).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        parse_audio_renditions(&body)
    }
}

#[async_trait]
impl MediaAdapter for AdaptiveAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Adaptive
    }

    async fn load(&mut self, url: &Url, options: &LoadOptions) -> Result<()> {
        if let Some(client) = &self.client {
            match Self::fetch_renditions(client, url).await {
                Ok(renditions) => {
                    debug!(count = renditions.len(), "Audio renditions discovered");
                    self.renditions = renditions;
                }
                Err(e) => {
                    warn!(error = %e, "Master manifest inspection failed");
                    self.renditions.clear();
                }
            }
        }
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
        self.renditions.len() > 1
    }

    fn supports_live_subtitle_switch(&self, _stream: &MediaStream) -> bool {
        false
    }

    async fn select_audio_track(&mut self, stream: &MediaStream) -> Result<()> {
        let rendition = self
            .renditions
            .iter()
            .find(|r| r.matches(stream))
            .ok_or_else(|| {
                Error::TrackSwitchFailure(format!(
                    "no audio rendition matches stream {}",
                    stream.index
                ))
            })?;
        let selector = rendition.selector();
        self.sink.select_audio(&selector).await
    }

    async fn select_subtitle_track(&mut self, stream: Option<&MediaStream>) -> Result<()> {
        match stream {
            None => self.sink.select_subtitle(&TrackSelector::Disabled).await,
            Some(stream) => Err(Error::TrackSwitchFailure(format!(
                "subtitle stream {} needs a new transcode",
                stream.index
            ))),
        }
    }

    async fn set_volume(&mut self, volume: f64, muted: bool) -> Result<()> {
        self.sink.set_volume(volume, muted).await
    }

    async fn destroy(&mut self) {
        self.renditions.clear();
        self.sink.close().await;
    }
}
