//! HTTP client for a Jellyfin-compatible media server

use super::{MediaServer, PlaybackInfo, PlaybackInfoRequest, PlaybackReport, SegmentList};
use crate::{config::ServerConfig, types::*, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// Item list wire shape used by the episodes endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ItemList {
    items: Vec<ItemDetails>,
}

/// Media server client over HTTP
#[derive(Debug, Clone)]
pub struct HttpMediaServer {
    client: Client,
    config: ServerConfig,
}

impl HttpMediaServer {
    /// Create a client for the configured server
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    /// Create with an existing HTTP client
    pub fn with_client(client: Client, config: ServerConfig) -> Self {
        Self { client, config }
    }

    /// Server configuration this client talks to
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// MediaBrowser authorization header value
    fn authorization(&self) -> String {
        format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\", Token=\"{}\"",
            self.config.client_name,
            self.config.device_name,
            self.config.device_id,
            self.config.client_version,
            self.config.access_token
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.config.base().join(path.trim_start_matches('/'))?)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", self.authorization())
    }

    fn check(endpoint: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::ServerStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }

    async fn post_report(&self, path: &str, report: &PlaybackReport) -> Result<()> {
        let url = self.endpoint(path)?;
        let response = self
            .authorized(self.client.post(url))
            .json(report)
            .send()
            .await?;
        Self::check(path, response)?;
        debug!(
            endpoint = path,
            play_session_id = %report.play_session_id,
            position_ticks = report.position_ticks,
            "Session notification sent"
        );
        Ok(())
    }
}

#[async_trait]
impl MediaServer for HttpMediaServer {
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    async fn playback_info(&self, request: &PlaybackInfoRequest) -> Result<PlaybackInfo> {
        let path = format!("Items/{}/PlaybackInfo", request.item_id);
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().append_pair("UserId", &request.user_id);

        let response = self
            .authorized(self.client.post(url))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::negotiation(e.to_string()))?;
        let response = Self::check(&path, response)
            .map_err(|e| Error::negotiation(e.to_string()))?;

        let info: PlaybackInfo = response
            .json()
            .await
            .map_err(|e| Error::negotiation(format!("malformed PlaybackInfo: {}", e)))?;
        Ok(info)
    }

    async fn item(&self, item_id: &str) -> Result<ItemDetails> {
        let path = format!("Users/{}/Items/{}", self.config.user_id, item_id);
        let url = self.endpoint(&path)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check(&path, response)?;
        Ok(response.json().await?)
    }

    async fn media_segments(&self, item_id: &str) -> Result<Vec<MediaSegment>> {
        let path = format!("MediaSegments/{}", item_id);
        let url = self.endpoint(&path)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check(&path, response)?;
        let list: SegmentList = response.json().await?;
        Ok(list.into_segments())
    }

    async fn next_item(&self, item: &ItemDetails) -> Result<Option<String>> {
        let Some(series_id) = item.series_id.as_deref() else {
            return Ok(None);
        };

        let path = format!("Shows/{}/Episodes", series_id);
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut()
            .append_pair("UserId", &self.config.user_id)
            .append_pair("StartItemId", &item.id)
            .append_pair("Limit", "2");

        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check(&path, response)?;
        let list: ItemList = response.json().await?;

        // First entry is the current episode
        Ok(list
            .items
            .into_iter()
            .find(|next| next.id != item.id)
            .map(|next| next.id))
    }

    async fn report_start(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("Sessions/Playing", report).await
    }

    async fn report_progress(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("Sessions/Playing/Progress", report).await
    }

    async fn report_stop(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("Sessions/Playing/Stopped", report).await
    }

    async fn trickplay_tile(
        &self,
        item_id: &str,
        media_source_id: &str,
        width: u32,
        sheet_index: u32,
    ) -> Result<Bytes> {
        let path = format!("Videos/{}/Trickplay/{}/{}.jpg", item_id, width, sheet_index);
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut()
            .append_pair("MediaSourceId", media_source_id);

        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check(&path, response)?;
        Ok(response.bytes().await?)
    }
}
