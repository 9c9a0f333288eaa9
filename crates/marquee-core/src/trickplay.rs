//! Trickplay scrubbing previews
//!
//! Thumbnails are packed into sprite sheets of `tile_width x tile_height`
//! images taken every `interval_ms`. A scrub position maps to a sheet index
//! and a pixel offset within that sheet.

use crate::{stream_url::StreamUrlBuilder, types::*, Result};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// Largest thumbnail width as a share of the display width
pub const MAX_TIER_SHARE: f64 = 0.2;

/// Location of one thumbnail inside its sprite sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TilePosition {
    pub sheet_index: u32,
    pub column: u32,
    pub row: u32,
    /// Pixel offset of the thumbnail within the sheet
    pub x: u32,
    pub y: u32,
}

impl TilePosition {
    /// CSS-style background position for the sheet
    pub fn background_position(&self) -> String {
        format!("-{}px -{}px", self.x, self.y)
    }
}

/// Thumbnail to show for a scrub position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrickplayTile {
    pub url: Url,
    pub width: u32,
    pub height: u32,
    pub position: TilePosition,
    pub background_position: String,
}

/// Preview shown while scrubbing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrubPreview {
    pub position_ticks: i64,
    pub time_label: String,
    pub tile: Option<TrickplayTile>,
}

/// Format ticks as `H:MM:SS`, or `M:SS` under an hour
pub fn format_time(ticks: i64) -> String {
    let total = ticks.max(0) / TICKS_PER_SECOND;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Pick the widest tier no wider than 20% of the display, else the narrowest
pub fn select_tier(
    tiers: &HashMap<String, TrickplayInfo>,
    device_pixel_width: u32,
) -> Option<(u32, TrickplayInfo)> {
    let limit = (device_pixel_width as f64 * MAX_TIER_SHARE).floor() as u32;
    let mut widths: Vec<(u32, TrickplayInfo)> = tiers
        .iter()
        .map(|(key, info)| (key.parse().unwrap_or(info.thumb_width), *info))
        .collect();
    widths.sort_by_key(|(width, _)| *width);

    widths
        .iter()
        .rev()
        .find(|(width, _)| *width <= limit)
        .or_else(|| widths.first())
        .copied()
}

/// Thumbnail for a position within a tier
pub fn tile_position(info: &TrickplayInfo, position_ticks: i64) -> Option<TilePosition> {
    let per_sheet = info.tiles_per_sheet();
    if per_sheet == 0 || info.interval_ms == 0 {
        return None;
    }

    let ms = (position_ticks.max(0) / TICKS_PER_MILLISECOND) as u64;
    let mut linear = (ms / info.interval_ms as u64) as u32;
    if info.thumbnail_count > 0 {
        linear = linear.min(info.thumbnail_count - 1);
    }

    let offset = linear % per_sheet;
    let column = offset % info.tile_width;
    let row = offset / info.tile_width;

    Some(TilePosition {
        sheet_index: linear / per_sheet,
        column,
        row,
        x: column * info.thumb_width,
        y: row * info.thumb_height,
    })
}

/// Scrub preview source for one item
#[derive(Debug, Clone)]
pub struct TrickplayScrubber {
    item_id: String,
    media_source_id: String,
    tier: Option<(u32, TrickplayInfo)>,
}

impl TrickplayScrubber {
    /// Choose a tier from the item's manifest for this display
    pub fn new(
        item_id: impl Into<String>,
        media_source_id: impl Into<String>,
        manifest: Option<&TrickplayManifest>,
        device_pixel_width: u32,
    ) -> Self {
        let media_source_id = media_source_id.into();
        let tier = manifest
            .and_then(|m| m.get(&media_source_id))
            .and_then(|tiers| select_tier(tiers, device_pixel_width));
        Self {
            item_id: item_id.into(),
            media_source_id,
            tier,
        }
    }

    /// Scrubber with only time labels
    pub fn empty(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            media_source_id: String::new(),
            tier: None,
        }
    }

    /// Selected tier width and layout
    pub fn tier(&self) -> Option<&(u32, TrickplayInfo)> {
        self.tier.as_ref()
    }

    pub fn media_source_id(&self) -> &str {
        &self.media_source_id
    }

    /// Preview for a scrub position
    pub fn preview(&self, position_ticks: i64, urls: &StreamUrlBuilder) -> Result<ScrubPreview> {
        let tile = match &self.tier {
            Some((width, info)) => match tile_position(info, position_ticks) {
                Some(position) => Some(TrickplayTile {
                    url: urls.trickplay_tile(
                        &self.item_id,
                        &self.media_source_id,
                        *width,
                        position.sheet_index,
                    )?,
                    width: info.thumb_width,
                    height: info.thumb_height,
                    background_position: position.background_position(),
                    position,
                }),
                None => None,
            },
            None => None,
        };

        Ok(ScrubPreview {
            position_ticks,
            time_label: format_time(position_ticks),
            tile,
        })
    }
}
