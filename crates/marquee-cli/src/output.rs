//! Output formatting for CLI

use marquee_core::{trickplay::format_time, MediaSegment, MediaStream, TrackInfo};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

#[derive(Tabled)]
pub struct StreamRow {
    #[tabled(rename = "Index")]
    index: i32,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Codec")]
    codec: String,
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

impl From<&MediaStream> for StreamRow {
    fn from(stream: &MediaStream) -> Self {
        let mut flags = Vec::new();
        if stream.is_default {
            flags.push("default");
        }
        if stream.is_forced {
            flags.push("forced");
        }
        if stream.is_external {
            flags.push("external");
        }
        if let Some(range) = stream.video_range_type.as_deref() {
            flags.push(range);
        }
        Self {
            index: stream.index,
            kind: stream
                .stream_type
                .map(|t| format!("{:?}", t))
                .unwrap_or_else(|| "-".into()),
            codec: stream.codec.clone().unwrap_or_else(|| "-".into()),
            language: stream.language.clone().unwrap_or_else(|| "-".into()),
            title: stream.label(),
            flags: flags.join(","),
        }
    }
}

pub fn streams_table(streams: &[MediaStream]) -> String {
    Table::new(streams.iter().map(StreamRow::from)).to_string()
}

#[derive(Tabled)]
pub struct SegmentRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Length")]
    length: String,
}

impl From<&MediaSegment> for SegmentRow {
    fn from(segment: &MediaSegment) -> Self {
        Self {
            kind: segment.segment_type.to_string(),
            start: format_time(segment.start_ticks),
            end: format_time(segment.end_ticks),
            length: format_time(segment.duration_ticks()),
        }
    }
}

pub fn segments_table(segments: &[MediaSegment]) -> String {
    Table::new(segments.iter().map(SegmentRow::from)).to_string()
}

#[derive(Tabled)]
pub struct TrackRow {
    #[tabled(rename = "Index")]
    index: i32,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Selected")]
    selected: String,
}

pub fn tracks_table(tracks: &[TrackInfo]) -> String {
    Table::new(tracks.iter().map(|t| TrackRow {
        index: t.index,
        label: t.label.clone(),
        selected: if t.selected { "*".into() } else { String::new() },
    }))
    .to_string()
}
