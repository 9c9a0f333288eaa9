//! Segment skip engine

use crate::types::*;
use serde::Serialize;

/// Segments shorter than this are never offered
pub const MIN_SEGMENT_TICKS: i64 = TICKS_PER_SECOND;

/// What invoking the skip action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SkipTarget {
    /// Seek past the segment
    Seek { position_ticks: i64 },
    /// Start the next item
    PlayNext { item_id: String },
}

/// Skip action shown to the user while inside a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipAction {
    pub segment: MediaSegment,
    pub label: String,
    pub target: SkipTarget,
}

/// Tracks which segment, if any, the position is in
#[derive(Debug, Clone, Default)]
pub struct SegmentSkipEngine {
    segments: Vec<MediaSegment>,
    next_item_id: Option<String>,
    active: Option<SkipAction>,
}

impl SegmentSkipEngine {
    /// Sorted by start; zero-length and sub-second ranges dropped
    pub fn new(mut segments: Vec<MediaSegment>) -> Self {
        segments.retain(|s| s.duration_ticks() >= MIN_SEGMENT_TICKS);
        segments.sort_by_key(|s| s.start_ticks);
        Self {
            segments,
            next_item_id: None,
            active: None,
        }
    }

    pub fn with_next_item(mut self, next_item_id: Option<String>) -> Self {
        self.next_item_id = next_item_id;
        self
    }

    pub fn set_next_item(&mut self, next_item_id: Option<String>) {
        self.next_item_id = next_item_id;
        self.active = None;
    }

    pub fn next_item_id(&self) -> Option<&str> {
        self.next_item_id.as_deref()
    }

    pub fn segments(&self) -> &[MediaSegment] {
        &self.segments
    }

    /// First segment in start order containing the position
    pub fn segment_at(&self, position_ticks: i64) -> Option<&MediaSegment> {
        self.segments.iter().find(|s| s.contains(position_ticks))
    }

    /// Currently offered action
    pub fn active(&self) -> Option<&SkipAction> {
        self.active.as_ref()
    }

    /// Feed a position update. Returns `Some(new)` when the offered action
    /// changes (`Some(None)` hides it) and `None` when nothing changed.
    pub fn update(&mut self, position_ticks: i64, enabled: bool) -> Option<Option<SkipAction>> {
        let current = if enabled {
            self.segment_at(position_ticks).map(|s| self.action_for(s))
        } else {
            None
        };

        if current == self.active {
            return None;
        }
        self.active = current.clone();
        Some(current)
    }

    /// Consume the offered action
    pub fn take_active(&mut self) -> Option<SkipAction> {
        self.active.take()
    }

    fn action_for(&self, segment: &MediaSegment) -> SkipAction {
        let next = self
            .next_item_id
            .as_ref()
            .filter(|_| segment.segment_type.is_ending());

        let (label, target) = match (segment.segment_type, next) {
            (_, Some(item_id)) => (
                "Play Next Episode",
                SkipTarget::PlayNext {
                    item_id: item_id.clone(),
                },
            ),
            (kind, None) => (
                match kind {
                    SegmentType::Intro => "Skip Intro",
                    SegmentType::Recap => "Skip Recap",
                    SegmentType::Preview => "Skip Preview",
                    SegmentType::Outro | SegmentType::Credits => "Skip Credits",
                },
                SkipTarget::Seek {
                    position_ticks: segment.end_ticks,
                },
            ),
        };

        SkipAction {
            segment: *segment,
            label: label.to_string(),
            target,
        }
    }
}
