//! Non-fatal decoder diagnostics.
//!
//! The decoder keeps going past problems local to one track (unpaired
//! notes, unknown events, stray bytes) and records them here instead of
//! failing the whole parse.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackLevel {
    /// Data was dropped
    Warning,
    /// Data was kept in an opaque or normalised form
    Info,
}

/// One diagnostic, located by track chunk and absolute byte offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
    pub track: usize,
    pub offset: usize,
}

impl Feedback {
    pub fn warning(message: impl Into<String>, track: usize, offset: usize) -> Self {
        Feedback {
            level: FeedbackLevel::Warning,
            message: message.into(),
            track,
            offset,
        }
    }

    pub fn info(message: impl Into<String>, track: usize, offset: usize) -> Self {
        Feedback {
            level: FeedbackLevel::Info,
            message: message.into(),
            track,
            offset,
        }
    }
}

/// Counters and messages gathered while decoding one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeReport {
    /// Note-ons still open at the end of their track, dropped.
    pub unmatched_note_ons: usize,
    /// Note-offs with nothing to close, ignored.
    pub unmatched_note_offs: usize,
    /// Pedal presses still held at the end of their track, dropped.
    pub unmatched_pedals: usize,
    /// Events kept as raw bytes.
    pub opaque_events: usize,
    /// Chunks skipped because their id was not `MTrk`.
    pub skipped_chunks: usize,
    pub feedback: Vec<Feedback>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched_note_ons == 0
            && self.unmatched_note_offs == 0
            && self.unmatched_pedals == 0
            && !self.has_warnings()
    }

    pub fn has_warnings(&self) -> bool {
        self.feedback
            .iter()
            .any(|f| f.level == FeedbackLevel::Warning)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Warning)
    }

    /// Fold one chunk's report into the file-level report.
    pub(crate) fn absorb(&mut self, other: DecodeReport) {
        self.unmatched_note_ons += other.unmatched_note_ons;
        self.unmatched_note_offs += other.unmatched_note_offs;
        self.unmatched_pedals += other.unmatched_pedals;
        self.opaque_events += other.opaque_events;
        self.skipped_chunks += other.skipped_chunks;
        self.feedback.extend(other.feedback);
    }
}
