pub mod srt;
pub mod remote;

pub use remote::{AudioClip, AudioSource, RemoteTranscriber};
pub use srt::parse_srt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One timed caption or transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    /// Start time in seconds
    pub from: f64,
    /// End time in seconds
    pub to: f64,
    /// Caption text
    pub content: String,
}

impl CaptionEntry {
    pub fn new(from: f64, to: f64, content: String) -> Self {
        Self { from, to, content }
    }
}

/// Index-addressable caption timing, used to translate index intervals into seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTable {
    entries: Vec<CaptionEntry>,
}

/// Official caption file layout: `{"body": [{"from", "to", "content", ...}]}`
#[derive(Debug, Deserialize)]
struct OfficialCaptions {
    #[serde(default)]
    body: Vec<CaptionEntry>,
}

/// Speech-to-text segment as returned by a `verbose_json` transcription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Transcription response in `verbose_json` form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl TimingTable {
    pub fn new(entries: Vec<CaptionEntry>) -> Self {
        Self { entries }
    }

    /// Parse an official caption JSON document
    pub fn from_official_json(json: &str) -> Result<Self> {
        let captions: OfficialCaptions = serde_json::from_str(json)?;
        debug!("Loaded {} official caption entries", captions.body.len());
        Ok(Self::new(captions.body))
    }

    /// Build a table from transcription segments.
    ///
    /// Blank segments and segments repeating the text of an earlier segment are dropped,
    /// so the table can be shorter than the raw segment list.
    pub fn from_transcription(segments: &[TranscriptSegment]) -> Self {
        let mut entries: Vec<CaptionEntry> = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }

            let repeated = segments[..index]
                .iter()
                .any(|previous| previous.text.trim() == text);
            if repeated {
                continue;
            }

            entries.push(CaptionEntry::new(segment.start, segment.end, text.to_string()));
        }

        debug!(
            "Built timing table with {} entries from {} transcription segments",
            entries.len(),
            segments.len()
        );

        Self::new(entries)
    }

    /// Entry at `index`, or `None` when out of range (including negative indices)
    pub fn get(&self, index: i64) -> Option<&CaptionEntry> {
        usize::try_from(index).ok().and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CaptionEntry] {
        &self.entries
    }

    /// Caption text keyed by index, the shape handed to the model
    pub fn captions_by_index(&self) -> BTreeMap<usize, String> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index, entry.content.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_official_captions() {
        let json = r#"{"font_size": 0.4, "body": [
            {"from": 0.5, "to": 2.0, "location": 2, "content": "hello"},
            {"from": 2.0, "to": 4.25, "location": 2, "content": "world"}
        ]}"#;
        let table = TimingTable::from_official_json(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().to, 4.25);
        assert_eq!(table.captions_by_index().get(&0).map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_transcription_dedup() {
        let segments = vec![
            segment(0.0, 1.0, " intro "),
            segment(1.0, 2.0, "   "),
            segment(2.0, 3.0, "intro"),
            segment(3.0, 4.0, "sponsor"),
        ];
        let table = TimingTable::from_transcription(&segments);
        assert_eq!(
            table.entries(),
            &[
                CaptionEntry::new(0.0, 1.0, "intro".to_string()),
                CaptionEntry::new(3.0, 4.0, "sponsor".to_string()),
            ]
        );
    }

    #[test]
    fn test_negative_and_missing_index() {
        let table = TimingTable::new(vec![CaptionEntry::new(0.0, 1.0, "a".to_string())]);
        assert!(table.get(-1).is_none());
        assert!(table.get(1).is_none());
        assert!(table.get(0).is_some());
    }
}
