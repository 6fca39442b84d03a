//! Transcript cleanup.
//!
//! The speech-to-text converter writes timestamped lines; the pipeline
//! strips those down to plain prose before returning the transcript.

use anyhow::Result;
use regex::Regex;
use tracing::debug;

pub trait TranscriptNormalizer: Send + Sync {
    fn normalize(&self, raw_output: &str) -> String;

    fn name(&self) -> &'static str;
}

/// Normalizer for whisper-style converter output
pub struct WhisperTimestampNormalizer {
    timestamp_regex: Regex,
}

impl WhisperTimestampNormalizer {
    pub fn new() -> Result<Self> {
        // Matches timestamps like [00:00:00.000 --> 00:00:03.280] or [00:00:00:000 --> 00:00:03:280]
        let timestamp_regex =
            Regex::new(r"\[\d{2}:\d{2}:\d{2}[:.]\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}[:.]\d{3}\]\s*")?;

        Ok(Self { timestamp_regex })
    }
}

impl TranscriptNormalizer for WhisperTimestampNormalizer {
    fn normalize(&self, raw_output: &str) -> String {
        debug!("Normalizing speech-to-text output");

        let mut cleaned = String::new();

        for line in raw_output.lines() {
            let line_cleaned = self.timestamp_regex.replace_all(line, "");
            let line_trimmed = line_cleaned.trim();

            if !line_trimmed.is_empty() {
                if !cleaned.is_empty() {
                    cleaned.push(' ');
                }
                cleaned.push_str(line_trimmed);
            }
        }

        let result = cleaned.trim().to_string();
        debug!(
            "Normalized {} chars to {} chars",
            raw_output.len(),
            result.len()
        );

        result
    }

    fn name(&self) -> &'static str {
        "WhisperTimestampNormalizer"
    }
}

/// Pass-through normalizer for converters that already emit clean text.
pub struct PlainNormalizer;

impl TranscriptNormalizer for PlainNormalizer {
    fn normalize(&self, raw_output: &str) -> String {
        raw_output.trim().to_string()
    }

    fn name(&self) -> &'static str {
        "PlainNormalizer"
    }
}
