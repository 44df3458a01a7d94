// crates/vpt-core/src/zap.rs
// ============================================================================
// Module: Zap Record & Statistics
// Description: External zapping-detection record shape and aggregate stats.
// Purpose: Give ZapAnalyzer a typed view of the capture-monitor's JSON and a
//          running accumulator for per-script zap statistics.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `ZappingRecord` is read-only input from an external collaborator (the
//! capture-monitor process, §6). `ZapStatistics` is the in-process
//! accumulator the engine builds up as it runs iterations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Zapping Record
// ============================================================================

/// Lifecycle status of a `last_zapping.json` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZappingStatus {
    /// The capture-monitor is still observing the zap.
    InProgress,
    /// The capture-monitor finished observing the zap.
    Completed,
}

/// The detection method used to determine the zap's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    /// Detected via a sustained black frame.
    Blackscreen,
    /// Detected via a frozen frame.
    Freeze,
}

/// The zapping-detection record written by the capture-monitor (§3
/// "ZappingRecord").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZappingRecord {
    /// Lifecycle status of this record.
    pub status: ZappingStatus,
    /// Unix-second timestamp of the action that triggered this zap.
    pub action_timestamp: i64,
    /// Unix-second timestamp the capture-monitor started observing.
    pub started_at_unix: i64,
    /// Seconds after which an in-progress record is considered stale.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,
    /// Whether a zap was actually detected.
    pub zapping_detected: bool,
    /// Duration of the blackscreen phase, in milliseconds.
    pub blackscreen_duration_ms: Option<u64>,
    /// Total zap duration, in milliseconds.
    pub total_zap_duration_ms: Option<u64>,
    /// Time from the triggering action to detection, in milliseconds.
    pub time_since_action_ms: Option<u64>,
    /// Human-readable channel name, when resolved.
    pub channel_name: Option<String>,
    /// Channel number, when resolved.
    pub channel_number: Option<String>,
    /// Program name at the time of the zap.
    pub program_name: Option<String>,
    /// Program start time (opaque string, provider-defined format).
    pub program_start_time: Option<String>,
    /// Program end time (opaque string, provider-defined format).
    pub program_end_time: Option<String>,
    /// Detection confidence in `0.0..=1.0`.
    pub confidence: Option<f64>,
    /// Which signal the capture-monitor used to mark completion.
    pub detection_type: Option<DetectionType>,
    /// Filenames of transition frames saved by the capture-monitor.
    #[serde(default)]
    pub transition_images: Vec<String>,
    /// Pre-uploaded URLs for the transition frames.
    #[serde(default)]
    pub transition_image_urls: Vec<String>,
    /// Duration of silence detected in the audio track, in milliseconds.
    pub audio_silence_duration_ms: Option<u64>,
}

const fn default_timeout_seconds() -> i64 {
    300
}

impl ZappingRecord {
    /// Returns true when an in-progress record has exceeded its own
    /// `timeout_seconds` relative to `now_unix` (§4.7 stale-marker rule).
    #[must_use]
    pub fn is_stale(&self, now_unix: i64) -> bool {
        now_unix.saturating_sub(self.started_at_unix) > self.timeout_seconds
    }

    /// Returns true when the record's `action_timestamp` matches the caller's
    /// action timestamp within the 10-second tolerance window (§4.7,
    /// §8 zap-analyzer laws).
    #[must_use]
    pub fn timestamp_matches(&self, action_timestamp_unix: i64) -> bool {
        (self.action_timestamp - action_timestamp_unix).abs() <= 10
    }
}

// ============================================================================
// SECTION: Zap Statistics
// ============================================================================

/// A single iteration's contribution to the running `ZapStatistics`.
#[derive(Debug, Clone, Default)]
pub struct ZapIterationSample {
    /// Whether the iteration's analysis succeeded overall.
    pub success: bool,
    /// Whether motion was detected.
    pub motion_detected: bool,
    /// Whether subtitles were detected.
    pub subtitles_detected: bool,
    /// Whether audio/speech was detected.
    pub audio_detected: bool,
    /// Whether a zap event was detected by the capture-monitor.
    pub zapping_detected: bool,
    /// Zap duration in seconds, when known.
    pub zap_duration_s: Option<f64>,
    /// Blackscreen duration in milliseconds, when known.
    pub blackscreen_duration_ms: Option<u64>,
    /// Audio silence duration in milliseconds, when known.
    pub audio_silence_duration_ms: Option<u64>,
    /// Detected subtitle language, when known.
    pub detected_language: Option<String>,
    /// Detected audio language, when known.
    pub audio_language: Option<String>,
    /// Detection method used, when a zap was detected.
    pub detection_type: Option<DetectionType>,
    /// Resolved channel name, when known.
    pub channel_name: Option<String>,
}

/// Running accumulator of per-iteration zap evidence (§4.7 "ZapStatistics
/// invariants").
#[derive(Debug, Clone, Default)]
pub struct ZapStatistics {
    /// Total iterations observed.
    pub total: u32,
    /// Iterations whose analysis succeeded.
    pub successful: u32,
    /// Iterations with motion detected.
    pub motion_count: u32,
    /// Iterations with subtitles detected.
    pub subtitles_count: u32,
    /// Iterations with audio detected.
    pub audio_count: u32,
    /// Iterations with a zap detected by the capture-monitor.
    pub zapping_detected_count: u32,
    /// Zap durations in seconds, one per iteration that reported one.
    zap_durations_s: Vec<f64>,
    /// Blackscreen durations in milliseconds, one per iteration that reported one.
    blackscreen_durations_ms: Vec<u64>,
    /// Audio silence durations in milliseconds, one per iteration that reported one.
    audio_silence_durations_ms: Vec<u64>,
    /// Union of detected subtitle languages.
    pub detected_languages: BTreeSet<String>,
    /// Union of detected audio languages.
    pub audio_languages: BTreeSet<String>,
}

impl ZapStatistics {
    /// Folds one iteration's sample into the running statistics.
    pub fn record(&mut self, sample: &ZapIterationSample) {
        self.total += 1;
        if sample.success {
            self.successful += 1;
        }
        if sample.motion_detected {
            self.motion_count += 1;
        }
        if sample.subtitles_detected {
            self.subtitles_count += 1;
        }
        if sample.audio_detected {
            self.audio_count += 1;
        }
        if sample.zapping_detected {
            self.zapping_detected_count += 1;
        }
        if let Some(duration) = sample.zap_duration_s {
            self.zap_durations_s.push(duration);
        }
        if let Some(duration) = sample.blackscreen_duration_ms {
            self.blackscreen_durations_ms.push(duration);
        }
        if let Some(duration) = sample.audio_silence_duration_ms {
            self.audio_silence_durations_ms.push(duration);
        }
        if let Some(language) = &sample.detected_language {
            self.detected_languages.insert(language.clone());
        }
        if let Some(language) = &sample.audio_language {
            self.audio_languages.insert(language.clone());
        }
    }

    /// Arithmetic mean zap duration in seconds, over iterations that reported one.
    #[must_use]
    pub fn average_zap_duration_s(&self) -> Option<f64> {
        average(&self.zap_durations_s)
    }

    /// Arithmetic mean blackscreen duration in milliseconds.
    #[must_use]
    pub fn average_blackscreen_duration_ms(&self) -> Option<f64> {
        average_u64(&self.blackscreen_durations_ms)
    }

    /// Arithmetic mean audio-silence duration in milliseconds.
    #[must_use]
    pub fn average_audio_silence_duration_ms(&self) -> Option<f64> {
        average_u64(&self.audio_silence_durations_ms)
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss, reason = "iteration counts are small")]
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn average_u64(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss, reason = "durations are far below f64's exact range")]
    let total: f64 = values.iter().sum::<u64>() as f64;
    #[allow(clippy::cast_precision_loss, reason = "iteration counts are small")]
    Some(total / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_marker_uses_record_timeout() {
        let record = ZappingRecord {
            status: ZappingStatus::InProgress,
            action_timestamp: 1_000,
            started_at_unix: 1_000,
            timeout_seconds: 300,
            zapping_detected: false,
            blackscreen_duration_ms: None,
            total_zap_duration_ms: None,
            time_since_action_ms: None,
            channel_name: None,
            channel_number: None,
            program_name: None,
            program_start_time: None,
            program_end_time: None,
            confidence: None,
            detection_type: None,
            transition_images: Vec::new(),
            transition_image_urls: Vec::new(),
            audio_silence_duration_ms: None,
        };
        assert!(!record.is_stale(1_200));
        assert!(record.is_stale(1_301));
    }

    #[test]
    fn timestamp_match_uses_ten_second_window() {
        let record = ZappingRecord {
            status: ZappingStatus::Completed,
            action_timestamp: 1_000,
            started_at_unix: 990,
            timeout_seconds: 300,
            zapping_detected: true,
            blackscreen_duration_ms: Some(500),
            total_zap_duration_ms: Some(1500),
            time_since_action_ms: Some(10),
            channel_name: Some("BBC".to_string()),
            channel_number: Some("101".to_string()),
            program_name: None,
            program_start_time: None,
            program_end_time: None,
            confidence: Some(0.9),
            detection_type: Some(DetectionType::Blackscreen),
            transition_images: Vec::new(),
            transition_image_urls: Vec::new(),
            audio_silence_duration_ms: None,
        };
        assert!(record.timestamp_matches(1_008));
        assert!(!record.timestamp_matches(1_012));
    }

    #[test]
    fn statistics_average_over_reporting_iterations_only() {
        let mut stats = ZapStatistics::default();
        stats.record(&ZapIterationSample {
            success: true,
            zap_duration_s: Some(2.0),
            ..Default::default()
        });
        stats.record(&ZapIterationSample { success: true, ..Default::default() });
        stats.record(&ZapIterationSample {
            success: true,
            zap_duration_s: Some(4.0),
            ..Default::default()
        });
        assert_eq!(stats.total, 3);
        assert_eq!(stats.average_zap_duration_s(), Some(3.0));
    }
}
