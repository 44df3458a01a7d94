// crates/vpt-broker/src/well_known.rs
// ============================================================================
// Module: Well-Known Object Store Key Prefixes
// Description: Builders for the fixed remote-path layout external tooling
//              (the report viewer, the reference-image browser) expects.
// Purpose: Keep the one true key layout in one place (§6 "Object storage").
// Dependencies: none
// ============================================================================

//! ## Overview
//! Every remote key the engine writes falls under one of five well-known
//! prefixes. These builders exist so callers never hand-assemble a key and
//! risk drifting from the layout external tooling depends on.

/// Variants of a stored reference image (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceImageVariant {
    /// The original captured reference image.
    Original,
    /// Greyscale-converted variant.
    Greyscale,
    /// Binary-threshold variant.
    Binary,
}

impl ReferenceImageVariant {
    /// Returns the filename suffix for this variant (empty for `Original`).
    #[must_use]
    const fn suffix(self) -> &'static str {
        match self {
            Self::Original => "",
            Self::Greyscale => "_greyscale",
            Self::Binary => "_binary",
        }
    }
}

/// Builds a `reference-images/<device_model>/<name>[_variant].jpg` key.
#[must_use]
pub fn reference_image_key(device_model: &str, name: &str, variant: ReferenceImageVariant) -> String {
    format!("reference-images/{device_model}/{name}{}.jpg", variant.suffix())
}

/// Builds a `navigation/<device_model>/<name>.jpg` key.
#[must_use]
pub fn navigation_image_key(device_model: &str, name: &str) -> String {
    format!("navigation/{device_model}/{name}.jpg")
}

/// Builds a `script-reports/<device_model>/<script>_<yyyymmdd>_<ts>/report.html` key.
#[must_use]
pub fn script_report_key(device_model: &str, script: &str, yyyymmdd: &str, unix_timestamp: i64) -> String {
    format!("script-reports/{device_model}/{script}_{yyyymmdd}_{unix_timestamp}/report.html")
}

/// Builds a `script-screenshots/<device_id>/<filename>` key.
#[must_use]
pub fn script_screenshot_key(device_id: &str, filename: &str) -> String {
    format!("script-screenshots/{device_id}/{filename}")
}

/// Builds an `audio-analysis/<device>/<seg>.wav` key.
#[must_use]
pub fn audio_analysis_key(device: &str, segment_name: &str) -> String {
    format!("audio-analysis/{device}/{segment_name}.wav")
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    #[test]
    fn reference_image_variants_suffix_the_filename() {
        assert_eq!(reference_image_key("x1", "home", ReferenceImageVariant::Original), "reference-images/x1/home.jpg");
        assert_eq!(reference_image_key("x1", "home", ReferenceImageVariant::Greyscale), "reference-images/x1/home_greyscale.jpg");
        assert_eq!(reference_image_key("x1", "home", ReferenceImageVariant::Binary), "reference-images/x1/home_binary.jpg");
    }

    #[test]
    fn script_report_key_nests_under_a_run_directory() {
        let key = script_report_key("x1", "goto", "20260726", 1_900_000_000);
        assert_eq!(key, "script-reports/x1/goto_20260726_1900000000/report.html");
    }
}
