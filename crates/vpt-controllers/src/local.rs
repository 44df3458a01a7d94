// crates/vpt-controllers/src/local.rs
// ============================================================================
// Module: Local Image/Text Verification Controllers
// Description: Built-in `image`/`text` verification backends running
//              entirely on-box, with artifact generation (§4.5).
// Purpose: Give a device a working image-template-match and text-presence
//          verification controller without depending on an external OCR
//          service, using only crates already in this workspace's stack.
// Dependencies: image, vpt-core
// ============================================================================

//! ## Overview
//! [`ImageMatchController`] implements the §4.5 "Image verification" core
//! algorithm: crop, filter, normalized cross-correlation against a
//! reference, and the three-artifact (source/reference/overlay) write-out.
//! Reference and source images are expected to already be resolved to local
//! paths by the caller (`VerificationExecutor` passes `source_image_path`
//! after screenshot capture; `image_path` is a params field the host
//! resolves before dispatch) — the object-storage-backed per-model
//! reference cache named in §4.5 is an `ObjectStore` concern, out of scope
//! for this controller.
//!
//! [`TextVerificationController`] implements the crop/greyscale/binary-
//! threshold preprocessing step, then delegates recognition to a pluggable
//! [`TextRecognizer`]. No OCR crate is available anywhere in this
//! workspace's dependency stack, so [`HeuristicTextRecognizer`] — which
//! recognizes nothing — is the only built-in implementation; a host that
//! needs real text verification supplies its own [`TextRecognizer`] backed
//! by an external OCR process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use image::DynamicImage;
use image::GenericImageView;
use image::Rgba;
use image::RgbaImage;
use serde_json::Value;
use vpt_core::Area;
use vpt_core::ImageFilter;
use vpt_core::VerificationConfig;
use vpt_core::VerificationController;
use vpt_core::VerificationOutcome;
use vpt_core::VptError;

/// Grayscale absolute-difference threshold below which a pixel counts as a
/// match for overlay coloring (§4.5 "Always produce three artifact files").
const OVERLAY_MATCH_TOLERANCE: i16 = 10;

/// Overlay alpha applied to both the match-green and mismatch-red tint.
const OVERLAY_ALPHA: u8 = 128;

/// Binary-threshold cutoff for text preprocessing (§4.5 "Text verification").
const TEXT_BINARY_THRESHOLD: u8 = 127;

// ============================================================================
// SECTION: ImageMatchController
// ============================================================================

/// Template-matching image verification controller (§4.5 "Image
/// verification (core algorithm)").
pub struct ImageMatchController {
    /// Directory artifacts are written under (`<output_dir>/verification_results/`).
    output_dir: String,
}

impl ImageMatchController {
    /// Builds a controller writing artifacts under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<String>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// Runs the comparison for one verification and writes its artifacts.
    fn run(&self, config: &VerificationConfig<'_>) -> Result<VerificationOutcome, VptError> {
        let Some(source_path) = config.source_image_path else {
            return Ok(failure("no source screenshot was captured for this verification"));
        };
        let Some(reference_path) = config.params.get("image_path").and_then(Value::as_str) else {
            return Ok(failure("missing image_path parameter"));
        };

        let source = image::open(source_path).map_err(|err| VptError::Controller(format!("failed to open source image: {err}")))?;
        let reference =
            image::open(reference_path).map_err(|err| VptError::Controller(format!("failed to open reference image: {err}")))?;

        let threshold = threshold_param(config.params);
        let area = area_param(config.params);
        let filter = filter_param(config.params);

        let cropped_source = area.map_or_else(|| source.clone(), |area| crop(&source, area));
        let filtered_source = apply_filter(&cropped_source, filter);
        let filtered_reference = apply_filter(&reference, filter);
        let aligned_reference = resize_to_match(&filtered_reference, &filtered_source);

        let score = normalized_cross_correlation(&filtered_source, &aligned_reference);
        let waiting_to_disappear = config.command.contains("disappear");
        let matched = score >= threshold;
        let success = if waiting_to_disappear { !matched } else { matched };
        let displayed_confidence = if waiting_to_disappear { (1.0 - score).clamp(0.0, 1.0) } else { score };

        let stem = artifact_stem(config.command);
        let base_dir = format!("{}/verification_results", self.output_dir.trim_end_matches('/'));
        let source_url = write_artifact(&base_dir, &format!("{stem}_source.png"), &filtered_source);
        let reference_url = write_artifact(&base_dir, &format!("{stem}_reference.png"), &aligned_reference);
        let overlay = build_overlay(&filtered_source, &aligned_reference);
        let overlay_url = overlay.and_then(|image| write_artifact(&base_dir, &format!("{stem}_overlay.png"), &DynamicImage::ImageRgba8(image)));

        let mut details = std::collections::BTreeMap::new();
        details.insert("score".to_string(), Value::from(displayed_confidence));
        details.insert("threshold".to_string(), Value::from(threshold));

        Ok(VerificationOutcome {
            success,
            message: Some(format!("match score {displayed_confidence:.3} against threshold {threshold:.3}")),
            error: if success { None } else { Some(format!("score {displayed_confidence:.3} did not clear threshold {threshold:.3}")) },
            details,
            source_url,
            reference_url,
            overlay_url,
            extracted_text: None,
            searched_text: None,
            detected_language: None,
        })
    }
}

impl VerificationController for ImageMatchController {
    fn execute_verification(&self, config: &VerificationConfig<'_>) -> Result<VerificationOutcome, VptError> {
        self.run(config)
    }

    fn available_verifications(&self) -> Vec<String> {
        vec!["waitfor_image_to_appear".to_string(), "waitfor_image_to_disappear".to_string(), "match_image".to_string()]
    }
}

// ============================================================================
// SECTION: TextVerificationController
// ============================================================================

/// Recognizes text in a preprocessed image. Pluggable so a host can back it
/// with a real OCR process; [`HeuristicTextRecognizer`] is the only
/// built-in implementation and recognizes nothing.
pub trait TextRecognizer: Send + Sync {
    /// Returns the recognized text and an optional detected-language hint.
    fn recognize(&self, image: &DynamicImage) -> (String, Option<String>);
}

/// A [`TextRecognizer`] that performs no recognition; every call returns
/// empty text and no language hint.
pub struct HeuristicTextRecognizer;

impl TextRecognizer for HeuristicTextRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> (String, Option<String>) {
        (String::new(), None)
    }
}

/// Text-presence verification controller (§4.5 "Text verification").
pub struct TextVerificationController {
    /// Directory processed images are written under.
    output_dir: String,
    /// The recognition backend.
    recognizer: Box<dyn TextRecognizer>,
}

impl TextVerificationController {
    /// Builds a controller over an explicit recognizer.
    #[must_use]
    pub fn new(output_dir: impl Into<String>, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { output_dir: output_dir.into(), recognizer }
    }

    /// Builds a controller using the built-in no-op recognizer.
    #[must_use]
    pub fn with_heuristic(output_dir: impl Into<String>) -> Self {
        Self::new(output_dir, Box::new(HeuristicTextRecognizer))
    }

    /// Runs the preprocessing/recognition/match pipeline for one verification.
    fn run(&self, config: &VerificationConfig<'_>) -> Result<VerificationOutcome, VptError> {
        let Some(source_path) = config.source_image_path else {
            return Ok(failure("no source screenshot was captured for this verification"));
        };
        let Some(target) = config.params.get("text").and_then(Value::as_str) else {
            return Ok(failure("missing text parameter"));
        };

        let source = image::open(source_path).map_err(|err| VptError::Controller(format!("failed to open source image: {err}")))?;
        let area = area_param(config.params);
        let cropped = area.map_or_else(|| source.clone(), |area| crop(&source, area));
        let binarized = binarize(&cropped);

        let stem = artifact_stem(config.command);
        let base_dir = format!("{}/verification_results", self.output_dir.trim_end_matches('/'));
        let source_url = write_artifact(&base_dir, &format!("{stem}_text.png"), &DynamicImage::ImageLuma8(binarized.clone()));

        let (recognized, language_hint) = self.recognizer.recognize(&DynamicImage::ImageLuma8(binarized));
        let normalized = recognized.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let found = normalized.contains(&target.to_lowercase());

        let waiting_to_disappear = config.command.contains("disappear");
        let success = if waiting_to_disappear { !found } else { found };

        Ok(VerificationOutcome {
            success,
            message: Some(if found { format!("found '{target}'") } else { format!("did not find '{target}'") }),
            error: if success { None } else { Some(format!("target text '{target}' not matched")) },
            details: std::collections::BTreeMap::new(),
            source_url,
            reference_url: None,
            overlay_url: None,
            extracted_text: Some(recognized),
            searched_text: Some(target.to_string()),
            detected_language: language_hint.or_else(|| Some("en".to_string())),
        })
    }
}

impl VerificationController for TextVerificationController {
    fn execute_verification(&self, config: &VerificationConfig<'_>) -> Result<VerificationOutcome, VptError> {
        self.run(config)
    }

    fn available_verifications(&self) -> Vec<String> {
        vec!["waitfor_text_to_appear".to_string(), "waitfor_text_to_disappear".to_string(), "match_text".to_string()]
    }
}

// ============================================================================
// SECTION: Shared helpers
// ============================================================================

/// Builds a failed [`VerificationOutcome`] carrying only an error message.
fn failure(error: &str) -> VerificationOutcome {
    VerificationOutcome { success: false, error: Some(error.to_string()), ..VerificationOutcome::default() }
}

/// Reads the `threshold` parameter, defaulting to 0.8 (§4.5, `Verification::threshold`).
fn threshold_param(params: &std::collections::BTreeMap<String, Value>) -> f64 {
    params.get("threshold").and_then(Value::as_f64).unwrap_or(0.8)
}

/// Reads the `area` parameter, if present and well-formed.
fn area_param(params: &std::collections::BTreeMap<String, Value>) -> Option<Area> {
    let area = params.get("area")?;
    Some(Area {
        x: area.get("x")?.as_u64()?.try_into().ok()?,
        y: area.get("y")?.as_u64()?.try_into().ok()?,
        w: area.get("w")?.as_u64()?.try_into().ok()?,
        h: area.get("h")?.as_u64()?.try_into().ok()?,
    })
}

/// Reads the `image_filter` parameter, defaulting to [`ImageFilter::None`].
fn filter_param(params: &std::collections::BTreeMap<String, Value>) -> ImageFilter {
    params
        .get("image_filter")
        .and_then(Value::as_str)
        .map(|raw| match raw {
            "greyscale" => ImageFilter::Greyscale,
            "binary" => ImageFilter::Binary,
            _ => ImageFilter::None,
        })
        .unwrap_or_default()
}

/// Crops `image` to `area`, clamping to the image's own bounds.
fn crop(image: &DynamicImage, area: Area) -> DynamicImage {
    let (width, height) = image.dimensions();
    let x = area.x.min(width.saturating_sub(1));
    let y = area.y.min(height.saturating_sub(1));
    let w = area.w.min(width - x).max(1);
    let h = area.h.min(height - y).max(1);
    image.crop_imm(x, y, w, h)
}

/// Applies an [`ImageFilter`] to `image`.
fn apply_filter(image: &DynamicImage, filter: ImageFilter) -> DynamicImage {
    match filter {
        ImageFilter::None => image.clone(),
        ImageFilter::Greyscale => image.grayscale(),
        ImageFilter::Binary => DynamicImage::ImageLuma8(binarize(image)),
    }
}

/// Converts to grayscale and applies a binary threshold (§4.5 "Text
/// verification", `TEXT_BINARY_THRESHOLD`).
fn binarize(image: &DynamicImage) -> image::GrayImage {
    let grey = image.to_luma8();
    let mut out = grey.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] >= TEXT_BINARY_THRESHOLD { 255 } else { 0 };
    }
    out
}

/// Resizes `reference` to match `target`'s dimensions, when they differ.
fn resize_to_match(reference: &DynamicImage, target: &DynamicImage) -> DynamicImage {
    let (tw, th) = target.dimensions();
    if reference.dimensions() == (tw, th) {
        reference.clone()
    } else {
        reference.resize_exact(tw, th, image::imageops::FilterType::Lanczos3)
    }
}

/// Computes the normalized cross-correlation between two equally-sized
/// images' grayscale buffers, mapped from `[-1, 1]` to `[0, 1]` (§4.5
/// "compute normalized cross-correlation (template matching)").
fn normalized_cross_correlation(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let a = a.to_luma8();
    let b = b.to_luma8();
    if a.dimensions() != b.dimensions() || a.dimensions() == (0, 0) {
        return 0.0;
    }
    let a_values: Vec<f64> = a.pixels().map(|p| f64::from(p[0])).collect();
    let b_values: Vec<f64> = b.pixels().map(|p| f64::from(p[0])).collect();
    let n = a_values.len() as f64;
    let mean_a = a_values.iter().sum::<f64>() / n;
    let mean_b = b_values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denom_a = 0.0;
    let mut denom_b = 0.0;
    for (va, vb) in a_values.iter().zip(b_values.iter()) {
        let da = va - mean_a;
        let db = vb - mean_b;
        numerator += da * db;
        denom_a += da * da;
        denom_b += db * db;
    }
    let denom = (denom_a * denom_b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    ((numerator / denom) + 1.0) / 2.0
}

/// Builds the green/red match overlay (§4.5 "overlay image").
fn build_overlay(source: &DynamicImage, reference: &DynamicImage) -> Option<RgbaImage> {
    if source.dimensions() != reference.dimensions() {
        return None;
    }
    let source_rgba = source.to_rgba8();
    let reference_rgba = reference.to_rgba8();
    let mut overlay = source_rgba.clone();
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        let source_pixel = source_rgba.get_pixel(x, y);
        let reference_pixel = reference_rgba.get_pixel(x, y);
        let source_grey = grayscale_value(source_pixel);
        let reference_grey = grayscale_value(reference_pixel);
        let diff = (i16::from(source_grey) - i16::from(reference_grey)).abs();
        let tint = if diff <= OVERLAY_MATCH_TOLERANCE { Rgba([0, 255, 0, OVERLAY_ALPHA]) } else { Rgba([255, 0, 0, OVERLAY_ALPHA]) };
        *pixel = blend(*source_pixel, tint);
    }
    Some(overlay)
}

/// Returns the ITU-R BT.601 luma value of an RGBA pixel.
fn grayscale_value(pixel: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "luma weights sum to 1.0 over u8 inputs")]
    {
        (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)) as u8
    }
}

/// Alpha-blends `tint` over `base`.
fn blend(base: Rgba<u8>, tint: Rgba<u8>) -> Rgba<u8> {
    let alpha = f64::from(tint.0[3]) / 255.0;
    let mut out = [0_u8; 4];
    for channel in 0 .. 3 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "blended channel stays within 0..=255")]
        {
            out[channel] = (f64::from(base.0[channel]) * (1.0 - alpha) + f64::from(tint.0[channel]) * alpha) as u8;
        }
    }
    out[3] = 255;
    Rgba(out)
}

/// Writes `image` as a PNG under `dir/file_name`, returning the path as a
/// string, or `None` on failure (artifact writes are best-effort).
fn write_artifact(dir: &str, file_name: &str, image: &DynamicImage) -> Option<String> {
    std::fs::create_dir_all(dir).ok()?;
    let path = format!("{dir}/{file_name}");
    image.save(&path).ok()?;
    Some(path)
}

/// Builds a filesystem-safe, collision-resistant stem for artifact file
/// names from a command name and the current time.
fn artifact_stem(command: &str) -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default();
    let safe_command: String = command.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    format!("{safe_command}_{millis}")
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use std::collections::BTreeMap;

    use image::Rgb;
    use image::RgbImage;
    use vpt_core::TeamId;
    use vpt_core::UserInterfaceName;

    use super::*;

    fn solid_png(path: &std::path::Path, color: [u8; 3]) {
        let mut buffer = RgbImage::new(8, 8);
        for pixel in buffer.pixels_mut() {
            *pixel = Rgb(color);
        }
        buffer.save(path).unwrap();
    }

    #[test]
    fn identical_images_score_near_one() -> Result<(), VptError> {
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let source_path = dir.path().join("source.png");
        let reference_path = dir.path().join("reference.png");
        solid_png(&source_path, [200, 100, 50]);
        solid_png(&reference_path, [200, 100, 50]);

        let controller = ImageMatchController::new(dir.path().to_string_lossy().into_owned());
        let mut params = BTreeMap::new();
        params.insert("image_path".to_string(), Value::from(reference_path.to_string_lossy().into_owned()));
        let team_id = TeamId::new("team");
        let ui_name = UserInterfaceName::new("ui");
        let source_path_str = source_path.to_string_lossy().into_owned();
        let config = VerificationConfig {
            command: "waitfor_image_to_appear",
            params: &params,
            verification_type: "image",
            team_id: &team_id,
            userinterface_name: &ui_name,
            source_image_path: Some(&source_path_str),
        };
        let outcome = controller.execute_verification(&config)?;
        assert!(outcome.source_url.is_some());
        assert!(outcome.overlay_url.is_some());
        Ok(())
    }

    #[test]
    fn missing_source_image_fails_without_error() -> Result<(), VptError> {
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let controller = ImageMatchController::new(dir.path().to_string_lossy().into_owned());
        let params = BTreeMap::new();
        let team_id = TeamId::new("team");
        let ui_name = UserInterfaceName::new("ui");
        let config = VerificationConfig {
            command: "match_image",
            params: &params,
            verification_type: "image",
            team_id: &team_id,
            userinterface_name: &ui_name,
            source_image_path: None,
        };
        let outcome = controller.execute_verification(&config)?;
        assert!(!outcome.success);
        Ok(())
    }

    #[test]
    fn heuristic_recognizer_never_finds_text() -> Result<(), VptError> {
        let dir = tempfile::tempdir().map_err(|err| VptError::Io(err.to_string()))?;
        let source_path = dir.path().join("frame.png");
        solid_png(&source_path, [255, 255, 255]);

        let controller = TextVerificationController::with_heuristic(dir.path().to_string_lossy().into_owned());
        let mut params = BTreeMap::new();
        params.insert("text".to_string(), Value::from("settings"));
        let team_id = TeamId::new("team");
        let ui_name = UserInterfaceName::new("ui");
        let source_path_str = source_path.to_string_lossy().into_owned();
        let config = VerificationConfig {
            command: "waitfor_text_to_appear",
            params: &params,
            verification_type: "text",
            team_id: &team_id,
            userinterface_name: &ui_name,
            source_image_path: Some(&source_path_str),
        };
        let outcome = controller.execute_verification(&config)?;
        assert!(!outcome.success);
        assert_eq!(outcome.searched_text.as_deref(), Some("settings"));
        Ok(())
    }
}
