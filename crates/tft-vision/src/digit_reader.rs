use image::{GrayImage, RgbaImage};
use std::path::Path;
use std::process::Command;
use tft_state::RoundLabel;
use tracing::{debug, warn};

/// Which on-screen number is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Gold,
    Level,
    Lives,
}

/// Reads numbers and the round label from cropped text zones.
/// `None` always means "could not read", never zero.
pub trait NumericReader: Send + Sync {
    fn read_number(&self, crop: &RgbaImage, field: NumericField) -> Option<u32>;

    fn read_round(&self, crop: &RgbaImage) -> Option<RoundLabel>;
}

/// Reader used when no OCR backend is configured
pub struct NoNumericReader;

impl NumericReader for NoNumericReader {
    fn read_number(&self, _crop: &RgbaImage, _field: NumericField) -> Option<u32> {
        None
    }

    fn read_round(&self, _crop: &RgbaImage) -> Option<RoundLabel> {
        None
    }
}

/// Reads digits from cropped game UI regions using Tesseract OCR.
/// Falls back gracefully when Tesseract is not installed.
pub struct DigitReader {
    tesseract_available: bool,
    temp_dir: std::path::PathBuf,
}

impl DigitReader {
    pub fn new() -> Self {
        let tesseract_available = check_tesseract();
        if tesseract_available {
            debug!("Tesseract OCR available");
        } else {
            warn!("Tesseract not found. Gold, level, lives and round will be unknown.");
        }

        let temp_dir = std::env::temp_dir().join("tocker_overlay_ocr");
        prepare_scratch_dir(&temp_dir);

        Self {
            tesseract_available,
            temp_dir,
        }
    }

    /// Check if OCR is available
    pub fn is_available(&self) -> bool {
        self.tesseract_available
    }

    /// Run Tesseract on a pre-processed grayscale image
    fn run_tesseract(&self, image: &GrayImage, whitelist: &str) -> Option<String> {
        let temp_path = self
            .temp_dir
            .join(format!("ocr_input_{}.png", std::process::id()));
        if let Err(e) = image.save(&temp_path) {
            warn!("Failed to write OCR input {}: {}", temp_path.display(), e);
            return None;
        }

        let output = Command::new("tesseract")
            .arg(&temp_path)
            .arg("stdout")
            .arg("--psm")
            .arg("7") // Single text line
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist))
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let text = String::from_utf8(output.stdout).ok()?;
        let trimmed = text.trim().to_string();

        if trimmed.is_empty() {
            None
        } else {
            debug!("OCR result: '{}'", trimmed);
            Some(trimmed)
        }
    }
}

impl Default for DigitReader {
    fn default() -> Self {
        Self::new()
    }
}

impl NumericReader for DigitReader {
    fn read_number(&self, crop: &RgbaImage, field: NumericField) -> Option<u32> {
        if !self.tesseract_available || crop.width() == 0 || crop.height() == 0 {
            return None;
        }

        let processed = preprocess_for_ocr(crop);
        let text = self.run_tesseract(&processed, "0123456789")?;
        let value = text.parse::<u32>().ok();
        if value.is_none() {
            debug!("Unparseable {:?} reading '{}'", field, text);
        }
        value
    }

    fn read_round(&self, crop: &RgbaImage) -> Option<RoundLabel> {
        if !self.tesseract_available || crop.width() == 0 || crop.height() == 0 {
            return None;
        }

        let processed = preprocess_for_ocr(crop);
        let text = self.run_tesseract(&processed, "0123456789-")?;
        RoundLabel::parse(&text)
    }
}

/// Create the directory OCR inputs are written to. Failure is logged, and OCR
/// reads then come back empty.
fn prepare_scratch_dir(dir: &Path) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to create OCR scratch dir {}: {}", dir.display(), e);
            false
        }
    }
}

/// Pre-process an RGBA image for OCR:
/// 1. Convert to grayscale
/// 2. Threshold to isolate bright text (game UI text is light on dark)
/// 3. Invert so text is dark on white (Tesseract preference)
fn preprocess_for_ocr(image: &RgbaImage) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let (w, h) = gray.dimensions();

    GrayImage::from_fn(w, h, |x, y| {
        let pixel = gray.get_pixel(x, y)[0];
        if pixel > 140 {
            image::Luma([0u8])
        } else {
            image::Luma([255u8])
        }
    })
}

/// Check if Tesseract is installed and accessible
fn check_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
