use anyhow::{Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod replay;

pub use replay::ReplaySource;

/// Pixel rectangle in frame coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub x: u32,
    pub y: u32,
    #[serde(alias = "w")]
    pub width: u32,
    #[serde(alias = "h")]
    pub height: u32,
}

impl ScreenRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the region lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Split into `count` equal-width columns, left to right.
    /// The last column absorbs any remainder pixels.
    pub fn split_columns(&self, count: usize) -> Vec<ScreenRegion> {
        if count == 0 {
            return Vec::new();
        }
        let n = count as u32;
        let col_width = self.width / n;
        (0..n)
            .map(|i| {
                let width = if i + 1 == n {
                    self.width - col_width * i
                } else {
                    col_width
                };
                ScreenRegion::new(self.x + col_width * i, self.y, width, self.height)
            })
            .collect()
    }
}

/// Crop a region from a captured frame, clamped to the frame bounds.
pub fn crop_region(frame: &RgbaImage, region: &ScreenRegion) -> RgbaImage {
    let (w, h) = (frame.width(), frame.height());

    let x = region.x.min(w);
    let y = region.y.min(h);
    let rw = region.width.min(w - x);
    let rh = region.height.min(h - y);

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}

/// Supplier of captured frames. `None` means "nothing this tick, try again".
pub trait FrameSource: Send {
    fn frame(&mut self) -> Option<Arc<RgbaImage>>;

    /// Human-readable label for logs
    fn describe(&self) -> String;

    /// True once no further frames will ever arrive
    fn finished(&self) -> bool {
        false
    }
}

/// Serves the same still image on every tick.
pub struct StillImageSource {
    label: String,
    frame: Arc<RgbaImage>,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let frame = image::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .to_rgba8();
        info!(
            "Still image source: {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self {
            label: format!("[Image] {}", path.display()),
            frame: Arc::new(frame),
        })
    }

    /// A uniform black frame of the given size, for dry runs without a game.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            label: format!("[Mock] {}x{}", width, height),
            frame: Arc::new(RgbaImage::from_pixel(
                width,
                height,
                image::Rgba([0, 0, 0, 255]),
            )),
        }
    }
}

impl FrameSource for StillImageSource {
    fn frame(&mut self) -> Option<Arc<RgbaImage>> {
        Some(self.frame.clone())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Image files directly under `dir`, sorted by file name.
pub(crate) fn list_frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
        .filter_map(|entry| match entry {
            Ok(e) => Some(e.path()),
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                None
            }
        })
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    files.sort();
    debug!("Found {} frame file(s) in {}", files.len(), dir.display());
    Ok(files)
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
        .unwrap_or(false)
}
