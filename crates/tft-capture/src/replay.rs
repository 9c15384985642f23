use crate::{list_frame_files, FrameSource};
use anyhow::{bail, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Replays a directory of saved screenshots in file-name order, one per tick.
/// Unreadable files are skipped; once exhausted every tick yields `None`.
pub struct ReplaySource {
    label: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl ReplaySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let files = list_frame_files(dir)?;
        if files.is_empty() {
            bail!("No frames found in {}", dir.display());
        }

        let dirname = dir
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!("Replay source: {} frame(s) from {}", files.len(), dir.display());

        Ok(Self {
            label: format!("[Replay] {}", dirname),
            files,
            next: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len() - self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.files.len()
    }
}

impl FrameSource for ReplaySource {
    fn frame(&mut self) -> Option<Arc<RgbaImage>> {
        while let Some(path) = self.files.get(self.next) {
            self.next += 1;
            match image::open(path) {
                Ok(img) => return Some(Arc::new(img.to_rgba8())),
                Err(e) => warn!("Skipping unreadable frame {}: {}", path.display(), e),
            }
        }
        None
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn finished(&self) -> bool {
        self.is_exhausted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_name_order_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, image::Rgba([10, 0, 0, 255]))
            .save(dir.path().join("frame_002.png"))
            .unwrap();
        RgbaImage::from_pixel(8, 8, image::Rgba([20, 0, 0, 255]))
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        std::fs::write(dir.path().join("frame_003.png"), b"not a png").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = ReplaySource::open(dir.path()).unwrap();
        assert_eq!(source.remaining(), 3);

        let first = source.frame().unwrap();
        assert_eq!(first.dimensions(), (8, 8));
        let second = source.frame().unwrap();
        assert_eq!(second.dimensions(), (4, 4));
        assert!(source.frame().is_none());
        assert!(source.is_exhausted());
        assert!(source.finished());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplaySource::open(dir.path()).is_err());
    }
}
