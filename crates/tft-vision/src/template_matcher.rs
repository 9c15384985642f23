use anyhow::{Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Matches closer than this on both axes are treated as the same feature
pub const DEDUP_RADIUS: u32 = 10;

/// Windows or templates with less total variance than this cannot be correlated
const FLAT_EPSILON: f64 = 1e-6;

/// A template found in a scene, top-left corner in scene coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
}

/// Pre-processed template: per-channel zero-mean RGB values and their energy
pub struct Template {
    name: String,
    width: u32,
    height: u32,
    centered: Vec<[f64; 3]>,
    norm_sq: f64,
}

impl Template {
    pub fn new(name: impl Into<String>, image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let n = (width as f64) * (height as f64);

        let mut mean = [0.0f64; 3];
        for px in image.pixels() {
            for c in 0..3 {
                mean[c] += px[c] as f64;
            }
        }
        if n > 0.0 {
            for m in &mut mean {
                *m /= n;
            }
        }

        let centered: Vec<[f64; 3]> = image
            .pixels()
            .map(|px| {
                [
                    px[0] as f64 - mean[0],
                    px[1] as f64 - mean[1],
                    px[2] as f64 - mean[2],
                ]
            })
            .collect();
        let norm_sq = centered
            .iter()
            .map(|p| p[0] * p[0] + p[1] * p[1] + p[2] * p[2])
            .sum();

        Self {
            name: name.into(),
            width,
            height,
            centered,
            norm_sq,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_flat(&self) -> bool {
        self.norm_sq < FLAT_EPSILON
    }
}

/// Scene pixels plus per-channel summed-area tables for O(1) window statistics
struct ScenePlanes {
    width: u32,
    height: u32,
    rgb: Vec<[f64; 3]>,
    sum: Vec<[f64; 3]>,
    sum_sq: Vec<[f64; 3]>,
}

impl ScenePlanes {
    fn new(scene: &RgbaImage) -> Self {
        let (width, height) = scene.dimensions();
        let (w, h) = (width as usize, height as usize);
        let rgb: Vec<[f64; 3]> = scene
            .pixels()
            .map(|px| [px[0] as f64, px[1] as f64, px[2] as f64])
            .collect();

        let stride = w + 1;
        let mut sum = vec![[0.0f64; 3]; stride * (h + 1)];
        let mut sum_sq = vec![[0.0f64; 3]; stride * (h + 1)];
        for y in 0..h {
            let mut row = [0.0f64; 3];
            let mut row_sq = [0.0f64; 3];
            for x in 0..w {
                let p = rgb[y * w + x];
                for c in 0..3 {
                    row[c] += p[c];
                    row_sq[c] += p[c] * p[c];
                    sum[(y + 1) * stride + x + 1][c] = sum[y * stride + x + 1][c] + row[c];
                    sum_sq[(y + 1) * stride + x + 1][c] =
                        sum_sq[y * stride + x + 1][c] + row_sq[c];
                }
            }
        }

        Self {
            width,
            height,
            rgb,
            sum,
            sum_sq,
        }
    }

    /// Sum of squared deviations from the window mean, over all three channels
    fn window_energy(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let stride = self.width as usize + 1;
        let n = (w * h) as f64;
        let (a, b, c, d) = (
            y * stride + x,
            y * stride + x + w,
            (y + h) * stride + x,
            (y + h) * stride + x + w,
        );
        (0..3)
            .map(|ch| {
                let s = self.sum[d][ch] - self.sum[b][ch] - self.sum[c][ch] + self.sum[a][ch];
                let sq = self.sum_sq[d][ch] - self.sum_sq[b][ch] - self.sum_sq[c][ch]
                    + self.sum_sq[a][ch];
                (sq - s * s / n).max(0.0)
            })
            .sum()
    }

    /// Zero-mean normalized cross-correlation of `tmpl` placed at (x, y).
    /// Returns a value between -1.0 (inverse) and 1.0 (perfect match).
    fn correlate(&self, tmpl: &Template, x: usize, y: usize) -> f64 {
        let (tw, th) = (tmpl.width as usize, tmpl.height as usize);
        let energy = self.window_energy(x, y, tw, th);
        if energy < FLAT_EPSILON {
            return 0.0;
        }

        let w = self.width as usize;
        let mut cross = 0.0;
        for j in 0..th {
            let scene_row = &self.rgb[(y + j) * w + x..(y + j) * w + x + tw];
            let tmpl_row = &tmpl.centered[j * tw..(j + 1) * tw];
            for (s, t) in scene_row.iter().zip(tmpl_row) {
                cross += s[0] * t[0] + s[1] * t[1] + s[2] * t[2];
            }
        }

        (cross / (tmpl.norm_sq * energy).sqrt()).clamp(-1.0, 1.0)
    }
}

/// Locates named template images inside a scene
pub struct TemplateMatcher {
    templates: BTreeMap<String, Template>,
    dedup_radius: u32,
}

impl TemplateMatcher {
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
            dedup_radius: DEDUP_RADIUS,
        }
    }

    /// Load every image directly under `templates_dir`, named by file stem.
    /// Later files with the same stem replace earlier ones; unreadable images are
    /// skipped. A missing directory yields an empty matcher.
    pub fn load(templates_dir: &Path) -> Result<Self> {
        let mut matcher = Self::empty();
        if !templates_dir.is_dir() {
            warn!(
                "Template directory {} not found. Matching disabled for this set.",
                templates_dir.display()
            );
            return Ok(matcher);
        }

        let mut paths: Vec<_> = std::fs::read_dir(templates_dir)
            .with_context(|| format!("Failed to read {}", templates_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && tft_capture::is_image_file(p))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => matcher.insert(name, &img.to_rgba8()),
                Err(e) => warn!("Skipping unreadable template {}: {}", path.display(), e),
            }
        }

        info!(
            "TemplateMatcher loaded {} templates from {}",
            matcher.template_count(),
            templates_dir.display()
        );
        Ok(matcher)
    }

    pub fn from_images<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = (S, RgbaImage)>,
        S: Into<String>,
    {
        let mut matcher = Self::empty();
        for (name, img) in images {
            matcher.insert(name, &img);
        }
        matcher
    }

    pub fn with_dedup_radius(mut self, radius: u32) -> Self {
        self.dedup_radius = radius;
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, image: &RgbaImage) {
        let tmpl = Template::new(name, image);
        if tmpl.is_flat() {
            debug!("Template {} has no contrast and will never match", tmpl.name);
        }
        if let Some(old) = self.templates.insert(tmpl.name.clone(), tmpl) {
            debug!("Template {} replaced", old.name);
        }
    }

    /// Number of loaded templates
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|k| k.as_str())
    }

    /// Find every location scoring at least `threshold` for the candidate templates
    /// (all of them, or only `subset`), then suppress near-duplicates.
    /// Results are ordered by descending confidence.
    pub fn find(&self, scene: &RgbaImage, threshold: f64, subset: Option<&[&str]>) -> Vec<Match> {
        if self.templates.is_empty() || scene.width() == 0 || scene.height() == 0 {
            return Vec::new();
        }

        let candidates: Vec<&Template> = match subset {
            Some(names) if !names.is_empty() => names
                .iter()
                .filter_map(|n| {
                    let t = self.templates.get(*n);
                    if t.is_none() {
                        debug!("No template named {}", n);
                    }
                    t
                })
                .collect(),
            _ => self.templates.values().collect(),
        };

        let planes = ScenePlanes::new(scene);
        let mut raw = Vec::new();
        for tmpl in candidates {
            if tmpl.is_flat() || tmpl.width > planes.width || tmpl.height > planes.height {
                continue;
            }
            let max_x = (planes.width - tmpl.width) as usize;
            let max_y = (planes.height - tmpl.height) as usize;
            for y in 0..=max_y {
                for x in 0..=max_x {
                    let score = planes.correlate(tmpl, x, y);
                    if score >= threshold {
                        raw.push(Match {
                            name: tmpl.name.clone(),
                            x: x as u32,
                            y: y as u32,
                            confidence: score,
                        });
                    }
                }
            }
        }

        let raw_count = raw.len();
        let kept = suppress_duplicates(raw, self.dedup_radius);
        if raw_count > 0 {
            debug!("{} raw match(es) reduced to {}", raw_count, kept.len());
        }
        kept
    }

    /// Highest-confidence match in the scene, if any clears `threshold`
    pub fn best_match(&self, scene: &RgbaImage, threshold: f64) -> Option<Match> {
        self.find(scene, threshold, None).into_iter().next()
    }
}

/// Greedy non-maximum suppression: walk matches from most to least confident and
/// keep one only if no kept match lies within `radius` pixels on both axes.
pub fn suppress_duplicates(mut matches: Vec<Match>, radius: u32) -> Vec<Match> {
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Match> = Vec::new();
    for m in matches {
        let near = kept
            .iter()
            .any(|k| m.x.abs_diff(k.x) < radius && m.y.abs_diff(k.y) < radius);
        if !near {
            kept.push(m);
        }
    }
    kept
}
