use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tft_capture::ScreenRegion;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("resolution must be non-zero, got {width}x{height}")]
    EmptyResolution { width: u32, height: u32 },

    #[error("zone '{zone}' has zero width or height")]
    EmptyZone { zone: &'static str },

    #[error("zone '{zone}' ({region:?}) extends outside the {width}x{height} frame")]
    OutOfFrame {
        zone: &'static str,
        region: ScreenRegion,
        width: u32,
        height: u32,
    },

    #[error("shop must be split into 1..=10 slots no wider than the zone, got {0}")]
    InvalidShopSlots(usize),

    #[error("threshold '{name}' must be within [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Named zones of the game screen in frame pixels, calibrated for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneLayout {
    pub resolution: Resolution,
    pub board: ScreenRegion,
    /// Champion bench below the board
    pub bench: ScreenRegion,
    /// Item components bench
    pub item_bench: ScreenRegion,
    pub shop: ScreenRegion,
    /// Number of equal-width cards the shop zone is split into
    pub shop_slots: usize,
    pub augment_select: ScreenRegion,
    pub phase_indicator: Option<ScreenRegion>,
    pub round_text: ScreenRegion,
    pub gold_text: ScreenRegion,
    pub level_text: ScreenRegion,
    pub lives_text: ScreenRegion,
}

impl Default for ZoneLayout {
    /// Calibrated from a 2560x1440 screenshot
    fn default() -> Self {
        Self {
            resolution: Resolution {
                width: 2560,
                height: 1440,
            },
            board: ScreenRegion::new(600, 400, 1360, 600),
            bench: ScreenRegion::new(345, 1000, 1635, 120),
            item_bench: ScreenRegion::new(345, 1190, 1635, 55),
            shop: ScreenRegion::new(590, 1260, 1400, 170),
            shop_slots: 5,
            augment_select: ScreenRegion::new(600, 400, 1360, 600),
            phase_indicator: None,
            round_text: ScreenRegion::new(960, 15, 110, 35),
            gold_text: ScreenRegion::new(1895, 1190, 45, 23),
            level_text: ScreenRegion::new(330, 1193, 210, 25),
            lives_text: ScreenRegion::new(2355, 290, 65, 25),
        }
    }
}

impl ZoneLayout {
    /// Every configured zone with its name
    pub fn zones(&self) -> Vec<(&'static str, ScreenRegion)> {
        let mut zones = vec![
            ("board", self.board),
            ("bench", self.bench),
            ("item_bench", self.item_bench),
            ("shop", self.shop),
            ("augment_select", self.augment_select),
            ("round_text", self.round_text),
            ("gold_text", self.gold_text),
            ("level_text", self.level_text),
            ("lives_text", self.lives_text),
        ];
        if let Some(r) = self.phase_indicator {
            zones.push(("phase_indicator", r));
        }
        zones
    }

    /// Shop zone split into its card slots, left to right
    pub fn shop_cards(&self) -> Vec<ScreenRegion> {
        self.shop.split_columns(self.shop_slots)
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(LayoutError::EmptyResolution { width, height });
        }
        for (zone, region) in self.zones() {
            if region.is_empty() {
                return Err(LayoutError::EmptyZone { zone });
            }
            if !region.fits_within(width, height) {
                return Err(LayoutError::OutOfFrame {
                    zone,
                    region,
                    width,
                    height,
                });
            }
        }
        if self.shop_slots == 0 || self.shop_slots > 10 || self.shop.width < self.shop_slots as u32
        {
            return Err(LayoutError::InvalidShopSlots(self.shop_slots));
        }
        Ok(())
    }

    /// Read and validate a calibration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration {}", path.display()))?;
        let layout: ZoneLayout = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse calibration {}", path.display()))?;
        layout.validate()?;
        info!(
            "Loaded calibration for {}x{} from {}",
            layout.resolution.width,
            layout.resolution.height,
            path.display()
        );
        Ok(layout)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write calibration {}", path.display()))?;
        Ok(())
    }
}

/// Minimum match confidence per zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    pub board: f64,
    pub bench: f64,
    pub items: f64,
    pub shop: f64,
    pub augments: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            board: 0.70,
            bench: 0.75,
            items: 0.80,
            shop: 0.80,
            augments: 0.80,
        }
    }
}

impl MatchThresholds {
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (name, value) in [
            ("board", self.board),
            ("bench", self.bench),
            ("items", self.items),
            ("shop", self.shop),
            ("augments", self.augments),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LayoutError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}
