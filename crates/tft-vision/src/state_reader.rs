use crate::digit_reader::{NoNumericReader, NumericField, NumericReader};
use crate::layout::{MatchThresholds, ZoneLayout};
use crate::phase::{FixedPhase, PhaseClassifier};
use crate::template_matcher::{Match, TemplateMatcher};
use anyhow::Result;
use image::RgbaImage;
use std::path::Path;
use tft_capture::{crop_region, ScreenRegion};
use tft_state::{ItemSighting, Observation, Phase, UnitSighting};
use tracing::{debug, info};

/// Lives above this are misreads
const MAX_LIVES: u32 = 3;

/// Template sets used by the reader, one per kind of on-screen element
pub struct TemplateSets {
    pub champions: TemplateMatcher,
    pub items: TemplateMatcher,
    pub augments: TemplateMatcher,
}

impl TemplateSets {
    /// Load `templates_dir/{champions,items,augments}`; missing sets are empty.
    pub fn load(templates_dir: &Path) -> Result<Self> {
        Ok(Self {
            champions: TemplateMatcher::load(&templates_dir.join("champions"))?,
            items: TemplateMatcher::load(&templates_dir.join("items"))?,
            augments: TemplateMatcher::load(&templates_dir.join("augments"))?,
        })
    }

    pub fn empty() -> Self {
        Self {
            champions: TemplateMatcher::empty(),
            items: TemplateMatcher::empty(),
            augments: TemplateMatcher::empty(),
        }
    }
}

/// Turns a captured frame into an `Observation` by matching each zone separately
pub struct StateReader {
    layout: ZoneLayout,
    thresholds: MatchThresholds,
    templates: TemplateSets,
    phase: Box<dyn PhaseClassifier>,
    numbers: Box<dyn NumericReader>,
}

impl StateReader {
    pub fn new(layout: ZoneLayout, thresholds: MatchThresholds, templates: TemplateSets) -> Self {
        info!(
            "StateReader ready: {} champion, {} item, {} augment templates",
            templates.champions.template_count(),
            templates.items.template_count(),
            templates.augments.template_count()
        );
        Self {
            layout,
            thresholds,
            templates,
            phase: Box::new(FixedPhase(Phase::Unknown)),
            numbers: Box::new(NoNumericReader),
        }
    }

    pub fn with_phase_classifier(mut self, classifier: impl PhaseClassifier + 'static) -> Self {
        self.phase = Box::new(classifier);
        self
    }

    pub fn with_numeric_reader(mut self, reader: impl NumericReader + 'static) -> Self {
        self.numbers = Box::new(reader);
        self
    }

    pub fn layout(&self) -> &ZoneLayout {
        &self.layout
    }

    /// Read every zone of `frame`. Never fails: zones without matches are empty and
    /// unreadable numbers are absent.
    pub fn read(&self, frame: &RgbaImage) -> Observation {
        let res = self.layout.resolution;
        if frame.dimensions() != (res.width, res.height) {
            debug!(
                "Frame is {}x{} but layout is calibrated for {}x{}",
                frame.width(),
                frame.height(),
                res.width,
                res.height
            );
        }

        let phase = self.phase.classify(frame, &self.layout);

        let board = self.units_in(frame, self.layout.board, self.thresholds.board);
        let bench = self.units_in(frame, self.layout.bench, self.thresholds.bench);
        let items = self.items_in(frame);
        let shop = self.read_shop(frame);

        let augment_choices = if phase == Phase::Augment {
            self.read_augments(frame)
        } else {
            Vec::new()
        };

        let gold = self.read_number(frame, self.layout.gold_text, NumericField::Gold);
        let level = self
            .read_number(frame, self.layout.level_text, NumericField::Level)
            .filter(|&l| l >= 1);
        let lives = self
            .read_number(frame, self.layout.lives_text, NumericField::Lives)
            .filter(|&l| l <= MAX_LIVES);
        let round = self
            .numbers
            .read_round(&crop_region(frame, &self.layout.round_text));

        debug!(
            "Observation: phase={} round={:?} board={} bench={} items={} gold={:?} level={:?} lives={:?}",
            phase.as_str(),
            round.map(|r| r.to_string()),
            board.len(),
            bench.len(),
            items.len(),
            gold,
            level,
            lives
        );

        Observation {
            phase,
            board,
            bench,
            items,
            shop,
            gold,
            level,
            lives,
            augment_choices,
            round,
        }
    }

    /// Run a matcher on one zone and shift the results back into frame coordinates
    fn find_in_zone(
        matcher: &TemplateMatcher,
        frame: &RgbaImage,
        zone: ScreenRegion,
        threshold: f64,
    ) -> Vec<Match> {
        let crop = crop_region(frame, &zone);
        matcher
            .find(&crop, threshold, None)
            .into_iter()
            .map(|m| Match {
                x: m.x + zone.x,
                y: m.y + zone.y,
                ..m
            })
            .collect()
    }

    fn units_in(&self, frame: &RgbaImage, zone: ScreenRegion, threshold: f64) -> Vec<UnitSighting> {
        Self::find_in_zone(&self.templates.champions, frame, zone, threshold)
            .into_iter()
            .map(|m| UnitSighting {
                champion: m.name,
                x: m.x,
                y: m.y,
                confidence: m.confidence,
            })
            .collect()
    }

    fn items_in(&self, frame: &RgbaImage) -> Vec<ItemSighting> {
        Self::find_in_zone(
            &self.templates.items,
            frame,
            self.layout.item_bench,
            self.thresholds.items,
        )
        .into_iter()
        .map(|m| ItemSighting {
            item: m.name,
            x: m.x,
            y: m.y,
            confidence: m.confidence,
        })
        .collect()
    }

    fn read_shop(&self, frame: &RgbaImage) -> Vec<Option<String>> {
        self.layout
            .shop_cards()
            .iter()
            .map(|card| {
                let crop = crop_region(frame, card);
                self.templates
                    .champions
                    .best_match(&crop, self.thresholds.shop)
                    .map(|m| m.name)
            })
            .collect()
    }

    /// Offered augments, left to right
    fn read_augments(&self, frame: &RgbaImage) -> Vec<String> {
        let mut found = Self::find_in_zone(
            &self.templates.augments,
            frame,
            self.layout.augment_select,
            self.thresholds.augments,
        );
        found.sort_by_key(|m| m.x);
        found.into_iter().map(|m| m.name).collect()
    }

    fn read_number(&self, frame: &RgbaImage, zone: ScreenRegion, field: NumericField) -> Option<u32> {
        self.numbers.read_number(&crop_region(frame, &zone), field)
    }
}
