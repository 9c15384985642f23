use crate::layout::ZoneLayout;
use image::RgbaImage;
use tft_state::Phase;

/// Decides which phase a frame shows. Implementations may return `Phase::Unknown`.
pub trait PhaseClassifier: Send + Sync {
    fn classify(&self, frame: &RgbaImage, layout: &ZoneLayout) -> Phase;
}

impl<F> PhaseClassifier for F
where
    F: Fn(&RgbaImage, &ZoneLayout) -> Phase + Send + Sync,
{
    fn classify(&self, frame: &RgbaImage, layout: &ZoneLayout) -> Phase {
        self(frame, layout)
    }
}

/// Always reports the same phase
#[derive(Debug, Clone, Copy)]
pub struct FixedPhase(pub Phase);

impl PhaseClassifier for FixedPhase {
    fn classify(&self, _frame: &RgbaImage, _layout: &ZoneLayout) -> Phase {
        self.0
    }
}
