pub mod digit_reader;
pub mod layout;
pub mod phase;
pub mod state_reader;
pub mod template_matcher;

pub use digit_reader::{DigitReader, NoNumericReader, NumericField, NumericReader};
pub use layout::{LayoutError, MatchThresholds, Resolution, ZoneLayout};
pub use phase::{FixedPhase, PhaseClassifier};
pub use state_reader::{StateReader, TemplateSets};
pub use template_matcher::{suppress_duplicates, Match, Template, TemplateMatcher, DEDUP_RADIUS};
