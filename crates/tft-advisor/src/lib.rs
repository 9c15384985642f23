pub mod advisor;
pub mod scoring;
pub mod strategy;
pub mod summary;

pub use advisor::{AdviceRequest, Advisor, AdvisorError, Conversation, Role, Turn, SCORING_RULES};
pub use scoring::{
    component_score, interest, surviving_score, time_score, ScoreBreakdown, ScoringEngine,
};
pub use strategy::{StrategyRefresh, StrategyText};
pub use summary::{summarize_state, thousands};
