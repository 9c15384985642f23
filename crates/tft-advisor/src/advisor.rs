use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Scoring rules every request carries ahead of the strategy notes
pub const SCORING_RULES: &str = "\
You are coaching a player through Tocker's Trials, a 30-round solo mode.
Score per remaining round: 2,500 per unbuilt component held, 1,000 per interest tier \
(1 tier per 10 gold, max 5), 250 per surviving unit, 2,750 for surviving the round.
Holding components early is worth more than building them. Answer briefly.";

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("a request is already in flight")]
    Busy,
    #[error("question is empty")]
    EmptyQuestion,
    #[error("advisor returned an empty answer")]
    EmptyAnswer,
    #[error("no advisor configured")]
    Unavailable,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceRequest {
    /// Scoring rules plus the current strategy document
    pub system: String,
    pub state_summary: String,
    pub question: String,
    pub history: Vec<Turn>,
}

impl AdviceRequest {
    /// Text of the newest user turn
    pub fn user_message(&self) -> String {
        format_user_turn(&self.state_summary, &self.question)
    }
}

fn format_user_turn(state_summary: &str, question: &str) -> String {
    format!("Game state:\n{}\n\nQuestion: {}", state_summary, question)
}

/// External AI collaborator. Blocking; callers keep it off the polling loop.
pub trait Advisor: Send + Sync {
    fn advise(&self, request: &AdviceRequest) -> Result<String, AdvisorError>;
}

/// Chat history with a single request in flight at a time
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    pending: Option<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Compose the request for `question` and mark it outstanding
    pub fn begin(
        &mut self,
        system: &str,
        state_summary: &str,
        question: &str,
    ) -> Result<AdviceRequest, AdvisorError> {
        if self.pending.is_some() {
            return Err(AdvisorError::Busy);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(AdvisorError::EmptyQuestion);
        }

        let request = AdviceRequest {
            system: system.to_string(),
            state_summary: state_summary.to_string(),
            question: question.to_string(),
            history: self.turns.clone(),
        };
        self.pending = Some(Turn {
            role: Role::User,
            content: request.user_message(),
        });
        Ok(request)
    }

    /// Settle the outstanding request. Only successful answers join the history.
    pub fn finish(&mut self, outcome: Result<String, AdvisorError>) -> Result<String, AdvisorError> {
        let question = self.pending.take();
        let answer = outcome.and_then(|text| {
            let text = text.trim().to_string();
            if text.is_empty() {
                Err(AdvisorError::EmptyAnswer)
            } else {
                Ok(text)
            }
        });

        match (&answer, question) {
            (Ok(text), Some(question)) => {
                self.turns.push(question);
                self.turns.push(Turn {
                    role: Role::Assistant,
                    content: text.clone(),
                });
                debug!("Conversation now has {} turns", self.turns.len());
            }
            (Err(err), _) => warn!("Advice request failed: {err}"),
            (Ok(_), None) => warn!("Answer arrived with no request outstanding"),
        }
        answer
    }

    /// `begin`, call the advisor, `finish`
    pub fn ask(
        &mut self,
        advisor: &dyn Advisor,
        system: &str,
        state_summary: &str,
        question: &str,
    ) -> Result<String, AdvisorError> {
        let request = self.begin(system, state_summary, question)?;
        let outcome = advisor.advise(&request);
        self.finish(outcome)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
