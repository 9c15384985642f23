use std::sync::{Arc, Mutex};
use tft_advisor::{summarize_state, Advisor, AdvisorError, Conversation, ScoringEngine, StrategyText};
use tft_state::{absolute_round, Observation};
use tokio::sync::watch;
use tracing::{info, warn};

/// Chat with the advisor about the latest observation.
///
/// Answers are also published on the advice channel the overlay reads from.
pub struct Companion {
    advisor: Option<Arc<dyn Advisor>>,
    strategy: Arc<StrategyText>,
    scoring: Arc<ScoringEngine>,
    observations: watch::Receiver<Option<Arc<Observation>>>,
    conversation: Arc<Mutex<Conversation>>,
    advice_tx: watch::Sender<Option<String>>,
}

impl Companion {
    pub fn new(
        strategy: Arc<StrategyText>,
        scoring: Arc<ScoringEngine>,
        observations: watch::Receiver<Option<Arc<Observation>>>,
    ) -> Self {
        let (advice_tx, _) = watch::channel(None);
        Self {
            advisor: None,
            strategy,
            scoring,
            observations,
            conversation: Arc::new(Mutex::new(Conversation::new())),
            advice_tx,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn advice(&self) -> watch::Receiver<Option<String>> {
        self.advice_tx.subscribe()
    }

    pub fn state_summary(&self) -> String {
        let obs = self
            .observations
            .borrow()
            .clone()
            .unwrap_or_else(|| Arc::new(Observation::default()));
        let score = self.scoring.projected_score(
            absolute_round(obs.round),
            obs.component_count(),
            obs.gold.unwrap_or(0),
            obs.board_unit_count(),
        );
        summarize_state(&obs, &score, self.scoring.total_rounds())
    }

    pub async fn ask(&self, question: &str) -> Result<String, AdvisorError> {
        let summary = self.state_summary();
        let system = self.strategy.system_prompt();
        let request = self.lock().begin(&system, &summary, question)?;

        let outcome = match &self.advisor {
            None => Err(AdvisorError::Unavailable),
            Some(advisor) => {
                let advisor = advisor.clone();
                tokio::task::spawn_blocking(move || advisor.advise(&request))
                    .await
                    .unwrap_or_else(|e| Err(AdvisorError::Transport(e.to_string())))
            }
        };

        let answer = self.lock().finish(outcome)?;
        info!("Advice received ({} chars)", answer.len());
        self.advice_tx.send_replace(Some(answer.clone()));
        Ok(answer)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Conversation> {
        match self.conversation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Conversation lock poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tft_advisor::AdviceRequest;
    use tft_data::ReferenceStore;
    use tft_state::RoundLabel;

    struct Echo;

    impl Advisor for Echo {
        fn advise(&self, request: &AdviceRequest) -> Result<String, AdvisorError> {
            Ok(format!("seen: {}", request.state_summary.lines().next().unwrap_or("")))
        }
    }

    fn companion(dir: &std::path::Path) -> (Companion, watch::Sender<Option<Arc<Observation>>>) {
        let strategy = Arc::new(StrategyText::load(&dir.join("strategy.md")).unwrap());
        let scoring = Arc::new(ScoringEngine::new(Arc::new(ReferenceStore::standard_rounds(30).unwrap())));
        let (tx, rx) = watch::channel(None);
        (Companion::new(strategy, scoring, rx), tx)
    }

    #[tokio::test]
    async fn test_ask_uses_latest_observation_and_publishes_advice() {
        let dir = tempfile::tempdir().unwrap();
        let (companion, tx) = companion(dir.path());
        let companion = companion.with_advisor(Arc::new(Echo));
        let advice = companion.advice();

        tx.send_replace(Some(Arc::new(Observation {
            round: RoundLabel::parse("2-5"),
            gold: Some(42),
            ..Default::default()
        })));

        let answer = companion.ask("Should I roll?").await.unwrap();
        assert!(answer.starts_with("seen: Round: 2-5 (15/30)"));
        assert!(answer.contains("Gold: 42"));
        assert_eq!(advice.borrow().as_deref(), Some(answer.as_str()));
    }

    #[tokio::test]
    async fn test_without_advisor_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (companion, _tx) = companion(dir.path());
        let err = companion.ask("Anything?").await.unwrap_err();
        assert!(matches!(err, AdvisorError::Unavailable));
        assert!(companion.advice().borrow().is_none());
        // The failed request does not leave the conversation blocked.
        assert!(matches!(companion.ask("Again?").await, Err(AdvisorError::Unavailable)));
    }
}
