//! Bounded retry around model completions
//!
//! Rate-limited calls are retried with exponential backoff plus jitter:
//! before attempt `i + 1` the loop waits `2^i + U(0, 1)` seconds, so five
//! attempts wait roughly 1, 2, 4 and 8 seconds between them. Any other
//! failure is returned immediately. Running out of attempts yields
//! [`PipelineError::RetryExhausted`], distinct from a single hard failure.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;
use crate::llm::{GenerativeModel, ModelError};
use crate::metrics::Metrics;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Delay before retrying after zero-based attempt `attempt`
pub fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let base = 2f64.powi(attempt.min(30) as i32);
    Duration::from_secs_f64(base + jitter.clamp(0.0, 1.0))
}

pub struct ResilientCompletion {
    model: Arc<dyn GenerativeModel>,
    sleeper: Arc<dyn Sleeper>,
    max_attempts: u32,
    metrics: Option<Arc<Metrics>>,
}

impl ResilientCompletion {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            sleeper: Arc::new(TokioSleeper),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            metrics: None,
        }
    }

    /// At least one attempt is always made
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the prompt, retrying only on rate limiting
    pub async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let mut attempt: u32 = 0;

        loop {
            match self.model.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(ModelError::Failed(message)) => {
                    return Err(PipelineError::ModelFailure(message));
                }
                Err(ModelError::RateLimited(message)) => {
                    let remaining = self.max_attempts - attempt - 1;
                    if remaining == 0 {
                        return Err(PipelineError::RetryExhausted {
                            attempts: self.max_attempts,
                            last_error: message,
                        });
                    }

                    let wait = backoff_delay(attempt, rand::thread_rng().gen_range(0.0..1.0));
                    tracing::warn!(
                        attempt = attempt + 1,
                        remaining,
                        wait_secs = wait.as_secs_f64(),
                        "Model rate limited, retrying: {}",
                        message
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.completion_retries.inc();
                    }

                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes and counts calls
    pub struct ScriptedModel {
        outcomes: Mutex<VecDeque<Result<String, ModelError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(outcomes: Vec<Result<String, ModelError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::RateLimited("script exhausted".to_string())))
        }
    }

    #[derive(Default)]
    pub struct RecordingSleeper {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn rate_limited() -> Result<String, ModelError> {
        Err(ModelError::RateLimited("429 Resource exhausted".to_string()))
    }

    fn completion(model: Arc<ScriptedModel>, sleeper: Arc<RecordingSleeper>) -> ResilientCompletion {
        ResilientCompletion::new(model).with_sleeper(sleeper)
    }

    #[test]
    fn test_backoff_delay_schedule() {
        assert_eq!(backoff_delay(0, 0.0), Duration::from_secs(1));
        assert_eq!(backoff_delay(3, 0.5), Duration::from_secs_f64(8.5));
        assert_eq!(backoff_delay(4, 2.0), Duration::from_secs(17));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("SELECT 1".to_string())]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let text = completion(model.clone(), sleeper.clone()).complete("q").await.unwrap();

        assert_eq!(text, "SELECT 1");
        assert_eq!(model.calls(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_rate_limits_then_succeeds() {
        let k = 3;
        let mut outcomes: Vec<_> = (0..k).map(|_| rate_limited()).collect();
        outcomes.push(Ok("SELECT 1".to_string()));
        let model = Arc::new(ScriptedModel::new(outcomes));
        let sleeper = Arc::new(RecordingSleeper::default());

        let text = completion(model.clone(), sleeper.clone()).complete("q").await.unwrap();

        assert_eq!(text, "SELECT 1");
        assert_eq!(model.calls(), k + 1);

        let sleeps = sleeper.sleeps.lock().unwrap().clone();
        assert_eq!(sleeps.len(), k);
        for (i, wait) in sleeps.iter().enumerate() {
            let floor = 2f64.powi(i as i32);
            assert!(wait.as_secs_f64() >= floor, "sleep {} below {}s", i, floor);
            assert!(wait.as_secs_f64() <= floor + 1.0, "sleep {} above {}s", i, floor + 1.0);
        }
    }

    #[tokio::test]
    async fn test_always_rate_limited_exhausts() {
        let model = Arc::new(ScriptedModel::new((0..10).map(|_| rate_limited()).collect()));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = completion(model.clone(), sleeper.clone())
            .complete("q")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RetryExhausted { attempts: 5, ref last_error } if last_error.contains("429")
        ));
        assert_eq!(model.calls(), DEFAULT_MAX_ATTEMPTS as usize);
        // No sleep after the final attempt
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), DEFAULT_MAX_ATTEMPTS as usize - 1);
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Failed("401 Unauthorized".to_string())),
            Ok("never reached".to_string()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = completion(model.clone(), sleeper.clone())
            .complete("q")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ModelFailure(ref m) if m == "401 Unauthorized"));
        assert_eq!(model.calls(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_attempt_ceiling() {
        let model = Arc::new(ScriptedModel::new((0..10).map(|_| rate_limited()).collect()));
        let sleeper = Arc::new(RecordingSleeper::default());

        let resilient = completion(model.clone(), sleeper).with_max_attempts(2);
        let err = resilient.complete("q").await.unwrap_err();

        assert!(matches!(err, PipelineError::RetryExhausted { attempts: 2, .. }));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("SELECT 1".to_string())]));
        let resilient = ResilientCompletion::new(model.clone()).with_max_attempts(0);

        assert_eq!(resilient.max_attempts(), 1);
        assert_eq!(resilient.complete("q").await.unwrap(), "SELECT 1");
    }
}
