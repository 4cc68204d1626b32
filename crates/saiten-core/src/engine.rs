//! Grading orchestrator.
//!
//! Sequences one grading request through
//! `RuleCheck -> Fixed` or `RuleCheck -> ModelCall -> Normalize -> Done`.
//! The orchestrator holds configuration only, so a single instance can grade
//! any number of requests concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::GradingError;
use crate::model::{CandidateAnswer, Problem, Score};
use crate::normalizer::normalize;
use crate::prompt::PromptBuilder;
use crate::results::{
    Feedback, GradingVerdict, LlmParams, RuleEvaluationOutcome, VerdictMetadata, VerdictSource,
};
use crate::rules::{summarize, RuleEvaluator};
use crate::traits::{CompletionRequest, LlmProvider};

/// Model call settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Model identifier sent to the transport.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Max tokens for the completion.
    pub max_tokens: u32,
    /// Upper bound on a single model call.
    pub timeout: Duration,
    /// Ask the backend for a JSON object.
    pub json_mode: bool,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
            json_mode: true,
            system_prompt: None,
        }
    }
}

/// States of one grading request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStage {
    RuleCheck,
    Fixed,
    ModelCall,
    Normalize,
    Done,
}

fn transition(from: GradingStage, to: GradingStage) {
    tracing::debug!(?from, ?to, "grading stage");
}

/// Runs the rule pre-screen and, when no rule decides, the model.
pub struct GradingOrchestrator {
    provider: Arc<dyn LlmProvider>,
    evaluator: RuleEvaluator,
    prompts: PromptBuilder,
    config: GraderConfig,
}

impl GradingOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GraderConfig) -> Self {
        Self {
            provider,
            evaluator: RuleEvaluator::default(),
            prompts: PromptBuilder::default(),
            config,
        }
    }

    pub fn with_evaluator(mut self, evaluator: RuleEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Grade one answer.
    ///
    /// Fails only on invalid input, a transport error, or a timeout. Malformed
    /// model output always produces a verdict.
    #[tracing::instrument(skip_all, fields(problem_id = %problem.id))]
    pub async fn grade(
        &self,
        answer: &CandidateAnswer,
        problem: &Problem,
    ) -> Result<GradingVerdict, GradingError> {
        let start = Instant::now();
        problem.validate()?;
        answer.validate_for(problem)?;

        let outcome = self.evaluator.evaluate(&answer.text, problem);
        if outcome.rule_override {
            transition(GradingStage::RuleCheck, GradingStage::Fixed);
            let verdict = fixed_verdict(answer, problem, outcome, start);
            audit(&verdict);
            return Ok(verdict);
        }

        transition(GradingStage::RuleCheck, GradingStage::ModelCall);
        let request = CompletionRequest {
            model: self.config.model.clone(),
            prompt: self.prompts.build(problem, &answer.text),
            system_prompt: self.config.system_prompt.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_mode: self.config.json_mode,
        };

        let response =
            match tokio::time::timeout(self.config.timeout, self.provider.complete(&request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::error!(
                        provider = self.provider.name(),
                        error = %format!("{e:#}"),
                        "model call failed"
                    );
                    return Err(GradingError::Transport(e));
                }
                Err(_) => {
                    tracing::error!(
                        provider = self.provider.name(),
                        timeout_secs = self.config.timeout.as_secs_f64(),
                        "model call timed out"
                    );
                    return Err(GradingError::Timeout(self.config.timeout));
                }
            };

        transition(GradingStage::ModelCall, GradingStage::Normalize);
        let normalized = normalize(&response.content);

        let verdict = GradingVerdict {
            score: normalized.score,
            reason: normalized.reason,
            feedback: normalized.feedback,
            rule_override: false,
            source: VerdictSource::Model,
            rule_details: outcome.details,
            metadata: VerdictMetadata {
                verdict_id: Uuid::new_v4(),
                problem_id: Some(problem.id.clone()),
                rater_id: answer.rater_id.clone(),
                latency_ms: start.elapsed().as_millis() as u64,
                token_usage: Some(response.token_usage),
                llm_params: Some(LlmParams {
                    model: request.model,
                    temperature: request.temperature,
                    max_tokens: request.max_tokens,
                }),
                model: Some(response.model),
                json_valid: normalized.json_valid,
                timestamp: Utc::now(),
            },
        };

        transition(GradingStage::Normalize, GradingStage::Done);
        audit(&verdict);
        Ok(verdict)
    }

    /// Grade independent requests concurrently, at most `parallelism` at a
    /// time. Results are returned in input order.
    pub async fn grade_batch(
        &self,
        jobs: &[(CandidateAnswer, Problem)],
        parallelism: usize,
    ) -> Vec<Result<GradingVerdict, GradingError>> {
        let semaphore = Semaphore::new(parallelism.max(1));
        let mut futures = FuturesUnordered::new();

        for (index, (answer, problem)) in jobs.iter().enumerate() {
            let semaphore = &semaphore;
            futures.push(async move {
                // The semaphore is never closed while this function runs.
                let _permit = semaphore.acquire().await.ok();
                (index, self.grade(answer, problem).await)
            });
        }

        let mut results: Vec<(usize, Result<GradingVerdict, GradingError>)> =
            Vec::with_capacity(jobs.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

fn fixed_verdict(
    answer: &CandidateAnswer,
    problem: &Problem,
    outcome: RuleEvaluationOutcome,
    start: Instant,
) -> GradingVerdict {
    let summary = summarize(&outcome);
    let negative = outcome.violations.iter().map(|v| v.reason.clone()).collect();

    GradingVerdict {
        score: summary.fixed_score.unwrap_or(Score::Acceptable),
        reason: summary.message,
        feedback: Feedback {
            positive: Vec::new(),
            negative,
        },
        rule_override: true,
        source: VerdictSource::Rule,
        rule_details: outcome.details,
        metadata: VerdictMetadata {
            verdict_id: Uuid::new_v4(),
            problem_id: Some(problem.id.clone()),
            rater_id: answer.rater_id.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
            token_usage: None,
            llm_params: None,
            model: None,
            json_valid: true,
            timestamp: Utc::now(),
        },
    }
}

fn audit(verdict: &GradingVerdict) {
    let tokens = verdict.metadata.token_usage.map(|u| u.total_tokens);
    tracing::info!(
        problem_id = verdict.metadata.problem_id.as_deref().unwrap_or(""),
        rater_id = verdict.metadata.rater_id.as_deref().unwrap_or(""),
        score = %verdict.score,
        source = ?verdict.source,
        latency_ms = verdict.metadata.latency_ms,
        tokens = ?tokens,
        json_valid = verdict.metadata.json_valid,
        "grading completed"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::model::fixtures;
    use crate::results::TokenUsage;
    use crate::traits::{CompletionResponse, ModelInfo};

    const GOOD_ANSWER: &str = "主要な利用者を初期から参加させ、要件の合意を早めに得る。";
    const MODEL_REPLY: &str = r#"{"ai_score":"〇","ai_reason":"要点を押さえている","ai_feedback":{"positive_points":["早期参画"],"negative_points":[]}}"#;

    struct StubProvider {
        reply: Result<String, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl StubProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                ..Self::replying("")
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    model: "stub-model-v1".into(),
                    token_usage: TokenUsage {
                        prompt_tokens: 120,
                        completion_tokens: 30,
                        total_tokens: 150,
                    },
                    latency_ms: 5,
                }),
                Err(message) => Err(anyhow::anyhow!("{message}")),
            }
        }

        async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
            Ok(vec![])
        }
    }

    fn orchestrator(provider: &Arc<StubProvider>) -> GradingOrchestrator {
        GradingOrchestrator::new(provider.clone(), GraderConfig::default())
    }

    fn answer(text: &str) -> CandidateAnswer {
        CandidateAnswer::new(fixtures::problem().id, text).with_rater("rater-1")
    }

    #[tokio::test]
    async fn overlong_answer_never_reaches_the_model() {
        let provider = Arc::new(StubProvider::replying(MODEL_REPLY));
        let verdict = orchestrator(&provider)
            .grade(&answer(&"あ".repeat(120)), &fixtures::problem())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(verdict.rule_override);
        assert_eq!(verdict.source, VerdictSource::Rule);
        assert_eq!(verdict.score, Score::Acceptable);
        assert_eq!(verdict.rule_details.len(), 1);
        assert_eq!(verdict.feedback.negative.len(), 1);
        assert!(verdict.feedback.positive.is_empty());
        assert!(verdict.metadata.json_valid);
        assert!(verdict.metadata.token_usage.is_none());
        assert!(verdict.metadata.llm_params.is_none());
        assert_eq!(verdict.metadata.rater_id.as_deref(), Some("rater-1"));
    }

    #[tokio::test]
    async fn copied_answer_is_fixed_to_poor() {
        let provider = Arc::new(StubProvider::replying(MODEL_REPLY));
        let problem = fixtures::problem();
        let verdict = orchestrator(&provider)
            .grade(&answer(&problem.model_answer), &problem)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(verdict.score, Score::Poor);
        assert!(verdict.reason.starts_with("Score fixed to ✕"));
    }

    #[tokio::test]
    async fn clean_answer_is_graded_by_the_model() {
        let provider = Arc::new(StubProvider::replying(MODEL_REPLY));
        let verdict = orchestrator(&provider)
            .grade(&answer(GOOD_ANSWER), &fixtures::problem())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(!verdict.rule_override);
        assert_eq!(verdict.source, VerdictSource::Model);
        assert_eq!(verdict.score, Score::Excellent);
        assert_eq!(verdict.reason, "要点を押さえている");
        assert_eq!(verdict.feedback.positive, vec!["早期参画"]);
        assert_eq!(verdict.rule_details.len(), 3);

        let meta = &verdict.metadata;
        assert!(meta.json_valid);
        assert_eq!(meta.problem_id.as_deref(), Some("2023-pm1-q1-1"));
        assert_eq!(meta.model.as_deref(), Some("stub-model-v1"));
        assert_eq!(meta.token_usage.unwrap().total_tokens, 150);
        assert_eq!(
            meta.llm_params,
            Some(LlmParams {
                model: "gpt-4o-mini".into(),
                temperature: 0.1,
                max_tokens: 1000,
            })
        );

        let sent = provider.last_request.lock().unwrap().clone().unwrap();
        assert!(sent.json_mode);
        assert!(sent.prompt.contains(GOOD_ANSWER));
    }

    #[tokio::test]
    async fn malformed_reply_still_yields_a_verdict() {
        for reply in ["not json at all", ""] {
            let provider = Arc::new(StubProvider::replying(reply));
            let verdict = orchestrator(&provider)
                .grade(&answer(GOOD_ANSWER), &fixtures::problem())
                .await
                .unwrap();
            assert_eq!(verdict.score, Score::Acceptable);
            assert!(!verdict.metadata.json_valid);
            assert!(!verdict.rule_override);
            assert_eq!(verdict.feedback, Feedback::default());
        }
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let provider = Arc::new(StubProvider::failing("connection refused"));
        let err = orchestrator(&provider)
            .grade(&answer(GOOD_ANSWER), &fixtures::problem())
            .await
            .unwrap_err();

        assert!(matches!(err, GradingError::Transport(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let provider = Arc::new(StubProvider {
            delay: Some(Duration::from_secs(120)),
            ..StubProvider::replying(MODEL_REPLY)
        });
        let config = GraderConfig {
            timeout: Duration::from_secs(2),
            ..GraderConfig::default()
        };
        let err = GradingOrchestrator::new(provider.clone(), config)
            .grade(&answer(GOOD_ANSWER), &fixtures::problem())
            .await
            .unwrap_err();

        assert!(matches!(err, GradingError::Timeout(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn input_errors_are_rejected_before_rules() {
        let provider = Arc::new(StubProvider::replying(MODEL_REPLY));
        let grader = orchestrator(&provider);

        let err = grader
            .grade(&answer("   "), &fixtures::problem())
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::MissingField("student_answer")));

        let mut problem = fixtures::problem();
        problem.model_answer.clear();
        let err = grader.grade(&answer(GOOD_ANSWER), &problem).await.unwrap_err();
        assert!(matches!(err, GradingError::MissingField("model_answer")));

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn batch_keeps_input_order() {
        let provider = Arc::new(StubProvider::replying(MODEL_REPLY));
        let problem = fixtures::problem();
        let jobs = vec![
            (answer(GOOD_ANSWER), problem.clone()),
            (answer(&"あ".repeat(120)), problem.clone()),
            (CandidateAnswer::new("unknown", GOOD_ANSWER), problem.clone()),
            (answer(GOOD_ANSWER), problem),
        ];

        let results = orchestrator(&provider).grade_batch(&jobs, 2).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().source, VerdictSource::Model);
        assert_eq!(results[1].as_ref().unwrap().source, VerdictSource::Rule);
        assert!(results[2].as_ref().unwrap_err().is_input_error());
        assert_eq!(results[3].as_ref().unwrap().score, Score::Excellent);
        assert_eq!(provider.calls(), 2);
    }
}
