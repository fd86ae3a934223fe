use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AISettings, HealthSnapshot, LearnedPattern, PhaseDetectionResult, RiskAnalysis, RiskLevel,
    RiskSource, SimilarityOutcome,
};

const BASE_RISK: u32 = 20;

/// Everything the reasoning service sees besides the snapshot itself.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningContext {
    pub owner_id: String,
    /// Feature name → mean value before past attacks. Empty without a valid pattern.
    pub pattern_means: BTreeMap<String, f64>,
    pub similarity: SimilarityOutcome,
    pub phase: PhaseDetectionResult,
}

impl ReasoningContext {
    pub fn new(
        owner_id: &str,
        pattern: Option<&LearnedPattern>,
        similarity: SimilarityOutcome,
        phase: PhaseDetectionResult,
    ) -> Self {
        let pattern_means = pattern
            .filter(|p| p.valid)
            .map(|p| {
                p.features
                    .iter()
                    .map(|(feature, stats)| (feature.name().to_string(), stats.mean))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            owner_id: owner_id.to_string(),
            pattern_means,
            similarity,
            phase,
        }
    }
}

/// Validated reply of a reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutput {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub triggers: Vec<String>,
    pub reasoning: String,
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &ReasoningContext,
    ) -> EngineResult<ReasoningOutput>;
}

/// Deterministic rule-based risk used whenever the reasoning service cannot
/// answer. Absent metrics add nothing.
pub fn fallback_analysis(snapshot: &HealthSnapshot, now: DateTime<Utc>) -> RiskAnalysis {
    let mut score = BASE_RISK;
    let mut triggers = Vec::new();
    let mut recommendations = Vec::new();

    if snapshot.hrv.is_some_and(|hrv| hrv < 40.0) {
        score += 25;
        triggers.push("Critical HRV".to_string());
        recommendations.push("Take a break and try slow breathing to help your HRV recover".to_string());
    }
    if snapshot.stress_level.is_some_and(|stress| stress > 70.0) {
        score += 20;
        triggers.push("High Stress".to_string());
        recommendations.push("Step away for a few minutes of relaxation".to_string());
    }
    let short_sleep = snapshot.sleep_hours.is_some_and(|h| h < 6.0);
    let poor_quality = snapshot.sleep_quality.is_some_and(|q| q < 60.0);
    if short_sleep || poor_quality {
        score += 15;
        triggers.push("Poor Sleep".to_string());
        recommendations.push("Plan an early night and keep a regular sleep schedule".to_string());
    }
    if snapshot.pressure.is_some_and(|p| p < 1010.0) {
        score += 15;
        triggers.push("Low Pressure".to_string());
        recommendations.push("Stay hydrated while the barometric pressure is low".to_string());
    }
    if snapshot.screen_time_minutes.is_some_and(|m| m > 360.0) {
        score += 10;
        triggers.push("High Screen Time".to_string());
        recommendations.push("Reduce screen brightness and take regular screen breaks".to_string());
    }

    let risk_score = score.min(100) as u8;
    let reasoning = if triggers.is_empty() {
        "No known migraine triggers are active right now.".to_string()
    } else {
        format!("Active triggers: {}.", triggers.join(", "))
    };

    RiskAnalysis {
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        triggers,
        reasoning,
        recommendations,
        source: RiskSource::Fallback,
        fallback_reason: None,
        computed_at: now,
    }
}

fn json_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
}

fn string_list(value: Option<&Value>, field: &str, required: bool) -> EngineResult<Vec<String>> {
    match value {
        None | Some(Value::Null) if !required => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()),
        _ => Err(EngineError::MalformedResponse(format!(
            "{} must be an array",
            field
        ))),
    }
}

/// Pull the JSON object out of a model reply (which may be wrapped in prose
/// or code fences) and validate it.
pub fn parse_reasoning_reply(content: &str) -> EngineResult<ReasoningOutput> {
    let body = json_object_pattern()
        .and_then(|re| re.find(content))
        .map(|m| m.as_str())
        .ok_or_else(|| EngineError::MalformedResponse("no JSON object in reply".to_string()))?;
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| EngineError::MalformedResponse(format!("JSON parse error: {}", e)))?;

    let score = payload
        .get("riskScore")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && (0.0..=100.0).contains(s))
        .ok_or_else(|| {
            EngineError::MalformedResponse("riskScore missing or outside 0-100".to_string())
        })?;
    let risk_score = score.round() as u8;

    let triggers = string_list(payload.get("triggers"), "triggers", true)?;
    let recommendations = string_list(payload.get("recommendations"), "recommendations", false)?;

    let risk_level = payload
        .get("riskLevel")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .unwrap_or_else(|| RiskLevel::from_score(risk_score));

    Ok(ReasoningOutput {
        risk_score,
        risk_level,
        triggers,
        reasoning: payload
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        recommendations,
    })
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions backed reasoning service.
pub struct LlmReasoningClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmReasoningClient {
    /// `None` when reasoning is disabled or no key is configured.
    pub fn from_settings(settings: &AISettings) -> Option<Self> {
        let api_key = crate::utils::config::resolve_api_key(&settings.api_key);
        if !settings.enabled || api_key.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
        })
    }

    fn build_prompt(snapshot: &HealthSnapshot, context: &ReasoningContext) -> EngineResult<String> {
        Ok(format!(
            "Assess the migraine risk for the next few hours from the data below.\n\
Return strict JSON with keys: riskScore (number 0-100), riskLevel (LOW|MODERATE|HIGH|CRITICAL), \
triggers (string[]), reasoning (string), recommendations (string[]).\n\
Be factual and concise.\n\n\
Current metrics: {}\n\
Pre-migraine pattern means: {}\n\
Similarity to past attacks: {}\n\
Current phase: {}",
            serde_json::to_string(snapshot)?,
            serde_json::to_string(&context.pattern_means)?,
            serde_json::to_string(&context.similarity)?,
            serde_json::to_string(&context.phase)?,
        ))
    }
}

#[async_trait]
impl ReasoningClient for LlmReasoningClient {
    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &ReasoningContext,
    ) -> EngineResult<ReasoningOutput> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a migraine risk analyst that outputs strict JSON only."
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(snapshot, context)?,
                },
            ],
            temperature: 0.2,
            max_tokens: 600,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::ReasoningUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(EngineError::ReasoningUnavailable(format!(
                "API error {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| EngineError::MalformedResponse("empty content".to_string()))?;

        parse_reasoning_reply(&content)
    }
}

/// Produces a risk analysis for a snapshot, preferring the reasoning service
/// and falling back to the rule-based score on any failure.
#[derive(Clone)]
pub struct RiskEngine {
    reasoning: Option<Arc<dyn ReasoningClient>>,
    timeout: Duration,
}

impl RiskEngine {
    pub fn new(reasoning: Option<Arc<dyn ReasoningClient>>, timeout: Duration) -> Self {
        Self { reasoning, timeout }
    }

    pub fn has_reasoning(&self) -> bool {
        self.reasoning.is_some()
    }

    pub async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &ReasoningContext,
        now: DateTime<Utc>,
    ) -> RiskAnalysis {
        let Some(client) = &self.reasoning else {
            let mut analysis = fallback_analysis(snapshot, now);
            analysis.fallback_reason = Some("reasoning service not configured".to_string());
            return analysis;
        };

        let outcome = match tokio::time::timeout(self.timeout, client.analyze(snapshot, context)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::ReasoningUnavailable(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(output) => RiskAnalysis {
                risk_score: output.risk_score,
                risk_level: output.risk_level,
                triggers: output.triggers,
                reasoning: output.reasoning,
                recommendations: output.recommendations,
                source: RiskSource::Reasoning,
                fallback_reason: None,
                computed_at: now,
            },
            Err(err) => {
                log::warn!(
                    "[RiskEngine] {}: using rule-based risk: {}",
                    context.owner_id,
                    err
                );
                let mut analysis = fallback_analysis(snapshot, now);
                analysis.fallback_reason = Some(err.to_string());
                analysis
            }
        }
    }
}
