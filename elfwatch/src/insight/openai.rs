// elfwatch/src/insight/openai.rs
//
// OpenAI-compatible chat-completions provider.
//
//   POST {api_base}/chat/completions
//   Authorization: Bearer $OPENAI_API_KEY
//
// Each call is one request bounded by the configured timeout (reqwest's own
// timeout plus an outer tokio guard). The reply's message content is parsed
// for a JSON object; anything else is a MalformedReply.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{parse_opinion, parse_prediction, InsightError, InsightProvider};
use crate::config::{api_key_from_env, InsightSettings, API_KEY_ENV};
use crate::records::{BehaviorPrediction, InsightOpinion, RiskMetrics};

const ANALYST_ROLE: &str =
    "You are a North Pole security analyst specializing in elf behavior analysis.";
const PREDICTOR_ROLE: &str =
    "You are a predictive behavior analyst for North Pole Security.";

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role:    &'static str,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self { Self { role: "system", content: content.to_string() } }
    fn user(content: String) -> Self { Self { role: "user", content } }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model:       &'a str,
    messages:    Vec<ChatMessage>,
    temperature: f32,
    max_tokens:  u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage:   Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens:     u32,
    completion_tokens: u32,
}

pub struct OpenAiInsight {
    client:   Client,
    api_key:  String,
    settings: InsightSettings,
}

impl OpenAiInsight {
    pub fn new(api_key: impl Into<String>, settings: InsightSettings) -> Result<Self, InsightError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, api_key: api_key.into(), settings })
    }

    /// Build from OPENAI_API_KEY. Absence is an error only here.
    pub fn from_env(settings: InsightSettings) -> Result<Self, InsightError> {
        let key = api_key_from_env().ok_or(InsightError::MissingApiKey(API_KEY_ENV))?;
        Self::new(key, settings)
    }

    pub fn model(&self) -> &str { &self.settings.model }
    pub fn timeout(&self) -> Duration { self.settings.timeout }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, InsightError> {
        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, self.send(messages)).await {
            Ok(result) => result,
            Err(_) => Err(InsightError::Timeout(timeout)),
        }
    }

    async fn send(&self, messages: Vec<ChatMessage>) -> Result<String, InsightError> {
        let url = format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'));
        let request = ChatRequest {
            model:       &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens:  self.settings.max_tokens,
        };

        debug!("POST {} model={}", url, self.settings.model);
        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Status { status: status.as_u16(), body });
        }

        let data: ChatResponse = response.json().await.map_err(|e| self.classify(e))?;
        if let Some(usage) = &data.usage {
            debug!("Token usage - prompt: {}, completion: {}", usage.prompt_tokens, usage.completion_tokens);
        }

        data.choices.into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InsightError::MalformedReply("reply has no message content".into()))
    }

    fn classify(&self, e: reqwest::Error) -> InsightError {
        if e.is_timeout() { InsightError::Timeout(self.settings.timeout) } else { InsightError::Network(e) }
    }
}

fn communications_prompt(messages: &[String]) -> String {
    format!(
        "Analyze these elf workshop communications for suspicious activity.\n\
         Consider signs of sabotage, conspiracy, or deviation from normal workshop operations.\n\
         Communications to analyze:\n{}\n\n\
         Provide a JSON-structured analysis with these fields:\n\
         - risk_level (0-10)\n\
         - suspicious_patterns (list)\n\
         - recommended_actions (list)\n\
         - psychological_assessment (brief)",
        messages.join("\n")
    )
}

fn prediction_prompt(metrics: &RiskMetrics, recent: &[String]) -> String {
    format!(
        "Based on this elf's historical behavior and recent communications,\n\
         predict potential future actions and risk of sabotage.\n\n\
         Historical Context:\n\
         Tasks Completed: {}\n\
         Attendance Rate: {}\n\
         Recent Communications: {:?}\n\n\
         Provide predictions for:\n\
         1. Likely next actions\n\
         2. Risk of sabotage in next 24 hours\n\
         3. Recommended preventive measures\n\n\
         Format as JSON with these fields:\n\
         - predicted_actions (list)\n\
         - sabotage_risk_24h (0-10)\n\
         - preventive_measures (list)",
        metrics.tasks_completed, metrics.attendance_rate, recent
    )
}

#[async_trait]
impl InsightProvider for OpenAiInsight {
    fn name(&self) -> &str { "openai" }

    async fn analyze_communications(
        &self,
        messages: &[String],
        subject:  &str,
    ) -> Result<InsightOpinion, InsightError> {
        let reply = self.chat(vec![
            ChatMessage::system(ANALYST_ROLE),
            ChatMessage::user(communications_prompt(messages)),
        ]).await?;
        let opinion = parse_opinion(&reply)?;
        info!("Insight for {}: risk_level={:.1} patterns={}", subject, opinion.risk_level, opinion.suspicious_patterns.len());
        Ok(opinion)
    }

    async fn predict_behavior(
        &self,
        subject: &str,
        metrics: &RiskMetrics,
        recent:  &[String],
    ) -> Result<BehaviorPrediction, InsightError> {
        let reply = self.chat(vec![
            ChatMessage::system(PREDICTOR_ROLE),
            ChatMessage::user(prediction_prompt(metrics, recent)),
        ]).await?;
        let prediction = parse_prediction(&reply)?;
        info!("Prediction for {}: sabotage_risk_24h={:.1}", subject, prediction.sabotage_risk_24h);
        Ok(prediction)
    }

    async fn probe(&self) -> Result<String, InsightError> {
        self.chat(vec![ChatMessage::user("Say 'The elves are working!'".to_string())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP stub: answers the first request with `status` + `body`
    /// after `delay`, and hands back the raw request text.
    async fn stub(status: u16, body: String, delay: Duration) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16384];
            let mut seen = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 { break; }
                seen.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&seen).to_string();
                if let Some(idx) = text.find("\r\n\r\n") {
                    let len = text.lines()
                        .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                        .unwrap_or(0);
                    if seen.len() >= idx + 4 + len { break; }
                }
            }
            tokio::time::sleep(delay).await;
            let resp = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status, body.len(), body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            String::from_utf8_lossy(&seen).to_string()
        });
        (base, handle)
    }

    fn settings(base: &str, timeout: Duration) -> InsightSettings {
        InsightSettings {
            enabled:  true,
            api_base: base.to_string(),
            timeout,
            ..Default::default()
        }
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        }).to_string()
    }

    #[tokio::test]
    async fn analyze_parses_opinion_and_sends_prompt() {
        let content = "```json\n{\"risk_level\": 9, \"suspicious_patterns\": [\"plotting\"], \"recommended_actions\": []}\n```";
        let (base, handle) = stub(200, completion(content), Duration::ZERO).await;
        let client = OpenAiInsight::new("sk-test", settings(&base, Duration::from_secs(5))).unwrap();

        let msgs = vec!["meet at the sleigh at midnight".to_string()];
        let o = client.analyze_communications(&msgs, "Jingle").await.unwrap();
        assert_eq!(o.risk_level, 9.0);
        assert_eq!(o.suspicious_patterns, vec!["plotting".to_string()]);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("meet at the sleigh at midnight"));
        assert!(request.contains("gpt-3.5-turbo"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let (base, _h) = stub(429, r#"{"error":"rate limited"}"#.to_string(), Duration::ZERO).await;
        let client = OpenAiInsight::new("sk-test", settings(&base, Duration::from_secs(5))).unwrap();
        match client.analyze_communications(&[], "Jingle").await {
            Err(InsightError::Status { status, .. }) => assert_eq!(status, 429),
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let (base, _h) = stub(200, completion("{}"), Duration::from_secs(5)).await;
        let client = OpenAiInsight::new("sk-test", settings(&base, Duration::from_millis(200))).unwrap();
        assert!(matches!(client.probe().await, Err(InsightError::Timeout(_))));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_network_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let base = format!("http://127.0.0.1:{}", port);
        let client = OpenAiInsight::new("sk-test", settings(&base, Duration::from_secs(2))).unwrap();
        assert!(matches!(
            client.analyze_communications(&[], "Jingle").await,
            Err(InsightError::Network(_)) | Err(InsightError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn prediction_round_trip() {
        let content = r#"{"predicted_actions": ["steal ribbon"], "sabotage_risk_24h": 4, "preventive_measures": ["lock cabinet"]}"#;
        let (base, _h) = stub(200, completion(content), Duration::ZERO).await;
        let client = OpenAiInsight::new("sk-test", settings(&base, Duration::from_secs(5))).unwrap();
        let metrics = RiskMetrics { tasks_completed: 7.0, attendance_rate: 8.0, ..Default::default() };
        let p = client.predict_behavior("Jingle", &metrics, &["hello".to_string()]).await.unwrap();
        assert_eq!(p.sabotage_risk_24h, 4.0);
        assert_eq!(p.preventive_measures, vec!["lock cabinet".to_string()]);
    }
}
