//! OpenAI API client for generated filing narratives.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Error)]
pub enum OpenAiApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,
}

impl OpenAiApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Extract the text content of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Inputs for a Form 6765 Section G Line 49(f) business-component description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line49fContext {
    pub research_activity_name: String,
    pub subcomponent_count: usize,
    pub subcomponent_groups: String,
    pub shrinkback_percent: f64,
    pub guideline_notes: String,
    pub industry: String,
}

/// OpenAI API client
#[derive(Debug, Clone)]
pub struct OpenAiApiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiApiClient {
    // Narrative generation is fallback-backed, so keep the budget tight
    // rather than letting a slow collaborator stall the report.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new client using the OPENAI_API_KEY environment variable
    pub fn from_env() -> Result<Self, OpenAiApiError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| OpenAiApiError::MissingApiKey)?;
        Self::new(api_key, None)
    }

    pub fn new(api_key: String, model: Option<String>) -> Result<Self, OpenAiApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("qre-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OpenAiApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Send a completion request, retrying transient failures
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> Result<ChatResponse, OpenAiApiError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens,
            messages,
        };

        (|| async { self.send_request(&request).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(2)
                    .with_jitter(),
            )
            .when(|e: &OpenAiApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "OpenAI API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<ChatResponse, OpenAiApiError> {
        let res = self
            .http
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<ChatResponse>()
                .await
                .map_err(|e| OpenAiApiError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(OpenAiApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(OpenAiApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(OpenAiApiError::Http { status, body })
            }
        }
    }

    /// Generate a Line 49(f) description for one business component
    pub async fn generate_line49f(&self, ctx: &Line49fContext) -> Result<String, OpenAiApiError> {
        let prompt = line49f_prompt(ctx);
        let messages = vec![
            ChatMessage::system(
                "You are a tax professional drafting Form 6765 Section G business component \
                 descriptions. Professional tone suitable for IRS filing. Output plain text only.",
            ),
            ChatMessage::user(prompt),
        ];

        let response = self.complete(messages, 512).await?;
        let text = response
            .text()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| OpenAiApiError::Serde("No text content in response".to_string()))?;

        if text.is_empty() {
            return Err(OpenAiApiError::Serde("Empty response from OpenAI".to_string()));
        }
        Ok(text)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> OpenAiApiError {
    if e.is_timeout() {
        OpenAiApiError::Timeout
    } else {
        OpenAiApiError::Transport(e.to_string())
    }
}

fn line49f_prompt(ctx: &Line49fContext) -> String {
    format!(
        r#"Generate a professional Line 49(f) description for Form 6765 Section G Business Component Information.

Context:
- Research Activity: {}
- Number of Subcomponents: {}
- Subcomponent Types: {}
- Industry: {}
- Guideline Notes: {}

Requirements:
- Professional tone suitable for IRS filing
- Describe the systematic experimentation and research methodology
- Explain how the research resolves technical uncertainty
- Include specific mention of the subcomponents evaluated
- Keep to 2-3 sentences maximum
- Focus on the research process and technical development

Generate a concise, professional description that demonstrates qualified research activities under IRC Section 41."#,
        ctx.research_activity_name,
        ctx.subcomponent_count,
        ctx.subcomponent_groups,
        ctx.industry,
        ctx.guideline_notes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Line49fContext {
        Line49fContext {
            research_activity_name: "Clinical Protocol Development".to_string(),
            subcomponent_count: 4,
            subcomponent_groups: "procedural subcomponents, diagnostic tools".to_string(),
            shrinkback_percent: 100.0,
            guideline_notes: "Performed under established protocols".to_string(),
            industry: "Healthcare".to_string(),
        }
    }

    #[test]
    fn prompt_carries_all_context_fields() {
        let prompt = line49f_prompt(&context());
        assert!(prompt.contains("Clinical Protocol Development"));
        assert!(prompt.contains("Number of Subcomponents: 4"));
        assert!(prompt.contains("diagnostic tools"));
        assert!(prompt.contains("Healthcare"));
        assert!(prompt.contains("2-3 sentences"));
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(OpenAiApiError::Timeout.should_retry());
        assert!(OpenAiApiError::RateLimited.should_retry());
        assert!(
            OpenAiApiError::Http {
                status: 503,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!OpenAiApiError::InvalidApiKey.should_retry());
        assert!(
            !OpenAiApiError::Http {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
    }
}
