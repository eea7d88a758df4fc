//! LLM interaction: send the extraction prompt and wait, with a deadline.
//!
//! The pipeline talks to the model through the [`ChatProvider`] trait so it
//! can be driven by an in-process fake. The production implementation,
//! [`OpenAiProvider`], speaks the OpenAI-compatible chat-completions
//! protocol directly over `reqwest`: the raw provider JSON is returned for
//! audit, and a non-success status keeps its body verbatim.
//!
//! ## Deadline
//!
//! [`invoke`] races the provider future against a timer. Whichever finishes
//! first wins and the other is dropped; dropping the `reqwest` future
//! aborts the in-flight request. There are no retries: one run makes
//! exactly one provider call.

use crate::config::{AnalysisConfig, TEMPERATURE};
use crate::error::ReportError;
use crate::pipeline::encode::InlinePayload;
use crate::pipeline::prompt::ExtractionPrompt;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: String,
    pub user_text: String,
    pub attachments: Vec<InlinePayload>,
}

impl ChatRequest {
    pub fn from_prompt(prompt: &ExtractionPrompt, config: &AnalysisConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: TEMPERATURE,
            max_tokens: config.max_tokens,
            system: prompt.system.clone(),
            user_text: prompt.user_text(),
            attachments: prompt.attachments().to_vec(),
        }
    }
}

/// What the provider answered.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    /// `choices[0].message.content`, or empty when absent.
    pub assistant_text: String,
    /// The full provider response body.
    pub raw_response: Value,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider name for logs and configuration errors.
    fn name(&self) -> &str;

    /// Send one request. Implementations must not retry.
    async fn complete(&self, request: &ChatRequest) -> Result<ProviderReply, ReportError>;
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.api_base.clone(), config.api_key.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ProviderReply, ReportError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ReportError::provider_not_configured(self.name()))?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| ReportError::ProviderTransport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<body unreadable: {}>", e.without_url()));
            return Err(ReportError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        let raw_response: Value = response
            .json()
            .await
            .map_err(|e| ReportError::ProviderTransport(format!("invalid response body: {e}")))?;

        Ok(ProviderReply {
            assistant_text: assistant_text(&raw_response),
            raw_response,
        })
    }
}

/// Build the chat-completions JSON body.
///
/// ## Message Layout
///
/// 1. **System message**: the JSON-only pin.
/// 2. **User message**: a text part with the instruction (and, in
///    text-mode, the report), followed by one part per attachment. Images
///    become `image_url` parts; PDFs become `file` parts.
pub fn request_body(request: &ChatRequest) -> Value {
    let mut content = vec![json!({ "type": "text", "text": request.user_text })];
    content.extend(request.attachments.iter().map(|p| match p {
        InlinePayload::Image { .. } => json!({
            "type": "image_url",
            "image_url": { "url": p.data_url() }
        }),
        InlinePayload::File { filename, .. } => json!({
            "type": "file",
            "file": { "filename": filename, "file_data": p.data_url() }
        }),
    }));

    json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": content }
        ]
    })
}

fn assistant_text(raw: &Value) -> String {
    raw["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Send `prompt` through `provider`, bounded by `config.timeout`.
pub async fn invoke(
    provider: &dyn ChatProvider,
    prompt: &ExtractionPrompt,
    config: &AnalysisConfig,
) -> Result<ProviderReply, ReportError> {
    let request = ChatRequest::from_prompt(prompt, config);
    let start = Instant::now();
    debug!(
        "Calling {} model={} mode={:?} attachments={}",
        provider.name(),
        request.model,
        prompt.mode(),
        request.attachments.len()
    );

    tokio::select! {
        result = provider.complete(&request) => {
            match &result {
                Ok(reply) => info!(
                    "{} answered in {}ms ({} characters)",
                    provider.name(),
                    start.elapsed().as_millis(),
                    reply.assistant_text.chars().count()
                ),
                Err(e) => warn!("{} call failed: {}", provider.name(), e),
            }
            result
        }
        _ = tokio::time::sleep(config.timeout) => {
            warn!(
                "{} did not answer within {:?}, abandoning the call",
                provider.name(),
                config.timeout
            );
            Err(ReportError::ProviderTimeout {
                timeout_ms: config.timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Language;
    use crate::output::{ExtractedText, ExtractionStatus};
    use crate::pipeline::prompt::PromptBuilder;
    use axum::{http::StatusCode, routing::post, Router};
    use std::time::Duration;

    struct SlowProvider(Duration);

    #[async_trait]
    impl ChatProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ProviderReply, ReportError> {
            tokio::time::sleep(self.0).await;
            Ok(ProviderReply {
                assistant_text: "{}".into(),
                raw_response: json!({}),
            })
        }
    }

    fn text_prompt() -> ExtractionPrompt {
        PromptBuilder::new(24_000)
            .build(
                &ExtractedText::usable("HbA1c 8.2%".into(), ExtractionStatus::Complete),
                Language::English,
            )
            .unwrap()
    }

    fn config_with_timeout(ms: u64) -> AnalysisConfig {
        AnalysisConfig::builder()
            .timeout(Duration::from_millis(ms))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn invoke_times_out() {
        let start = Instant::now();
        let err = invoke(
            &SlowProvider(Duration::from_secs(10)),
            &text_prompt(),
            &config_with_timeout(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReportError::ProviderTimeout { timeout_ms: 50 }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn invoke_returns_fast_reply() {
        let reply = invoke(
            &SlowProvider(Duration::from_millis(1)),
            &text_prompt(),
            &config_with_timeout(5_000),
        )
        .await
        .unwrap();
        assert_eq!(reply.assistant_text, "{}");
    }

    #[test]
    fn request_body_pins_temperature_and_tokens() {
        let req = ChatRequest::from_prompt(&text_prompt(), &AnalysisConfig::default());
        let body = request_body(&req);
        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["max_tokens"], json!(1000));
        assert_eq!(body["messages"][0]["role"], json!("system"));
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0]["text"].as_str().unwrap().contains("HbA1c 8.2%"));
    }

    #[test]
    fn request_body_attaches_images_and_files() {
        let req = ChatRequest {
            model: "m".into(),
            temperature: 0.0,
            max_tokens: 10,
            system: "s".into(),
            user_text: "u".into(),
            attachments: vec![
                InlinePayload::image_from_bytes(&[1, 2], "image/png"),
                InlinePayload::file_from_bytes(b"%PDF", "r.pdf", "application/pdf"),
            ],
        };
        let body = request_body(&req);
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[1]["type"], json!("image_url"));
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(parts[2]["type"], json!("file"));
        assert_eq!(parts[2]["file"]["filename"], json!("r.pdf"));
        assert!(parts[2]["file"]["file_data"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
    }

    #[test]
    fn assistant_text_defaults_to_empty() {
        assert_eq!(assistant_text(&json!({"choices": []})), "");
        assert_eq!(
            assistant_text(&json!({"choices": [{"message": {"content": "hi"}}]})),
            "hi"
        );
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let provider = OpenAiProvider::new("http://127.0.0.1:9", None);
        let req = ChatRequest::from_prompt(&text_prompt(), &AnalysisConfig::default());
        let err = provider.complete(&req).await.unwrap_err();
        assert!(matches!(err, ReportError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn debug_redacts_key() {
        let provider = OpenAiProvider::new("http://x", Some("sk-live-123".into()));
        assert!(!format!("{provider:?}").contains("sk-live-123"));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn non_success_status_keeps_body_verbatim() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    r#"{"error":{"message":"Rate limit reached"}}"#,
                )
            }),
        );
        let base = serve(app).await;
        let provider = OpenAiProvider::new(base, Some("sk-test".into()));
        let req = ChatRequest::from_prompt(&text_prompt(), &AnalysisConfig::default());
        match provider.complete(&req).await.unwrap_err() {
            ReportError::ProviderStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, r#"{"error":{"message":"Rate limit reached"}}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_error_body_is_reported() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let chunks: Vec<Result<axum::body::Bytes, std::io::Error>> = vec![
                    Ok(axum::body::Bytes::from_static(b"{\"error\":")),
                    Err(std::io::Error::other("upstream reset")),
                ];
                (
                    StatusCode::BAD_GATEWAY,
                    axum::body::Body::from_stream(futures::stream::iter(chunks)),
                )
            }),
        );
        let base = serve(app).await;
        let provider = OpenAiProvider::new(base, Some("sk-test".into()));
        let req = ChatRequest::from_prompt(&text_prompt(), &AnalysisConfig::default());
        match provider.complete(&req).await.unwrap_err() {
            ReportError::ProviderStatus { status, body } => {
                assert_eq!(status, 502);
                assert!(body.starts_with("<body unreadable:"), "got: {body}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_returns_full_response() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                axum::Json(json!({
                    "id": "chatcmpl-1",
                    "choices": [{"message": {"role": "assistant", "content": "{\"study\":\"CBC\"}"}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5}
                }))
            }),
        );
        let base = serve(app).await;
        let provider = OpenAiProvider::new(base, Some("sk-test".into()));
        let req = ChatRequest::from_prompt(&text_prompt(), &AnalysisConfig::default());
        let reply = provider.complete(&req).await.unwrap();
        assert_eq!(reply.assistant_text, r#"{"study":"CBC"}"#);
        assert_eq!(reply.raw_response["id"], json!("chatcmpl-1"));
    }
}
