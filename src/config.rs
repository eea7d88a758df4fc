//! Configuration types for medical-report analysis.
//!
//! Every pipeline knob lives in [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`] or read from the process environment with
//! [`AnalysisConfig::from_env`]. The config is immutable once built and is
//! shared by all concurrent requests.

use crate::error::ReportError;
use crate::pipeline::llm::ChatProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default chat model. Vision-capable, cheap, good at strict JSON.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Sampling temperature for every extraction call.
///
/// Not configurable: the same report must produce the same fields.
pub const TEMPERATURE: f32 = 0.0;

/// Configuration for a medical-report analysis.
///
/// # Example
/// ```rust
/// use medreport::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("gpt-4o-mini")
///     .timeout_secs(120)
///     .text_budget_chars(16_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.text_budget_chars, 16_000);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Chat model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Base URL of the OpenAI-compatible API. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Bearer credential. `None` means the provider is not configured and
    /// every run ends in `Failure(configuration)`.
    pub api_key: Option<String>,

    /// Pre-constructed provider. Takes precedence over `api_key`/`api_base`.
    pub provider: Option<Arc<dyn ChatProvider>>,

    /// Maximum tokens the model may generate. Default: 1000.
    ///
    /// Nine short fields fit comfortably; a larger ceiling only invites the
    /// model to ramble past the JSON object.
    pub max_tokens: u32,

    /// Hard upper bound on the provider call. Default: 300 s.
    pub timeout: Duration,

    /// Character budget for text embedded in the prompt. Default: 24 000.
    ///
    /// Longer extractions keep their first `text_budget_chars` characters.
    pub text_budget_chars: usize,

    /// Minimum trimmed character count for extracted text to be usable.
    /// Default: 50. Below it the document goes to vision-mode.
    pub min_usable_chars: usize,

    /// Maximum PDF pages rasterised for vision-mode. Default: 4.
    pub max_vision_pages: usize,

    /// Longest edge of a rasterised page in pixels. Default: 1600.
    pub max_rendered_pixels: u32,

    /// Maximum accepted upload size in bytes. Default: 80 MiB.
    pub max_upload_bytes: usize,

    /// Path to libpdfium (file or directory). `None` binds the system library.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            provider: None,
            max_tokens: 1000,
            timeout: Duration::from_secs(300),
            text_budget_chars: 24_000,
            min_usable_chars: 50,
            max_vision_pages: 4,
            max_rendered_pixels: 1600,
            max_upload_bytes: 80 * 1024 * 1024,
            pdfium_library: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("text_budget_chars", &self.text_budget_chars)
            .field("min_usable_chars", &self.min_usable_chars)
            .field("max_vision_pages", &self.max_vision_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `OPENAI_API_KEY` | `api_key` |
    /// | `MEDREPORT_MODEL` | `model` |
    /// | `MEDREPORT_API_BASE` | `api_base` |
    /// | `MEDREPORT_TIMEOUT_SECS` | `timeout` |
    /// | `MEDREPORT_MAX_TOKENS` | `max_tokens` |
    /// | `MEDREPORT_TEXT_BUDGET` | `text_budget_chars` |
    /// | `MEDREPORT_MIN_TEXT_CHARS` | `min_usable_chars` |
    /// | `PDFIUM_LIB_PATH` | `pdfium_library` |
    ///
    /// A missing `OPENAI_API_KEY` is not an error here: the server still
    /// starts and reports `configuration error` per request.
    pub fn from_env() -> Result<Self, ReportError> {
        let mut b = Self::builder();

        if let Some(key) = env_non_empty("OPENAI_API_KEY") {
            b = b.api_key(key);
        }
        if let Some(model) = env_non_empty("MEDREPORT_MODEL") {
            b = b.model(model);
        }
        if let Some(base) = env_non_empty("MEDREPORT_API_BASE") {
            b = b.api_base(base);
        }
        if let Some(secs) = env_parse::<u64>("MEDREPORT_TIMEOUT_SECS")? {
            b = b.timeout_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("MEDREPORT_MAX_TOKENS")? {
            b = b.max_tokens(n);
        }
        if let Some(n) = env_parse::<usize>("MEDREPORT_TEXT_BUDGET")? {
            b = b.text_budget_chars(n);
        }
        if let Some(n) = env_parse::<usize>("MEDREPORT_MIN_TEXT_CHARS")? {
            b = b.min_usable_chars(n);
        }
        if let Some(path) = env_non_empty("PDFIUM_LIB_PATH") {
            b = b.pdfium_library(path);
        }

        b.build()
    }

    /// Whether a credential or a pre-built provider is present.
    pub fn has_credentials(&self) -> bool {
        self.provider.is_some() || self.api_key.is_some()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ReportError> {
    match env_non_empty(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ReportError::InvalidConfig(format!("{name} must be a number, got '{raw}'"))
        }),
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    pub fn text_budget_chars(mut self, n: usize) -> Self {
        self.config.text_budget_chars = n;
        self
    }

    pub fn min_usable_chars(mut self, n: usize) -> Self {
        self.config.min_usable_chars = n;
        self
    }

    pub fn max_vision_pages(mut self, n: usize) -> Self {
        self.config.max_vision_pages = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ReportError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ReportError::InvalidConfig("model must not be empty".into()));
        }
        if c.timeout.is_zero() {
            return Err(ReportError::InvalidConfig("timeout must be > 0".into()));
        }
        if c.max_tokens == 0 {
            return Err(ReportError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.text_budget_chars == 0 {
            return Err(ReportError::InvalidConfig(
                "text budget must be ≥ 1 character".into(),
            ));
        }
        if c.max_vision_pages == 0 {
            return Err(ReportError::InvalidConfig(
                "max_vision_pages must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
