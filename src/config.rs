//! Configuration for analysis runs.
//!
//! Every knob lives in [`AnalysisConfig`], built once at process start via
//! [`AnalysisConfigBuilder`] and handed by reference to
//! [`crate::analyze::Pipeline::new`]. Backend credentials are resolved from
//! the environment at that point and never looked up again per request.

use crate::error::AnalysisError;
use crate::pipeline::llm::AnalysisBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload cap: 200 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Configuration for the analysis pipeline.
///
/// # Example
/// ```rust
/// use medbuddy::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .text_model("gemini-2.0-flash")
///     .api_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.provider_name, "gemini");
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Provider name understood by `edgequake_llm::ProviderFactory`. Default: "gemini".
    pub provider_name: String,

    /// Model used for text-report analyses. Default: "gemini-2.0-flash".
    pub text_model: String,

    /// Model used for scan analyses (prompt + image). Default: "gemini-2.0-flash".
    pub vision_model: String,

    /// Pre-constructed backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn AnalysisBackend>>,

    /// Sampling temperature. `None` keeps the provider default.
    pub temperature: Option<f32>,

    /// Output token cap. `None` keeps the provider default.
    pub max_tokens: Option<usize>,

    /// Bound on the single backend round-trip, in seconds. Default: 120.
    /// `None` waits for as long as the provider client does.
    pub api_timeout_secs: Option<u64>,

    /// Largest accepted upload in bytes. Default: 200 MiB.
    pub max_upload_bytes: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Directory for transient report files. `None` uses the system temp dir.
    pub report_dir: Option<PathBuf>,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider_name: "gemini".to_string(),
            text_model: "gemini-2.0-flash".to_string(),
            vision_model: "gemini-2.0-flash".to_string(),
            backend: None,
            temperature: None,
            max_tokens: None,
            api_timeout_secs: Some(120),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            download_timeout_secs: 120,
            report_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("provider_name", &self.provider_name)
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn AnalysisBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("report_dir", &self.report_dir)
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

    /// Environment variables that may hold the API key for `provider_name`.
    ///
    /// Local providers (ollama, lmstudio) need none.
    pub fn credential_env_vars(&self) -> &'static [&'static str] {
        credential_env_vars(&self.provider_name)
    }

    /// Check that a credential is present for the configured provider.
    ///
    /// Skipped when a pre-built backend is injected.
    pub fn check_credentials(&self) -> Result<(), AnalysisError> {
        if self.backend.is_some() {
            return Ok(());
        }
        let vars = self.credential_env_vars();
        if vars.is_empty() {
            return Ok(());
        }
        let present = vars
            .iter()
            .any(|v| std::env::var(v).map(|s| !s.trim().is_empty()).unwrap_or(false));
        if present {
            Ok(())
        } else {
            Err(AnalysisError::ProviderNotConfigured {
                provider: self.provider_name.clone(),
                hint: format!("Set {} (a .env file is read too).", vars.join(" or ")),
            })
        }
    }
}

fn credential_env_vars(provider: &str) -> &'static [&'static str] {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        _ => &[],
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    /// Wait on the backend without a client-side bound.
    pub fn no_api_timeout(mut self) -> Self {
        self.config.api_timeout_secs = None;
        self
    }

    pub fn max_upload_bytes(mut self, n: u64) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.report_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.provider_name.trim().is_empty() && c.backend.is_none() {
            return Err(AnalysisError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if c.text_model.trim().is_empty() || c.vision_model.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "model names must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(AnalysisError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(AnalysisError::InvalidConfig(
                "upload limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.provider_name, "gemini");
        assert_eq!(c.api_timeout_secs, Some(120));
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(c.temperature.is_none());
        assert!(c.report_dir.is_none());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = AnalysisConfig::builder().api_timeout_secs(0).build();
        assert!(matches!(err, Err(AnalysisError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = AnalysisConfig::builder().vision_model("  ").build();
        assert!(matches!(err, Err(AnalysisError::InvalidConfig(_))));
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = AnalysisConfig::builder().temperature(7.0).build().unwrap();
        assert_eq!(c.temperature, Some(2.0));
    }

    #[test]
    fn gemini_accepts_either_key_name() {
        let c = AnalysisConfig::default();
        assert_eq!(c.credential_env_vars(), &["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
    }

    #[test]
    fn local_providers_need_no_credentials() {
        let c = AnalysisConfig::builder()
            .provider_name("ollama")
            .build()
            .unwrap();
        assert!(c.check_credentials().is_ok());
    }
}
