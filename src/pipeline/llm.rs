//! Analysis client: send a prompt (and scan) to the backend, get text back.
//!
//! The client is a thin boundary adapter. It holds the backend and a timeout
//! and nothing else; every call is one round-trip with no caching, no
//! streaming and no retry. Prompt wording lives in [`crate::prompts`].
//!
//! The backend itself sits behind [`AnalysisBackend`], which exposes the two
//! operations the pipeline needs. [`LlmBackend`] implements it on top of
//! `edgequake_llm` providers; tests and embedders can plug in their own.

use super::encode::encode_scan;
use super::extract::{DecodedImage, NormalizedContent};
use super::postprocess::tidy_analysis;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, BackendError};
use crate::output::AnalysisResult;
use crate::prompts::Prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The generative-AI service boundary.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Text-completion call used for report analyses.
    async fn generate_from_text(&self, prompt: &str) -> Result<String, BackendError>;

    /// Multimodal call used for scan analyses: prompt and image together.
    async fn generate_from_text_and_image(
        &self,
        prompt: &str,
        image: &DecodedImage,
    ) -> Result<String, BackendError>;
}

/// [`AnalysisBackend`] over two `edgequake_llm` providers: one configured
/// for text completion, one for vision.
pub struct LlmBackend {
    text: Arc<dyn LLMProvider>,
    vision: Arc<dyn LLMProvider>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl LlmBackend {
    pub fn new(text: Arc<dyn LLMProvider>, vision: Arc<dyn LLMProvider>) -> Self {
        Self {
            text,
            vision,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Create both providers through `ProviderFactory`, which reads the API
    /// key from the environment.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        config.check_credentials()?;

        let text = create_provider(&config.provider_name, &config.text_model)?;
        let vision = if config.vision_model == config.text_model {
            Arc::clone(&text)
        } else {
            create_provider(&config.provider_name, &config.vision_model)?
        };
        info!(
            "Backend ready: provider={}, text={}, vision={}",
            config.provider_name, config.text_model, config.vision_model
        );

        Ok(Self {
            text,
            vision,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }

    async fn chat(
        provider: &Arc<dyn LLMProvider>,
        messages: Vec<ChatMessage>,
        options: &CompletionOptions,
    ) -> Result<String, BackendError> {
        let response = provider
            .chat(&messages, Some(options))
            .await
            .map_err(backend_error)?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[async_trait]
impl AnalysisBackend for LlmBackend {
    async fn generate_from_text(&self, prompt: &str) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::user(prompt)];
        Self::chat(&self.text, messages, &self.options()).await
    }

    async fn generate_from_text_and_image(
        &self,
        prompt: &str,
        image: &DecodedImage,
    ) -> Result<String, BackendError> {
        let image_data = encode_scan(image)?;
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image_data])];
        Self::chat(&self.vision, messages, &self.options()).await
    }
}

/// Provider-side timeouts keep their meaning; everything else is an API error.
fn backend_error(e: LlmError) -> BackendError {
    match e {
        LlmError::Timeout => {
            warn!("Provider timed out");
            BackendError::Timeout { secs: None }
        }
        other => BackendError::Api {
            message: other.to_string(),
        },
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnalysisError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnalysisError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Sends one prompt per run and turns the reply into an [`AnalysisResult`].
#[derive(Clone)]
pub struct AnalysisClient {
    backend: Arc<dyn AnalysisBackend>,
    timeout_secs: Option<u64>,
}

impl AnalysisClient {
    pub fn new(backend: Arc<dyn AnalysisBackend>, timeout_secs: Option<u64>) -> Self {
        Self {
            backend,
            timeout_secs,
        }
    }

    /// Use `config.backend` when injected, otherwise build an [`LlmBackend`].
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let backend: Arc<dyn AnalysisBackend> = match config.backend {
            Some(ref backend) => Arc::clone(backend),
            None => Arc::new(LlmBackend::from_config(config)?),
        };
        Ok(Self::new(backend, config.api_timeout_secs))
    }

    /// Run the single backend round-trip for `content`.
    ///
    /// Text goes to the text-completion configuration, scans to the
    /// multimodal one. Fails on backend error, on timeout, and when the
    /// reply is blank after tidy-up.
    pub async fn analyze(
        &self,
        prompt: &Prompt,
        content: &NormalizedContent,
    ) -> Result<AnalysisResult, BackendError> {
        let start = Instant::now();
        let call = async {
            match content {
                NormalizedContent::PlainText(_) => {
                    self.backend.generate_from_text(prompt.as_str()).await
                }
                NormalizedContent::DecodedImage(image) => {
                    self.backend
                        .generate_from_text_and_image(prompt.as_str(), image)
                        .await
                }
            }
        };

        let raw = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                Ok(reply) => reply,
                Err(_) => {
                    warn!("Backend call exceeded {}s", secs);
                    Err(BackendError::Timeout { secs: Some(secs) })
                }
            },
            None => call.await,
        }?;

        let text = tidy_analysis(&raw);
        if text.is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        debug!(
            "Backend replied with {} chars in {:?}",
            text.len(),
            start.elapsed()
        );
        Ok(AnalysisResult::new(text, content.report_kind()))
    }
}
