//! In-process inference: transcribe page images with a VLM and turn the
//! transcriptions into layout records.
//!
//! This is the engine behind the model-data gate. It is only reached when a
//! document arrives without precomputed model data and in-process inference
//! is enabled.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Each attempt is also bounded by
//! `api_timeout_secs` so a hung connection counts as a failed attempt.

use crate::config::PipelineConfig;
use crate::error::{DocParseError, Stage};
use crate::model::{ModelRecord, PageInference};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::{encode, postprocess, render};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::strategy::{InferenceEngine, PdfType};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// VLM-backed [`InferenceEngine`].
#[derive(Clone)]
pub struct VlmInference {
    config: PipelineConfig,
}

impl VlmInference {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl InferenceEngine for VlmInference {
    async fn analyze(
        &self,
        doc: &SourceDocument,
        _pdf_type: PdfType,
    ) -> Result<ModelRecord, DocParseError> {
        let start = Instant::now();
        let provider = resolve_provider(&self.config)?;

        let rendered = render::render_all_pages(
            doc.shared_bytes(),
            self.config.password.clone(),
            self.config.dpi,
            self.config.max_rendered_pixels,
        )
        .await
        .map_err(|detail| DocParseError::stage(Stage::Analyze, detail))?;
        info!("{}: transcribing {} pages", doc.name(), rendered.len());

        let config = &self.config;
        let results: Vec<Result<PageInference, DocParseError>> =
            stream::iter(rendered.into_iter().map(|(idx, img)| {
                let provider = Arc::clone(&provider);
                async move {
                    let (width, height) = (img.width() as f32, img.height() as f32);
                    let data = encode::encode_page(&img).map_err(|e| {
                        DocParseError::stage(
                            Stage::Analyze,
                            format!("page {}: image encoding failed: {e}", idx + 1),
                        )
                    })?;
                    let markdown = transcribe_page(&provider, idx + 1, data, config).await?;
                    Ok(postprocess::markdown_to_dets(idx, width, height, &markdown))
                }
            }))
            .buffer_unordered(config.inference_concurrency.max(1))
            .collect()
            .await;

        let mut model = results.into_iter().collect::<Result<ModelRecord, _>>()?;
        model.sort_by_key(|p| p.page_info.page_no);
        debug!(
            "{}: inference finished in {}ms",
            doc.name(),
            start.elapsed().as_millis()
        );
        Ok(model)
    }
}

/// Transcribe one page image, retrying transient failures.
///
/// The request is a system message (the transcription prompt or the
/// configured override) followed by a user turn carrying only the image.
pub async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image_data: ImageData,
    config: &PipelineConfig,
) -> Result<String, DocParseError> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images("", vec![image_data]),
    ];
    let options = build_options(config);
    let per_call = Duration::from_secs(config.api_timeout_secs);

    let mut last_err = String::from("Unknown error");
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_call, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                last_err = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, last_err);
            }
            Err(_) => {
                last_err = format!("no response within {}s", config.api_timeout_secs);
                warn!("Page {}: attempt {} timed out", page_num, attempt + 1);
            }
        }
    }

    Err(DocParseError::stage(
        Stage::Analyze,
        format!(
            "page {page_num}: VLM call failed after {} retries: {last_err}",
            config.max_retries
        ),
    ))
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocParseError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocParseError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the VLM provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`;
/// 2. `config.provider_name` with `config.model`;
/// 3. the `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` environment pair;
/// 4. OpenAI when `OPENAI_API_KEY` is set, else [`ProviderFactory::from_env`].
///
/// Resolution happens per document, so a batch whose documents all carry
/// model data never needs an API key.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DocParseError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocParseError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass precomputed model data.\n\
                Error: {e}"
            ),
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = PipelineConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_options_follow_config() {
        let config = PipelineConfig::builder()
            .temperature(0.0)
            .max_tokens(512)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(512));
    }
}
