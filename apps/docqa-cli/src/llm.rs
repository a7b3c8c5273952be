//! Generator and rerank-scorer wiring for the CLI.
//!
//! An Ollama endpoint is used when `llm.base_url` is configured;
//! otherwise a deterministic offline responder keeps the whole pipeline
//! runnable without any model server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use docqa_core::config::Config;
use docqa_core::traits::{Generator, RerankScorer};
use docqa_core::types::GenerationOutput;

const DEFAULT_MODEL: &str = "llama3.2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> anyhow::Result<GenerationOutput> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("llm request failed")?
            .error_for_status()
            .context("llm returned error status")?;

        let payload: Value = response.json().await.context("decode llm response")?;
        let text = payload
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut out = GenerationOutput::new(text);
        out.meta.insert("provider".to_string(), "ollama".to_string());
        out.meta.insert("model".to_string(), self.model.clone());
        Ok(out)
    }
}

/// Deterministic responder used when no model endpoint is configured.
/// Echoes the last prompt line so answers stay traceable in tests.
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        _max_tokens: usize,
    ) -> anyhow::Result<GenerationOutput> {
        let summary = prompt
            .trim()
            .lines()
            .last()
            .unwrap_or("No prompt provided");
        let mut out = GenerationOutput::new(format!(
            "[offline-llm] Answer based on provided context: {summary}"
        ));
        out.meta
            .insert("provider".to_string(), "local-fallback".to_string());
        out.meta
            .insert("temperature".to_string(), temperature.to_string());
        Ok(out)
    }
}

/// Word-overlap rerank scorer. Stands in for a cross-encoder when no
/// scoring service is deployed.
pub struct LexicalScorer;

#[async_trait]
impl RerankScorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical-overlap"
    }

    async fn score_batch(&self, query: &str, docs: &[String]) -> anyhow::Result<Vec<f32>> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let scores = docs
            .iter()
            .map(|doc| {
                let lower = doc.to_lowercase();
                let hits = query_words.iter().filter(|w| lower.contains(*w)).count();
                if query_words.is_empty() {
                    0.0
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let ratio = hits as f32 / query_words.len() as f32;
                    ratio
                }
            })
            .collect();
        Ok(scores)
    }
}

/// Pick the generator from config: Ollama when `llm.base_url` is set,
/// offline fallback otherwise.
pub fn generator_from_config(config: &Config) -> anyhow::Result<Arc<dyn Generator>> {
    match config.get::<String>("llm.base_url") {
        Ok(base_url) => {
            let model = config.get_or("llm.model", DEFAULT_MODEL.to_string());
            info!(base_url = %base_url, model = %model, "using ollama generator");
            Ok(Arc::new(OllamaGenerator::new(base_url, model)?))
        }
        Err(_) => {
            info!("no llm endpoint configured, using offline generator");
            Ok(Arc::new(OfflineGenerator))
        }
    }
}
