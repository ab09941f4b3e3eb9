//! Azure OpenAI / OpenAI client for embeddings and chat completions

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::errors::{RagError, Result};
use crate::providers::{CompletionProvider, EmbeddingProvider};

/// Which API flavour the client talks to
#[derive(Debug, Clone, PartialEq)]
enum ApiTarget {
    Azure {
        endpoint: String,
        api_key: String,
        chat_deployment: String,
        embedding_deployment: String,
        api_version: String,
    },
    OpenAi {
        base_url: String,
        api_key: String,
        model: String,
        embedding_model: String,
    },
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for both embeddings and completions.
///
/// Azure OpenAI wins when endpoint, key and deployment are all configured.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    target: ApiTarget,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let target = match (
            &config.azure_endpoint,
            &config.azure_api_key,
            &config.azure_deployment,
        ) {
            (Some(endpoint), Some(api_key), Some(deployment)) => ApiTarget::Azure {
                endpoint: endpoint.clone(),
                api_key: api_key.clone(),
                chat_deployment: deployment.clone(),
                embedding_deployment: config.azure_embedding_deployment.clone(),
                api_version: config.api_version.clone(),
            },
            _ => {
                let api_key = config.openai_api_key.clone().ok_or_else(|| {
                    RagError::Configuration(
                        "Either AZURE_OPENAI_* credentials or OPENAI_API_KEY must be provided"
                            .to_string(),
                    )
                })?;
                ApiTarget::OpenAi {
                    base_url: config.openai_base_url.trim_end_matches('/').to_string(),
                    api_key,
                    model: config.openai_model.clone(),
                    embedding_model: config.openai_embedding_model.clone(),
                }
            }
        };

        Ok(Self {
            client: Client::builder().build()?,
            target,
            max_tokens: config.max_tokens,
        })
    }

    /// `true` when talking to Azure OpenAI
    pub fn is_azure(&self) -> bool {
        matches!(self.target, ApiTarget::Azure { .. })
    }

    fn chat_url(&self) -> String {
        match &self.target {
            ApiTarget::Azure {
                endpoint,
                chat_deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, chat_deployment, api_version
            ),
            ApiTarget::OpenAi { base_url, .. } => format!("{}/chat/completions", base_url),
        }
    }

    fn embeddings_url(&self) -> String {
        match &self.target {
            ApiTarget::Azure {
                endpoint,
                embedding_deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                endpoint, embedding_deployment, api_version
            ),
            ApiTarget::OpenAi { base_url, .. } => format!("{}/embeddings", base_url),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.target {
            ApiTarget::Azure { api_key, .. } => request.header("api-key", api_key),
            ApiTarget::OpenAi { api_key, .. } => request.bearer_auth(api_key),
        }
    }

    fn chat_body(&self, prompt: &str, system_prompt: &str, temperature: f64) -> Value {
        let mut body = json!({
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });
        if let ApiTarget::OpenAi { model, .. } = &self.target {
            body["model"] = json!(model);
        }
        body
    }

    fn embeddings_body(&self, texts: &[&str]) -> Value {
        let mut body = json!({ "input": texts });
        if let ApiTarget::OpenAi { embedding_model, .. } = &self.target {
            body["model"] = json!(embedding_model);
        }
        body
    }

    /// POST a JSON body and return the parsed response, mapping every failure via `fail`
    async fn post_json(
        &self,
        url: String,
        body: &Value,
        fail: fn(String) -> RagError,
    ) -> Result<Value> {
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(fail(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| fail(format!("malformed response: {}", e)))
    }
}

/// Pull `choices[0].message.content` out of a chat completion response
fn extract_completion(response: &Value) -> Result<String> {
    if let Some(usage) = response.get("usage") {
        tracing::debug!(
            prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens = usage["completion_tokens"].as_u64().unwrap_or(0),
            "completion usage"
        );
    }

    response["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(|content| content.trim().to_string())
        .ok_or_else(|| RagError::Generation("response has no message content".to_string()))
}

/// Vectors in input order; the API may return them out of order
fn extract_embeddings(response: Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse = serde_json::from_value(response)
        .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;

    if parsed.data.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} vectors, got {}",
            expected,
            parsed.data.len()
        )));
    }

    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = self.embeddings_body(texts);
        let response = self
            .post_json(self.embeddings_url(), &body, RagError::Embedding)
            .await?;
        extract_embeddings(response, texts.len())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f64,
    ) -> Result<String> {
        let body = self.chat_body(prompt, system_prompt, temperature);
        let response = self
            .post_json(self.chat_url(), &body, RagError::Generation)
            .await?;
        extract_completion(&response)
    }
}
