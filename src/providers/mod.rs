//! External collaborator contracts
//!
//! The orchestrator only ever sees these traits. Concrete backends:
//! - [`AzureSearchBackend`]: Azure AI Search REST API
//! - [`OpenAiClient`]: Azure OpenAI or OpenAI, for both embeddings and completions

pub mod azure_search;
pub mod openai;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{Filter, Passage};

pub use azure_search::AzureSearchBackend;
pub use openai::OpenAiClient;

/// Executes retrieval queries against an index snapshot.
///
/// Every method returns passages in backend order with raw scores, or
/// `RagError::Retrieval`. A failed call says nothing about partial results.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search_lexical(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>>;

    async fn search_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>>;

    async fn search_hybrid(
        &self,
        text: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>>;

    /// Hybrid search plus backend-side re-ranking
    async fn search_semantic(
        &self,
        text: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>>;
}

/// Turns text into fixed-dimension vectors.
///
/// Identical input must give identical output within one provider version.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(crate::errors::RagError::Embedding(
                "provider returned an unexpected number of vectors".to_string(),
            )),
        }
    }
}

/// Turns a prompt into generated text
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system_prompt: &str, temperature: f64) -> Result<String>;
}
