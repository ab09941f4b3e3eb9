//! Azure AI Search backend
//!
//! Talks to `POST {endpoint}/indexes/{index}/docs/search?api-version=…`.
//! - lexical: `search` text only
//! - vector: `vectorQueries` only
//! - hybrid: text + vector query, fused by the service
//! - semantic: hybrid with `queryType=semantic`; the reranker score replaces
//!   the raw score when the service returns one

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{FieldMapping, SearchConfig};
use crate::errors::{RagError, Result};
use crate::providers::SearchBackend;
use crate::types::{Filter, Passage, SourceMeta, Strategy};

const SCORE_FIELD: &str = "@search.score";
const RERANKER_SCORE_FIELD: &str = "@search.rerankerScore";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
    top: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    vector_queries: Vec<VectorQuery<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    semantic_configuration: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct VectorQuery<'a> {
    kind: &'static str,
    vector: &'a [f32],
    k: usize,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

/// Azure AI Search REST client
#[derive(Debug, Clone)]
pub struct AzureSearchBackend {
    client: Client,
    endpoint: String,
    index_name: String,
    api_key: String,
    api_version: String,
    semantic_configuration: String,
    fields: FieldMapping,
}

impl AzureSearchBackend {
    /// Build from validated configuration
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| RagError::Configuration("search endpoint is not set".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| RagError::Configuration("search api key is not set".to_string()))?;

        let client = Client::builder().build()?;

        Ok(Self {
            client,
            endpoint,
            index_name: config.index_name.clone(),
            api_key,
            api_version: config.api_version.clone(),
            semantic_configuration: config.semantic_configuration.clone(),
            fields: config.fields.clone(),
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    fn vector_query<'a>(&'a self, vector: &'a [f32], top_k: usize) -> VectorQuery<'a> {
        VectorQuery {
            kind: "vector",
            vector,
            k: top_k,
            fields: &self.fields.vector,
        }
    }

    async fn execute(
        &self,
        request: &SearchRequest<'_>,
        strategy: Strategy,
    ) -> Result<Vec<Passage>> {
        let response = self
            .client
            .post(self.search_url())
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                RagError::Retrieval(format!("{} search request failed: {}", strategy, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Retrieval(format!(
                "{} search returned HTTP {}: {}",
                strategy, status, error_text
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| {
                RagError::Retrieval(format!("malformed {} search response: {}", strategy, e))
            })?;

        let passages = body
            .value
            .iter()
            .map(|hit| self.parse_hit(hit, strategy))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(%strategy, hits = passages.len(), "search completed");
        Ok(passages)
    }

    /// Map one raw hit onto a passage, falling back to common field names
    fn parse_hit(&self, hit: &Map<String, Value>, strategy: Strategy) -> Result<Passage> {
        let id = field_string(hit, &[&self.fields.id, "id"]).ok_or_else(|| {
            RagError::Retrieval(format!("search hit without '{}' or 'id' field", self.fields.id))
        })?;
        let text =
            field_string(hit, &[&self.fields.content, "content", "text"]).unwrap_or_default();

        let raw_score = hit.get(SCORE_FIELD).and_then(Value::as_f64);
        let reranker_score = hit.get(RERANKER_SCORE_FIELD).and_then(Value::as_f64);
        let score = match strategy {
            Strategy::Semantic => reranker_score.or(raw_score),
            _ => raw_score,
        }
        .ok_or_else(|| RagError::Retrieval(format!("search hit '{}' has no score", id)))?;

        let source = SourceMeta {
            document_id: field_string(hit, &[&self.fields.document_id])
                .unwrap_or_else(|| id.clone()),
            title: field_string(hit, &[&self.fields.title, "title"]),
            offset: None,
        };

        Ok(Passage::new(id, text, score, strategy).with_source(source))
    }
}

/// First present field among `names`, rendered as a string
fn field_string(hit: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match hit.get(*name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search_lexical(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        let request = SearchRequest {
            search: Some(text),
            top: top_k,
            filter: filter.map(Filter::as_str),
            vector_queries: Vec::new(),
            query_type: None,
            semantic_configuration: None,
        };
        self.execute(&request, Strategy::Lexical).await
    }

    async fn search_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        let request = SearchRequest {
            search: None,
            top: top_k,
            filter: filter.map(Filter::as_str),
            vector_queries: vec![self.vector_query(vector, top_k)],
            query_type: None,
            semantic_configuration: None,
        };
        self.execute(&request, Strategy::Vector).await
    }

    async fn search_hybrid(
        &self,
        text: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        let request = SearchRequest {
            search: Some(text),
            top: top_k,
            filter: filter.map(Filter::as_str),
            vector_queries: vec![self.vector_query(vector, top_k)],
            query_type: None,
            semantic_configuration: None,
        };
        self.execute(&request, Strategy::Hybrid).await
    }

    async fn search_semantic(
        &self,
        text: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Passage>> {
        let request = SearchRequest {
            search: Some(text),
            top: top_k,
            filter: filter.map(Filter::as_str),
            vector_queries: vec![self.vector_query(vector, top_k)],
            query_type: Some("semantic"),
            semantic_configuration: Some(&self.semantic_configuration),
        };
        self.execute(&request, Strategy::Semantic).await
    }
}
