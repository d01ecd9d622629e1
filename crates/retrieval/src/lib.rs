//! The Retriever port.
//!
//! Retrieval itself (vector search, metadata lookup, reranking) is an
//! external collaborator; this crate owns only the contract — a query
//! in, ranked passages out — plus the HTTP adapter for the deployed
//! service and a no-op fallback for environments without one.

pub mod http;

pub use http::HttpRetriever;

use serde::{Deserialize, Serialize};

use cf_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One ranked passage returned by the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: String,
    pub title: String,
    pub snippet: String,
    /// Reranker score in `[0, 1]`, descending across a result set.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Jurisdiction tag (e.g. a state or payer scope), when indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

/// A retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The retrieval contract consumed by the rag agent.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked passages for a query, best first. An empty vec is a valid
    /// result (no evidence found).
    async fn search(&self, req: SearchRequest) -> Result<Vec<Passage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// No-op fallback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Used when no retrieval endpoint is configured: every search returns
/// empty evidence and the pipeline degrades to low-confidence answers.
pub struct NoopRetriever;

#[async_trait::async_trait]
impl Retriever for NoopRetriever {
    async fn search(&self, req: SearchRequest) -> Result<Vec<Passage>> {
        tracing::debug!(query = %req.query, "retrieval disabled; returning no passages");
        Ok(Vec::new())
    }
}
