//! AI enrichment: knowledge cache and orchestrator client.

pub mod cache;
pub mod client;

pub use cache::KnowledgeCache;
pub use client::{AiClientError, AiOutcome, OrchestratorClient};
