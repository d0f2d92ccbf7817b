//! Type definitions for the Gemini-style generative-content API.
//!
//! Request types are what clients send to the proxy; response types are what
//! the proxy sends back after translating the backend's answer. Only plain
//! text parts are modeled.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what the client sends TO the proxy)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn. Inbound turns carry no role; the translator folds
/// them all into a single user message.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestContent {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: Option<u64>,
    #[serde(rename = "stopSequences")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(rename = "responseMimeType")]
    pub response_mime_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types (what the proxy sends BACK to the client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(rename = "modelVersion")]
    pub model_version: String,
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: UsageMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub index: u64,
    pub content: Content,
    #[serde(rename = "finishReason", skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    pub prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount")]
    pub candidates_token_count: u64,
    #[serde(rename = "totalTokenCount")]
    pub total_token_count: u64,
}

/// One streamed response object, written as a single JSON line per source
/// chunk. `usage_metadata` is relayed verbatim from the chunk (an empty
/// object when the chunk carries none), unlike the non-streaming path which
/// remaps the counter names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamedGenerationResponse {
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: serde_json::Value,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}
