//! Translate Gemini-style generation requests into backend chat-completion
//! requests.
//!
//! Only the two generation actions are translated; any other action's body is
//! returned untouched, since those requests are not relayed to the backend in
//! translated form. All part texts across all contents collapse into a single
//! user message — multi-turn role structure is not preserved.

use super::gemini_types::GenerationRequest;
use super::openai_types::{ChatMessage, ChatRequest, ResponseFormat, StreamOptions};
use super::{is_generation_action, STREAM_GENERATE_CONTENT};
use crate::error::{ProxyError, Result};
use crate::models::ModelMap;

/// Translate a Gemini-style request body for `action` into the backend's
/// request format. Pure function: same input always yields the same bytes.
///
/// # Errors
/// `MalformedInput` if the body is not a valid `GenerationRequest`;
/// `UnknownModel` if `model` has no backend mapping.
pub fn translate_request(
    body: &[u8],
    action: &str,
    model: &str,
    models: &ModelMap,
) -> Result<Vec<u8>> {
    if !is_generation_action(action) {
        return Ok(body.to_vec());
    }

    let req: GenerationRequest = serde_json::from_slice(body)
        .map_err(|e| ProxyError::malformed(format!("Invalid generation request: {e}")))?;

    let backend_model = models
        .to_backend(model)
        .ok_or_else(|| ProxyError::unknown_model(model))?;

    let text: String = req
        .contents
        .iter()
        .flat_map(|c| c.parts.iter())
        .map(|p| p.text.as_str())
        .collect();

    let stream = action == STREAM_GENERATE_CONTENT;
    let stream_options = StreamOptions {
        include_usage: stream.then_some(true),
    };

    let config = req.generation_config.unwrap_or_default();

    let format_type = match config.response_mime_type.as_deref() {
        Some("application/json") => "json_object",
        _ => "text",
    };

    let chat_req = ChatRequest {
        stream,
        stream_options,
        model: backend_model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: text,
        }],
        max_tokens: config.max_output_tokens,
        temperature: None,
        top_p: None,
        presence_penalty: None,
        frequency_penalty: None,
        stop: config.stop_sequences,
        response_format: ResponseFormat {
            format_type: format_type.to_string(),
        },
    };

    serde_json::to_vec(&chat_req)
        .map_err(|e| ProxyError::other(format!("Failed to serialize backend request: {e}")))
}
