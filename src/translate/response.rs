//! Translate complete backend chat-completion responses into Gemini-style
//! generation responses.

use super::gemini_types::{Candidate, Content, GenerationResponse, Part, UsageMetadata};
use super::openai_types::ChatResponse;
use super::GENERATE_CONTENT;
use crate::error::{ProxyError, Result};
use crate::models::ModelMap;

/// Translate a backend response body for `action` into the Gemini format.
/// Pass-through for everything except `generateContent` (streaming responses
/// go through the pump instead).
///
/// # Errors
/// `MalformedInput` if the body is not a valid `ChatResponse`; `UnknownModel`
/// if the backend's model id has no public mapping.
pub fn translate_response(body: &[u8], action: &str, models: &ModelMap) -> Result<Vec<u8>> {
    if action != GENERATE_CONTENT {
        return Ok(body.to_vec());
    }

    let resp: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| ProxyError::malformed(format!("Invalid backend response: {e}")))?;

    let model_version = models
        .to_public(&resp.model)
        .ok_or_else(|| ProxyError::unknown_model(&resp.model))?
        .to_string();

    let candidates = resp
        .choices
        .iter()
        .map(|choice| Candidate {
            index: choice.index,
            content: Content {
                role: "model".to_string(),
                parts: vec![Part {
                    text: choice.message.content.clone(),
                }],
            },
            finish_reason: choice.finish_reason.as_deref().map(map_finish_reason),
        })
        .collect();

    let gemini_resp = GenerationResponse {
        model_version,
        candidates,
        usage_metadata: UsageMetadata {
            prompt_token_count: resp.usage.prompt_tokens,
            candidates_token_count: resp.usage.completion_tokens,
            total_token_count: resp.usage.total_tokens,
        },
    };

    serde_json::to_vec(&gemini_resp)
        .map_err(|e| ProxyError::other(format!("Failed to serialize response: {e}")))
}

/// Map a backend finish reason to the Gemini convention. Shared with the
/// stream pump.
#[must_use]
pub fn map_finish_reason(reason: &str) -> String {
    match reason {
        "stop" => "STOP".to_string(),
        "length" => "MAX_TOKENS".to_string(),
        other => other.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_RESPONSE: &str = r#"{
        "id": "chatcmpl-someid",
        "object": "chat.completion",
        "created": 1687888509,
        "model": "gemma3:1b",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from the backend!"},
                "finish_reason": "stop"
            }
        ],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }"#;

    #[test]
    fn test_generate_content_response() {
        let out = translate_response(
            BACKEND_RESPONSE.as_bytes(),
            "generateContent",
            &ModelMap::builtin(),
        )
        .unwrap();

        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["modelVersion"], "gemma-3-1b-it");

        let candidates = v["candidates"].as_array().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0]["index"], 0);
        assert_eq!(candidates[0]["finishReason"], "STOP");
        assert_eq!(candidates[0]["content"]["role"], "model");
        assert_eq!(
            candidates[0]["content"]["parts"],
            serde_json::json!([{"text": "Hello from the backend!"}])
        );

        assert_eq!(
            v["usageMetadata"],
            serde_json::json!({
                "promptTokenCount": 10,
                "candidatesTokenCount": 5,
                "totalTokenCount": 15
            })
        );
    }

    #[test]
    fn test_other_actions_pass_through() {
        let body = br#"{"answer": "42"}"#;
        let out =
            translate_response(body, "generateAnswer", &ModelMap::builtin()).unwrap();
        assert_eq!(out, body.to_vec());
    }

    #[test]
    fn test_invalid_json_is_malformed_input() {
        let err = translate_response(b"not json", "generateContent", &ModelMap::builtin())
            .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedInput { .. }));
    }

    #[test]
    fn test_unknown_backend_model_fails() {
        let body = BACKEND_RESPONSE.replace("gemma3:1b", "mystery:7b");
        let err = translate_response(body.as_bytes(), "generateContent", &ModelMap::builtin())
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnknownModel { .. }));
    }

    #[test]
    fn test_null_finish_reason_omitted() {
        let body = BACKEND_RESPONSE.replace(r#""stop""#, "null");
        let out = translate_response(body.as_bytes(), "generateContent", &ModelMap::builtin())
            .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(v["candidates"][0].get("finishReason").is_none());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason("stop"), "STOP");
        assert_eq!(map_finish_reason("length"), "MAX_TOKENS");
        assert_eq!(map_finish_reason("content_filter"), "CONTENT_FILTER");
    }
}
