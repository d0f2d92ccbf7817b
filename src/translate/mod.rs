//! API translation between the Gemini generative-content format and the
//! OpenAI-compatible chat-completion format.
//!
//! The core of the proxy: converts request bodies, non-streaming response
//! bodies, and streaming SSE chunks. The request and response translators are
//! pure (no I/O); the stream pump runs on its own task.

pub mod gemini_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;

/// Action name for a non-streaming generation request.
pub const GENERATE_CONTENT: &str = "generateContent";

/// Action name for a streaming generation request.
pub const STREAM_GENERATE_CONTENT: &str = "streamGenerateContent";

/// Whether an action is one of the two translated generation actions.
/// Everything else passes through the proxy unmodified.
#[must_use]
pub fn is_generation_action(action: &str) -> bool {
    action == GENERATE_CONTENT || action == STREAM_GENERATE_CONTENT
}
