//! Pump for translating a backend SSE chunk stream into Gemini-style
//! streamed JSON lines.
//!
//! [`pump`] launches background work and returns immediately. Output lines go
//! through a capacity-1 channel, so each send suspends until the consumer
//! drains it — backpressure from the downstream client reaches all the way
//! back to the reads of the backend stream. The completion signal fires
//! exactly once on every exit path: clean `[DONE]`, transport error, closed
//! sink, or a panic inside the source stream.

use std::fmt::Display;
use std::ops::ControlFlow;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use super::gemini_types::{Candidate, Content, Part, StreamedGenerationResponse};
use super::openai_types::ChatStreamChunk;
use super::response::map_finish_reason;
use crate::models::ModelMap;

/// SSE payload that marks normal end of stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Consume the backend's SSE byte stream, translating each event into one
/// newline-terminated Gemini-style JSON line on `sink`. Returns immediately;
/// `done` fires once the sink is closed and no further writes will occur.
///
/// Malformed events and transport failures surface as diagnostic lines on the
/// sink instead of aborting; a fault in the source stream itself is contained
/// on the worker task and degrades to a clean termination.
pub fn pump<S, E>(
    source: S,
    sink: mpsc::Sender<Bytes>,
    done: oneshot::Sender<()>,
    models: ModelMap,
) where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        let worker = tokio::spawn(run(source, sink, models));
        if let Err(e) = worker.await {
            if e.is_panic() {
                tracing::error!("stream pump worker panicked; terminating stream");
            }
        }
        // The worker's sink handle is gone by now (returned or unwound), so
        // the receiver sees end-of-stream before done fires.
        let _ = done.send(());
    });
}

async fn run<S, E>(source: S, sink: mpsc::Sender<Bytes>, models: ModelMap)
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    tokio::pin!(source);
    // Buffer raw bytes and only decode complete lines: a multibyte character
    // may be split across transport chunk boundaries.
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk_result) = source.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                let _ = sink
                    .send(Bytes::from(format!("stream read error: {e}\n")))
                    .await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);

        while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes).trim().to_string();

            if handle_line(&line, &sink, &models).await.is_break() {
                return;
            }
        }
    }

    // A final event without a trailing newline still counts.
    let line = String::from_utf8_lossy(&buffer).trim().to_string();
    if !line.is_empty() {
        let _ = handle_line(&line, &sink, &models).await;
    }
}

/// Process one SSE line. Breaks on the terminator sentinel or a closed sink.
async fn handle_line(
    line: &str,
    sink: &mpsc::Sender<Bytes>,
    models: &ModelMap,
) -> ControlFlow<()> {
    if line.is_empty() {
        return ControlFlow::Continue(());
    }

    let payload = if let Some(stripped) = line.strip_prefix("data: ") {
        stripped.trim()
    } else if let Some(stripped) = line.strip_prefix("data:") {
        stripped.trim()
    } else {
        return ControlFlow::Continue(());
    };

    if payload == DONE_SENTINEL {
        return ControlFlow::Break(());
    }

    let chunk: ChatStreamChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(e) => {
            let diagnostic = format!("invalid chunk format, error: {e}, raw: {payload}\n");
            return send(sink, diagnostic).await;
        }
    };

    let model_version = match models.to_public(&chunk.model) {
        Some(public) => public.to_string(),
        None => {
            let diagnostic = format!("unknown backend model in chunk: {}\n", chunk.model);
            return send(sink, diagnostic).await;
        }
    };

    let usage_metadata = chunk
        .usage
        .clone()
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

    for choice in &chunk.choices {
        let response = StreamedGenerationResponse {
            candidates: vec![Candidate {
                index: choice.index,
                content: Content {
                    role: "model".to_string(),
                    parts: vec![Part {
                        text: choice.delta.content.clone().unwrap_or_default(),
                    }],
                },
                finish_reason: choice.finish_reason.as_deref().map(map_finish_reason),
            }],
            usage_metadata: usage_metadata.clone(),
            model_version: model_version.clone(),
        };

        let json = match serde_json::to_string(&response) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("failed to serialize streamed response: {e}");
                continue;
            }
        };

        if send(sink, format!("{json}\n")).await.is_break() {
            return ControlFlow::Break(());
        }
    }

    ControlFlow::Continue(())
}

/// A closed sink means the consumer is gone: terminal, not fatal.
async fn send(sink: &mpsc::Sender<Bytes>, line: String) -> ControlFlow<()> {
    match sink.send(Bytes::from(line)).await {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    type SourceItem = std::result::Result<Bytes, io::Error>;

    fn data_chunk(content: &str, finish: Option<&str>) -> String {
        let finish = finish.map_or("null".to_string(), |f| format!("\"{f}\""));
        format!(
            "data: {{\"id\":\"chatcmpl-someid1\",\"object\":\"chat.completion.chunk\",\
             \"created\":1687888510,\"model\":\"gemma3:4b\",\
             \"choices\":[{{\"delta\":{{\"content\":\"{content}\"}},\"index\":0,\
             \"finish_reason\":{finish}}}],\"usage\":{{}}}}\n"
        )
    }

    /// Run the pump over `items`, collecting output lines. Asserts the done
    /// signal fires and returns everything written to the sink.
    async fn run_pump(items: Vec<SourceItem>) -> String {
        let (tx, mut rx) = mpsc::channel::<Bytes>(1);
        let (done_tx, done_rx) = oneshot::channel();

        pump(stream::iter(items), tx, done_tx, ModelMap::builtin());

        let collector = tokio::spawn(async move {
            let mut out = String::new();
            while let Some(line) = rx.recv().await {
                out.push_str(&String::from_utf8_lossy(&line));
            }
            out
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), done_rx)
            .await
            .expect("done signal did not fire")
            .expect("done sender dropped without signaling");

        collector.await.unwrap()
    }

    #[tokio::test]
    async fn test_three_chunks_then_done() {
        let items = vec![
            Ok(Bytes::from(data_chunk("Hello", None))),
            Ok(Bytes::from(data_chunk(" from", None))),
            Ok(Bytes::from(data_chunk(" stream!", Some("stop")))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];

        let output = run_pump(items).await;
        let lines: Vec<&str> = output.trim().lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["candidates"][0]["index"], 0);
        assert_eq!(
            first["candidates"][0]["content"]["parts"],
            serde_json::json!([{"text": "Hello"}])
        );
        assert_eq!(first["candidates"][0]["content"]["role"], "model");
        assert!(first["candidates"][0].get("finishReason").is_none());
        assert_eq!(first["usageMetadata"], serde_json::json!({}));
        assert_eq!(first["modelVersion"], "gemma-3-4b-it");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            second["candidates"][0]["content"]["parts"][0]["text"],
            " from"
        );
        assert!(second["candidates"][0].get("finishReason").is_none());

        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["candidates"][0]["finishReason"], "STOP");
    }

    #[tokio::test]
    async fn test_done_sentinel_without_trailing_newline() {
        let items = vec![
            Ok(Bytes::from(data_chunk("hi", None))),
            Ok(Bytes::from("data: [DONE]")),
        ];
        let output = run_pump(items).await;
        assert_eq!(output.trim().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_read_error_writes_diagnostic_and_completes() {
        let items = vec![
            Ok(Bytes::from(data_chunk("partial", None))),
            Err(io::Error::other("simulated read error")),
        ];

        let output = run_pump(items).await;
        assert!(output.contains("stream read error: simulated read error"));
        // Partial progress before the failure is preserved.
        assert!(output.contains("partial"));
    }

    #[tokio::test]
    async fn test_invalid_chunk_writes_diagnostic_and_continues() {
        let items = vec![
            Ok(Bytes::from("data: {invalid-json}\n")),
            Ok(Bytes::from(data_chunk("still going", None))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];

        let output = run_pump(items).await;
        assert!(output.contains("invalid chunk format"));
        assert!(output.contains("{invalid-json}"));
        assert!(output.contains("still going"));
    }

    #[tokio::test]
    async fn test_unknown_backend_model_writes_diagnostic_and_continues() {
        let bad = data_chunk("x", None).replace("gemma3:4b", "mystery:7b");
        let items = vec![
            Ok(Bytes::from(bad)),
            Ok(Bytes::from(data_chunk("ok", None))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];

        let output = run_pump(items).await;
        assert!(output.contains("unknown backend model in chunk: mystery:7b"));
        assert!(output.contains("ok"));
    }

    #[tokio::test]
    async fn test_non_data_lines_skipped() {
        let items = vec![
            Ok(Bytes::from(": keep-alive comment\n\n")),
            Ok(Bytes::from("event: message\n")),
            Ok(Bytes::from(data_chunk("only output", None))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];

        let output = run_pump(items).await;
        assert_eq!(output.trim().lines().count(), 1);
        assert!(output.contains("only output"));
    }

    #[tokio::test]
    async fn test_panicking_source_still_signals_done() {
        let source = stream::poll_fn(|_| -> std::task::Poll<Option<SourceItem>> {
            panic!("simulated panic in reader");
        });

        let (tx, mut rx) = mpsc::channel::<Bytes>(1);
        let (done_tx, done_rx) = oneshot::channel();

        pump(source, tx, done_tx, ModelMap::builtin());

        tokio::time::timeout(std::time::Duration::from_secs(1), done_rx)
            .await
            .expect("done signal did not fire after panic")
            .expect("done sender dropped without signaling");

        // The sink must be closed, yielding end-of-stream to the consumer.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_multibyte_text_split_across_chunks() {
        // Split the two-byte 'é' across two transport chunks; line assembly
        // must reunite the bytes before decoding.
        let event = data_chunk("héllo", None) + "data: [DONE]\n";
        let bytes = event.into_bytes();
        let split_at = event_split_point(&bytes);

        let items: Vec<SourceItem> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split_at])),
            Ok(Bytes::copy_from_slice(&bytes[split_at..])),
        ];

        let output = run_pump(items).await;
        assert!(output.contains("héllo"), "got: {output}");
        assert!(!output.contains('\u{FFFD}'), "got: {output}");
    }

    /// Index one byte past the start of the first multibyte character.
    fn event_split_point(bytes: &[u8]) -> usize {
        bytes
            .iter()
            .position(|&b| b >= 0x80)
            .expect("fixture contains a multibyte character")
            + 1
    }

    #[tokio::test]
    async fn test_closed_sink_terminates_pump() {
        let items: Vec<SourceItem> = vec![
            Ok(Bytes::from(data_chunk("a", None))),
            Ok(Bytes::from(data_chunk("b", None))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];

        let (tx, rx) = mpsc::channel::<Bytes>(1);
        let (done_tx, done_rx) = oneshot::channel();
        drop(rx);

        pump(stream::iter(items), tx, done_tx, ModelMap::builtin());

        tokio::time::timeout(std::time::Duration::from_secs(1), done_rx)
            .await
            .expect("done signal did not fire with closed sink")
            .expect("done sender dropped without signaling");
    }
}
