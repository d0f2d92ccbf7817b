//! Forwarding layer between the Gemini-facing server and the OpenAI-compatible
//! backend. Request bodies go through [`translate_request`], non-streaming
//! response bodies through [`translate_response`], and streaming response
//! bodies through the pump. Backend error statuses are relayed untranslated.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::models::ModelMap;
use crate::translate::request::translate_request;
use crate::translate::response::translate_response;
use crate::translate::streaming::pump;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Outcome of relaying a non-streaming request.
pub struct RelayResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Outcome of relaying a streaming request.
pub enum StreamOutcome {
    /// Translated newline-delimited JSON lines from the pump.
    Stream(ReceiverStream<Bytes>),
    /// The backend refused the request; its error body is relayed as-is.
    BackendError(RelayResponse),
}

/// Forward a non-streaming request through the backend and translate the
/// answer back into the Gemini format.
pub async fn relay_non_streaming(
    body: &[u8],
    action: &str,
    model: &str,
    config: &ProxyConfig,
    models: &ModelMap,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<RelayResponse> {
    let backend_body = translate_request(body, action, model, models)?;
    let response = send_to_backend(backend_body, config, client, logger).await?;

    let status = response.status().as_u16();
    let resp_body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::backend(format!("Failed to read backend response: {e}")))?;

    if status >= 400 {
        logger.warn(
            "proxy",
            format!("Backend returned status {status}, relaying error body"),
        );
        return Ok(RelayResponse {
            status,
            body: resp_body,
        });
    }

    let translated = translate_response(&resp_body, action, models)?;
    logger.debug(
        "proxy",
        format!("Translated response: {} bytes", translated.len()),
    );

    Ok(RelayResponse {
        status,
        body: Bytes::from(translated),
    })
}

/// Forward a streaming request through the backend and pump its SSE stream
/// into Gemini-style JSON lines. The pump runs on its own task; the returned
/// stream is the consuming half of the capacity-1 handoff.
pub async fn relay_streaming(
    body: &[u8],
    action: &str,
    model: &str,
    config: &ProxyConfig,
    models: &ModelMap,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<StreamOutcome> {
    let backend_body = translate_request(body, action, model, models)?;
    let response = send_to_backend(backend_body, config, client, logger).await?;

    let status = response.status().as_u16();
    if status >= 400 {
        let resp_body = response.bytes().await.unwrap_or_default();
        logger.warn(
            "proxy",
            format!("Backend returned status {status} for streaming request"),
        );
        return Ok(StreamOutcome::BackendError(RelayResponse {
            status,
            body: resp_body,
        }));
    }

    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let (done_tx, done_rx) = oneshot::channel();

    pump(response.bytes_stream(), tx, done_tx, models.clone());

    let logger = logger.clone();
    tokio::spawn(async move {
        let _ = done_rx.await;
        logger.info("stream", "Stream completed");
    });

    Ok(StreamOutcome::Stream(ReceiverStream::new(rx)))
}

async fn send_to_backend(
    body: Vec<u8>,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<reqwest::Response> {
    let url = format!(
        "{}/chat/completions",
        config.backend.base_url.trim_end_matches('/')
    );

    logger.info("proxy", format!("POST {url}"));

    let mut req_builder = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(body);

    if let Some(api_key) = config.resolve_api_key()? {
        req_builder = req_builder.header("Authorization", format!("Bearer {api_key}"));
    }

    req_builder
        .send()
        .await
        .map_err(|e| ProxyError::backend(format!("Backend request failed: {e}")))
}
