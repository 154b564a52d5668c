//! The four proxy routes. One pipeline, parameterised only by the
//! upstream path and an optional forced provider for the Anthropic-shaped
//! route.

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use futures_util::{Stream, StreamExt, stream};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::extract_bearer_token,
    models::{LogEntry, LogMetrics, LogRequest, LogResponse, ProviderKind},
    pricing,
    state::AppState,
};

struct ProxyRoute {
    upstream_path: &'static str,
    forced_provider: Option<ProviderKind>,
}

const CHAT_COMPLETIONS: ProxyRoute = ProxyRoute { upstream_path: "/v1/chat/completions", forced_provider: None };
const COMPLETIONS: ProxyRoute = ProxyRoute { upstream_path: "/v1/completions", forced_provider: None };
const EMBEDDINGS: ProxyRoute = ProxyRoute { upstream_path: "/v1/embeddings", forced_provider: None };
const ANTHROPIC_MESSAGES: ProxyRoute =
    ProxyRoute { upstream_path: "/v1/messages", forced_provider: Some(ProviderKind::Anthropic) };

pub async fn chat_completions(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, headers, body, &CHAT_COMPLETIONS).await
}

pub async fn completions(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, headers, body, &COMPLETIONS).await
}

pub async fn embeddings(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, headers, body, &EMBEDDINGS).await
}

pub async fn anthropic_messages(state: State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle(state, headers, body, &ANTHROPIC_MESSAGES).await
}

async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes, route: &ProxyRoute) -> Response {
    match run_pipeline(&state, &headers, &body, route).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn run_pipeline(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    route: &ProxyRoute,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(headers).map_err(|_| ApiError::Unauthorized)?;
    let config = state
        .key_service
        .validate_key(token, tokio_util::sync::CancellationToken::new())
        .await?;

    let mut request: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::MalformedRequest(format!("body is not valid JSON: {e}")))?;
    let full_model = request
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::MalformedRequest("missing \"model\"".into()))?
        .to_string();

    let (prefix, bare_model) = full_model
        .split_once('/')
        .ok_or_else(|| ApiError::MalformedRequest("model must be \"provider/model\"".into()))?;
    let prefix_provider =
        ProviderKind::parse(prefix).ok_or_else(|| ApiError::MalformedRequest(format!("unknown provider \"{prefix}\"")))?;
    let provider = route.forced_provider.unwrap_or(prefix_provider);

    if !state.key_service.is_model_allowed(&config, &full_model) {
        return Err(ApiError::ModelNotAllowed);
    }
    let secret = state.key_service.get_provider_key(&config, provider)?;
    state.key_service.check_budget(&config, 0.0)?;

    let messages = extract_messages_payload(&request);
    let temperature = request.get("temperature").and_then(Value::as_f64);
    let max_tokens = request.get("max_tokens").and_then(Value::as_i64);
    let log_request = LogRequest {
        model: full_model.clone(),
        provider: provider.to_string(),
        messages,
        temperature,
        max_tokens,
    };

    request["model"] = Value::String(bare_model.to_string());
    let stream_requested = request.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let started = Instant::now();
    let upstream = state
        .dispatch
        .dispatch(provider, route.upstream_path, &secret, &request)
        .await
        .map_err(|e| ApiError::UpstreamUnreachable(e.to_string()))?;

    let trace_id = Uuid::new_v4();
    if stream_requested {
        Ok(stream_response(state, config.key_id, config.name.clone(), config.user_id, provider, log_request, upstream, trace_id))
    } else {
        buffered_response(state, config.key_id, config.name.clone(), config.user_id, provider, bare_model, log_request, upstream, trace_id, started).await
    }
}

/// Pulls the opaque conversation payload out of the request for the log
/// entry without interpreting it.
fn extract_messages_payload(request: &Value) -> String {
    request
        .get("messages")
        .or_else(|| request.get("prompt"))
        .map(|v| v.to_string())
        .unwrap_or_else(|| "[]".to_string())
}

async fn buffered_response(
    state: &AppState,
    key_id: Uuid,
    key_name: String,
    user_id: Uuid,
    provider: ProviderKind,
    bare_model: &str,
    log_request: LogRequest,
    upstream: reqwest::Response,
    trace_id: Uuid,
    started: Instant,
) -> Result<Response, ApiError> {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let raw_body = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::UpstreamUnreachable(e.to_string()))?;
    let latency_ms = started.elapsed().as_millis() as i64;

    let parsed: Value = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
    let (prompt_tokens, completion_tokens) = extract_usage(&parsed);
    let content = extract_content(&parsed, provider);
    let cost_usd = pricing::cost_usd(Some(provider), bare_model, prompt_tokens, completion_tokens);

    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        builder = builder.header(name, value);
    }
    let response = builder
        .body(Body::from(raw_body))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    crate::metrics::record_proxy_request(provider.as_str(), status.as_u16());

    let key_service = state.key_service.clone();
    let log_pipeline = state.log_pipeline.clone();
    let entry = LogEntry {
        trace_id,
        timestamp: chrono::Utc::now(),
        virtual_key_id: key_id,
        virtual_key_name: key_name,
        user_id,
        request: log_request,
        response: LogResponse {
            content,
            status_code: status.as_u16(),
            error: None,
            prompt_tokens,
            completion_tokens,
        },
        metrics: LogMetrics { latency_ms, cost_usd },
    };

    // Spend/log side-effects are detached so the client response is never
    // held up by them.
    tokio::spawn(async move {
        key_service.update_spend(key_id, cost_usd, prompt_tokens + completion_tokens).await;
        log_pipeline.submit(entry);
    });

    Ok(response)
}

fn stream_response(
    state: &AppState,
    key_id: Uuid,
    key_name: String,
    user_id: Uuid,
    provider: ProviderKind,
    log_request: LogRequest,
    upstream: reqwest::Response,
    trace_id: Uuid,
) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    crate::metrics::record_proxy_request(provider.as_str(), status.as_u16());
    let chunk_size = state.config.upstream_stream_chunk_bytes;
    let body = Body::from_stream(rechunk(upstream.bytes_stream(), chunk_size));

    let entry = LogEntry {
        trace_id,
        timestamp: chrono::Utc::now(),
        virtual_key_id: key_id,
        virtual_key_name: key_name,
        user_id,
        request: log_request,
        response: LogResponse {
            content: "[streaming response]".to_string(),
            status_code: status.as_u16(),
            error: None,
            prompt_tokens: 0,
            completion_tokens: 0,
        },
        metrics: LogMetrics { latency_ms: 0, cost_usd: 0.0 },
    };
    state.log_pipeline.submit(entry);

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

/// Re-buffers upstream chunks to a fixed size so the byte-copy loop matches
/// the configured `UPSTREAM_STREAM_CHUNK_BYTES` (step 11), independent
/// of whatever chunking the upstream TCP/TLS stack happened to deliver.
fn rechunk(
    upstream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
    chunk_size: usize,
) -> impl Stream<Item = std::io::Result<bytes::Bytes>> + Send + 'static {
    stream::unfold((Box::pin(upstream), BytesMut::new()), move |(mut upstream, mut buf)| async move {
        loop {
            if buf.len() >= chunk_size {
                let chunk = buf.split_to(chunk_size);
                return Some((Ok(chunk.freeze()), (upstream, buf)));
            }
            match upstream.next().await {
                Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    return Some((Err(std::io::Error::other(e)), (upstream, buf)));
                }
                None => {
                    if buf.is_empty() {
                        return None;
                    }
                    let chunk = std::mem::take(&mut buf);
                    return Some((Ok(chunk.freeze()), (upstream, buf)));
                }
            }
        }
    })
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection" | "transfer-encoding" | "content-length" | "keep-alive" | "upgrade"
    )
}

fn extract_usage(body: &Value) -> (i64, i64) {
    let usage = body.get("usage");
    let prompt = usage
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let completion = usage
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    (prompt, completion)
}

fn extract_content(body: &Value, provider: ProviderKind) -> String {
    match provider {
        ProviderKind::Anthropic => body
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        ProviderKind::Openai => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn rechunk_buffers_small_chunks_into_fixed_size_pieces() {
        let upstream = tokio_stream::iter(vec![
            Ok::<_, reqwest::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
            Ok(Bytes::from_static(b"gh")),
        ]);
        let chunks: Vec<Bytes> = rechunk(upstream, 4).map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh")]);
    }

    #[tokio::test]
    async fn rechunk_flushes_a_trailing_partial_chunk_when_the_stream_ends() {
        let upstream = tokio_stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from_static(b"abc"))]);
        let chunks: Vec<Bytes> = rechunk(upstream, 8).map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"abc")]);
    }

    #[test]
    fn hop_by_hop_headers_are_filtered_out() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }

    #[test]
    fn extract_usage_defaults_to_zero_when_absent() {
        let body = serde_json::json!({});
        assert_eq!(extract_usage(&body), (0, 0));
    }

    #[test]
    fn extract_content_reads_the_right_pointer_per_provider() {
        let openai = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_content(&openai, ProviderKind::Openai), "hi");

        let anthropic = serde_json::json!({"content": [{"text": "hi"}]});
        assert_eq!(extract_content(&anthropic, ProviderKind::Anthropic), "hi");
    }
}
