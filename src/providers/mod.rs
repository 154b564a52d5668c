//! Minimal upstream dispatch (steps 4, 7, 8). No retries, no circuit
//! breakers, no fallback chains — the Non-goals explicitly exclude
//! request-level cost arbitration and upstream retries, and this is a thin
//! pass-through rather than a multi-provider orchestration layer.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;

use crate::models::ProviderKind;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream transport failure: {0}")]
    Request(#[from] reqwest::Error),
}

/// Base URL and credential header shape per provider (step 4).
pub fn base_url(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Openai => "https://api.openai.com",
        ProviderKind::Anthropic => "https://api.anthropic.com",
    }
}

fn apply_credential(request: RequestBuilder, provider: ProviderKind, secret: &str) -> RequestBuilder {
    match provider {
        ProviderKind::Openai => request.bearer_auth(secret),
        ProviderKind::Anthropic => request
            .header("x-api-key", secret)
            .header("anthropic-version", "2023-06-01"),
    }
}

/// Forwards a rewritten request body to the selected upstream with the
/// 120-second upper bound from step 8.
pub struct ProviderDispatch {
    http: Client,
    timeout: Duration,
    base_url_override: Option<String>,
}

impl ProviderDispatch {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout, base_url_override: None }
    }

    /// Points dispatch at a fixed base URL instead of the real provider
    /// hosts, so tests can run against a local mock server.
    #[cfg(any(test, feature = "test-support"))]
    pub fn with_base_url(http: Client, timeout: Duration, base_url: impl Into<String>) -> Self {
        Self { http, timeout, base_url_override: Some(base_url.into()) }
    }

    pub async fn dispatch(
        &self,
        provider: ProviderKind,
        upstream_path: &str,
        secret: &str,
        body: &serde_json::Value,
    ) -> Result<Response, ProviderError> {
        let base = self.base_url_override.as_deref().unwrap_or_else(|| base_url(provider));
        let url = format!("{base}{upstream_path}");
        let request = self.http.post(url).json(body).timeout(self.timeout);
        let request = apply_credential(request, provider, secret);
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    use super::*;

    #[test]
    fn openai_base_url_is_the_public_api() {
        assert_eq!(base_url(ProviderKind::Openai), "https://api.openai.com");
    }

    #[test]
    fn anthropic_base_url_is_the_public_api() {
        assert_eq!(base_url(ProviderKind::Anthropic), "https://api.anthropic.com");
    }

    #[tokio::test]
    async fn dispatch_posts_the_body_with_bearer_auth_for_openai() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatch = ProviderDispatch::with_base_url(Client::new(), Duration::from_secs(5), server.uri());
        let response = dispatch
            .dispatch(ProviderKind::Openai, "/v1/chat/completions", "sk-test", &json!({"model": "gpt-4o"}))
            .await
            .expect("dispatch should succeed");
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn dispatch_uses_anthropic_headers_instead_of_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatch = ProviderDispatch::with_base_url(Client::new(), Duration::from_secs(5), server.uri());
        let response = dispatch
            .dispatch(ProviderKind::Anthropic, "/v1/messages", "sk-ant-test", &json!({"model": "claude-3-haiku-20240307"}))
            .await
            .expect("dispatch should succeed");
        assert!(response.status().is_success());
    }
}
