//! Core data model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderKind::Openai),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Provider credential record. The `ciphertext` is the raw upstream secret
/// sealed under the service master key; it never leaves `db`/`crypto`
/// unescorted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProvider {
    pub user_id: Uuid,
    pub provider: ProviderKind,
    pub ciphertext: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub token_hash: String,
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
    pub current_spend: f64,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl VirtualKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Denormalised hot-path projection. Lives only in cache and process memory
/// — `secrets` holds *plaintext* upstream credentials and must never be
/// logged or persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub key_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
    pub current_spend: f64,
    pub secrets: std::collections::HashMap<ProviderKind, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    pub key_id: Uuid,
    pub date: NaiveDate,
    pub total_tokens: i64,
    pub total_cost: f64,
}

/// Request shape embedded in a log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    pub model: String,
    pub provider: String,
    pub messages: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

/// Response shape embedded in a log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResponse {
    pub content: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMetrics {
    pub latency_ms: i64,
    pub cost_usd: f64,
}

/// Immutable trace record, one per proxied request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub trace_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub virtual_key_id: Uuid,
    pub virtual_key_name: String,
    pub user_id: Uuid,
    pub request: LogRequest,
    pub response: LogResponse,
    pub metrics: LogMetrics,
}
