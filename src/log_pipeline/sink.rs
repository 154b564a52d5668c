//! Thin reqwest-based client for the search backend. No OpenSearch
//! or Elasticsearch client crate appears anywhere in this codebase's
//! dependency corpus, so this talks raw HTTP the same way the provider
//! dispatcher does — the index name and mapping are the only OpenSearch
//! wire-format details the rest of the crate needs to know about.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use uuid::Uuid;

use super::error::LogPipelineError;
use crate::models::LogEntry;

pub const INDEX_NAME: &str = "lumina-logs";

pub struct SearchSink {
    http: Client,
    base_url: String,
}

fn entry_to_document(entry: &LogEntry) -> Value {
    json!({
        "trace_id": entry.trace_id,
        "timestamp": entry.timestamp,
        "virtual_key_id": entry.virtual_key_id,
        "virtual_key_name": entry.virtual_key_name,
        "user_id": entry.user_id,
        "request": {
            "model": entry.request.model,
            "provider": entry.request.provider,
            "messages": entry.request.messages,
            "temperature": entry.request.temperature,
            "max_tokens": entry.request.max_tokens,
        },
        "response": {
            "content": entry.response.content,
            "status_code": entry.response.status_code,
            "error": entry.response.error,
            "prompt_tokens": entry.response.prompt_tokens,
            "completion_tokens": entry.response.completion_tokens,
        },
        "metrics": {
            "latency_ms": entry.metrics.latency_ms,
            "cost_usd": entry.metrics.cost_usd,
        },
    })
}

fn document_to_entry(doc: &Value) -> Option<LogEntry> {
    serde_json::from_value(doc.clone()).ok()
}

impl SearchSink {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    /// PUT the index mapping at construction time. A 400 means the index
    /// already exists and is swallowed.
    pub async fn bootstrap_index(&self) -> Result<(), LogPipelineError> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "trace_id": {"type": "keyword"},
                    "virtual_key_id": {"type": "keyword"},
                    "user_id": {"type": "keyword"},
                    "timestamp": {"type": "date"},
                    "request": {
                        "properties": {
                            "model": {"type": "keyword"},
                            "provider": {"type": "keyword"},
                            "messages": {"type": "text"},
                            "temperature": {"type": "float"},
                            "max_tokens": {"type": "long"},
                        }
                    },
                    "response": {
                        "properties": {
                            "content": {"type": "text"},
                            "status_code": {"type": "integer"},
                            "error": {"type": "text"},
                            "prompt_tokens": {"type": "long"},
                            "completion_tokens": {"type": "long"},
                        }
                    },
                    "metrics": {
                        "properties": {
                            "latency_ms": {"type": "long"},
                            "cost_usd": {"type": "float"},
                        }
                    }
                }
            }
        });

        let response = self
            .http
            .put(format!("{}/{}", self.base_url, INDEX_NAME))
            .json(&mapping)
            .send()
            .await?;
        if response.status().as_u16() != 400 {
            response.error_for_status()?;
        }
        Ok(())
    }

    /// Build and POST a bulk-index payload for one batch. Returns the
    /// number of documents that failed, if any.
    pub async fn bulk_index(&self, entries: &[LogEntry]) -> Result<(), LogPipelineError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for entry in entries {
            let action = json!({"index": {"_index": INDEX_NAME, "_id": entry.trace_id}});
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&entry_to_document(entry).to_string());
            body.push('\n');
        }

        let response = self
            .http
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: Value = response.json().await?;

        if parsed.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let mut failed = 0usize;
            if let Some(items) = parsed.get("items").and_then(Value::as_array) {
                for item in items {
                    if let Some(index_result) = item.get("index") {
                        if let Some(status) = index_result.get("status").and_then(Value::as_u64) {
                            if status >= 300 {
                                failed += 1;
                                tracing::warn!(
                                    id = %index_result.get("_id").and_then(Value::as_str).unwrap_or("?"),
                                    status,
                                    reason = %index_result.get("error").map(|e| e.to_string()).unwrap_or_default(),
                                    "bulk index document failed"
                                );
                            }
                        }
                    }
                }
            }
            if failed > 0 {
                return Err(LogPipelineError::PartialFailure { failed, total: entries.len() });
            }
        }
        Ok(())
    }

    /// Direct document GET; 404 is mapped to `None`.
    pub async fn get_log(&self, trace_id: Uuid) -> Result<Option<LogEntry>, LogPipelineError> {
        let response = self
            .http
            .get(format!("{}/{}/_doc/{}", self.base_url, INDEX_NAME, trace_id))
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let parsed: Value = response.error_for_status()?.json().await?;
        Ok(parsed.get("_source").and_then(document_to_entry))
    }

    pub async fn search(
        &self,
        q: Option<&str>,
        model: Option<&str>,
        status: Option<u16>,
        from_ts: Option<DateTime<Utc>>,
        to_ts: Option<DateTime<Utc>>,
        offset: u32,
        size: u32,
    ) -> Result<(Vec<LogEntry>, u64), LogPipelineError> {
        let mut must: Vec<Value> = Vec::new();
        if let Some(q) = q.filter(|q| !q.is_empty()) {
            must.push(json!({
                "multi_match": {
                    "query": q,
                    "fields": ["request.messages", "response.content"]
                }
            }));
        }
        if let Some(model) = model {
            must.push(json!({"term": {"request.model": model}}));
        }
        if let Some(status) = status {
            must.push(json!({"term": {"response.status_code": status}}));
        }
        if from_ts.is_some() || to_ts.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(from) = from_ts {
                range.insert("gte".into(), json!(from));
            }
            if let Some(to) = to_ts {
                range.insert("lte".into(), json!(to));
            }
            must.push(json!({"range": {"timestamp": range}}));
        }

        let query = json!({
            "query": {"bool": {"must": must}},
            "sort": [{"timestamp": "desc"}],
            "from": offset,
            "size": size,
        });

        let response: Value = self
            .http
            .post(format!("{}/{}/_search", self.base_url, INDEX_NAME))
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = response
            .pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let entries = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| h.get("_source").and_then(document_to_entry))
                    .collect()
            })
            .unwrap_or_default();

        Ok((entries, total))
    }

    pub async fn get_stats(
        &self,
        user_id: Uuid,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
    ) -> Result<Stats, LogPipelineError> {
        let query = json!({
            "size": 0,
            "query": {
                "bool": {
                    "must": [
                        {"term": {"user_id": user_id}},
                        {"range": {"timestamp": {"gte": from_ts, "lte": to_ts}}},
                    ]
                }
            },
            "aggs": {
                "total_cost": {"sum": {"field": "metrics.cost_usd"}},
                "avg_latency": {"avg": {"field": "metrics.latency_ms"}},
                "successes": {"filter": {"range": {"response.status_code": {"lt": 400}}}},
            }
        });

        let response: Value = self
            .http
            .post(format!("{}/{}/_search", self.base_url, INDEX_NAME))
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total_hits = response.pointer("/hits/total/value").and_then(Value::as_u64).unwrap_or(0);
        let total_cost_usd = response
            .pointer("/aggregations/total_cost/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let avg_latency_ms = response
            .pointer("/aggregations/avg_latency/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let success_count = response
            .pointer("/aggregations/successes/doc_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let success_rate = if total_hits == 0 {
            0.0
        } else {
            success_count as f64 / total_hits as f64 * 100.0
        };

        Ok(Stats { total_hits, total_cost_usd, avg_latency_ms, success_rate })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub total_hits: u64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}
