//! HTTP-bridge capability: forwards invocations to an external executor process.
//!
//! Each action maps to a path on the executor's base endpoint. Params are
//! POSTed as a JSON body; the decoded JSON response becomes the result `data`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Capability, CapabilityError, HealthStatus, InvokeResult};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

fn default_health_path() -> String {
    "/health".into()
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Configuration of one external executor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCapabilityConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    /// Base URL, e.g. `http://localhost:3001`.
    pub endpoint: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Action name → path appended to `endpoint`.
    #[serde(default)]
    pub actions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A capability backed by an HTTP executor.
#[derive(Debug, Clone)]
pub struct HttpCapability {
    config: HttpCapabilityConfig,
    client: reqwest::Client,
}

impl HttpCapability {
    pub fn new(config: HttpCapabilityConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn config(&self) -> &HttpCapabilityConfig {
        &self.config
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn capability_type(&self) -> &str {
        &self.config.capability_type
    }

    fn supported_actions(&self) -> Vec<String> {
        self.config.actions.keys().cloned().collect()
    }

    async fn invoke(&self, action: &str, params: Value) -> Result<InvokeResult, CapabilityError> {
        let path = self.config.actions.get(action).ok_or_else(|| {
            CapabilityError::UnsupportedAction {
                instance: self.config.name.clone(),
                action: action.to_owned(),
            }
        })?;
        let url = self.url_for(path);

        let response = match self.client.post(&url).json(&params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("executor '{}' unreachable at {}: {}", self.config.name, url, e);
                return Ok(InvokeResult::failed(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(InvokeResult::failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let data = response
            .json::<Value>()
            .await
            .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;
        Ok(InvokeResult::ok(data))
    }

    async fn check_health(&self) -> HealthStatus {
        let started = Instant::now();
        let url = self.url_for(&self.config.health_path);
        let outcome = self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await;
        let elapsed = Some(started.elapsed().as_millis() as u64);

        match outcome {
            Ok(resp) if resp.status().is_success() => HealthStatus {
                response_time_ms: elapsed,
                ..HealthStatus::healthy()
            },
            Ok(resp) => HealthStatus {
                response_time_ms: elapsed,
                ..HealthStatus::unhealthy(format!("HTTP {}", resp.status().as_u16()))
            },
            Err(e) => HealthStatus {
                response_time_ms: elapsed,
                ..HealthStatus::unhealthy(e.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::json;

    async fn spawn_executor() -> String {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/api/fetch", post(|Json(body): Json<Value>| async move {
                Json(json!({ "title": "Example", "textContent": body["url"] }))
            }))
            .route("/api/broken", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(endpoint: String) -> HttpCapabilityConfig {
        HttpCapabilityConfig {
            name: "pw-1".into(),
            capability_type: "playwright".into(),
            endpoint,
            health_path: "/health".into(),
            enabled: true,
            timeout_ms: 5_000,
            actions: BTreeMap::from([
                ("fetch".to_string(), "/api/fetch".to_string()),
                ("broken".to_string(), "/api/broken".to_string()),
            ]),
            description: None,
        }
    }

    #[tokio::test]
    async fn successful_post_wraps_json_body() {
        let capability = HttpCapability::new(config(spawn_executor().await));
        let result = capability
            .invoke("fetch", json!({ "url": "https://x.test" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["textContent"], "https://x.test");
    }

    #[tokio::test]
    async fn non_2xx_becomes_unsuccessful_result() {
        let capability = HttpCapability::new(config(spawn_executor().await));
        let result = capability.invoke("broken", json!({})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("HTTP 502: upstream down"));
    }

    #[tokio::test]
    async fn unmapped_action_is_rejected() {
        let capability = HttpCapability::new(config("http://127.0.0.1:9".into()));
        assert!(matches!(
            capability.invoke("screenshot", json!({})).await,
            Err(CapabilityError::UnsupportedAction { .. })
        ));
    }

    #[tokio::test]
    async fn health_probe_hits_health_path() {
        let capability = HttpCapability::new(config(spawn_executor().await));
        let status = capability.check_health().await;
        assert!(status.healthy);
        assert!(status.response_time_ms.is_some());
    }

    #[test]
    fn config_defaults_apply() {
        let cfg: HttpCapabilityConfig = serde_json::from_value(json!({
            "name": "c", "type": "chat", "endpoint": "http://localhost:3002"
        }))
        .unwrap();
        assert_eq!(cfg.health_path, "/health");
        assert!(cfg.enabled);
        assert_eq!(cfg.timeout_ms, 30_000);
        assert!(cfg.actions.is_empty());
    }
}
