//! Session bound to one upstream inspection gateway login.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use skinspect_core::InspectedItem;
use tracing::{debug, error, instrument, warn};

use super::{Inspection, Session};
use crate::error::InspectError;
use crate::reference::InspectReference;

/// Where and how to reach one gateway login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub name: String,
    pub base_url: String,
    pub token: Option<String>,
}

impl SessionConfig {
    /// Parse `name=url` (or a bare url, named `session-{index}`)
    pub fn parse(entry: &str, index: usize, token: Option<String>) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        let (name, url) = match entry.split_once('=') {
            Some((name, url)) => (name.trim().to_string(), url.trim()),
            None => (format!("session-{index}"), entry),
        };
        Some(Self {
            name,
            base_url: url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Parse a comma-separated session list
    pub fn parse_list(list: &str, token: Option<String>) -> Vec<Self> {
        list.split(',')
            .enumerate()
            .filter_map(|(i, entry)| Self::parse(entry, i, token.clone()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    iteminfo: InspectedItem,
    /// Milliseconds the login wants to rest
    #[serde(default)]
    delay: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    ready: bool,
}

/// Gateway-backed session
pub struct HttpSession {
    config: SessionConfig,
    client: Client,
    ready: AtomicBool,
}

impl HttpSession {
    pub fn new(config: SessionConfig, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { config, client, ready: AtomicBool::new(false) })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn mark(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }
}

#[async_trait]
impl Session for HttpSession {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    #[instrument(skip(self, reference), fields(session = %self.config.name, asset_id = reference.asset_id))]
    async fn inspect(&self, reference: &InspectReference) -> Result<Inspection, InspectError> {
        let url = format!("{}/inspect", self.config.base_url);
        let (s, m) = reference.owner_fields();
        let query = [
            ("s", s.to_string()),
            ("a", reference.asset_id.to_string()),
            ("d", reference.checksum.to_string()),
            ("m", m.to_string()),
        ];

        let response = match self.authorized(self.client.get(&url).query(&query)).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Gateway unreachable");
                self.mark(false);
                return Err(InspectError::Protocol(e.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Gateway rejected inspection");
            return Err(InspectError::Protocol(format!("gateway returned {status}")));
        }

        let parsed: InspectResponse = response
            .json()
            .await
            .map_err(|e| InspectError::Protocol(format!("malformed gateway reply: {e}")))?;

        debug!(delay_ms = ?parsed.delay, "Inspection complete");
        Ok(Inspection {
            item: parsed.iteminfo,
            delay: parsed.delay.map(Duration::from_millis),
        })
    }

    #[instrument(skip(self), fields(session = %self.config.name))]
    async fn refresh(&self) -> bool {
        let url = format!("{}/status", self.config.base_url);

        let ready = match self.authorized(self.client.get(&url)).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<StatusResponse>()
                .await
                .map(|status| status.ready)
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Gateway not ready");
                false
            }
            Err(e) => {
                debug!(error = %e, "Gateway status check failed");
                false
            }
        };

        self.mark(ready);
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_and_bare() {
        let list = SessionConfig::parse_list(
            "alpha=http://10.0.0.2:7001/, http://10.0.0.3:7001,",
            Some("secret".to_string()),
        );

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "alpha");
        assert_eq!(list[0].base_url, "http://10.0.0.2:7001");
        assert_eq!(list[1].name, "session-1");
        assert_eq!(list[1].token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_new_session_starts_not_ready() {
        let config = SessionConfig::parse("bot=http://localhost:7001", 0, None).unwrap();
        let session = HttpSession::new(config, Duration::from_secs(5)).unwrap();

        assert_eq!(session.name(), "bot");
        assert_eq!(session.base_url(), "http://localhost:7001");
        assert!(!session.is_ready());
    }

    #[test]
    fn test_inspect_response_shape() {
        let json = r#"{
            "iteminfo": {
                "s": "76561198084749846", "a": "16535415745", "d": "9144829193434925417", "m": "0",
                "floatvalue": 0.25, "paintseed": 1, "defindex": 7, "paintindex": 44,
                "rarity": 6, "quality": 4, "origin": 8
            },
            "delay": 1500
        }"#;
        let parsed: InspectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.iteminfo.a, 16_535_415_745);
        assert_eq!(parsed.delay, Some(1500));
    }
}
