//! Kuro widget client — stamina snapshots for one game role.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reminder_core::config::ApiConfig;
use reminder_core::error::{ReminderError, Result};
use reminder_core::traits::SnapshotFetcher;
use reminder_core::types::{FetchError, Snapshot};

use crate::response::{self, Outcome};

/// Role ids at or above this belong to the overseas server.
const OVERSEAS_ROLE_ID_FLOOR: u64 = 200_000_000;

/// Fetches stamina from the Kuro widget endpoint.
pub struct KuroClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl KuroClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent("okhttp/3.11.0")
            .build()
            .map_err(|e| ReminderError::Config(format!("HTTP client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    /// Server id for a role: overseas ids start at 200000000.
    pub fn server_id_for(&self, account_uid: &str) -> &str {
        match account_uid.trim().parse::<u64>() {
            Ok(id) if id >= OVERSEAS_ROLE_ID_FLOOR => &self.config.server_id_overseas,
            _ => &self.config.server_id,
        }
    }

    fn form(&self, account_uid: &str) -> Vec<(&'static str, String)> {
        vec![
            ("type", "2".to_string()),
            ("sizeType", "1".to_string()),
            ("gameId", self.config.game_id.to_string()),
            ("serverId", self.server_id_for(account_uid).to_string()),
            ("roleId", account_uid.to_string()),
        ]
    }

    async fn attempt(&self, account_uid: &str, credential: &str) -> Outcome {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .header("source", "android")
            .header("token", credential)
            .header("did", "")
            .header("b-at", "")
            .form(&self.form(account_uid))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return Outcome::Retry(format!("request failed: {e}")),
        };
        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return Outcome::Retry(format!("read body failed: {e}")),
        };
        response::classify(status, &body, &self.config.invalid_credential_codes, Utc::now())
    }
}

#[async_trait]
impl SnapshotFetcher for KuroClient {
    fn name(&self) -> &str {
        "kuro"
    }

    async fn fetch(
        &self,
        account_uid: &str,
        credential: &str,
    ) -> std::result::Result<Snapshot, FetchError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(account_uid, credential).await {
                Outcome::Snapshot(snapshot) => {
                    tracing::debug!("📡 uid {account_uid}: stamina {}", snapshot.value);
                    return Ok(snapshot);
                }
                Outcome::Failed(e) => {
                    tracing::debug!("📡 uid {account_uid}: {e}");
                    return Err(e);
                }
                Outcome::Retry(detail) => {
                    tracing::warn!("⚠️ uid {account_uid}: attempt {attempt}/{attempts} failed: {detail}");
                    last_error = detail;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(FetchError::transient(format!(
            "max retries reached: {last_error}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminder_core::types::FetchFailureKind;

    fn client_with(config: ApiConfig) -> KuroClient {
        KuroClient::new(config).unwrap()
    }

    #[test]
    fn test_server_id_selection() {
        let client = client_with(ApiConfig::default());
        assert_eq!(client.server_id_for("100000001"), "76402e5b20be2c39f095a152090afddc");
        assert_eq!(client.server_id_for("200000000"), "919752ae5ea09c1ced910dd668a63ffb");
        assert_eq!(client.server_id_for("not-a-number"), "76402e5b20be2c39f095a152090afddc");
    }

    #[test]
    fn test_form_fields() {
        let client = client_with(ApiConfig::default());
        let form = client.form("100000001");
        assert!(form.contains(&("type", "2".to_string())));
        assert!(form.contains(&("sizeType", "1".to_string())));
        assert!(form.contains(&("gameId", "3".to_string())));
        assert!(form.contains(&("roleId", "100000001".to_string())));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_retries() {
        let config = ApiConfig {
            endpoint: "http://127.0.0.1:9/getData".into(),
            max_retries: 2,
            retry_delay_ms: 10,
            timeout_secs: 1,
            ..Default::default()
        };
        let client = client_with(config);
        let err = client.fetch("100000001", "token").await.unwrap_err();
        assert_eq!(err.kind, FetchFailureKind::Transient);
        assert!(err.detail.contains("max retries"));
    }
}
