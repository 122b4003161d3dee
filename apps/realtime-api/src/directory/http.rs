//! HTTP client for the CRUD service's internal user endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;

use crate::gateway::events::PresenceStatus;

use super::{DirectoryError, UserDirectory, UserIdentity};

#[derive(Clone)]
pub struct HttpDirectory {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceBody {
    status: PresenceStatus,
    last_active: DateTime<Utc>,
}

impl HttpDirectory {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/internal/users/{}", self.base_url, user_id)
    }
}

#[async_trait]
impl UserDirectory for HttpDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        let resp = self
            .http
            .get(self.user_url(user_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(?e, %user_id, "user lookup failed");
                DirectoryError::Unavailable(e.to_string())
            })?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let user = resp.json::<UserIdentity>().await.map_err(|e| {
                    tracing::error!(?e, %user_id, "user lookup parse failed");
                    DirectoryError::Unexpected(e.to_string())
                })?;
                Ok(Some(user))
            }
            status => Err(DirectoryError::Unexpected(format!("status {status}"))),
        }
    }

    async fn record_presence(
        &self,
        user_id: &str,
        status: PresenceStatus,
        last_active: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let resp = self
            .http
            .put(format!("{}/presence", self.user_url(user_id)))
            .bearer_auth(&self.api_key)
            .json(&PresenceBody { status, last_active })
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Unexpected(format!("status {}", resp.status())));
        }
        Ok(())
    }
}
