use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorCode};

/// Client for the user service's internal (service-to-service) endpoints:
/// existence checks, block-relationship checks, and profile batch lookups.
#[derive(Clone)]
pub struct UsersClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub credential_id: Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct BlockedResponse {
    blocked: bool,
}

impl UsersClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Whether the given user exists. Unreachable user service is an
    /// internal error, never a silent "no".
    pub async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let url = format!("{}/internal/users/{}/exists", self.base_url, user_id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::internal(format!("user service unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                ErrorCode::ServiceUnavailable,
                "user service returned an error",
            ));
        }

        let body: ExistsResponse = resp
            .json()
            .await
            .map_err(|e| AppError::internal(format!("invalid user service response: {e}")))?;

        Ok(body.exists)
    }

    /// Whether a block exists between the two users, in either direction.
    pub async fn blocked_between(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let url = format!("{}/internal/blocks/{}/{}", self.base_url, a, b);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::internal(format!("user service unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                ErrorCode::ServiceUnavailable,
                "user service returned an error",
            ));
        }

        let body: BlockedResponse = resp
            .json()
            .await
            .map_err(|e| AppError::internal(format!("invalid user service response: {e}")))?;

        Ok(body.blocked)
    }

    /// Fetch profile data for a set of users. Best-effort: a failure is
    /// logged and returns an empty list so callers can render unenriched.
    pub async fn profiles_batch(&self, credential_ids: &[Uuid]) -> Vec<UserProfile> {
        if credential_ids.is_empty() {
            return vec![];
        }

        let url = format!("{}/internal/profiles/batch", self.base_url);
        match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "credential_ids": credential_ids }))
            .send()
            .await
        {
            Ok(resp) => resp.json().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid profile batch response");
                vec![]
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch profiles from user service");
                vec![]
            }
        }
    }
}
