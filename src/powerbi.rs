//! Power BI embed tokens for the premium dashboard.
//!
//! Client-credentials access token (cached) exchanged for a report-scoped
//! embed token via the `GenerateToken` REST call.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::config::PowerBiConfig;
use crate::errors::AppError;

const POWERBI_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

// Access tokens live about an hour; refresh well before that.
const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// What the frontend needs to render the embedded report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedInfo {
    pub embed_token: String,
    pub embed_url: String,
    pub report_id: String,
    pub expires_on: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GenerateTokenResponse {
    token: String,
    expiration: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PowerBiClient {
    client: Client,
    config: PowerBiConfig,
    access_tokens: Cache<String, String>,
}

impl PowerBiClient {
    pub fn new(config: PowerBiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create Power BI client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            access_tokens: Cache::builder()
                .time_to_live(ACCESS_TOKEN_TTL)
                .max_capacity(1)
                .build(),
        })
    }

    /// Embed token and URL for the configured report.
    pub async fn embed_info(&self) -> Result<EmbedInfo, AppError> {
        let access_token = self.access_token().await?;

        let url = format!(
            "{}/v1.0/myorg/groups/{}/reports/{}/GenerateToken",
            self.config.api_url.trim_end_matches('/'),
            self.config.workspace_id,
            self.config.report_id
        );

        tracing::info!("Requesting Power BI embed token for report {}", self.config.report_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&access_token)
            .json(&json!({ "accessLevel": "View" }))
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Power BI GenerateToken failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Power BI returned error {}: {}", status, error_text);
            return Err(AppError::ExternalApiError(format!(
                "Power BI GenerateToken returned status {}",
                status
            )));
        }

        let embed: GenerateTokenResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Power BI embed token: {}", e))
        })?;

        Ok(EmbedInfo {
            embed_token: embed.token,
            embed_url: self.embed_url()?,
            report_id: self.config.report_id.clone(),
            expires_on: embed.expiration,
        })
    }

    fn embed_url(&self) -> Result<String, AppError> {
        Url::parse_with_params(
            &self.config.embed_base_url,
            &[
                ("reportId", self.config.report_id.as_str()),
                ("groupId", self.config.workspace_id.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| AppError::InternalError(format!("Invalid Power BI embed URL: {}", e)))
    }

    async fn access_token(&self) -> Result<String, AppError> {
        self.access_tokens
            .try_get_with(self.config.tenant_id.clone(), self.fetch_access_token())
            .await
            .map_err(|e| AppError::ExternalApiError(e.to_string()))
    }

    async fn fetch_access_token(&self) -> Result<String, AppError> {
        let url = format!(
            "{}/{}/oauth2/token",
            self.config.authority_url.trim_end_matches('/'),
            self.config.tenant_id
        );

        tracing::debug!("Fetching Power BI access token for tenant {}", self.config.tenant_id);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("resource", POWERBI_RESOURCE),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Power BI token request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Power BI token endpoint returned {}", status);
            return Err(AppError::ExternalApiError(format!(
                "Power BI token endpoint returned status {}",
                status
            )));
        }

        let token: AccessTokenResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Power BI access token: {}", e))
        })?;

        Ok(token.access_token)
    }
}
