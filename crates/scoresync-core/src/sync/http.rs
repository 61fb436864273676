//! HTTP client for the score API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::util::{compact_text, normalize_text_option};

use super::identity::AccessToken;
use super::transport::{ScoreTransport, TransportError, UploadBatch, UploadResponse};

const UPLOAD_PATH: &str = "/v1/scores/batch";

/// [`ScoreTransport`] over `POST {base}/v1/scores/batch`
#[derive(Debug, Clone)]
pub struct HttpScoreTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpScoreTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            endpoint: format!("{base_url}{UPLOAD_PATH}"),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScoreTransport for HttpScoreTransport {
    async fn upload_scores(
        &self,
        token: &AccessToken,
        batch: &UploadBatch,
    ) -> Result<UploadResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .header("Accept", "application/json")
            .json(batch)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        serde_json::from_str(&body).map_err(|error| {
            TransportError::InvalidResponse(format!("{error}: {}", compact_text(&body)))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn request_error(error: reqwest::Error) -> TransportError {
    if error.is_connect() || error.is_timeout() {
        TransportError::Unreachable(error.to_string())
    } else {
        TransportError::Http(error)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String, TransportError> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let transport =
            HttpScoreTransport::new("https://scores.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.endpoint(),
            "https://scores.example.com/v1/scores/batch"
        );
    }

    #[test]
    fn api_errors_prefer_json_message() {
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, r#"{"error": "token revoked"}"#),
            "token revoked (401)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(
            parse_api_error(StatusCode::SERVICE_UNAVAILABLE, "  "),
            "HTTP 503"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Port 9 (discard) is not listening on loopback in test environments.
        let transport =
            HttpScoreTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let token = AccessToken::new("secret").unwrap();
        let batch = UploadBatch::new("tablet", &[]);

        let error = transport.upload_scores(&token, &batch).await.unwrap_err();
        assert!(
            matches!(error, TransportError::Unreachable(_)),
            "unexpected error: {error:?}"
        );
    }
}
