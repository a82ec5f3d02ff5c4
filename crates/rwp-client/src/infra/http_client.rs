use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

/// Bound on every request the agent makes. A response that does not arrive
/// within this window is a network error, never a hang.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| AppError::ServerUnreachable)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Self::decode_json(resp).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode_json(resp).await
    }

    /// POST where the client only cares about a 2xx acknowledgement.
    pub async fn post_no_response<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), AppError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::ServerError(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed").into(),
            ))
        }
    }

    /// Shared response handling: non-2xx and non-JSON content types are
    /// rejected before any attempt to read the body.
    async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T, AppError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ServerError(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed").into(),
            ));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("application/json") {
            return Err(AppError::UnexpectedContentType(content_type));
        }

        resp.json::<T>()
            .await
            .map_err(|e| AppError::ProtocolDecode(e.to_string()))
    }
}
