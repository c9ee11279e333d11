use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::errors::ProviderError;
use crate::util::{redact_secrets, tail_chars};

const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_CHARS: usize = 500;

/// Thin REST client shared by the adapters: one auth header, JSON in and out,
/// every non-2xx mapped to `ProviderError::Status`.
pub(crate) struct ApiClient {
    http: Client,
    base: String,
    auth_name: &'static str,
    auth_value: String,
}

impl ApiClient {
    pub fn new(base: &str, auth_name: &'static str, auth_value: String) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("medic/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            auth_name,
            auth_value,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<Response, ProviderError> {
        debug!(endpoint, "provider request");
        let response = request
            .header(self.auth_name, &self.auth_value)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: redact_secrets(&tail_chars(body.trim(), ERROR_BODY_CHARS)),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T, ProviderError> {
        let text = response.text().await.map_err(|source| ProviderError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self.send(self.http.get(self.url(path)).query(query), path).await?;
        Self::decode(response, path).await
    }

    /// Like `get_json`, with 404 mapped to `None`.
    pub async fn get_optional_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ProviderError> {
        match self.get_json(path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_text(&self, path: &str) -> Result<String, ProviderError> {
        let response = self.send(self.http.get(self.url(path)), path).await?;
        response.text().await.map_err(|source| ProviderError::Transport {
            endpoint: path.to_string(),
            source,
        })
    }

    /// Collect every page of a list endpoint. Stops on a short page.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let mut params = query.to_vec();
            params.push(("per_page", PAGE_SIZE.to_string()));
            params.push(("page", page.to_string()));
            let batch: Vec<T> = self.get_json(path, &params).await?;
            let count = batch.len();
            all.extend(batch);
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let response = self.send(self.http.post(self.url(path)).json(body), path).await?;
        Self::decode(response, path).await
    }

    /// POST where the response body is irrelevant.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ProviderError> {
        self.send(self.http.post(self.url(path)).json(body), path).await?;
        Ok(())
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ProviderError> {
        self.send(self.http.put(self.url(path)).json(body), path).await?;
        Ok(())
    }
}
