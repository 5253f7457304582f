//! Outbound REST-client connector (spec §3 `RestClient`, keyed
//! `restclient.<tag>`): a pooled [`reqwest::Client`] joined against a fixed
//! base URL, with JSON-then-text response decoding.

use std::path::Path;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RestClientConfig;
use crate::error::{Error, Result};

/// One parsed response: JSON decode is attempted first, falling back to the
/// raw text body when the caller doesn't care about a typed payload.
pub struct RestResponse {
    pub status: StatusCode,
    pub body: bytes::Bytes,
}

impl RestResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::BadRequest(format!("invalid JSON response: {e}")))
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::BadRequest(format!("invalid UTF-8 response: {e}")))
    }
}

/// Resolves `restclient.<tag>` in the DI container.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    /// When true, a non-2xx response is surfaced as `Error::HttpClient`
    /// instead of being returned to the caller for inspection.
    raise_on_error: bool,
}

impl RestClient {
    pub fn new(config: &RestClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.tls_verify);

        if let Some(path) = &config.ca_bundle_path {
            let pem = std::fs::read(path)
                .map_err(|e| Error::ConnectorConfig(format!("failed to read CA bundle {}: {e}", Path::new(path).display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::ConnectorConfig(format!("invalid CA bundle: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::ConnectorConfig(format!("invalid default header name '{name}': {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| Error::ConnectorConfig(format!("invalid default header value: {e}")))?;
            headers.insert(name, value);
        }
        builder = builder.default_headers(headers);

        Ok(Self {
            client: builder.build().map_err(Error::HttpClient)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            raise_on_error: true,
        })
    }

    /// Disables the default "non-2xx is an error" behavior for callers that
    /// want to inspect every status code themselves.
    #[must_use]
    pub fn tolerant(mut self) -> Self {
        self.raise_on_error = false;
        self
    }

    pub async fn get(
        &self,
        path: &str,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        self.request(Method::GET, path, None::<&()>, headers, query, raise_on_error).await
    }

    pub async fn post<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        self.request(Method::POST, path, body, headers, query, raise_on_error).await
    }

    pub async fn put<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        self.request(Method::PUT, path, body, headers, query, raise_on_error).await
    }

    pub async fn patch<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        self.request(Method::PATCH, path, body, headers, query, raise_on_error).await
    }

    pub async fn delete(
        &self,
        path: &str,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        self.request(Method::DELETE, path, None::<&()>, headers, query, raise_on_error).await
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: Option<&[(&str, &str)]>,
        query: Option<&[(&str, &str)]>,
        raise_on_error: Option<bool>,
    ) -> Result<RestResponse> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
        }

        let response = request.send().await.map_err(Error::HttpClient)?;
        let status = response.status();
        let raise_on_error = raise_on_error.unwrap_or(self.raise_on_error);
        if raise_on_error && (status.is_client_error() || status.is_server_error()) {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::BadRequest(format!("{url} returned {status}: {detail}")));
        }
        let body = response.bytes().await.map_err(Error::HttpClient)?;
        Ok(RestResponse { status, body })
    }
}
