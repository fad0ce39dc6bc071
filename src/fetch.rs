//! HTTP gateway for the Ropify API
//!
//! Every request is stamped with the bearer token currently held by the
//! credential store, and every response is unwrapped from the
//! `{status, message, data}` envelope to its `data` payload.

use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::config::ClientOptions;
use crate::error::Error;
use crate::store::{CredentialStore, TOKEN_KEY};

/// Response envelope used by every endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

/// Stateless transport bound to a base URL and a credential store
#[derive(Clone)]
pub struct Gateway {
    base_url: String,
    client: Client,
    store: Arc<dyn CredentialStore>,
    client_info: String,
}

impl Gateway {
    /// Create a gateway with its own HTTP client honouring the configured timeout
    pub fn new(
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        options: &ClientOptions,
    ) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self::with_client(base_url, client, store, options))
    }

    /// Create a gateway around an existing HTTP client
    pub fn with_client(
        base_url: &str,
        client: Client,
        store: Arc<dyn CredentialStore>,
        options: &ClientOptions,
    ) -> Self {
        Self {
            base_url: format!("{}{}", base_url.trim_end_matches('/'), options.api_prefix),
            client,
            store,
            client_info: options.client_info.clone(),
        }
    }

    /// Absolute URL of an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The credential store requests are stamped from
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn get(&self, path: &str) -> FetchBuilder<'_> {
        FetchBuilder::new(self, path, Method::GET)
    }

    pub fn post(&self, path: &str) -> FetchBuilder<'_> {
        FetchBuilder::new(self, path, Method::POST)
    }

    pub fn delete(&self, path: &str) -> FetchBuilder<'_> {
        FetchBuilder::new(self, path, Method::DELETE)
    }
}

enum Body {
    Json(Vec<u8>),
    Multipart(Form),
}

/// Helper for building and executing a single gateway request
pub struct FetchBuilder<'a> {
    gateway: &'a Gateway,
    url: String,
    method: Method,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    bearer: Option<String>,
    body: Option<Body>,
}

impl<'a> FetchBuilder<'a> {
    fn new(gateway: &'a Gateway, path: &str, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&gateway.client_info) {
            headers.insert("X-Client-Info", value);
        }

        Self {
            gateway,
            url: gateway.url(path),
            method,
            headers,
            query_params: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    /// Use this token instead of the stored one
    pub fn bearer_auth(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a query parameter only when present
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(body)?;
        self.headers
            .insert("Content-Type", HeaderValue::from_static("application/json"));
        self.body = Some(Body::Json(json));
        Ok(self)
    }

    /// Add a multipart form body to the request
    pub fn multipart(mut self, form: Form) -> Self {
        self.body = Some(Body::Multipart(form));
        self
    }

    async fn build(self) -> Result<RequestBuilder, Error> {
        let mut url = Url::parse(&self.url)?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        let token = match self.bearer {
            Some(token) => Some(token),
            None => self.gateway.store.get_item(TOKEN_KEY).await?,
        };

        let mut headers = self.headers;
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        trace!("{} {}", self.method, url);
        let mut req = self
            .gateway
            .client
            .request(self.method, url.as_str())
            .headers(headers);

        match self.body {
            Some(Body::Json(bytes)) => req = req.body(bytes),
            Some(Body::Multipart(form)) => req = req.multipart(form),
            None => {}
        }

        Ok(req)
    }

    async fn send(self) -> Result<reqwest::Response, Error> {
        let response = self.build().await?.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            debug!("Request failed with status {}: {}", status, message);
            return Err(Error::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Execute the request and unwrap the envelope payload
    pub async fn execute<T: DeserializeOwned>(self) -> Result<T, Error> {
        let bytes = self.send().await?.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        Ok(envelope.data)
    }

    /// Execute the request, discarding any payload
    pub async fn execute_empty(self) -> Result<(), Error> {
        self.send().await?;
        Ok(())
    }
}
