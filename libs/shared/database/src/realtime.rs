use std::collections::HashMap;

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::StoreError;

/// REST client for the hosted realtime database.
///
/// Every node is addressed as `{base_url}/{path}.json`; the caller's ID token
/// travels in the `auth` query parameter.
pub struct RealtimeClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Characters the database refuses inside a key.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

pub fn validate_key(key: &str) -> Result<&str, StoreError> {
    if key.is_empty() || key.chars().any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c.is_control()) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

impl RealtimeClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.realtime_database_url.trim_end_matches('/').to_string(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn node_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        if self.base_url.is_empty() {
            return Err(StoreError::NotConfigured);
        }

        let url = self.node_url(path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers());

        if let Some(token) = auth_token {
            req = req.query(&[("auth", token)]);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Unauthorized {
                    status: status.as_u16(),
                    body: error_text,
                },
                code => StoreError::Http {
                    status: code,
                    body: error_text,
                },
            });
        }

        let bytes = response.bytes().await?;
        let payload: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        let data = serde_json::from_slice::<T>(payload)?;
        Ok(data)
    }

    /// Read a single node. Absent nodes come back as `None`.
    pub async fn get<T>(&self, path: &str, auth_token: Option<&str>) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request::<Option<T>>(Method::GET, path, auth_token, &[], None).await
    }

    /// Children of `collection` whose `field` equals `value`, keyed by child key.
    ///
    /// Children are returned undecoded so callers can skip malformed records
    /// one at a time.
    pub async fn query_equal_to(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        auth_token: Option<&str>,
    ) -> Result<HashMap<String, Value>, StoreError> {
        // Both parameters are JSON literals, so ids are quoted and escaped.
        let query = [
            ("orderBy", serde_json::to_string(field)?),
            ("equalTo", serde_json::to_string(value)?),
        ];

        let result: Option<HashMap<String, Value>> = self
            .request(Method::GET, collection, auth_token, &query, None)
            .await?;

        Ok(result.unwrap_or_default())
    }

    /// Overwrite the node at `path`.
    pub async fn set(&self, path: &str, value: Value, auth_token: Option<&str>) -> Result<(), StoreError> {
        let _: Value = self
            .request(Method::PUT, path, auth_token, &[], Some(value))
            .await?;
        Ok(())
    }

    /// Merge `fields` into the node at `path`, leaving other children untouched.
    pub async fn update(&self, path: &str, fields: Value, auth_token: Option<&str>) -> Result<(), StoreError> {
        let _: Value = self
            .request(Method::PATCH, path, auth_token, &[], Some(fields))
            .await?;
        Ok(())
    }

    /// Append a child under `collection` and return its generated key.
    pub async fn push(&self, collection: &str, value: Value, auth_token: Option<&str>) -> Result<String, StoreError> {
        let response: PushResponse = self
            .request(Method::POST, collection, auth_token, &[], Some(value))
            .await?;
        debug!("Pushed new child {} under {}", response.name, collection);
        Ok(response.name)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
