// Catalog query HTTP client
//
// The catalog endpoint accepts an opaque query document and answers with
// `{ "data": {...}, "errors": [...] }`. Query construction is the caller's
// business; this client only moves the request and unwraps the envelope.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

#[derive(Debug, Serialize)]
struct CatalogRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<CatalogErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogErrorEntry {
    message: String,
}

/// HTTP client for the catalog query endpoint.
pub struct CatalogClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl CatalogClient {
    /// Create a catalog client from a `TransportConfig`.
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            endpoint,
            timeout: transport.timeout,
        })
    }

    /// Create a catalog client with a pre-built `reqwest::Client`. Requests
    /// use the default transport timeout unless [`with_timeout`](Self::with_timeout)
    /// says otherwise.
    pub fn from_reqwest(endpoint: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            timeout: TransportConfig::default().timeout,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The endpoint queries are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Run a query and return the response's `data` member.
    ///
    /// A non-empty `errors` list fails the whole query, even when partial
    /// data came back with it.
    pub async fn query(&self, query: &str) -> Result<Value, Error> {
        self.query_with_variables(query, None).await
    }

    /// Run a query with a variables object.
    pub async fn query_with_variables(
        &self,
        query: &str,
        variables: Option<&Value>,
    ) -> Result<Value, Error> {
        debug!(endpoint = %self.endpoint, "catalog query");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&CatalogRequest { query, variables })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?
            .error_for_status()?;

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: CatalogResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if !parsed.errors.is_empty() {
            return Err(Error::Catalog {
                messages: parsed.errors.into_iter().map(|e| e.message).collect(),
            });
        }

        Ok(parsed.data.unwrap_or(Value::Null))
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout: self.timeout,
            }
        } else {
            Error::Transport(err)
        }
    }
}
