//! Shared HTTP helper for upstream clients.
//!
//! Folds the send → status-check → JSON-decode sequence into one place so
//! every client surfaces non-2xx responses as [`YosoError::Upstream`] with
//! the raw body intact for classification.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use yoso_types::{YosoError, traits::Result};

#[derive(Clone)]
pub struct UpstreamHttp {
    http: Client,
}

impl UpstreamHttp {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Returns the inner client for building requests.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.http
    }

    /// Sends a request and checks for success status.
    ///
    /// # Errors
    ///
    /// Returns [`YosoError::Upstream`] on non-success status codes, or
    /// [`YosoError::Http`] if the request fails to send.
    pub async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(YosoError::Upstream {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Sends a request and decodes the JSON body.
    ///
    /// An empty success body decodes to `Value::Null`.
    ///
    /// # Errors
    ///
    /// Same as [`UpstreamHttp::send`], plus [`YosoError::Serialization`] on
    /// a malformed body.
    pub async fn send_json(&self, builder: RequestBuilder) -> Result<Value> {
        let resp = self.send(builder).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_http_clone() {
        let http = UpstreamHttp::new(Client::new());
        let copy = http.clone();
        let _ = copy.client();
    }
}
