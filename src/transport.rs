//! The single HTTP boundary between adapters and the network.
//!
//! Adapters describe a call (URL, headers, JSON body) and get back either a
//! buffered JSON value or a normalized byte stream; every non-2xx response
//! surfaces as [`Error::Upstream`] with the parsed error body. Stream
//! representation is normalized here once, never in adapters. Dropping a
//! returned stream aborts the in-flight request.

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use reqwest::Client;
use serde_json::Value;

use crate::Error;

/// A normalized readable chunk source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// HTTP transport shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client })
    }

    fn build(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.json(body)
    }

    /// Issue one call and buffer the JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<Value, Error> {
        let response = self.build(url, headers, body).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Issue one call and return the raw response byte stream.
    pub async fn post_stream(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<ByteStream, Error> {
        let response = self.build(url, headers, body).send().await?;
        let response = check_status(response).await?;
        Ok(Box::pin(response.bytes_stream()))
    }
}

/// Turn a non-2xx response into a uniform upstream error carrying the status
/// and the parsed error body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Err(Error::upstream(status.as_u16(), body))
}
