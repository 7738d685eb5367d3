//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, trace};

use crate::error::DriveError;
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, StreamingResponse,
};

/// Production transport built on a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with an idle limit of `timeout` on every read.
    ///
    /// Buffered requests are also capped at `timeout` end to end. Streamed
    /// downloads are not, so a large body only fails when the connection
    /// stalls.
    pub fn new(timeout: Duration) -> Result<Self, DriveError> {
        let client = reqwest::Client::builder()
            .read_timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("onedrive-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DriveError::config_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match request.body {
            RequestBody::Empty => {
                // Graph rejects body-less PUT/POST without an explicit length
                if matches!(request.method, Method::Put | Method::Post) {
                    builder = builder.header("Content-Length", "0");
                }
                builder
            }
            RequestBody::Bytes(data) => builder.body(data),
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, DriveError> {
        debug!("{:?} {}", request.method, request.url);

        let response = self.build(request).timeout(self.timeout).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        trace!("HTTP {} ({} bytes)", status, body.len());
        Ok(HttpResponse { status, headers, body })
    }

    async fn stream(&self, request: HttpRequest) -> Result<StreamingResponse, DriveError> {
        debug!("{:?} {} (streamed)", request.method, request.url);

        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(DriveError::from));

        Ok(StreamingResponse {
            status,
            content_length,
            body: Box::pin(body),
        })
    }
}
