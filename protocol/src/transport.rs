//! # Outbound Transport
//!
//! The one seam through which the protocol talks to other parties: GET an
//! Authority document, POST a request body. Production code uses
//! [`HttpsTransport`]; tests plug in an in-memory router.
//!
//! Every call is bounded by [`REQUEST_TIMEOUT`]. Nothing here retries. A
//! timeout, a refused connection or a non-success status is a transport
//! error and the transaction ends there.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use crate::config::{JSON_CONTENT_TYPE, REQUEST_TIMEOUT};
use crate::PaymentError;

/// A raw HTTP answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response with the protocol media type.
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            body,
        }
    }

    /// The body, provided the status is 200 and the content type is exactly
    /// the protocol media type.
    pub fn into_json_body(self, url: &str) -> Result<Vec<u8>, PaymentError> {
        if self.status != 200 {
            return Err(PaymentError::Transport(format!(
                "{url} answered with HTTP {}",
                self.status
            )));
        }
        match self.content_type.as_deref() {
            Some(JSON_CONTENT_TYPE) => Ok(self.body),
            other => Err(PaymentError::Transport(format!(
                "Content-Type must be \"{JSON_CONTENT_TYPE}\", found: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

/// GET and POST, nothing else.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, PaymentError>;
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, PaymentError>;
}

/// reqwest-backed HTTPS client with the protocol timeout baked in.
#[derive(Clone, Debug)]
pub struct HttpsTransport {
    client: Client,
}

impl HttpsTransport {
    pub fn new() -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn collect(url: &str, response: reqwest::Response) -> Result<HttpResponse, PaymentError> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?
            .to_vec();
        debug!(url, status, bytes = body.len(), "received response");
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, PaymentError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        Self::collect(url, response).await
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, PaymentError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        Self::collect(url, response).await
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::Transport(format!(
            "{url} timed out after {} ms",
            REQUEST_TIMEOUT.as_millis()
        ))
    } else if e.is_connect() {
        PaymentError::Transport(format!("cannot connect to {url}"))
    } else {
        PaymentError::Transport(format!("{url}: {e}"))
    }
}
