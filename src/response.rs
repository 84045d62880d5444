use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, Method, StatusCode, Version};
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, timeout_at};

use crate::body::{read_all_body_limited, read_body_prefix};
use crate::context::RequestContext;
use crate::error::Error;

/// What a response body read stays bound to after the headers arrive.
#[derive(Clone, Debug)]
pub(crate) struct CallBounds {
    pub(crate) ctx: RequestContext,
    pub(crate) deadline: Option<Instant>,
    pub(crate) timeout: Duration,
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) max_response_body_bytes: usize,
}

/// Unprocessed response of [`crate::request_raw`].
///
/// The status is never classified here. The body is still on the wire: read
/// it with [`RawResponse::bytes`] (or `text`/`json`), which remain bound to
/// the caller's context and to what is left of the configured timeout, or
/// take it with [`RawResponse::into_body`]. Dropping the value releases the
/// connection.
#[derive(Debug)]
pub struct RawResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Incoming,
    bounds: CallBounds,
}

impl RawResponse {
    pub(crate) fn new(parts: Parts, body: Incoming, bounds: CallBounds) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            bounds,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn method(&self) -> &Method {
        &self.bounds.method
    }

    /// Request uri with credentials and query removed.
    pub fn uri(&self) -> &str {
        &self.bounds.uri
    }

    pub(crate) fn max_response_body_bytes(&self) -> usize {
        self.bounds.max_response_body_bytes
    }

    pub fn into_body(self) -> Incoming {
        self.body
    }

    pub async fn bytes(self) -> crate::Result<Bytes> {
        let (_, _, body) = self.collect().await?;
        Ok(body)
    }

    pub async fn text(self) -> crate::Result<String> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Typed decoding of this response; see [`crate::request`].
    pub async fn json<T>(self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        crate::decode::decode_json(self).await
    }

    pub(crate) async fn collect(self) -> crate::Result<(StatusCode, HeaderMap, Bytes)> {
        let max_bytes = self.bounds.max_response_body_bytes;
        self.read_bounded(|body| async move {
            read_all_body_limited(body, max_bytes)
                .await
                .map_err(|error| error.into_error(max_bytes))
        })
        .await
    }

    /// Like `collect`, but a body over the limit is cut to the limit instead
    /// of failing.
    pub(crate) async fn collect_prefix(self) -> crate::Result<(StatusCode, HeaderMap, Bytes)> {
        let max_bytes = self.bounds.max_response_body_bytes;
        self.read_bounded(|body| async move {
            read_body_prefix(body, max_bytes)
                .await
                .map_err(|source| Error::ReadBody {
                    source: Box::new(source),
                })
        })
        .await
    }

    async fn read_bounded<F, Fut>(self, read: F) -> crate::Result<(StatusCode, HeaderMap, Bytes)>
    where
        F: FnOnce(Incoming) -> Fut,
        Fut: Future<Output = crate::Result<Bytes>>,
    {
        let Self {
            status,
            headers,
            body,
            bounds,
            ..
        } = self;
        let read = read(body);
        let bounded = async {
            match bounds.deadline {
                Some(deadline) => timeout_at(deadline, read).await.ok(),
                None => Some(read.await),
            }
        };

        match bounds.ctx.run(bounded).await {
            Err(error) => Err(error.into()),
            Ok(None) => Err(Error::Timeout {
                timeout_ms: bounds.timeout.as_millis(),
                method: bounds.method.clone(),
                uri: bounds.uri.clone(),
            }),
            Ok(Some(result)) => result.map(|bytes| (status, headers, bytes)),
        }
    }
}
