use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::Error;
use crate::throttle::Throttle;
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_METHOD: &str = "GET";
pub const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Query multi-map. Encoded in key order, values in insertion order.
pub type QueryParams = BTreeMap<String, Vec<String>>;

type EncodeJson = dyn Fn() -> Result<Vec<u8>, serde_json::Error> + Send + Sync;

/// A caller value whose JSON encoding is deferred until the request runs.
#[derive(Clone)]
pub struct JsonBody {
    encode: Arc<EncodeJson>,
}

impl JsonBody {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(move || serde_json::to_vec(&value)),
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        (self.encode)()
    }
}

impl fmt::Debug for JsonBody {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("JsonBody(..)")
    }
}

pub(crate) enum RequestBody {
    Empty,
    Buffered(Bytes),
}

impl RequestBody {
    pub(crate) fn is_present(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Buffered(bytes) => bytes,
        }
    }
}

/// Everything one outbound call needs.
///
/// Built from defaults (`GET`, a two second timeout, empty headers) and then
/// refined with `with_*` calls. Scalars are last-write-wins; `with_headers`
/// and `with_query_params` replace the whole field. Nothing is validated
/// here: method, endpoint, body and proxy are checked when the request runs,
/// so a misconfigured request that is never sent is not an error.
///
/// ```
/// use reqlet::{DEFAULT_TIMEOUT, RequestConfig};
///
/// let config = RequestConfig::new()
///     .with_endpoint("https://api.example.com/v1/items")
///     .with_method("POST")
///     .with_body(serde_json::json!({ "name": "demo" }));
/// assert_eq!(config.method(), "POST");
/// assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
/// ```
#[derive(Clone)]
pub struct RequestConfig {
    endpoint: String,
    method: String,
    body: Option<JsonBody>,
    body_marshalled: Option<Bytes>,
    headers: HeaderMap,
    query_params: QueryParams,
    timeout: Duration,
    throttle: Option<Arc<dyn Throttle>>,
    proxy: Option<String>,
    max_response_body_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: DEFAULT_METHOD.to_owned(),
            body: None,
            body_marshalled: None,
            headers: HeaderMap::new(),
            query_params: QueryParams::new(),
            timeout: DEFAULT_TIMEOUT,
            throttle: None,
            proxy: None,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets a value to be JSON-encoded when the request runs.
    pub fn with_body<T>(mut self, body: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Some(JsonBody::new(body));
        self
    }

    pub fn with_json_body(mut self, body: JsonBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets pre-encoded body bytes, sent as-is.
    pub fn with_body_marshalled(mut self, body: impl Into<Bytes>) -> Self {
        self.body_marshalled = Some(body.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends one header value, keeping any already configured for `name`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> crate::Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn with_query_params(mut self, query_params: QueryParams) -> Self {
        self.query_params = query_params;
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_throttle<T>(self, throttle: T) -> Self
    where
        T: Throttle + 'static,
    {
        self.with_throttle_arc(Arc::new(throttle))
    }

    /// Shares one throttle instance between many requests.
    pub fn with_throttle_arc(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_marshalled(&self) -> Option<&Bytes> {
        self.body_marshalled.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn throttle(&self) -> Option<&Arc<dyn Throttle>> {
        self.throttle.as_ref()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    pub(crate) fn resolve_body(&self) -> crate::Result<RequestBody> {
        match (&self.body, &self.body_marshalled) {
            (Some(_), Some(_)) => Err(Error::ConflictingBody),
            (Some(body), None) => {
                let encoded = body
                    .encode()
                    .map_err(|source| Error::Serialize { source })?;
                Ok(RequestBody::Buffered(Bytes::from(encoded)))
            }
            (None, Some(bytes)) => Ok(RequestBody::Buffered(bytes.clone())),
            (None, None) => Ok(RequestBody::Empty),
        }
    }

    pub(crate) fn encoded_query(&self) -> Option<String> {
        if self.query_params.is_empty() {
            return None;
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &self.query_params {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        let encoded = serializer.finish();
        // keys without values encode to nothing and must not clear the query
        (!encoded.is_empty()).then_some(encoded)
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RequestConfig")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("body_marshalled_len", &self.body_marshalled.as_ref().map(Bytes::len))
            .field("headers", &self.headers)
            .field("query_params", &self.query_params)
            .field("timeout", &self.timeout)
            .field("throttle", &self.throttle.is_some())
            .field("proxy", &self.proxy.as_deref().map(redact_uri_for_logs))
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .finish()
    }
}

pub(crate) fn is_allowed_method(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}
