//! `reqlet` is a small outbound HTTP helper for service-to-service calls.
//!
//! A call is described by a [`RequestConfig`] and runs under a
//! [`RequestContext`] that can cancel it or bound it by a deadline. Calls may
//! pass through a pluggable [`Throttle`] and an explicit forward proxy.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqlet::prelude::{RateThrottle, RequestConfig, RequestContext};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct CreateItemResponse {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = RequestContext::background().with_timeout(Duration::from_secs(10));
//!     let throttle = RateThrottle::new(Duration::from_millis(100), 5);
//!
//!     let config = RequestConfig::new()
//!         .with_endpoint("https://api.example.com/v1/items")
//!         .with_method("POST")
//!         .with_timeout(Duration::from_secs(3))
//!         .with_body(serde_json::json!({ "name": "demo" }))
//!         .try_header("X-Client", "my-service")?
//!         .with_throttle(throttle);
//!
//!     let created: CreateItemResponse = reqlet::request(&ctx, config).await?;
//!     println!("created id={}", created.id);
//!     Ok(())
//! }
//! ```
//!
//! # Defaults
//!
//! - Method `GET`, timeout of two seconds, no body, no throttle, no proxy.
//! - Only `GET`, `POST`, `PUT`, `PATCH` and `DELETE` are accepted.
//! - [`request`] treats any status of 400 or above as an error;
//!   [`request_raw`] never looks at the status.

mod body;
mod config;
mod content_encoding;
mod context;
mod decode;
mod error;
mod execute;
mod proxy;
mod rate_limit;
mod response;
mod throttle;
mod util;

pub use crate::config::{
    ALLOWED_METHODS, DEFAULT_MAX_RESPONSE_BODY_BYTES, DEFAULT_METHOD, DEFAULT_TIMEOUT, JsonBody,
    QueryParams, RequestConfig,
};
pub use crate::context::{ContextError, RequestContext};
pub use crate::decode::request;
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::execute::request_raw;
pub use crate::proxy::validate_proxy;
pub use crate::rate_limit::RateThrottle;
pub use crate::response::RawResponse;
pub use crate::throttle::{NoopThrottle, Throttle};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        ContextError, Error, ErrorCode, JsonBody, NoopThrottle, QueryParams, RateThrottle,
        RawResponse, RequestConfig, RequestContext, Result, Throttle, TransportErrorKind,
        request, request_raw, validate_proxy,
    };
}

#[cfg(test)]
mod tests;
