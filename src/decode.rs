use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::content_encoding::decode_content_encoded_body_limited;
use crate::context::RequestContext;
use crate::error::Error;
use crate::execute::request_raw;
use crate::response::RawResponse;
use crate::util::truncate_body;

/// Runs the request and decodes a JSON body into `T`.
///
/// Any status of 400 or above fails with [`Error::HttpStatus`] carrying the
/// code and body text. A `Content-Encoding` of exactly `br` is decompressed
/// before decoding. The response body is consumed on every path.
///
/// ```no_run
/// use reqlet::{RequestConfig, RequestContext};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Item {
///     id: String,
/// }
///
/// # async fn run() -> reqlet::Result<()> {
/// let ctx = RequestContext::background();
/// let item: Item = reqlet::request(
///     &ctx,
///     RequestConfig::new().with_endpoint("https://api.example.com/v1/items/1"),
/// )
/// .await?;
/// println!("{}", item.id);
/// # Ok(())
/// # }
/// ```
pub async fn request<T>(ctx: &RequestContext, config: RequestConfig) -> crate::Result<T>
where
    T: DeserializeOwned,
{
    let response = request_raw(ctx, config).await?;
    decode_json(response).await
}

pub(crate) async fn decode_json<T>(response: RawResponse) -> crate::Result<T>
where
    T: DeserializeOwned,
{
    let max_bytes = response.max_response_body_bytes();
    let status = response.status();

    if status.as_u16() >= 400 {
        let method = response.method().clone();
        let uri = response.uri().to_owned();
        // an error body over the limit is cut, the status still wins
        let body = match response.collect_prefix().await {
            Ok((_, _, body)) => String::from_utf8_lossy(&body).into_owned(),
            Err(Error::ReadBody { source }) => {
                debug!(error = %source, "failed to read error response body");
                String::new()
            }
            Err(error) => return Err(error),
        };
        warn!(
            status = status.as_u16(),
            method = %method,
            uri = %uri,
            "http status error"
        );
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let (_, headers, body) = response.collect().await?;
    let body = decode_content_encoded_body_limited(body, &headers, max_bytes)
        .map_err(|error| error.into_error(max_bytes))?;
    debug!(status = status.as_u16(), body_len = body.len(), "decoding json response");
    serde_json::from_slice(&body).map_err(|source| Error::Deserialize {
        source,
        body: truncate_body(&body),
    })
}
