use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;

use crate::config::RequestBody;
use crate::error::Error;

pub(crate) type ReqBody = Full<Bytes>;

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
) -> Result<Request<ReqBody>, Error> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(body.into_bytes()))
        .map_err(|source| Error::RequestBuild { source })?;
    *request.headers_mut() = headers;
    Ok(request)
}

pub(crate) enum ReadBodyError {
    Read(hyper::Error),
    TooLarge { actual_bytes: usize },
}

impl ReadBodyError {
    pub(crate) fn into_error(self, max_bytes: usize) -> Error {
        match self {
            Self::Read(source) => Error::ReadBody {
                source: Box::new(source),
            },
            Self::TooLarge { actual_bytes } => Error::ResponseBodyTooLarge {
                limit_bytes: max_bytes,
                actual_bytes,
            },
        }
    }
}

pub(crate) async fn read_all_body_limited(
    mut body: Incoming,
    max_bytes: usize,
) -> Result<Bytes, ReadBodyError> {
    let mut collected = Vec::new();
    let mut total_len = 0_usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ReadBodyError::Read)?;
        if let Some(data) = frame.data_ref() {
            total_len = total_len.saturating_add(data.len());
            if total_len > max_bytes {
                return Err(ReadBodyError::TooLarge {
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

/// Keeps at most `max_bytes` of the body and drops the rest.
pub(crate) async fn read_body_prefix(
    mut body: Incoming,
    max_bytes: usize,
) -> Result<Bytes, hyper::Error> {
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(data) = frame.data_ref() {
            let room = max_bytes.saturating_sub(collected.len());
            collected.extend_from_slice(&data[..data.len().min(room)]);
            if collected.len() >= max_bytes {
                break;
            }
        }
    }

    Ok(Bytes::from(collected))
}
