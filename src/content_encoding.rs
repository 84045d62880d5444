use std::io::{self, Read};

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_ENCODING;

use crate::error::Error;

const BROTLI: &str = "br";
const BROTLI_BUFFER_SIZE: usize = 4096;

#[derive(Debug)]
pub(crate) enum DecodeContentEncodingError {
    Decode { encoding: String, message: String },
    TooLarge { actual_bytes: usize },
}

impl DecodeContentEncodingError {
    pub(crate) fn into_error(self, max_bytes: usize) -> Error {
        match self {
            Self::Decode { encoding, message } => Error::DecodeContentEncoding { encoding, message },
            Self::TooLarge { actual_bytes } => Error::ResponseBodyTooLarge {
                limit_bytes: max_bytes,
                actual_bytes,
            },
        }
    }
}

fn read_to_end_limited<R: Read>(
    reader: &mut R,
    encoding: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, DecodeContentEncodingError> {
    let mut decoded = Vec::new();
    let mut chunk = [0_u8; 8 * 1024];

    loop {
        let read = reader.read(&mut chunk).map_err(|error: io::Error| {
            DecodeContentEncodingError::Decode {
                encoding: encoding.to_owned(),
                message: error.to_string(),
            }
        })?;
        if read == 0 {
            break;
        }
        let next_size = decoded.len().saturating_add(read);
        if next_size > max_bytes {
            return Err(DecodeContentEncodingError::TooLarge {
                actual_bytes: next_size,
            });
        }
        decoded.extend_from_slice(&chunk[..read]);
    }

    Ok(decoded)
}

/// Only a `Content-Encoding` of exactly `br` is decoded; any other value,
/// including a list or different casing, leaves the body untouched.
pub(crate) fn is_brotli_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .is_some_and(|value| value.as_bytes() == BROTLI.as_bytes())
}

pub(crate) fn decode_brotli_limited(
    body: Bytes,
    max_bytes: usize,
) -> Result<Bytes, DecodeContentEncodingError> {
    let max_bytes = max_bytes.max(1);
    let mut decoder = brotli::Decompressor::new(body.as_ref(), BROTLI_BUFFER_SIZE);
    read_to_end_limited(&mut decoder, BROTLI, max_bytes).map(Bytes::from)
}

pub(crate) fn decode_content_encoded_body_limited(
    body: Bytes,
    headers: &HeaderMap,
    max_bytes: usize,
) -> Result<Bytes, DecodeContentEncodingError> {
    if !body.is_empty() && is_brotli_encoded(headers) {
        return decode_brotli_limited(body, max_bytes);
    }
    Ok(body)
}
