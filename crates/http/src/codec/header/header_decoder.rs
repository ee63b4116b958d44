//! HTTP response head decoder
//!
//! Parses the status line and header fields of a response from raw bytes into a
//! [`ResponseHead`]. Field positions are recorded as byte ranges into the frozen head
//! block, so no header name or value is copied.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1 responses are accepted

use bytes::BytesMut;
use http::{Method, Version};
use httparse::{Error, Status as ParseStatus};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{FieldIndex, Header, MethodExt, ParseError, PayloadSize, ResponseHead, Status};

/// Maximum number of header fields allowed in a response head
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire response head
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP response heads implementing the [`Decoder`] trait.
///
/// Body framing is not decided here, see [`parse_payload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = ResponseHead;
    type Error = ParseError;

    /// Attempts to decode a response head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(head))` if a complete head was parsed and split off `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The number of headers exceeds `MAX_HEADER_NUM`
    /// - The head size exceeds `MAX_HEADER_BYTES`
    /// - The HTTP version is not supported or the status code is out of range
    /// - Headers contain invalid characters
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // need at least the status line "HTTP/1.1 200"
        if src.len() < 12 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut res = httparse::Response::new(&mut headers);

        let parsed_result = res.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            ParseStatus::Complete(head_size) => {
                trace!(head_size, "parsed response head");
                ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(head_size, MAX_HEADER_BYTES));

                let version = match res.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    // Currently HTTP/2 and HTTP/3 not supported
                    _ => return Err(ParseError::InvalidVersion(res.version)),
                };

                let code = res.code.ok_or_else(|| ParseError::invalid_header("missing status code"))?;
                let status = Status::with_reason(code, res.reason.unwrap_or_default())?;

                let fields = record_fields(src, res.headers);

                let block = src.split_to(head_size).freeze();
                Ok(Some(ResponseHead::new(version, status, Header::from_raw(block, fields))))
            }
            // If parsing incomplete, ensure current buffer size does not exceed limit
            ParseStatus::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Records the byte positions of header names and values relative to `bytes`.
fn record_fields(bytes: &[u8], headers: &[httparse::Header<'_>]) -> Vec<FieldIndex> {
    let bytes_ptr = bytes.as_ptr() as usize;
    headers
        .iter()
        .map(|header| {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            FieldIndex {
                name: name_start..name_start + header.name.len(),
                value: value_start..value_start + header.value.len(),
            }
        })
        .collect()
}

/// Determines how the body of `head` is framed, given the method of the request it answers.
///
/// Follows RFC 9112 section 6.3:
/// - no body for responses to HEAD, for 1xx, 204 and 304
/// - chunked if `transfer-encoding` ends with `chunked`
/// - fixed length if `content-length` is present
/// - otherwise the body runs until the connection closes
///
/// # Errors
///
/// Returns `ParseError` if:
/// - Both Content-Length and Transfer-Encoding headers are present
/// - Content-Length value is invalid
pub fn parse_payload(head: &ResponseHead, request_method: &Method) -> Result<PayloadSize, ParseError> {
    if !request_method.response_body_allowed() || !head.status().permits_response_body() {
        return Ok(PayloadSize::Empty);
    }

    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length
    let te_header = head.header().get_all(http::header::TRANSFER_ENCODING.as_str());
    let cl_header = head.header().get_all(http::header::CONTENT_LENGTH.as_str());

    match (te_header.is_empty(), cl_header.is_empty()) {
        (true, true) => Ok(PayloadSize::UntilClose),

        (false, true) => {
            if is_chunked(&te_header) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (true, false) => {
            let mut length = None;
            for cl_str in cl_header.iter().flat_map(|value| value.split(',')) {
                let parsed = cl_str
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ParseError::invalid_content_length(format!("value {cl_str} is not u64: {e}")))?;
                // repeated values are tolerated only when they agree
                match length {
                    Some(previous) if previous != parsed => {
                        return Err(ParseError::invalid_content_length("conflicting values"));
                    }
                    _ => length = Some(parsed),
                }
            }

            match length {
                Some(0) => Ok(PayloadSize::Empty),
                Some(length) => Ok(PayloadSize::Length(length)),
                None => Err(ParseError::invalid_content_length("empty value")),
            }
        }

        (false, false) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Checks if the Transfer-Encoding values indicate chunked encoding.
///
/// According to RFC 9112, chunked must be the last encoding if present.
fn is_chunked(values: &[&str]) -> bool {
    values
        .last()
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}
