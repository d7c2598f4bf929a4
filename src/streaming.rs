//! Byte-stream relays from an upstream daemon to the HTTP caller.
//!
//! Chunks are forwarded as they arrive. When the caller disconnects, axum
//! drops the response body, which drops the upstream stream and closes its
//! connection.

use std::convert::Infallible;

use axum::body::StreamBody;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::upstream::ollama::OllamaReply;
use crate::upstream::ByteStream;

pub const DONE_EVENT: &str = "data: [DONE]\n\n";

pub fn content_event(content: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", serde_json::json!({ "content": content })))
}

pub fn error_event(message: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", serde_json::json!({ "error": message })))
}

/// Splits a byte stream into newline-terminated lines. Works on raw bytes so
/// a multi-byte character split across chunks stays intact.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Complete, non-blank lines contained in the buffered input.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the upstream ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

enum LineEvent {
    Content(String),
    Skip,
    Done(Option<String>),
    Error(String),
}

fn decode_line(line: &str) -> LineEvent {
    match serde_json::from_str::<OllamaReply>(line) {
        Ok(reply) => {
            if let Some(err) = reply.error.clone() {
                return LineEvent::Error(err);
            }
            let content = reply.content();
            if reply.done {
                LineEvent::Done((!content.is_empty()).then(|| content.to_string()))
            } else if content.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Content(content.to_string())
            }
        }
        Err(e) => {
            tracing::warn!("skipping undecodable stream line: {}", e);
            LineEvent::Skip
        }
    }
}

/// Converts Ollama NDJSON into `data: {"content": ..}` events followed by
/// `data: [DONE]`. One event per upstream line, in upstream order.
pub fn ndjson_to_sse(upstream: ByteStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        let mut upstream = upstream;
        let mut decoder = LineDecoder::default();
        let mut pending: Vec<String> = Vec::new();

        'read: loop {
            let finished = match upstream.next().await {
                Some(Ok(chunk)) => {
                    pending.extend(decoder.push(&chunk));
                    false
                }
                Some(Err(e)) => {
                    tracing::error!("upstream stream failed: {:#}", e);
                    yield Ok(error_event(&e.to_string()));
                    return;
                }
                None => {
                    pending.extend(decoder.finish());
                    true
                }
            };

            for line in std::mem::take(&mut pending) {
                match decode_line(&line) {
                    LineEvent::Content(c) => yield Ok(content_event(&c)),
                    LineEvent::Done(last) => {
                        if let Some(c) = last {
                            yield Ok(content_event(&c));
                        }
                        break 'read;
                    }
                    LineEvent::Error(err) => {
                        yield Ok(error_event(&err));
                        return;
                    }
                    LineEvent::Skip => {}
                }
            }

            if finished {
                break;
            }
        }

        yield Ok(Bytes::from_static(DONE_EVENT.as_bytes()));
    }
}

/// Forwards upstream chunks verbatim. A transport error after the first byte
/// becomes an in-band error event.
pub fn passthrough(upstream: ByteStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        let mut upstream = upstream;
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => yield Ok(bytes),
                Err(e) => {
                    tracing::error!("upstream stream failed: {:#}", e);
                    yield Ok(error_event(&e.to_string()));
                    break;
                }
            }
        }
    }
}

pub fn event_stream_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut response = (StatusCode::OK, StreamBody::new(stream)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
