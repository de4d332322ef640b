//! Decoding of server-sent-event style completion streams.
//!
//! Vendors emit newline-delimited `data: <json>` lines and terminate with a
//! `[DONE]` sentinel. [`decode_data_lines`] handles one text fragment in
//! isolation; [`SseJsonStream`] wraps a byte stream and carries a trailing
//! partial line across fragment boundaries so no event is lost when the
//! transport splits a line mid-event.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::Error;

/// Marker that prefixes every event payload line.
const DATA_MARKER: &str = "data:";

/// Sentinel payload signalling end of stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Upper bound on buffered bytes without a newline.
const MAX_BUFFER: usize = 1_000_000;

enum LineOutcome {
    Event(Value),
    Done,
    Skip,
}

fn decode_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if !trimmed.starts_with(DATA_MARKER) {
        return LineOutcome::Skip;
    }
    let payload = trimmed[DATA_MARKER.len()..].trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }
    match serde_json::from_str(payload) {
        Ok(value) => LineOutcome::Event(value),
        Err(error) => {
            // Best-effort policy: a malformed line is skipped, the stream
            // continues.
            tracing::debug!(%error, line = payload, "skipping malformed stream event line");
            LineOutcome::Skip
        }
    }
}

/// Decode one text fragment into parsed JSON event objects.
///
/// Keeps only `data:`-prefixed lines, stops the whole fragment at the
/// `[DONE]` sentinel, and skips lines that do not parse as JSON. Stateless:
/// callers that may receive a line split across fragments use
/// [`SseJsonStream`] instead.
pub fn decode_data_lines(fragment: &str) -> Vec<Value> {
    let mut events = Vec::new();
    for line in fragment.lines() {
        match decode_line(line) {
            LineOutcome::Event(value) => events.push(value),
            LineOutcome::Done => break,
            LineOutcome::Skip => {}
        }
    }
    events
}

/// A stream adapter that decodes `data:` lines from a byte stream.
///
/// Buffers incomplete trailing lines (including UTF-8 sequences split across
/// chunks) until the closing newline arrives, and fuses after the sentinel.
pub struct SseJsonStream<S> {
    inner: S,
    buffer: Vec<u8>,
    events: VecDeque<Value>,
    done: bool,
}

impl<S> SseJsonStream<S> {
    /// Create a new decoding stream over a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
            done: false,
        }
    }

    /// Decode every complete line currently in the buffer.
    ///
    /// Splitting at the last newline keeps any partial trailing line (and any
    /// partial UTF-8 sequence) buffered for the next fragment.
    fn drain_complete_lines(&mut self) -> Result<(), Error> {
        let Some(last_newline) = memchr::memrchr(b'\n', &self.buffer) else {
            return Ok(());
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        let text = std::str::from_utf8(&complete)
            .map_err(|e| Error::streaming(format!("invalid UTF-8 in event stream: {e}")))?;

        for line in text.lines() {
            match decode_line(line) {
                LineOutcome::Event(value) => self.events.push_back(value),
                LineOutcome::Done => {
                    self.done = true;
                    break;
                }
                LineOutcome::Skip => {}
            }
        }
        Ok(())
    }
}

impl<S, E> Stream for SseJsonStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<Value, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // Yield already-decoded events first (FIFO order).
            if let Some(value) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }

            if self.done {
                return Poll::Ready(None);
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::streaming(format!(
                        "stream error: {}",
                        e.into()
                    )))));
                }
                None => {
                    // Stream ended without the sentinel: decode a final
                    // unterminated line rather than dropping it.
                    if !self.buffer.is_empty() {
                        let remainder = std::mem::take(&mut self.buffer);
                        if let Ok(text) = std::str::from_utf8(&remainder) {
                            if let LineOutcome::Event(value) = decode_line(text) {
                                return Poll::Ready(Some(Ok(value)));
                            }
                        }
                    }
                    return Poll::Ready(None);
                }
            };

            self.buffer.extend_from_slice(&chunk);

            if self.buffer.len() > MAX_BUFFER {
                self.buffer.clear();
                return Poll::Ready(Some(Err(Error::streaming(
                    "event stream buffer exceeded maximum size",
                ))));
            }

            if let Err(e) = self.drain_complete_lines() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

/// Extension trait to decode byte streams as JSON event streams.
pub trait SseJsonStreamExt: Stream {
    fn sse_json(self) -> SseJsonStream<Self>
    where
        Self: Sized,
    {
        SseJsonStream::new(self)
    }
}

impl<S: Stream> SseJsonStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    #[test]
    fn test_decode_stops_at_sentinel() {
        let fragment = "data: {\"a\":1}\n\ndata: {\"a\":2}\ndata: [DONE]\ndata: {\"a\":3}\n";
        let events = decode_data_lines(fragment);
        assert_eq!(events, vec![json!({"a":1}), json!({"a":2})]);
    }

    #[test]
    fn test_decode_skips_malformed_lines() {
        let fragment = "data: {\"n\":1}\ndata: {\"n\":2}\ndata: {\"n\":3}\ndata: {oops\ndata: {\"n\":4}\ndata: {\"n\":5}\n";
        let events = decode_data_lines(fragment);
        assert_eq!(
            events,
            vec![
                json!({"n":1}),
                json!({"n":2}),
                json!({"n":3}),
                json!({"n":4}),
                json!({"n":5})
            ]
        );
    }

    #[test]
    fn test_decode_ignores_non_data_lines() {
        let fragment = ": comment\nevent: message\ndata: {\"ok\":true}\n";
        let events = decode_data_lines(fragment);
        assert_eq!(events, vec![json!({"ok":true})]);
    }

    #[tokio::test]
    async fn test_stream_buffers_split_lines() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from("data: {\"part\"")),
            Ok(bytes::Bytes::from(": 1}\ndata: {\"part\": 2}\n")),
        ];
        let mut events = stream::iter(chunks).sse_json();

        assert_eq!(events.next().await.unwrap().unwrap(), json!({"part": 1}));
        assert_eq!(events.next().await.unwrap().unwrap(), json!({"part": 2}));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_fuses_after_sentinel() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from("data: {\"n\": 1}\ndata: [DONE]\n")),
            Ok(bytes::Bytes::from("data: {\"n\": 2}\n")),
        ];
        let mut events = stream::iter(chunks).sse_json();

        assert_eq!(events.next().await.unwrap().unwrap(), json!({"n": 1}));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_utf8_split_across_chunks() {
        // Euro sign is three bytes starting at offset 16; split it mid-char.
        let bytes = "data: {\"text\": \"€\"}\n".as_bytes();
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&bytes[..17])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[17..])),
        ];
        let mut events = stream::iter(chunks).sse_json();

        assert_eq!(
            events.next().await.unwrap().unwrap(),
            json!({"text": "€"})
        );
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_final_line_without_newline() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> =
            vec![Ok(bytes::Bytes::from("data: {\"tail\": true}"))];
        let mut events = stream::iter(chunks).sse_json();

        assert_eq!(events.next().await.unwrap().unwrap(), json!({"tail": true}));
        assert!(events.next().await.is_none());
    }
}
