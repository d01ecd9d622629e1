//! SSE plumbing for the streaming completion path.
//!
//! The wire format is chunked `data:` lines delimited by blank lines.
//! [`drain_data_lines`] pulls complete payloads out of a buffer in
//! place; [`sse_completion_stream`] turns a `reqwest::Response` plus a
//! payload parser into a [`BoxStream`] of completion events, flushing
//! the trailing partial block when the body closes and guaranteeing a
//! final `Done` event.

use cf_domain::stream::{BoxStream, CompletionEvent};
use cf_domain::{Error, Result};

/// Extract complete `data:` payloads from an SSE buffer.
///
/// Event blocks are delimited by `\n\n` and may carry `event:`, `id:`,
/// or `retry:` lines; only `data:` lines matter here. Consumed bytes
/// are removed; a trailing partial block stays for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // the \n\n delimiter

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
    }

    payloads
}

/// Build a completion-event stream from an SSE response body.
///
/// `parse_data` maps one `data:` payload to zero or more events. The
/// stream flushes the remaining buffer on body close and emits a
/// fallback `Done` if the parser never produced one.
pub(crate) fn sse_completion_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<CompletionEvent>>
where
    F: FnMut(&str) -> Vec<Result<CompletionEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for payload in drain_data_lines(&mut buffer) {
                        for event in parse_data(&payload) {
                            if matches!(&event, Ok(CompletionEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for payload in drain_data_lines(&mut buffer) {
                            for event in parse_data(&payload) {
                                if matches!(&event, Ok(CompletionEvent::Done { .. })) {
                                    done_emitted = true;
                                }
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::Http(e.to_string()));
                    break;
                }
            }
        }

        if !done_emitted {
            yield Ok(CompletionEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}
