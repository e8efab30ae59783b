use crate::error::{LlmError, Result};
use bytes::Bytes;
use futures_util::Stream;
use futures_util::StreamExt;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    Other,
}

/// Splits a byte stream into server-sent events. A trailing event without the
/// terminating blank line is still emitted when the body ends.
pub(crate) fn decode_sse<S>(bytes_stream: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures_util::stream::unfold(
        (bytes_stream, String::new(), false),
        |(mut stream, mut buffer, mut ended)| async move {
            loop {
                if let Some(idx) = buffer.find("\n\n") {
                    let raw = buffer[..idx].to_string();
                    buffer = buffer[idx + 2..].to_string();
                    return Some((Ok(parse_event(&raw)), (stream, buffer, ended)));
                }

                if ended {
                    if buffer.trim().is_empty() {
                        return None;
                    }
                    let raw = std::mem::take(&mut buffer);
                    return Some((Ok(parse_event(&raw)), (stream, buffer, ended)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        if buffer.contains('\r') {
                            buffer = buffer.replace("\r\n", "\n");
                        }
                        continue;
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(LlmError::Http(e.to_string())),
                            (stream, buffer, ended),
                        ));
                    }
                    None => {
                        ended = true;
                        continue;
                    }
                }
            }
        },
    )
}

fn parse_event(raw: &str) -> SseEvent {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if data_lines.is_empty() {
        return SseEvent::Other;
    }
    SseEvent::Data(data_lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_joins_multiline_data() {
        assert_eq!(
            parse_event("event: message\ndata: a\ndata: b"),
            SseEvent::Data("a\nb".to_string())
        );
        assert_eq!(parse_event(": keepalive"), SseEvent::Other);
    }
}
