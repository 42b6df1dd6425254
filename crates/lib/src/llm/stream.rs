//! Streamed reply: raw UTF-8 text chunks with no framing, joined in arrival order.

use crate::llm::BackendError;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

/// Incremental UTF-8 decoder. A code point split across two chunks is held back until the
/// rest arrives; invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(s) => {
                    out.push_str(s);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[start..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        // incomplete sequence at the end; wait for the next chunk
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Finite, non-restartable sequence of text fragments from one backend response.
pub struct ReplyStream {
    chunks: BoxStream<'static, Result<Vec<u8>, BackendError>>,
    decoder: Utf8ChunkDecoder,
    finished: bool,
}

impl ReplyStream {
    pub(crate) fn from_response(res: reqwest::Response) -> Self {
        Self::from_chunks(
            res.bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(BackendError::from)),
        )
    }

    /// Wrap any byte-chunk stream (used for transports other than reqwest, and in tests).
    pub fn from_chunks<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, BackendError>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            decoder: Utf8ChunkDecoder::default(),
            finished: false,
        }
    }

    /// Next decoded fragment; `None` once the transport is exhausted or has failed.
    pub async fn next_fragment(&mut self) -> Option<Result<String, BackendError>> {
        while !self.finished {
            match self.chunks.next().await {
                Some(Ok(bytes)) => {
                    let text = self.decoder.push(&bytes);
                    if !text.is_empty() {
                        return Some(Ok(text));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    let tail = self.decoder.finish();
                    if !tail.is_empty() {
                        return Some(Ok(tail));
                    }
                }
            }
        }
        None
    }

    /// Drain the stream into one string. A transport error anywhere discards the partial text.
    pub async fn into_text(mut self) -> Result<String, BackendError> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&[u8]]) -> ReplyStream {
        let items: Vec<Result<Vec<u8>, BackendError>> =
            parts.iter().map(|p| Ok(p.to_vec())).collect();
        ReplyStream::from_chunks(stream::iter(items))
    }

    #[tokio::test]
    async fn concatenates_in_arrival_order() {
        let s = chunks(&[&b"Hel"[..], &b"lo, "[..], &b"world"[..]]);
        assert_eq!(s.into_text().await.expect("text"), "Hello, world");
    }

    #[tokio::test]
    async fn code_point_split_across_chunks() {
        // "café" with the two bytes of 'é' in different chunks
        let s = chunks(&[&b"caf\xC3"[..], &b"\xA9!"[..]]);
        assert_eq!(s.into_text().await.expect("text"), "café!");
    }

    #[tokio::test]
    async fn invalid_bytes_become_replacement_char() {
        let s = chunks(&[&b"a\xFFb"[..]]);
        assert_eq!(s.into_text().await.expect("text"), "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn truncated_tail_is_flushed_lossy() {
        let s = chunks(&[&b"ok\xE2\x82"[..]]);
        assert_eq!(s.into_text().await.expect("text"), "ok\u{FFFD}");
    }

    #[tokio::test]
    async fn fragments_skip_empty_chunks() {
        let mut s = chunks(&[&b""[..], &b"one"[..], &b"\xF0\x9F"[..], &b"\x98\x80"[..]]);
        assert_eq!(s.next_fragment().await.expect("some").expect("ok"), "one");
        assert_eq!(s.next_fragment().await.expect("some").expect("ok"), "😀");
        assert!(s.next_fragment().await.is_none());
        assert!(s.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn transport_error_fails_whole_reply() {
        let items: Vec<Result<Vec<u8>, BackendError>> =
            vec![Ok(b"partial".to_vec()), Err(BackendError::Timeout)];
        let s = ReplyStream::from_chunks(stream::iter(items));
        assert!(matches!(s.into_text().await, Err(BackendError::Timeout)));
    }
}
