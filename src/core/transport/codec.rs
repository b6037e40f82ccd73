//! Frame codec for the stdio transport.
//!
//! The reader turns input bytes into [`Decoded`] values and never gives up on
//! the stream because of one bad frame: it skips to the next frame boundary
//! and reports where parsing failed. The writer emits each response with a
//! single buffered write followed by a flush.

use std::fmt;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::config::Framing;
use super::error::{TransportError, TransportResult};
use crate::core::protocol::{Request, RequestId, Response};

/// Header lines longer than this are treated as garbage.
const MAX_HEADER_LINE_BYTES: usize = 1024;

// ============================================================================
// Decoding results
// ============================================================================

/// Where in the input stream a frame started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLocation {
    /// 1-based line number (line framing).
    Line(u64),
    /// 1-based frame ordinal (length framing).
    Frame(u64),
}

/// A frame that could not be turned into a request.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub location: FrameLocation,
    /// Byte offset of the first byte of the frame.
    pub offset: u64,
    /// Column reported by the JSON parser, when the body was parsed.
    pub column: Option<usize>,
    pub reason: String,
    /// Present when the frame was valid JSON carrying a usable id.
    pub id: Option<RequestId>,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            FrameLocation::Line(line) => write!(f, "line {}", line)?,
            FrameLocation::Frame(index) => write!(f, "frame {}", index)?,
        }
        write!(f, " (byte offset {})", self.offset)?;
        if let Some(column) = self.column {
            write!(f, ", column {}", column)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Outcome of one [`FrameReader::decode_next`] call.
#[derive(Debug)]
pub enum Decoded {
    Request(Request),
    Malformed(DecodeError),
    EndOfStream,
}

struct RawLine {
    bytes: Vec<u8>,
    offset: u64,
    overflow: bool,
}

// ============================================================================
// Reader
// ============================================================================

/// Reads framed requests from a buffered input stream.
pub struct FrameReader<R> {
    reader: R,
    framing: Framing,
    max_frame_bytes: usize,
    offset: u64,
    lines: u64,
    frames: u64,
}

impl<R> FrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, framing: Framing, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            framing,
            max_frame_bytes,
            offset: 0,
            lines: 0,
            frames: 0,
        }
    }

    /// Total bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Wait for the next complete frame or the end of the stream.
    pub async fn decode_next(&mut self) -> TransportResult<Decoded> {
        match self.framing {
            Framing::Line => self.decode_line().await,
            Framing::ContentLength => self.decode_content_length().await,
        }
    }

    async fn decode_line(&mut self) -> TransportResult<Decoded> {
        loop {
            let Some(line) = self.read_line(self.max_frame_bytes).await? else {
                return Ok(Decoded::EndOfStream);
            };
            let location = FrameLocation::Line(self.lines);

            if line.overflow {
                return Ok(Decoded::Malformed(DecodeError {
                    location,
                    offset: line.offset,
                    column: None,
                    reason: format!("frame exceeds {} bytes", self.max_frame_bytes),
                    id: None,
                }));
            }

            if line.bytes.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            return Ok(parse_frame(&line.bytes, location, line.offset));
        }
    }

    async fn decode_content_length(&mut self) -> TransportResult<Decoded> {
        let mut content_length: Option<usize> = None;
        let mut header_error: Option<String> = None;
        let mut start: Option<u64> = None;

        loop {
            let Some(line) = self.read_line(MAX_HEADER_LINE_BYTES).await? else {
                if let Some(offset) = start {
                    self.frames += 1;
                    return Ok(Decoded::Malformed(DecodeError {
                        location: FrameLocation::Frame(self.frames),
                        offset,
                        column: None,
                        reason: "stream ended inside a header block".to_string(),
                        id: None,
                    }));
                }
                return Ok(Decoded::EndOfStream);
            };

            if line.overflow {
                start.get_or_insert(line.offset);
                header_error = Some("header line too long".to_string());
                continue;
            }

            let text = String::from_utf8_lossy(&line.bytes);
            let text = text.trim();
            if text.is_empty() {
                if start.is_some() {
                    break;
                }
                continue;
            }
            start.get_or_insert(line.offset);

            match text.split_once(':') {
                Some((name, value)) if name.trim().eq_ignore_ascii_case("content-length") => {
                    match value.trim().parse::<usize>() {
                        Ok(n) => content_length = Some(n),
                        Err(_) => {
                            header_error =
                                Some(format!("invalid Content-Length value {:?}", value.trim()))
                        }
                    }
                }
                Some(_) => {}
                None => header_error = Some(format!("malformed header line {:?}", text)),
            }
        }

        self.frames += 1;
        let location = FrameLocation::Frame(self.frames);
        let offset = start.unwrap_or(self.offset);
        let malformed = |reason: String| {
            Decoded::Malformed(DecodeError {
                location,
                offset,
                column: None,
                reason,
                id: None,
            })
        };

        if let Some(reason) = header_error {
            return Ok(malformed(reason));
        }
        let Some(length) = content_length else {
            return Ok(malformed("missing Content-Length header".to_string()));
        };

        if length > self.max_frame_bytes {
            let skipped = self.discard(length).await?;
            if skipped < length as u64 {
                return Ok(malformed("stream ended inside a frame body".to_string()));
            }
            return Ok(malformed(format!(
                "frame exceeds {} bytes",
                self.max_frame_bytes
            )));
        }

        let mut body = vec![0u8; length];
        match self.reader.read_exact(&mut body).await {
            Ok(_) => self.offset += length as u64,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(malformed("stream ended inside a frame body".to_string()));
            }
            Err(e) => return Err(TransportError::Read(e)),
        }

        Ok(parse_frame(&body, location, offset))
    }

    /// Read one line, keeping at most `limit` bytes of it.
    ///
    /// Over-long lines are consumed to their end and flagged, which is how
    /// the reader resynchronizes on the next line.
    async fn read_line(&mut self, limit: usize) -> TransportResult<Option<RawLine>> {
        let offset = self.offset;
        let mut bytes = Vec::new();
        let mut overflow = false;
        let mut saw_input = false;

        loop {
            let available = self.reader.fill_buf().await.map_err(TransportError::Read)?;
            if available.is_empty() {
                if !saw_input {
                    return Ok(None);
                }
                break;
            }
            saw_input = true;

            let (used, done) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            if !overflow {
                bytes.extend_from_slice(&available[..used]);
                // Allow for the trailing "\r\n".
                if bytes.len() > limit.saturating_add(2) {
                    overflow = true;
                    bytes = Vec::new();
                }
            }

            self.reader.consume(used);
            self.offset += used as u64;

            if done {
                break;
            }
        }

        self.lines += 1;
        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }

        Ok(Some(RawLine {
            bytes,
            offset,
            overflow,
        }))
    }

    async fn discard(&mut self, length: usize) -> TransportResult<u64> {
        let mut limited = (&mut self.reader).take(length as u64);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink())
            .await
            .map_err(TransportError::Read)?;
        self.offset += skipped;
        Ok(skipped)
    }
}

fn parse_frame(bytes: &[u8], location: FrameLocation, offset: u64) -> Decoded {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            return Decoded::Malformed(DecodeError {
                location,
                offset,
                column: Some(e.column()),
                reason: format!("invalid JSON: {}", e),
                id: None,
            });
        }
    };

    match Request::from_value(value) {
        Ok(request) => Decoded::Request(request),
        Err((id, reason)) => Decoded::Malformed(DecodeError {
            location,
            offset,
            column: None,
            reason,
            id,
        }),
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Serialize a response into one complete frame.
pub fn encode_frame(response: &Response, framing: Framing) -> TransportResult<Vec<u8>> {
    let body = serde_json::to_vec(response)?;
    let frame = match framing {
        Framing::Line => {
            let mut frame = body;
            frame.push(b'\n');
            frame
        }
        Framing::ContentLength => {
            let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
            frame.extend_from_slice(&body);
            frame
        }
    };
    Ok(frame)
}

/// Writes encoded responses to the output stream.
///
/// Not shareable on purpose: the session gives it to exactly one writer task.
pub struct FrameWriter<W> {
    writer: W,
    framing: Framing,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, framing: Framing) -> Self {
        Self { writer, framing }
    }

    /// Encode and write one response.
    pub async fn encode(&mut self, response: &Response) -> TransportResult<()> {
        let frame = encode_frame(response, self.framing)?;
        self.writer
            .write_all(&frame)
            .await
            .map_err(TransportError::Write)?;
        self.writer.flush().await.map_err(TransportError::Write)
    }

    pub async fn shutdown(&mut self) -> TransportResult<()> {
        self.writer.flush().await.map_err(TransportError::Write)
    }
}

/// Parse a captured output stream back into responses.
///
/// This is the host side of the codec, used to check what the server wrote.
pub fn decode_responses(bytes: &[u8], framing: Framing) -> TransportResult<Vec<Response>> {
    let mut responses = Vec::new();
    match framing {
        Framing::Line => {
            for line in bytes.split(|b| *b == b'\n') {
                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                responses.push(serde_json::from_slice(line)?);
            }
        }
        Framing::ContentLength => {
            let mut rest = bytes;
            while !rest.is_empty() {
                let header_end = rest
                    .windows(4)
                    .position(|w| w == b"\r\n\r\n")
                    .ok_or_else(|| TransportError::protocol("unterminated header block"))?;
                let headers = String::from_utf8_lossy(&rest[..header_end]);
                let length = headers
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.trim()
                            .eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .ok_or_else(|| TransportError::protocol("missing Content-Length"))?;
                let body_start = header_end + 4;
                let body_end = body_start + length;
                if body_end > rest.len() {
                    return Err(TransportError::protocol("truncated frame body"));
                }
                responses.push(serde_json::from_slice(&rest[body_start..body_end])?);
                rest = &rest[body_end..];
            }
        }
    }
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{ErrorCode, Method};
    use serde_json::json;

    async fn decode_all(input: &[u8], framing: Framing, max: usize) -> Vec<Decoded> {
        let mut reader = FrameReader::new(input, framing, max);
        let mut out = Vec::new();
        loop {
            match reader.decode_next().await.unwrap() {
                Decoded::EndOfStream => break,
                other => out.push(other),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_line_frames_and_blank_lines() {
        let input = b"{\"id\":1,\"method\":\"ping\"}\n\n  \r\n{\"id\":\"b\",\"method\":\"list_tools\"}\r\n";
        let decoded = decode_all(input, Framing::Line, 1024).await;
        assert_eq!(decoded.len(), 2);
        match &decoded[1] {
            Decoded::Request(request) => {
                assert_eq!(request.id, RequestId::String("b".to_string()));
                assert_eq!(request.method, Method::ListTools);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let decoded = decode_all(b"{\"id\":1,\"method\":\"ping\"}", Framing::Line, 1024).await;
        assert!(matches!(decoded.as_slice(), [Decoded::Request(_)]));
    }

    #[tokio::test]
    async fn test_malformed_line_resyncs() {
        let input = b"{\"id\":1,\"method\":\"ping\"}\n{not json\n{\"id\":3,\"method\":\"ping\"}\n";
        let decoded = decode_all(input, Framing::Line, 1024).await;
        assert_eq!(decoded.len(), 3);
        match &decoded[1] {
            Decoded::Malformed(err) => {
                assert_eq!(err.location, FrameLocation::Line(2));
                assert_eq!(err.offset, 25);
                assert!(err.column.is_some());
                assert!(err.id.is_none());
                assert!(err.to_string().starts_with("line 2 (byte offset 25)"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(decoded[2], Decoded::Request(_)));
    }

    #[tokio::test]
    async fn test_valid_json_bad_shape_keeps_id() {
        let decoded = decode_all(b"{\"id\":9,\"params\":{}}\n", Framing::Line, 1024).await;
        match &decoded[0] {
            Decoded::Malformed(err) => assert_eq!(err.id, Some(RequestId::Number(9))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let mut input = Vec::new();
        input.extend_from_slice(format!("{{\"id\":1,\"method\":\"{}\"}}\n", "x".repeat(200)).as_bytes());
        input.extend_from_slice(b"{\"id\":2,\"method\":\"ping\"}\n");
        let decoded = decode_all(&input, Framing::Line, 64).await;
        assert_eq!(decoded.len(), 2);
        match &decoded[0] {
            Decoded::Malformed(err) => assert!(err.reason.contains("exceeds 64 bytes")),
            other => panic!("unexpected {:?}", other),
        }
        match &decoded[1] {
            Decoded::Request(request) => assert_eq!(request.id, RequestId::Number(2)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_content_length_frames() {
        let body1 = br#"{"id":1,"method":"ping"}"#;
        let body2 = br#"{"id":2,"method":"initialize"}"#;
        let mut input = Vec::new();
        input.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body1.len()).as_bytes());
        input.extend_from_slice(body1);
        input.extend_from_slice(
            format!("Content-Type: application/json\r\ncontent-length: {}\r\n\r\n", body2.len())
                .as_bytes(),
        );
        input.extend_from_slice(body2);

        let decoded = decode_all(&input, Framing::ContentLength, 1024).await;
        assert_eq!(decoded.len(), 2);
        match &decoded[1] {
            Decoded::Request(request) => assert_eq!(request.method, Method::Initialize),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_content_length_bad_header_resyncs() {
        let body = br#"{"id":5,"method":"ping"}"#;
        let mut input = Vec::new();
        input.extend_from_slice(b"Content-Length: abc\r\n\r\n");
        input.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        input.extend_from_slice(body);

        let decoded = decode_all(&input, Framing::ContentLength, 1024).await;
        assert_eq!(decoded.len(), 2);
        match &decoded[0] {
            Decoded::Malformed(err) => {
                assert_eq!(err.location, FrameLocation::Frame(1));
                assert!(err.reason.contains("invalid Content-Length"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(decoded[1], Decoded::Request(_)));
    }

    #[tokio::test]
    async fn test_content_length_oversized_body_is_discarded() {
        let big = format!(r#"{{"id":1,"method":"{}"}}"#, "y".repeat(100));
        let small = br#"{"id":2,"method":"ping"}"#;
        let mut input = Vec::new();
        input.extend_from_slice(format!("Content-Length: {}\r\n\r\n", big.len()).as_bytes());
        input.extend_from_slice(big.as_bytes());
        input.extend_from_slice(format!("Content-Length: {}\r\n\r\n", small.len()).as_bytes());
        input.extend_from_slice(small);

        let decoded = decode_all(&input, Framing::ContentLength, 64).await;
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Decoded::Malformed(_)));
        assert!(matches!(decoded[1], Decoded::Request(_)));
    }

    #[tokio::test]
    async fn test_content_length_truncated_body() {
        let input = b"Content-Length: 50\r\n\r\n{\"id\":1";
        let decoded = decode_all(input, Framing::ContentLength, 1024).await;
        match decoded.as_slice() {
            [Decoded::Malformed(err)] => assert!(err.reason.contains("ended inside")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_reader_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"id\":1,\"me")
            .read(b"thod\":\"ping\"}\n{\"id\":2,")
            .read(b"\"method\":\"ping\"}\n")
            .build();
        let mut reader = FrameReader::new(tokio::io::BufReader::new(mock), Framing::Line, 1024);

        for expected in [1, 2] {
            match reader.decode_next().await.unwrap() {
                Decoded::Request(request) => assert_eq!(request.id, RequestId::Number(expected)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            reader.decode_next().await.unwrap(),
            Decoded::EndOfStream
        ));
    }

    #[tokio::test]
    async fn test_writer_round_trip() {
        for framing in [Framing::Line, Framing::ContentLength] {
            let mut buffer = Vec::new();
            {
                let mut writer = FrameWriter::new(&mut buffer, framing);
                writer
                    .encode(&Response::success(RequestId::Number(1), json!({"text": "a\nb"})))
                    .await
                    .unwrap();
                writer
                    .encode(&Response::error(
                        Some(RequestId::from("z")),
                        ErrorCode::Timeout,
                        "slow",
                    ))
                    .await
                    .unwrap();
            }

            let responses = decode_responses(&buffer, framing).unwrap();
            assert_eq!(responses.len(), 2);
            assert_eq!(responses[0].result().unwrap()["text"], "a\nb");
            assert_eq!(responses[1].error_code(), Some(ErrorCode::Timeout));
        }
    }

    #[test]
    fn test_line_frame_is_single_line() {
        let frame = encode_frame(
            &Response::success(RequestId::Number(1), json!("multi\nline\ntext")),
            Framing::Line,
        )
        .unwrap();
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }
}
