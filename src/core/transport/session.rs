//! One protocol session over a pair of byte streams.
//!
//! The read loop decodes frames and spawns one task per request. Responses
//! travel over a bounded channel to a single writer task, which owns the
//! output stream, so frames are written whole and never interleave. A
//! semaphore caps the number of requests in flight; with a cap of one,
//! requests are handled strictly in arrival order.
//!
//! The session ends when the input reaches end of stream: in-flight calls get
//! `shutdown_grace` to finish, the rest are cancelled and answer `cancelled`.
//! A failure to write the output stream ends the session with an error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::codec::{Decoded, FrameReader, FrameWriter};
use super::{TransportConfig, TransportError, TransportResult};
use crate::core::protocol::{ErrorCode, Response};
use crate::core::server::{ToolServer, panic_message};

/// Serve requests from `reader` until end of stream, writing responses to `writer`.
pub async fn serve<R, W>(
    server: Arc<ToolServer>,
    reader: R,
    writer: W,
    config: &TransportConfig,
) -> TransportResult<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let dispatch = server.config().dispatch.clone();
    let mut frames = FrameReader::new(BufReader::new(reader), config.framing, config.max_frame_bytes);

    let (responses, outbound) = mpsc::channel::<Response>(config.outbound_buffer.max(1));
    let writer_failed = CancellationToken::new();
    let writer_task = tokio::spawn(write_responses(
        FrameWriter::new(writer, config.framing),
        outbound,
        writer_failed.clone(),
    ));

    let shutdown = CancellationToken::new();
    let permits = Arc::new(Semaphore::new(dispatch.max_in_flight.max(1)));
    let mut tasks = JoinSet::new();

    info!(
        "Session started ({} framing, up to {} requests in flight)",
        config.framing.as_str(),
        dispatch.max_in_flight.max(1)
    );

    loop {
        // Reap finished tasks so the set does not grow with the session
        while tasks.try_join_next().is_some() {}

        let decoded = tokio::select! {
            decoded = frames.decode_next() => decoded,
            _ = writer_failed.cancelled() => break,
        };

        match decoded {
            Ok(Decoded::Request(request)) => {
                let Some(permit) = acquire(&permits, &writer_failed).await else {
                    break;
                };
                let server = server.clone();
                let responses = responses.clone();
                let shutdown = shutdown.clone();
                tasks.spawn(async move {
                    let id = request.id.clone();
                    let response = match AssertUnwindSafe(server.handle(request, &shutdown))
                        .catch_unwind()
                        .await
                    {
                        Ok(response) => response,
                        Err(payload) => {
                            let message = panic_message(payload);
                            error!(id = %id, "Request handling panicked: {}", message);
                            Response::error(Some(id), ErrorCode::InternalError, "internal server error")
                        }
                    };
                    // A closed channel means the writer failed; the session reports it
                    let _ = responses.send(response).await;
                    drop(permit);
                });
            }
            Ok(Decoded::Malformed(decode_error)) => {
                let Some(permit) = acquire(&permits, &writer_failed).await else {
                    break;
                };
                warn!("Discarding malformed frame: {}", decode_error);
                let response = Response::error(
                    decode_error.id.clone(),
                    ErrorCode::DecodeError,
                    decode_error.to_string(),
                );
                let sent = responses.send(response).await;
                drop(permit);
                if sent.is_err() {
                    break;
                }
            }
            Ok(Decoded::EndOfStream) => {
                debug!("Input reached end of stream at byte {}", frames.offset());
                break;
            }
            Err(e) => {
                warn!("Input stream failed, treating as end of stream: {}", e);
                break;
            }
        }
    }

    if writer_failed.is_cancelled() {
        shutdown.cancel();
        tasks.shutdown().await;
    } else {
        drain(&mut tasks, &shutdown, dispatch.shutdown_grace).await;
    }

    drop(responses);
    let result = writer_task
        .await
        .map_err(|e| TransportError::writer_stopped(e.to_string()))?;
    info!("Session finished");
    result
}

/// Wait for a dispatch slot. The permit is held until the response is
/// queued, so a single slot keeps responses in arrival order.
async fn acquire(permits: &Arc<Semaphore>, writer_failed: &CancellationToken) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        permit = permits.clone().acquire_owned() => permit.ok(),
        _ = writer_failed.cancelled() => None,
    }
}

/// Let in-flight requests finish within `grace`, then cancel the rest.
async fn drain(tasks: &mut JoinSet<()>, shutdown: &CancellationToken, grace: std::time::Duration) {
    if tasks.is_empty() {
        return;
    }
    info!("Draining {} in-flight requests", tasks.len());

    let finished = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(
            "Shutdown grace of {:?} elapsed; cancelling {} requests",
            grace,
            tasks.len()
        );
        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }
}

/// The only code that touches the output stream.
async fn write_responses<W>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<Response>,
    failed: CancellationToken,
) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = outbound.recv().await {
        if let Err(e) = writer.encode(&response).await {
            error!("Failed to write response: {}", e);
            failed.cancel();
            return Err(e);
        }
        debug!(id = ?response.id, "Response written");
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::protocol::RequestId;
    use crate::core::server::test_tools::{test_config, test_server};
    use crate::core::transport::codec::decode_responses;
    use crate::core::transport::config::Framing;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn line(value: Value) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(&value).unwrap();
        bytes.push(b'\n');
        bytes
    }

    fn sleep_call(id: i64, ms: u64) -> Value {
        json!({
            "id": id,
            "method": "call_tool",
            "params": { "name": "sleep", "arguments": { "ms": ms, "reply": format!("done {}", id) } },
        })
    }

    /// Feed `input` then close it; collect everything the server wrote.
    async fn run_session(server: Arc<ToolServer>, input: Vec<u8>, config: TransportConfig) -> Vec<Response> {
        let (mut host_in, server_in) = duplex(64 * 1024);
        let (server_out, mut host_out) = duplex(64 * 1024);

        let session = tokio::spawn(async move { serve(server, server_in, server_out, &config).await });

        host_in.write_all(&input).await.unwrap();
        drop(host_in);

        let mut output = Vec::new();
        host_out.read_to_end(&mut output).await.unwrap();
        session.await.unwrap().unwrap();

        decode_responses(&output, sniff_framing(&output)).unwrap()
    }

    fn sniff_framing(output: &[u8]) -> Framing {
        if output.starts_with(b"Content-Length") {
            Framing::ContentLength
        } else {
            Framing::Line
        }
    }

    fn ids(responses: &[Response]) -> Vec<RequestId> {
        responses.iter().filter_map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_interleave() {
        let (server, _) = test_server(test_config());
        let mut input = Vec::new();
        for id in 0..25 {
            input.extend(line(sleep_call(id, 20 + (id as u64 % 5) * 10)));
        }

        let responses = run_session(server, input, TransportConfig::line()).await;

        assert_eq!(responses.len(), 25);
        let seen: HashSet<RequestId> = ids(&responses).into_iter().collect();
        assert_eq!(seen, (0..25).map(RequestId::Number).collect());
        for response in &responses {
            let Some(RequestId::Number(id)) = &response.id else {
                panic!("missing id");
            };
            assert_eq!(response.result().unwrap()["text"], format!("done {}", id));
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_resyncs() {
        let (server, _) = test_server(test_config());
        let mut input = line(json!({ "id": 1, "method": "ping" }));
        input.extend_from_slice(b"{\"id\": 2, \"method\": \n");
        input.extend(line(json!({ "id": 3, "method": "ping" })));
        input.extend(line(json!({ "id": 4, "params": {} })));

        let responses = run_session(server, input, TransportConfig::line()).await;
        assert_eq!(responses.len(), 4);

        let decode_errors: Vec<&Response> = responses
            .iter()
            .filter(|r| r.error_code() == Some(ErrorCode::DecodeError))
            .collect();
        assert_eq!(decode_errors.len(), 2);
        // Unparseable frame: id lost. Parseable frame without method: id kept.
        assert!(decode_errors.iter().any(|r| r.id.is_none()));
        assert!(decode_errors.iter().any(|r| r.id == Some(RequestId::Number(4))));

        let ok: Vec<RequestId> = responses
            .iter()
            .filter(|r| !r.is_error())
            .filter_map(|r| r.id.clone())
            .collect();
        assert_eq!(ok.len(), 2);
    }

    #[tokio::test]
    async fn test_content_length_session() {
        let (server, _) = test_server(test_config());
        let mut input = Vec::new();
        for request in [
            json!({ "id": "a", "method": "initialize" }),
            json!({ "id": "b", "method": "list_tools" }),
        ] {
            let body = serde_json::to_vec(&request).unwrap();
            input.extend(format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes());
            input.extend(body);
        }

        let responses = run_session(server, input, TransportConfig::content_length()).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| !r.is_error()));
    }

    #[tokio::test]
    async fn test_single_in_flight_preserves_order() {
        let mut config = test_config();
        config.dispatch.max_in_flight = 1;
        let (server, _) = test_server(config);

        let mut input = Vec::new();
        // Earlier requests are slower; concurrent dispatch would reorder them
        for (id, ms) in [(1, 120), (2, 60), (3, 1)] {
            input.extend(line(sleep_call(id, ms)));
        }
        input.extend(line(json!({ "id": 4, "method": "ping" })));

        let responses = run_session(server, input, TransportConfig::line()).await;
        assert_eq!(
            ids(&responses),
            (1..=4).map(RequestId::Number).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_fault_containment_across_session() {
        let (server, _) = test_server(test_config());
        let mut input = line(json!({
            "id": 1, "method": "call_tool", "params": { "name": "panic", "arguments": {} }
        }));
        input.extend(line(sleep_call(2, 10_000)));
        input.extend(line(json!({
            "id": 3, "method": "call_tool", "params": { "name": "nope" }
        })));
        input.extend(line(sleep_call(4, 1)));

        let responses = run_session(server, input, TransportConfig::line()).await;
        let code = |id: i64| {
            responses
                .iter()
                .find(|r| r.id == Some(RequestId::Number(id)))
                .map(|r| r.error_code())
                .unwrap()
        };

        assert_eq!(code(1), Some(ErrorCode::InternalError));
        assert_eq!(code(2), Some(ErrorCode::Timeout));
        assert_eq!(code(3), Some(ErrorCode::UnknownTool));
        assert_eq!(code(4), None);
    }

    #[tokio::test]
    async fn test_end_of_input_drains_in_flight() {
        let (server, _) = test_server(test_config());
        let input = line(sleep_call(1, 150));

        let responses = run_session(server, input, TransportConfig::line()).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].result().unwrap()["text"], "done 1");
    }

    #[tokio::test]
    async fn test_shutdown_grace_cancels_stragglers() {
        let mut config = Config::default();
        config.dispatch.shutdown_grace = Duration::from_millis(100);
        config.dispatch.cancel_grace = Duration::from_millis(50);
        let (server, _) = test_server(config);

        let input = line(json!({
            "id": 1, "method": "call_tool",
            "params": { "name": "sleep", "arguments": { "ms": 30_000, "cooperative": true } }
        }));

        let started = Instant::now();
        let responses = run_session(server, input, TransportConfig::line()).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].error_code(), Some(ErrorCode::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let (server, _) = test_server(test_config());
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "host went away"))
            .build();
        let (mut host_in, server_in) = duplex(1024);
        host_in
            .write_all(&line(json!({ "id": 1, "method": "ping" })))
            .await
            .unwrap();

        // Input stays open: the session must end because of the writer alone
        let result = serve(server, server_in, writer, &TransportConfig::line()).await;
        assert!(matches!(result, Err(TransportError::Write(_))));
        drop(host_in);
    }
}
