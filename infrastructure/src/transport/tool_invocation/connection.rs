//! Tool-server connection: framing, request correlation and process lifetime.
//!
//! Concurrent fan-out shares one server process. A single background reader
//! task owns the read half exclusively and hands each response to the
//! caller waiting on its request id; writes are serialized behind a mutex.

use super::error::{Result, ToolInvocationError};
use super::protocol::{
    JsonRpcErrorOut, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageKind,
    classify_message, initialize_params,
};
use serde::Serialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter,
};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type FrameWriter = Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Removes a pending entry when the waiting caller goes away, whether it
/// got its answer, timed out or was aborted.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.id);
    }
}

pub struct ToolServerConnection {
    reader_handle: JoinHandle<()>,
    pending: PendingMap,
    writer: FrameWriter,
    closed: Arc<AtomicBool>,
    /// Server process, killed on drop. `None` for in-memory streams.
    child: Option<std::sync::Mutex<Child>>,
}

impl ToolServerConnection {
    /// Spawn `program args...` and connect to its stdio.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        debug!("Spawning tool server: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Linux: have the kernel SIGTERM the server if we die without
        // running Drop (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(ToolInvocationError::Spawn)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            ToolInvocationError::Spawn(std::io::Error::other("Failed to capture stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolInvocationError::Spawn(std::io::Error::other("Failed to capture stdout"))
        })?;

        Ok(Self::from_streams(stdout, stdin, Some(child)))
    }

    /// Build a connection over arbitrary streams. Starts the reader task.
    pub fn from_streams<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let writer: FrameWriter = Arc::new(Mutex::new(BufWriter::new(boxed)));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_handle = tokio::spawn(Self::reader_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&closed),
        ));

        Self {
            reader_handle,
            pending,
            writer,
            closed,
            child: child.map(std::sync::Mutex::new),
        }
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&self, timeout: Duration) -> Result<()> {
        let result = self
            .request("initialize", Some(initialize_params()), timeout)
            .await?;
        let server = result
            .pointer("/serverInfo/name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        info!("Tool server initialized: {}", server);
        self.notify("notifications/initialized", None).await
    }

    /// Send a request and wait up to `timeout` for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ToolInvocationError::Closed);
        }

        let request = JsonRpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(request.id, tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request.id,
        };

        // The reader may have shut down between the check and the insert.
        if self.closed.load(Ordering::Acquire) {
            return Err(ToolInvocationError::Closed);
        }

        self.write_message(&request).await?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ToolInvocationError::Closed),
            Err(_) => return Err(ToolInvocationError::Timeout(timeout.as_millis() as u64)),
        };

        if let Some(error) = response.error {
            return Err(ToolInvocationError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Send a notification (no response).
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        self.write_message(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Reader still running and, for a spawned server, the process alive
    pub fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match &self.child {
            Some(child) => {
                let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
                matches!(child.try_wait(), Ok(None))
            }
            None => true,
        }
    }

    async fn write_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        trace!("Tool server sending: {}", String::from_utf8_lossy(&body));
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &body).await?;
        Ok(())
    }

    /// Background reader loop, single owner of the read half.
    ///
    /// Responses go to the matching pending oneshot. Requests from the
    /// server are answered with "method not found". When the stream ends
    /// every pending sender is dropped, so waiters observe `Closed`.
    async fn reader_loop<R>(
        reader: R,
        pending: PendingMap,
        writer: FrameWriter,
        closed: Arc<AtomicBool>,
    ) where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut reader = BufReader::new(reader);

        loop {
            let body = match read_frame(&mut reader).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("Tool server closed its output");
                    break;
                }
                Err(e) => {
                    warn!("Tool server reader: failed to read frame: {}", e);
                    break;
                }
            };

            trace!("Tool server received: {}", String::from_utf8_lossy(&body));

            let value: serde_json::Value = match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Tool server sent invalid JSON: {}", e);
                    continue;
                }
            };

            match classify_message(&value) {
                MessageKind::Response => {
                    let response: JsonRpcResponse = match serde_json::from_value(value) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("Tool server reader: malformed response: {}", e);
                            continue;
                        }
                    };
                    let Some(id) = response.id else {
                        debug!("Tool server reader: response without id");
                        continue;
                    };
                    let sender = {
                        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                        pending.remove(&id)
                    };
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => debug!("Tool server reader: no caller waiting for id {}", id),
                    }
                }
                MessageKind::IncomingRequest { id } => {
                    let method = value
                        .get("method")
                        .and_then(|m| m.as_str())
                        .unwrap_or("")
                        .to_string();
                    debug!("Tool server reader: refusing server request {}", method);
                    if let Ok(body) =
                        serde_json::to_vec(&JsonRpcErrorOut::method_not_found(id, &method))
                    {
                        let mut w = writer.lock().await;
                        let _ = write_frame(&mut *w, &body).await;
                    }
                }
                MessageKind::Notification => {
                    trace!(
                        "Tool server reader: ignoring notification {}",
                        value.get("method").and_then(|m| m.as_str()).unwrap_or("")
                    );
                }
            }
        }

        closed.store(true, Ordering::Release);
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.clear();
    }
}

impl Drop for ToolServerConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        if let Some(child) = &self.child {
            debug!("Tool server connection dropping, killing server process");
            let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
            let _ = child.start_kill();
        }
    }
}

/// Write one `Content-Length` framed message.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Read one `Content-Length` framed message. `None` on a clean end of
/// stream between messages.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = String::new();
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            if saw_header {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside message headers",
                ));
            }
            return Ok(None);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            // Blank lines between messages
            continue;
        }

        saw_header = true;
        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().ok();
        }
    }

    let len = content_length.unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    /// Server side of an in-memory connection
    struct FakeServer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        async fn recv(&mut self) -> serde_json::Value {
            let body = read_frame(&mut self.reader).await.unwrap().unwrap();
            serde_json::from_slice(&body).unwrap()
        }

        async fn send(&mut self, value: serde_json::Value) {
            let body = serde_json::to_vec(&value).unwrap();
            write_frame(&mut self.writer, &body).await.unwrap();
        }

        async fn reply(&mut self, id: &serde_json::Value, result: serde_json::Value) {
            self.send(serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}))
                .await;
        }
    }

    fn pair() -> (ToolServerConnection, FakeServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);
        let connection = ToolServerConnection::from_streams(client_r, client_w, None);
        let server = FakeServer {
            reader: BufReader::new(server_r),
            writer: server_w,
        };
        (connection, server)
    }

    #[tokio::test]
    async fn test_read_frame_tolerates_extra_headers() {
        let raw = b"content-length: 2\r\nContent-Type: application/json\r\n\r\n{}\r\n";
        let mut reader = BufReader::new(&raw[..]);
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), b"{}");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_headers() {
        let raw = b"Content-Length: 10\r\n";
        let mut reader = BufReader::new(&raw[..]);
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_responses_correlate_by_id() {
        let (connection, mut server) = pair();
        let connection = Arc::new(connection);

        let first = {
            let c = Arc::clone(&connection);
            tokio::spawn(async move {
                c.request("tools/call", Some(serde_json::json!({"n": 1})), Duration::from_secs(5))
                    .await
            })
        };
        let a = server.recv().await;
        let second = {
            let c = Arc::clone(&connection);
            tokio::spawn(async move {
                c.request("tools/call", Some(serde_json::json!({"n": 2})), Duration::from_secs(5))
                    .await
            })
        };
        let b = server.recv().await;

        // Answer out of order
        server.reply(&b["id"], serde_json::json!({"n": b["params"]["n"]})).await;
        server.reply(&a["id"], serde_json::json!({"n": a["params"]["n"]})).await;

        assert_eq!(first.await.unwrap().unwrap()["n"], 1);
        assert_eq!(second.await.unwrap().unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn test_rpc_error_is_returned() {
        let (connection, mut server) = pair();
        let call = tokio::spawn(async move {
            connection
                .request("tools/call", None, Duration::from_secs(5))
                .await
        });
        let req = server.recv().await;
        server
            .send(serde_json::json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": -32602, "message": "unknown tool"}
            }))
            .await;

        match call.await.unwrap() {
            Err(ToolInvocationError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown tool");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_pending() {
        let (connection, mut server) = pair();
        let (result, _) = tokio::join!(
            connection.request("tools/call", None, Duration::from_millis(500)),
            server.recv()
        );
        assert!(matches!(result, Err(ToolInvocationError::Timeout(500))));
        assert!(connection.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let (connection, mut server) = pair();
        let connection = Arc::new(connection);
        let call = {
            let c = Arc::clone(&connection);
            tokio::spawn(async move { c.request("tools/call", None, Duration::from_secs(5)).await })
        };
        server.recv().await;
        drop(server);

        assert!(matches!(
            call.await.unwrap(),
            Err(ToolInvocationError::Closed)
        ));
        assert!(!connection.is_alive());
        assert!(matches!(
            connection.request("tools/call", None, Duration::from_secs(1)).await,
            Err(ToolInvocationError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_server_requests_are_refused() {
        let (connection, mut server) = pair();
        server
            .send(serde_json::json!({"jsonrpc": "2.0", "id": 77, "method": "sampling/createMessage"}))
            .await;
        let reply = server.recv().await;
        assert_eq!(reply["id"], 77);
        assert_eq!(reply["error"]["code"], -32601);
        assert!(connection.is_alive());
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (connection, mut server) = pair();
        let init = tokio::spawn(async move {
            connection.initialize(Duration::from_secs(5)).await
        });

        let req = server.recv().await;
        assert_eq!(req["method"], "initialize");
        assert!(req["params"]["protocolVersion"].is_string());
        server
            .reply(&req["id"], serde_json::json!({"serverInfo": {"name": "fake"}}))
            .await;

        let note = server.recv().await;
        assert_eq!(note["method"], "notifications/initialized");
        assert!(note.get("id").is_none());
        init.await.unwrap().unwrap();
    }
}
