//! JSON-RPC peer: request/response correlation over a transport.
//!
//! One reader task owns the inbound stream; any number of callers may have
//! requests in flight. A writer task serializes access to the child's stdin
//! so `call` and `notify` can run concurrently with the reader.

use crate::error::McpError;
use crate::jsonrpc::{
    self, Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::transport::{TransportReader, TransportWriter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WRITE_QUEUE: usize = 64;
const NOTIFICATION_QUEUE: usize = 64;

/// Malformed-line tolerance: more than this many inside one window fails
/// the peer. Tool servers sometimes interleave debug chatter on stdout, so
/// a stray line is survivable; a flood is not.
const MALFORMED_LIMIT: u32 = 100;
const MALFORMED_WINDOW: Duration = Duration::from_secs(10);

type PendingSlot = oneshot::Sender<Result<JsonRpcResponse, McpError>>;
type Pending = Arc<Mutex<HashMap<u64, PendingSlot>>>;
type Subscribers = Arc<Mutex<HashMap<String, mpsc::Sender<serde_json::Value>>>>;

/// One side of a JSON-RPC conversation with a tool server.
pub struct Peer {
    server_name: String,
    next_id: AtomicU64,
    write_tx: mpsc::Sender<String>,
    pending: Pending,
    subscribers: Subscribers,
    cancel: CancellationToken,
    fatal: Arc<std::sync::Mutex<Option<String>>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl Peer {
    /// Start the reader and writer tasks over a transport's stdio halves.
    ///
    /// The token should be a child of the supervisor's root; the peer
    /// cancels it when the connection becomes unsound, and completes every
    /// pending call when it fires.
    pub fn spawn(
        server_name: impl Into<String>,
        writer: TransportWriter,
        reader: TransportReader,
        cancel: CancellationToken,
    ) -> Self {
        let server_name = server_name.into();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));
        let fatal = Arc::new(std::sync::Mutex::new(None));

        let (write_tx, write_rx) = mpsc::channel::<String>(WRITE_QUEUE);

        let writer_handle = tokio::spawn(write_loop(
            writer,
            write_rx,
            Arc::clone(&pending),
            cancel.clone(),
            server_name.clone(),
        ));
        let reader_handle = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&subscribers),
            write_tx.clone(),
            cancel.clone(),
            Arc::clone(&fatal),
            server_name.clone(),
        ));

        Self {
            server_name,
            next_id: AtomicU64::new(1),
            write_tx,
            pending,
            subscribers,
            cancel,
            fatal,
            reader_handle,
            writer_handle,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The peer's cancellation token; fires when the connection fails.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Description of the fault that failed this peer, if any.
    pub fn fatal_cause(&self) -> Option<String> {
        self.fatal.lock().expect("fatal mutex poisoned").clone()
    }

    /// Send a request and wait for its response.
    ///
    /// The pending slot is registered before the line is written, so a
    /// response cannot race its own caller.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if self.cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.write_tx.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpError::ConnectionClosed);
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Slot dropped without completion; only happens if the peer is
            // torn down between drain and task exit.
            Err(_) => Err(McpError::ConnectionClosed),
        }
    }

    /// Send a notification; fire-and-forget.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        if self.cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.write_tx
            .send(line)
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    /// Receive notifications for one method. Later subscriptions for the
    /// same method replace earlier ones.
    pub async fn subscribe(&self, method: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        self.subscribers.lock().await.insert(method.to_string(), tx);
        rx
    }

    /// Cancel the peer and complete all in-flight calls.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        fail_pending(&self.pending, || McpError::Cancelled).await;
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// Complete every pending slot with an error and empty the table.
async fn fail_pending<F: Fn() -> McpError>(pending: &Pending, make: F) {
    let mut pending = pending.lock().await;
    for (_, slot) in pending.drain() {
        let _ = slot.send(Err(make()));
    }
}

async fn write_loop(
    mut writer: TransportWriter,
    mut write_rx: mpsc::Receiver<String>,
    pending: Pending,
    cancel: CancellationToken,
    server_name: String,
) {
    while let Some(line) = write_rx.recv().await {
        if let Err(e) = writer.write_line(&line).await {
            tracing::warn!("write to tool server '{server_name}' failed: {e}");
            fail_pending(&pending, || McpError::ConnectionClosed).await;
            cancel.cancel();
            break;
        }
    }
}

async fn read_loop(
    mut reader: TransportReader,
    pending: Pending,
    subscribers: Subscribers,
    write_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    fatal: Arc<std::sync::Mutex<Option<String>>>,
    server_name: String,
) {
    let mut malformed = MalformedBudget::new(tokio::time::Instant::now());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                fail_pending(&pending, || McpError::Cancelled).await;
                break;
            }
            next = reader.read_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("tool server '{server_name}' closed its stream");
                fail_pending(&pending, || McpError::ConnectionClosed).await;
                break;
            }
            Err(e) => {
                tracing::warn!("read from tool server '{server_name}' failed: {e}");
                fail_pending(&pending, || McpError::ConnectionClosed).await;
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match jsonrpc::classify(&line) {
            Ok(Incoming::Response(response)) => {
                deliver_response(&pending, response, &server_name).await;
            }
            Ok(Incoming::Request { id, method }) => {
                tracing::debug!("rejecting request '{method}' from '{server_name}'");
                let reply = jsonrpc::method_not_found(id, &method);
                match serde_json::to_string(&reply) {
                    Ok(line) => {
                        let _ = write_tx.send(line).await;
                    }
                    Err(e) => tracing::warn!("failed to serialize rejection: {e}"),
                }
            }
            Ok(Incoming::Notification { method, params }) => {
                let subscribers = subscribers.lock().await;
                match subscribers.get(&method) {
                    Some(tx) => {
                        if tx
                            .try_send(params.unwrap_or(serde_json::Value::Null))
                            .is_err()
                        {
                            tracing::warn!("notification '{method}' dropped: subscriber lagging");
                        }
                    }
                    None => {
                        tracing::debug!(
                            "notification '{method}' from '{server_name}' has no subscriber"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!("malformed line from '{server_name}': {e}: {line}");
                if malformed.record(tokio::time::Instant::now()) {
                    let cause = format!(
                        "more than {MALFORMED_LIMIT} malformed lines within \
                         {}s from '{server_name}'",
                        MALFORMED_WINDOW.as_secs()
                    );
                    tracing::error!("{cause}");
                    fatal
                        .lock()
                        .expect("fatal mutex poisoned")
                        .get_or_insert(cause);
                    fail_pending(&pending, || {
                        McpError::Protocol("peer failed: malformed input flood".to_string())
                    })
                    .await;
                    cancel.cancel();
                    break;
                }
            }
        }
    }

    // Dropping the senders closes every notification channel.
    subscribers.lock().await.clear();
}

async fn deliver_response(pending: &Pending, response: JsonRpcResponse, server_name: &str) {
    let id = match &response.id {
        Some(RequestId::Num(id)) => *id,
        other => {
            tracing::warn!("response with unmatched id {other:?} from '{server_name}' dropped");
            return;
        }
    };
    let slot = pending.lock().await.remove(&id);
    match slot {
        Some(slot) => {
            let _ = slot.send(Ok(response));
        }
        None => tracing::warn!("response with unknown id {id} from '{server_name}' dropped"),
    }
}

/// Counts malformed lines inside a fixed window.
struct MalformedBudget {
    window_start: tokio::time::Instant,
    count: u32,
}

impl MalformedBudget {
    fn new(now: tokio::time::Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Record one malformed line; `true` when the budget is exhausted.
    fn record(&mut self, now: tokio::time::Instant) -> bool {
        if now.duration_since(self.window_start) > MALFORMED_WINDOW {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count > MALFORMED_LIMIT
    }
}
