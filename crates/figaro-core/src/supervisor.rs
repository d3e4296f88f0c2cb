//! Supervisor: composes transports, peers, and clients; owns the root
//! cancellation token and the shutdown order.

use crate::agent::Agent;
use crate::error::FigaroError;
use crate::sink::ConversationSink;
use figaro_mcp::transport::Completion;
use figaro_mcp::{
    ContainerDefinition, DockerTransport, McpClient, McpError, Peer, ServerRegistry, ToolRegistry,
};
use figaro_types::{Event, EventType, LlmBridge};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bound on one whole user request, tool iterations included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type CauseSlot = Arc<Mutex<Option<FigaroError>>>;

pub struct SupervisorOptions {
    pub container_runtime: String,
    pub model: String,
    pub max_tokens: u32,
}

struct ServerConnection {
    name: String,
    transport: Option<DockerTransport>,
    peer: Arc<Peer>,
    client: Arc<McpClient>,
}

/// Owns every server connection plus the agent, and fans the first fatal
/// failure out as root cancellation.
pub struct Supervisor {
    connections: Vec<ServerConnection>,
    registry: Arc<ToolRegistry>,
    agent: Agent,
    events: mpsc::UnboundedSender<Event>,
    root: CancellationToken,
    cause: CauseSlot,
    watchdogs: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Bring up every configured server sequentially. Any failure tears the
    /// already-started connections down again, newest first.
    pub async fn start(
        options: SupervisorOptions,
        servers: &ServerRegistry,
        bridge: Arc<dyn LlmBridge>,
        events: mpsc::UnboundedSender<Event>,
        sink: Option<Arc<dyn ConversationSink>>,
    ) -> Result<Self, FigaroError> {
        let root = CancellationToken::new();
        let cause: CauseSlot = Arc::new(Mutex::new(None));

        let mut connections: Vec<ServerConnection> = Vec::new();
        for definition in &servers.docker_servers {
            match connect(&options.container_runtime, definition, &root).await {
                Ok(conn) => connections.push(conn),
                Err(e) => {
                    tracing::error!("failed to start tool server '{}': {e}", definition.name);
                    for conn in connections.into_iter().rev() {
                        teardown_connection(conn).await;
                    }
                    root.cancel();
                    return Err(e);
                }
            }
        }

        let clients: Vec<Arc<McpClient>> = connections
            .iter()
            .map(|conn| Arc::clone(&conn.client))
            .collect();
        let registry = Arc::new(ToolRegistry::build(&clients));
        tracing::info!(
            "{} tool(s) registered from {} server(s)",
            registry.len(),
            connections.len()
        );

        let watchdogs = connections
            .iter()
            .map(|conn| {
                spawn_watchdog(
                    conn.name.clone(),
                    conn.transport
                        .as_ref()
                        .expect("transport present at startup")
                        .completion(),
                    Arc::clone(&conn.peer),
                    root.clone(),
                    Arc::clone(&cause),
                )
            })
            .collect();

        let mut agent = Agent::new(
            bridge,
            Arc::clone(&registry),
            events.clone(),
            options.model,
            options.max_tokens,
        );
        if let Some(sink) = sink {
            agent = agent.with_sink(sink);
        }

        Ok(Self {
            connections,
            registry,
            agent,
            events,
            root,
            cause,
            watchdogs,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Operator interrupt: records `Cancelled` as the cause (if first) and
    /// cancels the root. Idempotent.
    pub fn interrupt(&self) {
        fail(&self.cause, &self.root, FigaroError::Cancelled);
    }

    /// Run one user request through the agent loop, bounded by 60 s.
    pub async fn request(&self, text: &str) -> Result<(), FigaroError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let _ = self
            .events
            .send(Event::new(EventType::TaskStarted, task_id.as_str()));

        let outcome = tokio::select! {
            _ = self.root.cancelled() => Err(FigaroError::Cancelled),
            result = tokio::time::timeout(
                REQUEST_TIMEOUT,
                self.agent.run(&task_id, text, self.root.child_token()),
            ) => match result {
                Ok(inner) => inner.map(|_| ()),
                Err(_) => Err(FigaroError::RequestTimeout {
                    seconds: REQUEST_TIMEOUT.as_secs(),
                }),
            },
        };

        match &outcome {
            Ok(()) => {
                let _ = self
                    .events
                    .send(Event::new(EventType::TaskCompleted, task_id.as_str()));
            }
            Err(e) => {
                let _ = self.events.send(
                    Event::new(EventType::TaskFailed, task_id.as_str()).with_data(e.to_string()),
                );
                if !e.is_cancelled() {
                    self.root.cancel();
                }
            }
        }
        outcome
    }

    /// Propagate cancellation, tear connections down newest first, close
    /// the event bus, and return the first recorded cause.
    pub async fn shutdown(mut self) -> Option<FigaroError> {
        self.root.cancel();
        for watchdog in self.watchdogs.drain(..) {
            watchdog.abort();
        }
        for conn in std::mem::take(&mut self.connections).into_iter().rev() {
            teardown_connection(conn).await;
        }
        let cause = self.cause.lock().expect("cause mutex poisoned").take();
        // Dropping self releases the last event senders, closing the bus.
        cause
    }
}

async fn connect(
    runtime: &str,
    definition: &ContainerDefinition,
    root: &CancellationToken,
) -> Result<ServerConnection, FigaroError> {
    let mut transport = DockerTransport::spawn(runtime, definition, root.child_token())?;
    let (writer, reader) = transport.take_io().expect("io of a fresh transport");
    let peer = Arc::new(Peer::spawn(
        definition.name.clone(),
        writer,
        reader,
        root.child_token(),
    ));

    match McpClient::initialize(definition.name.clone(), Arc::clone(&peer)).await {
        Ok(client) => Ok(ServerConnection {
            name: definition.name.clone(),
            transport: Some(transport),
            peer,
            client: Arc::new(client),
        }),
        Err(e) => {
            peer.shutdown().await;
            transport.shutdown().await;
            Err(e.into())
        }
    }
}

async fn teardown_connection(mut conn: ServerConnection) {
    conn.peer.shutdown().await;
    if let Some(transport) = conn.transport.take() {
        transport.shutdown().await;
    }
}

/// Watch one connection: an abnormal child exit or a peer fault becomes the
/// supervisor-wide cause.
fn spawn_watchdog(
    name: String,
    mut completion: Completion,
    peer: Arc<Peer>,
    root: CancellationToken,
    cause: CauseSlot,
) -> JoinHandle<()> {
    let peer_cancel = peer.cancellation();
    tokio::spawn(async move {
        tokio::select! {
            _ = root.cancelled() => {}
            _ = peer_cancel.cancelled() => {
                if root.is_cancelled() {
                    return;
                }
                let detail = peer
                    .fatal_cause()
                    .unwrap_or_else(|| "connection failed".to_string());
                fail(
                    &cause,
                    &root,
                    FigaroError::Mcp(McpError::Protocol(format!("tool server '{name}': {detail}"))),
                );
            }
            outcome = completion.wait_for(Option::is_some) => {
                if root.is_cancelled() {
                    return;
                }
                let detail = match outcome {
                    Ok(guard) => describe_failure(&guard),
                    Err(_) => None,
                };
                if let Some(detail) = detail {
                    fail(
                        &cause,
                        &root,
                        FigaroError::Mcp(McpError::ServerExited { name, detail }),
                    );
                }
            }
        }
    })
}

/// A clean zero exit is left to end-of-stream handling; anything else is a
/// transport failure.
fn describe_failure(status: &Option<std::io::Result<std::process::ExitStatus>>) -> Option<String> {
    match status {
        Some(Ok(status)) if status.success() => None,
        Some(Ok(status)) => Some(status.to_string()),
        Some(Err(e)) => Some(e.to_string()),
        None => None,
    }
}

/// Record the first cause and cancel the root; later causes are dropped.
fn fail(cause: &CauseSlot, root: &CancellationToken, error: FigaroError) {
    {
        let mut slot = cause.lock().expect("cause mutex poisoned");
        if slot.is_none() {
            tracing::error!("fatal: {error}");
            *slot = Some(error);
        }
    }
    root.cancel();
}
