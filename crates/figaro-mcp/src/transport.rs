//! Container transport for tool servers.
//!
//! Launches a server via the configured container runtime
//! (`<runtime> run --rm -i <image> <cmd...>`) and exposes its stdio as a
//! line-oriented byte stream plus a lifecycle handle. The transport knows
//! nothing about JSON-RPC; framing lives in [`crate::peer`].

use crate::config::ContainerDefinition;
use crate::error::McpError;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Grace period between closing stdin and killing the child.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// The child's final exit status, or the spawn-side I/O error that ended it.
pub type Completion = watch::Receiver<Option<std::io::Result<ExitStatus>>>;

/// Write half of a transport: exactly one writer exists per handle.
pub struct TransportWriter {
    stdin: ChildStdin,
}

impl TransportWriter {
    /// Write one line, appending `'\n'`, and flush.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }
}

/// Read half of a transport: exactly one reader exists per handle.
pub struct TransportReader {
    reader: BufReader<ChildStdout>,
}

impl TransportReader {
    /// Read one line without its terminator. `None` on end-of-stream.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// A running tool-server child process.
///
/// Holding the handle keeps the child alive; `shutdown` must be called to
/// release it deliberately. Dropping the handle kills the child outright.
pub struct DockerTransport {
    name: String,
    io: Option<(TransportWriter, TransportReader)>,
    kill_tx: Option<oneshot::Sender<()>>,
    completion: Completion,
}

impl DockerTransport {
    /// Launch a server in the container runtime.
    pub fn spawn(
        runtime: &str,
        definition: &ContainerDefinition,
        cancel: CancellationToken,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(runtime);
        cmd.args(container_args(definition));
        Self::launch(&definition.name, cmd, cancel)
    }

    /// Launch an arbitrary command as a transport child.
    ///
    /// Tests drive this directly with plain local processes; production
    /// code goes through [`DockerTransport::spawn`].
    pub fn launch(
        name: &str,
        mut cmd: Command,
        cancel: CancellationToken,
    ) -> Result<Self, McpError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.to_string(),
            source: e,
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exit_tx, completion) =
            watch::channel::<Option<std::io::Result<ExitStatus>>>(None);

        // Monitor task: sole owner of the child. Resolves the completion
        // signal with the exit status; a cancel or kill request forces the
        // child down first.
        let monitor_name = name.to_string();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            match &status {
                Ok(code) => tracing::debug!("tool server '{monitor_name}' exited: {code}"),
                Err(e) => tracing::warn!("tool server '{monitor_name}' wait failed: {e}"),
            }
            let _ = exit_tx.send(Some(status));
        });

        Ok(Self {
            name: name.to_string(),
            io: Some((
                TransportWriter { stdin },
                TransportReader {
                    reader: BufReader::new(stdout),
                },
            )),
            kill_tx: Some(kill_tx),
            completion,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the stdio halves. Returns `None` if already taken.
    pub fn take_io(&mut self) -> Option<(TransportWriter, TransportReader)> {
        self.io.take()
    }

    /// A receiver for the child's completion signal.
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Close stdin, wait up to 5 s for a graceful exit, then kill.
    /// The exit status lands on the completion signal either way.
    pub async fn shutdown(mut self) {
        drop(self.io.take());

        let mut completion = self.completion.clone();
        let graceful =
            tokio::time::timeout(SHUTDOWN_GRACE, completion.wait_for(Option::is_some)).await;

        let timed_out = graceful.is_err();
        drop(graceful);

        if timed_out {
            tracing::debug!("tool server '{}' did not exit in time, killing", self.name);
            if let Some(kill) = self.kill_tx.take() {
                let _ = kill.send(());
            }
            let _ =
                tokio::time::timeout(SHUTDOWN_GRACE, completion.wait_for(Option::is_some)).await;
        }
    }
}

/// Arguments for `<runtime> run --rm -i ...`. Environment flags are emitted
/// in sorted key order so the invocation is stable.
fn container_args(definition: &ContainerDefinition) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
    let mut keys: Vec<&String> = definition.env.keys().collect();
    keys.sort();
    for key in keys {
        args.push("--env".to_string());
        args.push(format!("{key}={}", definition.env[key]));
    }
    args.push(definition.image.clone());
    args.extend(definition.command.iter().cloned());
    args
}
