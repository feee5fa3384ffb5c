//! Process Channel
//!
//! Runs one request/response session against a freshly spawned target
//! process: every payload line is written to stdin, stdin is closed, and
//! stdout/stderr are drained until the process exits or the wall-clock
//! timeout elapses. The child is reaped on every exit path.


pub mod http;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::mcp::Outgoing;

pub use http::{HttpReply, HttpWrapper};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Child process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("Failed to read {stream} from target: {source}")]
    Read {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode payload line: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything captured from one channel session
#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub elapsed: Duration,
    pub exit_status: Option<ExitStatus>,
    /// Set when stdin could not be fully written, usually because the target exited early
    pub write_error: Option<String>,
}

impl ChannelOutput {
    #[inline]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[inline]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Something the harness can run a probe session against
#[async_trait]
pub trait Target: Send + Sync {
    async fn send_and_collect(
        &self,
        payload: &[Outgoing],
        timeout: Duration,
    ) -> Result<ChannelOutput, ChannelError>;

    /// Short human-readable description for logs and reports
    fn describe(&self) -> String;
}

/// Grace period for a target to exit after closing its output streams
const REAP_GRACE: Duration = Duration::from_millis(250);

/// Launches `<interpreter> <script>` once per session
#[derive(Debug, Clone)]
pub struct ProcessChannel {
    target: TargetConfig,
    working_dir: PathBuf,
}

impl ProcessChannel {
    /// Build a channel from config, resolving the working directory now
    #[inline]
    pub fn new(target: &TargetConfig) -> std::io::Result<Self> {
        let working_dir = match &target.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        Ok(Self {
            target: target.clone(),
            working_dir,
        })
    }

    #[inline]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn command(&self) -> Command {
        let var = &self.target.search_path_var;
        let search_path = self
            .target
            .search_path_value(&self.working_dir, std::env::var_os(var));

        let mut command = Command::new(&self.target.interpreter);
        command
            .arg(&self.target.script)
            .current_dir(&self.working_dir)
            .env(var, search_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Target for ProcessChannel {
    async fn send_and_collect(
        &self,
        payload: &[Outgoing],
        timeout: Duration,
    ) -> Result<ChannelOutput, ChannelError> {
        let input = encode_payload(payload)?;

        let mut child = self
            .command()
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                program: self.describe(),
                source,
            })?;
        debug!(pid = ?child.id(), "Spawned target {}", self.describe());

        let result = run_session(&mut child, input, timeout).await;
        let grace = match &result {
            Ok(output) if !output.timed_out => REAP_GRACE,
            _ => Duration::ZERO,
        };
        let exit_status = reap(&mut child, grace).await;

        let mut output = result?;
        output.exit_status = exit_status;
        Ok(output)
    }

    fn describe(&self) -> String {
        format!(
            "{} {}",
            self.target.interpreter,
            self.target.script.display()
        )
    }
}

/// Join all payload lines with newlines, terminating the last one as well
#[inline]
pub fn encode_payload(payload: &[Outgoing]) -> Result<String, serde_json::Error> {
    let mut input = String::new();
    for line in payload {
        input.push_str(&line.to_line()?);
        input.push('\n');
    }
    Ok(input)
}

async fn run_session(
    child: &mut Child,
    input: String,
    timeout: Duration,
) -> Result<ChannelOutput, ChannelError> {
    let stdin = child.stdin.take().ok_or(ChannelError::MissingPipe("stdin"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or(ChannelError::MissingPipe("stdout"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or(ChannelError::MissingPipe("stderr"))?;

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let started = Instant::now();

    let session = async {
        let (write, out, err) = tokio::join!(
            feed(stdin, input),
            drain(&mut stdout, &mut stdout_buf),
            drain(&mut stderr, &mut stderr_buf),
        );
        out.map_err(|source| ChannelError::Read {
            stream: "stdout",
            source,
        })?;
        err.map_err(|source| ChannelError::Read {
            stream: "stderr",
            source,
        })?;
        Ok::<_, ChannelError>(write.err())
    };

    let outcome = tokio::time::timeout(timeout, session).await;
    let mut output = ChannelOutput {
        elapsed: started.elapsed(),
        ..ChannelOutput::default()
    };

    match outcome {
        Ok(Ok(write_error)) => {
            if let Some(e) = &write_error {
                warn!("Target stopped reading stdin early: {}", e);
            }
            output.write_error = write_error.map(|e| e.to_string());
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            info!("Target exceeded {:?} timeout, terminating", timeout);
            output.timed_out = true;
        }
    }

    output.stdout = stdout_buf;
    output.stderr = stderr_buf;
    Ok(output)
}

/// Write the whole input then close stdin so the target sees EOF
async fn feed(mut stdin: ChildStdin, input: String) -> std::io::Result<()> {
    stdin.write_all(input.as_bytes()).await?;
    stdin.flush().await?;
    stdin.shutdown().await
}

/// Read until EOF, appending as data arrives so partial output survives a timeout
async fn drain<R>(reader: &mut R, buffer: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Make sure the child has exited and been waited on
async fn reap(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("Target exited with {}", status);
            return Some(status);
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to poll target status: {}", e),
    }

    // Output streams are closed but the process may still be running
    if !grace.is_zero() {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => warn!("Failed to wait for target: {}", e),
            Err(_) => debug!("Target still running after closing its output"),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill target: {}", e);
    }
    match child.try_wait() {
        Ok(status) => status,
        Err(e) => {
            warn!("Failed to collect target status after kill: {}", e);
            None
        }
    }
}
