//! Module control through the `pactl` command-line client.
//!
//! Every request runs one `pactl` process and waits for it, up to the
//! configured timeout. Works against PulseAudio and pipewire-pulse alike.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pipedev_core::{ControlError, ControlResult, ModuleControl, ModuleIndex, ModuleInfo};

use crate::modules::parse_module_list;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to reach the sound server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactlConfig {
    /// Client executable
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Arguments placed before the pactl arguments (e.g., a wrapper's own flags)
    #[serde(default)]
    pub program_args: Vec<String>,
    /// Server address passed as `--server`; the client default if unset
    #[serde(default)]
    pub server: Option<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PactlConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            server: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("pactl")
}

fn default_timeout_ms() -> u64 {
    5000
}

impl PactlConfig {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// [`ModuleControl`] backed by `pactl`.
#[derive(Debug, Clone, Default)]
pub struct PactlControl {
    config: PactlConfig,
}

impl PactlControl {
    /// Create a control using the given client configuration.
    #[must_use]
    pub fn new(config: PactlConfig) -> Self {
        Self { config }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &PactlConfig {
        &self.config
    }

    /// Run one pactl request and return its standard output.
    fn run(&self, args: &[&str]) -> ControlResult<String> {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.program_args);
        if let Some(server) = &self.config.server {
            command.arg(format!("--server={server}"));
        }
        command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(program = %self.config.program.display(), ?args, "Running pactl");
        let mut child = command.spawn().map_err(ControlError::Spawn)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;
        let status: ExitStatus = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    abort(&mut child);
                    warn!(?args, error = %e, "Failed to poll pactl");
                    return Err(ControlError::Io(e));
                }
            }
            if Instant::now() >= deadline {
                abort(&mut child);
                warn!(?args, ?timeout, "pactl request timed out");
                return Err(ControlError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        if !status.success() {
            return Err(ControlError::Rejected {
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

/// Kill and reap a request that will not be waited for.
///
/// Reader threads finish once the killed child's pipes close.
fn abort(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<std::io::Result<Vec<u8>>>) -> ControlResult<String> {
    let bytes = reader
        .join()
        .map_err(|_| ControlError::InvalidReply("output reader panicked".to_string()))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl ModuleControl for PactlControl {
    fn load_module(&self, name: &str, args: &str) -> ControlResult<ModuleIndex> {
        let mut request = vec!["load-module", name];
        if !args.is_empty() {
            request.push(args);
        }

        let stdout = self.run(&request)?;
        let reply = stdout.trim();
        let index = reply
            .parse::<u32>()
            .map_err(|_| ControlError::InvalidReply(format!("expected module index, got {reply:?}")))?;

        debug!(module = name, index, "Module loaded");
        Ok(ModuleIndex(index))
    }

    fn unload_module(&self, index: ModuleIndex) -> ControlResult<()> {
        let index_arg = index.to_string();
        self.run(&["unload-module", index_arg.as_str()])?;
        debug!(index = %index, "Module unloaded");
        Ok(())
    }

    fn module_info_list(&self) -> ControlResult<Vec<ModuleInfo>> {
        let stdout = self.run(&["--format=json", "list", "modules"])?;
        parse_module_list(&stdout)
    }
}
