//! Pipe device provisioning.
//!
//! Loads `module-pipe-source` / `module-pipe-sink` through a [`ModuleControl`],
//! opens the named pipe the module created, and unloads the module again on
//! release. The module is always loaded before the pipe is opened and unloaded
//! after the pipe is closed.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::control::{ModuleControl, ModuleIndex, ModuleInfo};
use crate::device::{PipeHandle, VirtualSink, VirtualSource};
use crate::error::{PipeError, PipeResult};
use crate::props::{
    CHANNELS, DeviceProperties, SAMPLE_FORMAT, SAMPLE_RATE, buffer_size_bytes, parse_prop_list,
    prop_list,
};

/// Server module backing a virtual source.
pub const PIPE_SOURCE_MODULE: &str = "module-pipe-source";
/// Server module backing a virtual sink.
pub const PIPE_SINK_MODULE: &str = "module-pipe-sink";

const PIPE_MODE: u32 = 0o755;

/// Where pipe files live and how they are named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Directory holding the pipe files
    #[serde(default = "default_pipe_dir")]
    pub pipe_dir: PathBuf,
    /// Application prefix in pipe file names
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self { pipe_dir: default_pipe_dir(), prefix: default_prefix() }
    }
}

fn default_pipe_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_prefix() -> String {
    "pipedev".to_string()
}

impl PipeConfig {
    /// Pipe file path for a device name: `<pipe_dir>/<prefix>-<name>.pipe`.
    ///
    /// The name is not checked here; [`PipeProvisioner`] rejects names that
    /// would leave `pipe_dir` before using it.
    #[must_use]
    pub fn pipe_path(&self, name: &str) -> PathBuf {
        self.pipe_dir.join(format!("{}-{name}.pipe", self.prefix))
    }

    /// Check whether a pipe module with this device name and pipe file is one
    /// this configuration creates.
    ///
    /// The file must be exactly `pipe_path(device_name)`. A file name prefix
    /// match is not enough: `nDAX-other-RX1.pipe` starts with `nDAX-` but
    /// belongs to prefix `nDAX-other`.
    #[must_use]
    pub fn owns_pipe(&self, device_name: &str, path: &Path) -> bool {
        check_device_name(device_name).is_ok() && self.pipe_path(device_name) == path
    }
}

/// A device name must map to a single file inside the pipe directory.
fn check_device_name(name: &str) -> PipeResult<()> {
    if name.is_empty() || name.contains(['/', '\0']) {
        return Err(PipeError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Creates and releases pipe devices over an injected module control channel.
pub struct PipeProvisioner<C> {
    control: C,
    config: PipeConfig,
}

impl<C: ModuleControl> PipeProvisioner<C> {
    /// Create a provisioner using the given control channel.
    #[must_use]
    pub fn new(control: C, config: PipeConfig) -> Self {
        Self { control, config }
    }

    /// The control channel.
    #[must_use]
    pub fn control(&self) -> &C {
        &self.control
    }

    /// The pipe configuration.
    #[must_use]
    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Create a virtual source named `name`.
    ///
    /// The pipe is opened read-write; samples written to it appear on the
    /// server side as captured audio. `latency_ms` sizes the device buffer.
    ///
    /// # Errors
    /// - [`PipeError::InvalidName`] for an empty name or one containing `/`
    /// - [`PipeError::InvalidLatency`] for a negative or non-finite latency
    /// - [`PipeError::ModuleLoad`] if the server refuses the module
    /// - [`PipeError::PipeOpen`] if the pipe cannot be opened; the module is
    ///   unloaded again before returning
    pub fn create_source(
        &self,
        name: &str,
        description: &str,
        icon: &str,
        latency_ms: f64,
    ) -> PipeResult<VirtualSource> {
        check_device_name(name)?;
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(PipeError::InvalidLatency(latency_ms));
        }

        let path = self.config.pipe_path(name);
        let file_arg = path.to_string_lossy().into_owned();
        let properties = DeviceProperties {
            buffer_size: Some(buffer_size_bytes(latency_ms)),
            icon_name: icon.to_string(),
            description: description.to_string(),
        }
        .render();

        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();
        let args = prop_list(&[
            ("source_name", name),
            ("file", file_arg.as_str()),
            ("rate", rate.as_str()),
            ("format", SAMPLE_FORMAT),
            ("channels", channels.as_str()),
            ("source_properties", properties.as_str()),
        ]);

        info!(name, latency_ms, "Creating pipe source");
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        self.load_and_open(PIPE_SOURCE_MODULE, &args, path, &options)
            .map(VirtualSource::new)
    }

    /// Create a virtual sink named `name`.
    ///
    /// The pipe is opened read-only; audio played to the sink can be read
    /// from it. The server paces the sink with the system clock.
    ///
    /// # Errors
    /// - [`PipeError::InvalidName`] for an empty name or one containing `/`
    /// - [`PipeError::ModuleLoad`] if the server refuses the module
    /// - [`PipeError::PipeOpen`] if the pipe cannot be opened; the module is
    ///   unloaded again before returning
    pub fn create_sink(&self, name: &str, description: &str, icon: &str) -> PipeResult<VirtualSink> {
        check_device_name(name)?;
        let path = self.config.pipe_path(name);
        let file_arg = path.to_string_lossy().into_owned();
        let properties = DeviceProperties {
            buffer_size: None,
            icon_name: icon.to_string(),
            description: description.to_string(),
        }
        .render();

        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();
        let args = prop_list(&[
            ("sink_name", name),
            ("file", file_arg.as_str()),
            ("rate", rate.as_str()),
            ("format", SAMPLE_FORMAT),
            ("channels", channels.as_str()),
            ("use_system_clock_for_timing", "yes"),
            ("sink_properties", properties.as_str()),
        ]);

        info!(name, "Creating pipe sink");
        let mut options = OpenOptions::new();
        options.read(true);
        self.load_and_open(PIPE_SINK_MODULE, &args, path, &options)
            .map(VirtualSink::new)
    }

    /// Release a device: close its pipe, then unload its module.
    ///
    /// Close errors are ignored. The module is unloaded even if the pipe file
    /// was already taken out of the device.
    ///
    /// # Errors
    /// Returns [`PipeError::ModuleUnload`] if the server does not unload the
    /// module; the pipe is closed regardless.
    pub fn release(&self, device: impl Into<PipeHandle>) -> PipeResult<()> {
        let (index, file) = device.into().disarm();
        drop(file);

        self.control
            .unload_module(index)
            .map_err(|source| PipeError::ModuleUnload { index, source })?;

        debug!(module = %index, "Pipe device released");
        Ok(())
    }

    /// List the server's loaded modules, in server order.
    ///
    /// # Errors
    /// Returns [`PipeError::Query`] if the request fails.
    pub fn list_modules(&self) -> PipeResult<Vec<ModuleInfo>> {
        self.control.module_info_list().map_err(PipeError::Query)
    }

    /// Unload pipe modules left behind in this configuration's namespace.
    ///
    /// Matches `module-pipe-source` / `module-pipe-sink` instances whose
    /// device name and `file` argument are a pair this provisioner would
    /// create (see [`PipeConfig::owns_pipe`]). Failed unloads are logged and
    /// skipped.
    ///
    /// The server cannot tell a stale module from a live one. Run the sweep
    /// before creating any device, or pass the modules of every device still
    /// in use under this prefix (by this provisioner or another process) in
    /// `live`; those are never unloaded. Otherwise a live device loses its
    /// module and its later [`release`](Self::release) fails.
    ///
    /// # Errors
    /// Returns [`PipeError::Query`] if the module list cannot be fetched.
    pub fn sweep_stale(&self, live: &[ModuleIndex]) -> PipeResult<Vec<ModuleIndex>> {
        let modules = self.list_modules()?;
        let mut unloaded = Vec::new();

        for module in modules.iter().filter(|m| m.is_pipe_device()) {
            if live.contains(&module.index) {
                debug!(module = %module.index, "Skipping live pipe module");
                continue;
            }
            let Some((name, path)) = pipe_module_identity(module) else {
                continue;
            };
            if !self.config.owns_pipe(&name, &path) {
                continue;
            }

            match self.control.unload_module(module.index) {
                Ok(()) => {
                    info!(module = %module.index, path = %path.display(), "Unloaded stale pipe module");
                    unloaded.push(module.index);
                }
                Err(e) => {
                    warn!(module = %module.index, error = %e, "Failed to unload stale pipe module");
                }
            }
        }

        Ok(unloaded)
    }

    fn load_and_open(
        &self,
        module: &'static str,
        args: &str,
        path: PathBuf,
        options: &OpenOptions,
    ) -> PipeResult<PipeHandle> {
        debug!(module, args, "Loading pipe module");
        let index = self
            .control
            .load_module(module, args)
            .map_err(|source| PipeError::ModuleLoad { module, source })?;

        match open_pipe(options, &path) {
            Ok(file) => {
                info!(module, index = %index, path = %path.display(), "Pipe device ready");
                Ok(PipeHandle::new(index, path, file))
            }
            Err(source) => {
                if let Err(e) = self.control.unload_module(index) {
                    warn!(
                        module,
                        index = %index,
                        error = %e,
                        "Failed to unload module after pipe open failure"
                    );
                }
                Err(PipeError::PipeOpen { path, source })
            }
        }
    }
}

fn open_pipe(options: &OpenOptions, path: &Path) -> std::io::Result<File> {
    let mut options = options.clone();
    options.mode(PIPE_MODE).open(path)
}

/// Device name and pipe file a pipe module was loaded with.
fn pipe_module_identity(module: &ModuleInfo) -> Option<(String, PathBuf)> {
    let name_key = if module.name == PIPE_SOURCE_MODULE { "source_name" } else { "sink_name" };
    let pairs = parse_prop_list(module.argument.as_deref()?)?;

    let name = pairs.iter().find(|(key, _)| key == name_key)?.1.clone();
    let path = pairs.iter().find(|(key, _)| key == "file")?.1.clone();
    Some((name, PathBuf::from(path)))
}
