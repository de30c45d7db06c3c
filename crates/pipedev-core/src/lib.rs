//! pipedev core - Named-pipe virtual audio devices.
//!
//! This crate asks a PulseAudio-compatible sound server to create pipe
//! devices and hands back the open pipe:
//! - Virtual sources: samples written to the pipe become a capture device
//! - Virtual sinks: audio played to the sink can be read from the pipe
//! - Module listing and cleanup of pipe modules left behind by a crash
//!
//! The server is reached through a [`ModuleControl`] implementation passed to
//! [`PipeProvisioner::new`].

pub mod control;
pub mod device;
pub mod error;
pub mod props;
pub mod provisioner;

pub use control::{ModuleControl, ModuleIndex, ModuleInfo};
pub use device::{PipeHandle, VirtualSink, VirtualSource};
pub use error::{ControlError, ControlResult, PipeError, PipeResult};
pub use provisioner::{PIPE_SINK_MODULE, PIPE_SOURCE_MODULE, PipeConfig, PipeProvisioner};
