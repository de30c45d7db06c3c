//! pipedev pulse - Sound server access through `pactl`.
//!
//! Provides [`PactlControl`], a [`pipedev_core::ModuleControl`] that drives
//! the server's module loader with the `pactl` client, so a
//! [`pipedev_core::PipeProvisioner`] can run against a live PulseAudio or
//! pipewire-pulse server.

mod modules;
pub mod pactl;

pub use pactl::{PactlConfig, PactlControl};
