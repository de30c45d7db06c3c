//! Module control channel.
//!
//! The sound server exposes a module-loading interface: load a module with an
//! argument string and get back its index, unload a module by index, and list
//! the loaded modules. [`ModuleControl`] is that interface; the provisioner is
//! handed an implementation rather than reaching for a global connection.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ControlResult;

/// Index the sound server assigned to a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleIndex(pub u32);

impl fmt::Display for ModuleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for ModuleIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Descriptor of a module loaded in the sound server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module index
    pub index: ModuleIndex,
    /// Module name (e.g., "module-pipe-source")
    pub name: String,
    /// Argument string the module was loaded with
    pub argument: Option<String>,
    /// Usage counter, if the server tracks one
    pub n_used: Option<u32>,
    /// Module properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ModuleInfo {
    /// Check if this is a pipe source or pipe sink module.
    #[must_use]
    pub fn is_pipe_device(&self) -> bool {
        self.name == crate::provisioner::PIPE_SOURCE_MODULE
            || self.name == crate::provisioner::PIPE_SINK_MODULE
    }
}

/// Request/reply interface to the sound server's module loader.
///
/// Implementations own the transport and are responsible for serializing
/// concurrent requests. Every call blocks until the server replies or the
/// transport gives up.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleControl {
    /// Load `name` with the given argument string.
    ///
    /// # Errors
    /// Returns an error if the transport fails or the server rejects the module.
    fn load_module(&self, name: &str, args: &str) -> ControlResult<ModuleIndex>;

    /// Unload the module with the given index.
    ///
    /// # Errors
    /// Returns an error if the transport fails or the server rejects the request.
    fn unload_module(&self, index: ModuleIndex) -> ControlResult<()>;

    /// List loaded modules in server order.
    ///
    /// # Errors
    /// Returns an error if the transport fails or the reply cannot be parsed.
    fn module_info_list(&self) -> ControlResult<Vec<ModuleInfo>>;
}

impl<C: ModuleControl + ?Sized> ModuleControl for Arc<C> {
    fn load_module(&self, name: &str, args: &str) -> ControlResult<ModuleIndex> {
        (**self).load_module(name, args)
    }

    fn unload_module(&self, index: ModuleIndex) -> ControlResult<()> {
        (**self).unload_module(index)
    }

    fn module_info_list(&self) -> ControlResult<Vec<ModuleInfo>> {
        (**self).module_info_list()
    }
}
