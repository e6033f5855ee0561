//! Loading launcher settings.

use std::ffi::OsString;
use std::sync::Arc;

use nuhost_config::HostSettings;
use ortho_config::{OrthoConfig, OrthoError};

/// Trait abstracting settings loading for testability.
pub trait SettingsLoader: Send + Sync {
    /// Loads the launcher settings from the process arguments.
    fn load(&self, args: &[OsString]) -> Result<HostSettings, Arc<OrthoError>>;
}

/// Loader that layers defaults, files, `NUHOST_*` variables and `args`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSettingsLoader;

impl SettingsLoader for SystemSettingsLoader {
    fn load(&self, args: &[OsString]) -> Result<HostSettings, Arc<OrthoError>> {
        HostSettings::load_from_iter(args.iter().cloned())
    }
}

/// Loader that ignores the arguments and returns fixed settings.
#[derive(Debug, Default, Clone)]
pub struct StaticSettingsLoader {
    settings: HostSettings,
}

impl StaticSettingsLoader {
    /// Builds a loader returning `settings`.
    #[must_use]
    pub const fn new(settings: HostSettings) -> Self {
        Self { settings }
    }
}

impl SettingsLoader for StaticSettingsLoader {
    fn load(&self, _args: &[OsString]) -> Result<HostSettings, Arc<OrthoError>> {
        Ok(self.settings.clone())
    }
}
