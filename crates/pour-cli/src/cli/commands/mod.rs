//! CLI command handlers. Each command is in its own file.

mod checksum;
mod completions;
mod install;
mod show;
mod uninstall;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use install::{run_install, InstallArgs};
pub use show::run_show;
pub use uninstall::run_uninstall;

use anyhow::Context;
use pour_core::config::PourConfig;
use pour_core::descriptor::vars::{EnvSource, LayeredSource, MapSource};
use pour_core::descriptor::{Descriptor, LoadContext};
use pour_core::error::DescriptorError;
use pour_core::platform::Platform;
use std::path::PathBuf;

use super::ConfigFailure;

/// Tags a configuration lookup so it exits with the descriptor/config code.
pub(crate) fn as_config_failure<T>(result: anyhow::Result<T>) -> anyhow::Result<T> {
    result.context(ConfigFailure)
}

/// `--prefix` when given, else the configured or XDG default prefix.
pub(crate) fn prefix_or_configured(cfg: &PourConfig, prefix: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match prefix {
        Some(p) => Ok(p),
        None => as_config_failure(cfg.resolve_prefix()),
    }
}

/// Where a descriptor comes from and how its templates resolve.
#[derive(Debug, Clone)]
pub struct DescriptorArgs {
    pub path: PathBuf,
    /// `KEY=VALUE` overrides, consulted before the environment.
    pub vars: Vec<String>,
    /// `OS_ARCH`, or the host platform.
    pub platform: Option<String>,
}

impl DescriptorArgs {
    pub fn load(&self) -> Result<Descriptor, DescriptorError> {
        let overrides = MapSource::from_assignments(&self.vars).map_err(|reason| {
            DescriptorError::Invalid {
                field: "--var".to_string(),
                reason,
            }
        })?;
        let platform = match &self.platform {
            Some(p) => p.parse::<Platform>().map_err(|reason| DescriptorError::Invalid {
                field: "--platform".to_string(),
                reason,
            })?,
            None => Platform::detect(),
        };
        let env = EnvSource;
        let vars = LayeredSource::new().push(&overrides).push(&env);
        let descriptor = Descriptor::load(&self.path, LoadContext::new(&vars).with_platform(platform))?;
        tracing::debug!(
            path = %self.path.display(),
            name = descriptor.name(),
            version = descriptor.version(),
            url = descriptor.url(),
            "descriptor loaded"
        );
        Ok(descriptor)
    }
}
