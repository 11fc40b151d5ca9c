//! `pour uninstall`: remove files recorded in a package's receipt.

use anyhow::Result;
use pour_core::config::PourConfig;
use pour_core::control::CancelToken;
use pour_core::install::Installer;
use std::path::PathBuf;

use super::prefix_or_configured;

pub async fn run_uninstall(cfg: &PourConfig, name: &str, prefix: Option<PathBuf>) -> Result<()> {
    let prefix = prefix_or_configured(cfg, prefix)?;
    let installer = Installer::new(prefix, CancelToken::new());
    let receipt = installer.uninstall(name)?;
    for f in &receipt.files {
        println!("removed {}", f.display());
    }
    eprintln!("==> {} {} uninstalled", receipt.name, receipt.version);
    Ok(())
}
