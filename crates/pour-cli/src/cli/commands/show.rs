//! `pour show`: resolve a descriptor and print its plan.

use anyhow::Result;
use pour_core::config::PourConfig;
use pour_core::control::CancelToken;
use pour_core::install::Installer;
use pour_core::pipeline::Plan;
use std::path::PathBuf;

use super::install::print_plan;
use super::{prefix_or_configured, DescriptorArgs};

pub async fn run_show(cfg: &PourConfig, args: &DescriptorArgs, prefix: Option<PathBuf>) -> Result<()> {
    let descriptor = args.load()?;
    let prefix = prefix_or_configured(cfg, prefix)?;
    let installer = Installer::new(prefix, CancelToken::new());

    if let Some(desc) = descriptor.desc() {
        println!("desc:     {}", desc);
    }
    if let Some(homepage) = descriptor.homepage() {
        println!("homepage: {}", homepage);
    }
    print_plan(&Plan::new(&descriptor, &installer));

    match installer.receipt(descriptor.name()) {
        Ok(Some(r)) => println!("installed: {} ({} file(s))", r.version, r.files.len()),
        Ok(None) => println!("installed: no"),
        Err(e) => tracing::warn!("could not read receipt: {}", e),
    }
    Ok(())
}
