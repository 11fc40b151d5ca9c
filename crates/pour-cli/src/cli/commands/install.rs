//! `pour install`: run the full pipeline for one descriptor.

use anyhow::Result;
use pour_core::config::PourConfig;
use pour_core::control::CancelToken;
use pour_core::pipeline::{Pipeline, Plan, RunOptions, RunReport};
use std::path::PathBuf;

use super::{as_config_failure, DescriptorArgs};

#[derive(Debug, Clone)]
pub struct InstallArgs {
    pub descriptor: DescriptorArgs,
    pub prefix: Option<PathBuf>,
    pub skip_verify: bool,
    pub dry_run: bool,
    pub keep_download: bool,
}

pub async fn run_install(cfg: &PourConfig, args: InstallArgs) -> Result<()> {
    let descriptor = args.descriptor.load()?;

    let mut options = as_config_failure(RunOptions::from_config(cfg))?;
    if let Some(prefix) = args.prefix {
        options.prefix = prefix;
    }
    options.skip_verify = args.skip_verify;
    options.dry_run = args.dry_run;
    options.keep_downloads |= args.keep_download;

    if options.skip_verify && !options.dry_run {
        eprintln!("************************************************************");
        eprintln!("  WARNING: --skip-verify is set. The archive's SHA-256 will");
        eprintln!("  NOT be enforced. Only use this with archives you trust.");
        eprintln!("************************************************************");
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, stopping...");
            on_signal.cancel();
        }
    });

    eprintln!(
        "==> {} {} -> {}",
        descriptor.name(),
        descriptor.version(),
        options.prefix.display()
    );
    let result = tokio::task::spawn_blocking(move || {
        let mut pipeline = Pipeline::new(&descriptor, options, cancel);
        pipeline.run()
    })
    .await;
    signal_task.abort();

    let report = result??;
    if args.dry_run {
        print_plan(&report.plan);
        return Ok(());
    }
    print_summary(&report);
    Ok(())
}

pub(super) fn print_plan(plan: &Plan) {
    println!("name:     {}", plan.name);
    println!("version:  {}", plan.version);
    println!("url:      {}", plan.url);
    println!("format:   {}", plan.archive_format);
    println!("sha256:   {}", plan.expected_checksum);
    println!("prefix:   {}", plan.prefix.display());
    for f in &plan.files {
        println!(
            "install:  {} -> {} ({})",
            f.source.display(),
            f.destination.display(),
            f.kind
        );
    }
    println!("test:     {}", plan.test_command.join(" "));
}

fn print_summary(report: &RunReport) {
    if let Some(digest) = &report.actual_checksum {
        let note = if report.verified { "verified" } else { "NOT verified" };
        eprintln!("==> sha256 {} ({})", digest, note);
    }
    for path in &report.installed {
        println!("{}", path.display());
    }
    eprintln!(
        "==> {} {} installed, smoke test passed",
        report.plan.name, report.plan.version
    );
}
