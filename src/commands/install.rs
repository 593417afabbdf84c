use anyhow::{Result, bail};
use log::debug;

use super::config::Config;
use super::interrupt::InterruptGuard;
use crate::{
    application::{InstallOptions, InstallReport, InstallRequest, InstallStatus, InstallUseCase},
    runtime::Runtime,
};

/// Install every name at the requested version.
#[tracing::instrument(skip(config, options))]
pub async fn install<R: Runtime + 'static>(
    config: &Config<R>,
    names: &[String],
    version: Option<String>,
    options: InstallOptions,
) -> Result<()> {
    // The use case applies `options.repositories`
    let repositories = config.repositories(&[])?;
    let feeds = config.feeds(&repositories);
    debug!("Installing into {:?}", config.install_root);

    let interrupt = InterruptGuard::install();
    let use_case = InstallUseCase::new(
        config.runtime.as_ref(),
        &feeds,
        repositories,
        config.install_root.clone(),
    )
    .with_cleanup(interrupt.cleanup());

    let requests: Vec<InstallRequest> = names
        .iter()
        .map(|name| InstallRequest::new(name.as_str(), version.clone()))
        .collect();
    let reports = use_case
        .install(interrupt.context(), &requests, &options)
        .await?;

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    for report in &reports {
        print_report(report);
    }
    if failed > 0 {
        bail!("{} of {} resource(s) could not be installed", failed, reports.len());
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    for issue in &report.issues {
        eprintln!("warning: {}", issue);
    }
    match &report.status {
        InstallStatus::Installed { installed } => {
            for identity in installed {
                println!("Installed {}", identity);
            }
        }
        InstallStatus::AlreadyInstalled(identity) => {
            println!("{} is already installed", identity);
        }
        InstallStatus::NotFound => {
            eprintln!("'{}' could not be found in any repository", report.name);
        }
        InstallStatus::Failed { reason, installed } => {
            for identity in installed {
                println!("Installed {}", identity);
            }
            eprintln!("Failed to install '{}': {}", report.name, reason);
            if !installed.is_empty() {
                eprintln!(
                    "Kept {} package(s) installed before the failure",
                    installed.len()
                );
            }
        }
    }
}
