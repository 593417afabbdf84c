use anyhow::Result;

use super::config::Config;
use super::interrupt::InterruptGuard;
use crate::{
    application::{UninstallOptions, UninstallOutcome, UninstallRequest, UninstallUseCase},
    package::ResourceVersion,
    runtime::Runtime,
};

/// Remove installed versions of one resource.
#[tracing::instrument(skip(config))]
pub fn uninstall<R: Runtime + 'static>(
    config: &Config<R>,
    request: UninstallRequest,
    options: UninstallOptions,
) -> Result<()> {
    let interrupt = InterruptGuard::install();
    let use_case = UninstallUseCase::new(config.runtime.as_ref(), config.install_root.clone());

    match use_case.uninstall(interrupt.context(), &request, &options)? {
        UninstallOutcome::NotInstalled => println!("{} is not installed.", request.name),
        UninstallOutcome::NoMatchingVersion => {
            println!("No installed version of {} matches the request.", request.name)
        }
        UninstallOutcome::PartiallyRemoved { removed, remaining } => {
            println!("Uninstalled {} {}", request.name, join(&removed));
            println!("Still installed: {}", join(&remaining));
        }
        UninstallOutcome::FullyRemoved { removed } => {
            println!("Uninstalled {} {}", request.name, join(&removed));
        }
    }
    Ok(())
}

fn join(versions: &[ResourceVersion]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
