use anyhow::{Result, bail};
use log::debug;

use super::config::Config;
use super::interrupt::InterruptGuard;
use crate::{
    package::{ResourceMetadata, Versioned},
    runtime::Runtime,
    search::{SearchCoordinator, SearchRequest},
};

/// Search the registered repositories and print the matches.
#[tracing::instrument(skip(config))]
pub async fn find<R: Runtime + 'static>(
    config: &Config<R>,
    request: SearchRequest,
    repositories: &[String],
) -> Result<()> {
    let repositories = config.repositories(repositories)?;
    debug!("Searching {} repositories", repositories.len());
    let feeds = config.feeds(&repositories);

    let interrupt = InterruptGuard::install();
    let outcome = SearchCoordinator::new(&feeds)
        .search(interrupt.context(), &request, &repositories)
        .await?;

    for issue in outcome.unavailable.iter().chain(&outcome.unresolved) {
        eprintln!("warning: {}", issue);
    }

    if outcome.results.is_empty() {
        println!("No resources found.");
    }
    for metadata in &outcome.results {
        println!("{}", format_result(metadata));
    }

    let missing: Vec<String> = outcome.not_found_errors().map(|e| e.to_string()).collect();
    for message in &missing {
        eprintln!("{}", message);
    }
    if !missing.is_empty() {
        bail!("{} name(s) could not be found", missing.len());
    }
    Ok(())
}

pub(crate) fn format_result(metadata: &ResourceMetadata) -> String {
    let line = format!(
        "{:<32} {:<16} {:<8} {:<12}",
        metadata.id().as_str(),
        metadata.version().to_string(),
        metadata.primary_kind().to_string(),
        metadata.repository
    );
    match &metadata.description {
        Some(description) => format!("{} {}", line, description).trim_end().to_string(),
        None => line.trim_end().to_string(),
    }
}
