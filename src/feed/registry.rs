//! Feed clients by repository name.

use std::sync::Arc;

use log::warn;

use super::{FeedClient, FeedFactory};
use crate::registry::RepositoryDescriptor;
use crate::runtime::Runtime;

/// Feed clients keyed by repository name, compared case-insensitively.
/// Iteration follows registration order.
#[derive(Default, Clone)]
pub struct FeedRegistry {
    feeds: Vec<Arc<dyn FeedClient>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every repository. A repository whose client cannot
    /// be created is left out and later reported as unavailable.
    pub fn from_repositories<R: Runtime + 'static>(
        factory: &FeedFactory<R>,
        repositories: &[RepositoryDescriptor],
    ) -> Self {
        let mut registry = Self::new();
        for descriptor in repositories {
            match factory.create(descriptor) {
                Ok(feed) => registry.register(feed),
                Err(e) => warn!("Cannot create a client for {}: {:#}", descriptor.name, e),
            }
        }
        registry
    }

    /// Register a client, replacing any client with the same repository name.
    pub fn register(&mut self, feed: Arc<dyn FeedClient>) {
        let name = feed.repository().name.clone();
        self.feeds
            .retain(|f| !f.repository().name.eq_ignore_ascii_case(&name));
        self.feeds.push(feed);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FeedClient>> {
        self.feeds
            .iter()
            .find(|f| f.repository().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
