//! Maps repository descriptors to feed clients.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use super::{FeedClient, LocalDirectoryFeedClient, RemoteFeedClient};
use crate::http::HttpClient;
use crate::registry::RepositoryDescriptor;
use crate::runtime::Runtime;

const USER_AGENT: &str = "resget-cli";

/// Where a repository URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Remote(String),
    Local(PathBuf),
}

impl FeedLocation {
    /// `http(s)://` URLs are remote; `file://` URLs and plain paths are local.
    pub fn parse(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            FeedLocation::Remote(url.to_string())
        } else if lower.starts_with("file://") {
            FeedLocation::Local(PathBuf::from(&url["file://".len()..]))
        } else {
            FeedLocation::Local(PathBuf::from(url))
        }
    }
}

pub struct FeedFactory<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime + 'static> FeedFactory<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    pub fn create(&self, descriptor: &RepositoryDescriptor) -> Result<Arc<dyn FeedClient>> {
        match FeedLocation::parse(&descriptor.url) {
            FeedLocation::Remote(_) => {
                let client = self.http_client(descriptor)?;
                Ok(Arc::new(RemoteFeedClient::new(
                    Arc::clone(&self.runtime),
                    descriptor.clone(),
                    client,
                )))
            }
            FeedLocation::Local(root) => Ok(Arc::new(LocalDirectoryFeedClient::new(
                Arc::clone(&self.runtime),
                descriptor.clone(),
                root,
            ))),
        }
    }

    /// HTTP client for one repository, authenticated when the repository
    /// names a credential variable that is set.
    pub fn http_client(&self, descriptor: &RepositoryDescriptor) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(variable) = &descriptor.credential {
            match self.runtime.env_var(variable) {
                Ok(token) => {
                    let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
                    auth_value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, auth_value);
                    debug!(
                        "Using {} for {}: {}",
                        variable,
                        descriptor.name,
                        mask(&token)
                    );
                }
                Err(_) => debug!("{} is not set, {} is queried anonymously", variable, descriptor.name),
            }
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(HttpClient::new(client))
    }
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
