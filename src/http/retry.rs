//! When a failed feed request is worth repeating.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::StatusCode;

/// How many times a feed request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, used where a caller already handles failure.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Runs `operation` until it succeeds, fails with a [`FeedHttpError`],
    /// or the attempts are used up. The last error is returned.
    pub async fn run<F, Fut, T>(&self, what: &str, operation: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.downcast_ref::<FeedHttpError>().is_some() => {
                    debug!("{}: not retrying: {}", what, e);
                    return Err(e);
                }
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        what, attempt, attempts, e, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A feed answered with a status that will not change on retry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedHttpError {
    #[error("the repository rejected the credential (HTTP 401); check the configured credential variable")]
    Unauthorized,
    #[error("access to the repository is forbidden (HTTP 403)")]
    Forbidden,
    #[error("the repository is rate limiting requests (HTTP {0}); try again later")]
    RateLimited(u16),
    #[error("not found on the repository (HTTP 404)")]
    NotFound,
    #[error("the repository rejected the request (HTTP {0})")]
    Rejected(u16),
}

impl FeedHttpError {
    /// Maps a response status to a permanent failure. Success, redirects
    /// and server errors yield `None`.
    pub fn from_status(status: StatusCode, body_hint: &str) -> Option<Self> {
        match status {
            StatusCode::UNAUTHORIZED => Some(Self::Unauthorized),
            StatusCode::FORBIDDEN if body_hint.to_lowercase().contains("rate limit") => {
                Some(Self::RateLimited(status.as_u16()))
            }
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            StatusCode::TOO_MANY_REQUESTS => Some(Self::RateLimited(status.as_u16())),
            StatusCode::NOT_FOUND => Some(Self::NotFound),
            s if s.is_client_error() => Some(Self::Rejected(s.as_u16())),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Turns a non-success response into an error, classifying permanent
/// failures as [`FeedHttpError`] so [`RetryPolicy::run`] stops early.
pub(crate) async fn check_status(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    match FeedHttpError::from_status(status, &body) {
        Some(permanent) => Err(permanent.into()),
        None => Err(anyhow::anyhow!("{} answered HTTP {}", url, status.as_u16())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            FeedHttpError::from_status(StatusCode::UNAUTHORIZED, ""),
            Some(FeedHttpError::Unauthorized)
        );
        assert_eq!(
            FeedHttpError::from_status(StatusCode::FORBIDDEN, "API rate limit exceeded"),
            Some(FeedHttpError::RateLimited(403))
        );
        assert_eq!(
            FeedHttpError::from_status(StatusCode::FORBIDDEN, "private feed"),
            Some(FeedHttpError::Forbidden)
        );
        assert_eq!(
            FeedHttpError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Some(FeedHttpError::RateLimited(429))
        );
        assert!(
            FeedHttpError::from_status(StatusCode::NOT_FOUND, "")
                .unwrap()
                .is_not_found()
        );
        assert_eq!(
            FeedHttpError::from_status(StatusCode::BAD_REQUEST, ""),
            Some(FeedHttpError::Rejected(400))
        );
        assert_eq!(FeedHttpError::from_status(StatusCode::BAD_GATEWAY, ""), None);
        assert_eq!(FeedHttpError::from_status(StatusCode::OK, ""), None);
    }

    #[test]
    fn test_unauthorized_message_points_at_credential() {
        assert!(FeedHttpError::Unauthorized.to_string().contains("credential"));
    }

    #[tokio::test]
    async fn test_run_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = quick(3)
            .run("search", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("connection reset"))
                    } else {
                        Ok("page")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = quick(3)
            .run("metadata", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::Error::from(FeedHttpError::Forbidden))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            err.downcast_ref::<FeedHttpError>(),
            Some(&FeedHttpError::Forbidden)
        );
    }

    #[tokio::test]
    async fn test_run_gives_up_after_last_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = quick(2)
            .run("download", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("timeout #{}", n))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.to_string(), "timeout #1");
    }

    #[tokio::test]
    async fn test_none_makes_a_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let _ = RetryPolicy::none()
            .run("search", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("connection refused"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_status() {
        let mut server = mockito::Server::new_async().await;
        let _unauthorized = server
            .mock("GET", "/private")
            .with_status(401)
            .create_async()
            .await;
        let _unavailable = server
            .mock("GET", "/busy")
            .with_status(503)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/private", server.url()))
            .send()
            .await
            .unwrap();
        let err = check_status(response).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<FeedHttpError>(),
            Some(&FeedHttpError::Unauthorized)
        );

        let response = client
            .get(format!("{}/busy", server.url()))
            .send()
            .await
            .unwrap();
        let err = check_status(response).await.unwrap_err();
        assert!(err.downcast_ref::<FeedHttpError>().is_none());
        assert!(err.to_string().contains("503"));
    }
}
