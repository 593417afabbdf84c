//! Thin reqwest wrapper used by remote feeds.

use anyhow::{Context, Result, bail};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::io::Write;

use super::retry::{FeedHttpError, RetryPolicy, check_status};

/// Feed HTTP client. Every request goes through the configured [`RetryPolicy`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GETs `url` with `query` and decodes the JSON body.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!("GET {} {:?}", url, query);

        self.retry
            .run(url, || async {
                let response = self
                    .client
                    .get(url)
                    .query(query)
                    .send()
                    .await
                    .with_context(|| format!("Failed to reach {}", url))?;
                let response = check_status(response).await?;
                response
                    .json::<T>()
                    .await
                    .with_context(|| format!("{} did not return valid feed JSON", url))
            })
            .await
    }

    /// Like [`HttpClient::get_json`], but a 404 yields `None`. Feeds answer
    /// 404 for package ids they do not carry.
    pub async fn get_json_optional<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        match self.get_json(url, query).await {
            Ok(value) => Ok(Some(value)),
            Err(e)
                if e
                    .downcast_ref::<FeedHttpError>()
                    .is_some_and(FeedHttpError::is_not_found) =>
            {
                debug!("{} not found", url);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Streams `url` into a fresh writer from `create_writer`, returning the
    /// byte count. A retry starts over with a new writer. A body shorter
    /// than the announced Content-Length is an error.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading {}", url);

        self.retry
            .run(url, || async {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to start download of {}", url))?;
                let mut response = check_status(response).await?;
                let expected = response.content_length();

                let mut writer = create_writer()?;
                let mut written: u64 = 0;
                while let Some(chunk) = response
                    .chunk()
                    .await
                    .with_context(|| format!("Download of {} was interrupted", url))?
                {
                    writer
                        .write_all(&chunk)
                        .context("Failed to write package archive")?;
                    written += chunk.len() as u64;
                }
                writer.flush().context("Failed to write package archive")?;

                if let Some(expected) = expected
                    && written < expected
                {
                    bail!("{} ended after {} of {} bytes", url, written, expected);
                }
                Ok(written)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn client() -> HttpClient {
        HttpClient::new(Client::new()).with_retry_policy(RetryPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        })
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Page {
        total: usize,
        ids: Vec<String>,
    }

    #[tokio::test]
    async fn test_get_json_sends_query() {
        // --- Setup Mock Server ---
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "Az.*".into()),
                Matcher::UrlEncoded("take".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"total": 2, "ids": ["Az.Accounts", "Az.Storage"]}"#)
            .create_async()
            .await;

        // --- Execute ---
        let page: Page = client()
            .get_json(&format!("{}/search", server.url()), &[("q", "Az.*"), ("take", "10")])
            .await
            .unwrap();

        // --- Verify ---
        mock.assert_async().await;
        assert_eq!(page.total, 2);
        assert_eq!(page.ids, vec!["Az.Accounts", "Az.Storage"]);
    }

    #[tokio::test]
    async fn test_get_json_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .with_status(502)
            .expect(2)
            .create_async()
            .await;

        let result: Result<Page> = client()
            .get_json(&format!("{}/search", server.url()), &[])
            .await;

        mock.assert_async().await;
        assert!(result.unwrap_err().to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_get_json_invalid_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let result: Result<Page> = client()
            .get_json(&format!("{}/search", server.url()), &[])
            .await;

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("did not return valid feed JSON")
        );
    }

    #[tokio::test]
    async fn test_get_json_optional_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages/Missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result: Option<Page> = client()
            .get_json_optional(&format!("{}/packages/Missing", server.url()), &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_json_optional_keeps_other_failures() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages/Private")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let err = client()
            .get_json_optional::<Page>(&format!("{}/packages/Private", server.url()), &[])
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.downcast_ref::<FeedHttpError>(),
            Some(&FeedHttpError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_download_streams_into_writer() {
        // --- Setup Mock Server ---
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages/Pester/5.5.0/download")
            .with_status(200)
            .with_body("archive-bytes")
            .create_async()
            .await;
        let sink = Arc::new(Mutex::new(Vec::new()));

        // --- Execute ---
        let bytes = client()
            .download(
                &format!("{}/packages/Pester/5.5.0/download", server.url()),
                || Ok(SharedBuffer(sink.clone())),
            )
            .await
            .unwrap();

        // --- Verify ---
        mock.assert_async().await;
        assert_eq!(bytes, 13);
        assert_eq!(sink.lock().unwrap().as_slice(), b"archive-bytes");
    }

    #[tokio::test]
    async fn test_download_not_found_creates_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/packages/Missing/1.0.0/download")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result = client()
            .download(
                &format!("{}/packages/Missing/1.0.0/download", server.url()),
                || -> Result<std::io::Sink> { panic!("writer must not be created") },
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
