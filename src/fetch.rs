use anyhow::{bail, Result};
use async_trait::async_trait;

/// What to do with a response of a given HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// 2xx: take the body
    Body,
    /// Gone or blocked (404, 403): no content, caller skips the page
    Skip,
    /// Anything else: hard error
    Fail,
}

pub fn classify_status(status: u16) -> StatusAction {
    match status {
        200..=299 => StatusAction::Body,
        403 | 404 => StatusAction::Skip,
        _ => StatusAction::Fail,
    }
}

/// Fetches one page of HTML. `Ok(None)` means the page is gone or blocked
/// and the caller should skip it; errors carry the status and URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<Option<String>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<Option<String>> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();

        match classify_status(status) {
            StatusAction::Body => Ok(Some(response.text().await?)),
            StatusAction::Skip => {
                tracing::debug!("HTTP {} for {}, treating as no content", status, url);
                Ok(None)
            }
            StatusAction::Fail => bail!("HTTP {} for {}", status, url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_statuses() {
        assert_eq!(classify_status(200), StatusAction::Body);
        assert_eq!(classify_status(201), StatusAction::Body);
        assert_eq!(classify_status(299), StatusAction::Body);
    }

    #[test]
    fn test_classify_gone_statuses() {
        assert_eq!(classify_status(404), StatusAction::Skip);
        assert_eq!(classify_status(403), StatusAction::Skip);
    }

    #[test]
    fn test_classify_error_statuses() {
        assert_eq!(classify_status(301), StatusAction::Fail);
        assert_eq!(classify_status(400), StatusAction::Fail);
        assert_eq!(classify_status(429), StatusAction::Fail);
        assert_eq!(classify_status(500), StatusAction::Fail);
        assert_eq!(classify_status(503), StatusAction::Fail);
    }
}
