use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::AppError;

#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch_text(&self, location: &str) -> Result<String, AppError>;
}

/// Plain HTTP GET; used by the server for storage bucket URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("agency-insights/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Fetch(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch_text(&self, location: &str) -> Result<String, AppError> {
        let response = self
            .http
            .get(location)
            .send()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("{location} responded with {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))
    }
}

/// Reads from the local filesystem; the CLI `import` command uses it.
#[derive(Debug, Clone, Default)]
pub struct LocalFileFetcher;

#[async_trait]
impl FileFetcher for LocalFileFetcher {
    async fn fetch_text(&self, location: &str) -> Result<String, AppError> {
        let path = PathBuf::from(location);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::Fetch(format!("{}: {e}", path.display())))
    }
}
