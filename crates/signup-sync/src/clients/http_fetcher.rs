//! Plain HTTP download for resolved image links

use super::{check_status, FetchedFile, LinkFetcher};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

const SERVICE: &str = "image host";

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("signup-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<FetchedFile> {
        let response = check_status(SERVICE, self.client.get(url).send().await?).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // A share link that is not public answers 200 with a sign-in page
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"))
        {
            return Err(SyncError::InvalidImage(
                "link returned an HTML page, the file is probably not shared publicly".into(),
            ));
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(SyncError::InvalidImage("download returned no data".into()));
        }

        debug!(bytes = bytes.len(), content_type = ?content_type, "Downloaded");
        Ok(FetchedFile {
            bytes,
            content_type,
        })
    }
}
