//! Batch image publishing
//!
//! All images resolved in a batch go into one commit on the content host:
//!
//! 1. read the branch tip and its tree
//! 2. create one blob per image
//! 3. create one tree over the tip's tree holding every new path
//! 4. commit that tree with the tip as parent
//! 5. fast-forward the branch to the commit
//!
//! Nothing the host creates is reachable until step 5 succeeds, so a failure
//! at any step leaves the branch untouched and the batch gets no URLs.

use crate::clients::{ContentHost, TreeEntry};
use crate::error::Result;
use crate::mapper::LogicalId;
use crate::outcome::{Warning, WarningKind};
use crate::resolver::ResolvedImage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Public URL of every image published in a batch
pub type ImageUrlMap = HashMap<LogicalId, String>;

pub struct AssetPublisher {
    host: Arc<dyn ContentHost>,
}

impl AssetPublisher {
    pub fn new(host: Arc<dyn ContentHost>) -> Self {
        Self { host }
    }

    /// Publish `images` as one commit. An empty slice makes no host calls.
    #[instrument(skip(self, images), fields(images = images.len()))]
    pub async fn publish(
        &self,
        images: &[ResolvedImage],
        batch: usize,
    ) -> std::result::Result<ImageUrlMap, Warning> {
        if images.is_empty() {
            return Ok(ImageUrlMap::new());
        }

        match self.commit(images, batch).await {
            Ok(commit) => {
                info!(batch, %commit, images = images.len(), "Images published");
                Ok(images
                    .iter()
                    .map(|img| (img.logical_id.clone(), self.host.public_url(&img.path)))
                    .collect())
            },
            Err(e) => {
                warn!(batch, error = %e, "Publish failed, batch continues without images");
                Err(Warning::new(
                    WarningKind::Publish,
                    format!("batch {}: {} image(s) not published: {}", batch, images.len(), e),
                ))
            },
        }
    }

    async fn commit(&self, images: &[ResolvedImage], batch: usize) -> Result<String> {
        let tip = self.host.get_branch_tip().await?;
        let base_tree = self.host.get_commit_tree(&tip).await?;

        let mut entries = Vec::with_capacity(images.len());
        for image in images {
            let blob_sha = self.host.create_blob(&image.bytes).await?;
            entries.push(TreeEntry {
                path: image.path.clone(),
                blob_sha,
            });
        }

        let tree = self.host.create_tree(&base_tree, &entries).await?;
        let message = format!("Add {} image(s) for batch {}", images.len(), batch);
        let commit = self.host.create_commit(&message, &tree, &tip).await?;
        self.host.update_ref(&commit).await?;
        Ok(commit)
    }
}
