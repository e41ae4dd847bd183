//! GitHub git data API client
//!
//! Implements [`ContentHost`] over the low-level git objects endpoints so a
//! whole batch of images lands in a single commit.

use super::{decode, ContentHost, TreeEntry};
use crate::config::GitHubConfig;
use crate::error::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

const SERVICE: &str = "GitHub";
const API_VERSION: &str = "2022-11-28";

/// Regular file mode for tree entries
const FILE_MODE: &str = "100644";

pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
}

#[derive(Debug, Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: Sha,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: Sha,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("signup-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}/git/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        );
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

#[async_trait]
impl ContentHost for GitHubClient {
    #[instrument(skip(self), fields(branch = %self.config.branch))]
    async fn get_branch_tip(&self) -> Result<String> {
        let response = self
            .request(Method::GET, &format!("ref/heads/{}", self.config.branch))
            .send()
            .await?;
        let parsed: RefResponse = decode(SERVICE, response).await?;
        Ok(parsed.object.sha)
    }

    #[instrument(skip(self))]
    async fn get_commit_tree(&self, commit_sha: &str) -> Result<String> {
        let response = self
            .request(Method::GET, &format!("commits/{}", commit_sha))
            .send()
            .await?;
        let parsed: CommitResponse = decode(SERVICE, response).await?;
        Ok(parsed.tree.sha)
    }

    #[instrument(skip(self, content), fields(bytes = content.len()))]
    async fn create_blob(&self, content: &[u8]) -> Result<String> {
        let response = self
            .request(Method::POST, "blobs")
            .json(&json!({
                "content": STANDARD.encode(content),
                "encoding": "base64",
            }))
            .send()
            .await?;
        let parsed: Sha = decode(SERVICE, response).await?;
        debug!(sha = %parsed.sha, "Blob created");
        Ok(parsed.sha)
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        let tree: Vec<Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "mode": FILE_MODE,
                    "type": "blob",
                    "sha": e.blob_sha,
                })
            })
            .collect();

        let response = self
            .request(Method::POST, "trees")
            .json(&json!({ "base_tree": base_tree, "tree": tree }))
            .send()
            .await?;
        let parsed: Sha = decode(SERVICE, response).await?;
        Ok(parsed.sha)
    }

    #[instrument(skip(self))]
    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String> {
        let response = self
            .request(Method::POST, "commits")
            .json(&json!({
                "message": message,
                "tree": tree_sha,
                "parents": [parent_sha],
            }))
            .send()
            .await?;
        let parsed: Sha = decode(SERVICE, response).await?;
        Ok(parsed.sha)
    }

    #[instrument(skip(self), fields(branch = %self.config.branch))]
    async fn update_ref(&self, commit_sha: &str) -> Result<()> {
        let response = self
            .request(Method::PATCH, &format!("refs/heads/{}", self.config.branch))
            .json(&json!({ "sha": commit_sha, "force": false }))
            .send()
            .await?;
        let _: Value = decode(SERVICE, response).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.branch,
            path.trim_start_matches('/')
        )
    }
}
