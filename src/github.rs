//! GitHub repository used as a secondary file store through the contents API.

use crate::{
    config::GitHubConfig,
    domain::FileStorage,
    errors::StorageError,
    models::{StorageUsage, StoredFile},
};
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

const GITHUB_JSON: &str = "application/vnd.github+json";
const GITHUB_RAW: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("imagi-gallery/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GitHubFileStorage {
    http: Client,
    config: GitHubConfig,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    branch: &'a str,
}

#[derive(Serialize)]
struct DeleteContents<'a> {
    message: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct ContentsEntry {
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: ContentsEntry,
}

#[derive(Deserialize)]
struct RepositoryInfo {
    /// Kilobytes.
    size: u64,
}

impl GitHubFileStorage {
    pub fn new(config: GitHubConfig) -> Self {
        Self { http: Client::new(), config }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base,
            self.config.owner,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.config.owner, self.config.repo, self.config.branch, path
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, GITHUB_JSON)
    }

    async fn entry(&self, path: &str) -> Result<ContentsEntry, StorageError> {
        let response = self
            .request(reqwest::Method::GET, self.contents_url(path))
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .context(format!("GitHub: Failed to look up '{}'", path))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let response = error_for_status(response, "look up", path).await?;
        Ok(response
            .json()
            .await
            .context(format!("GitHub: Unexpected contents response for '{}'", path))?)
    }

    async fn directory_stats(&self) -> Result<(u64, u64), StorageError> {
        let dir = &self.config.upload_dir;
        let response = self
            .request(reqwest::Method::GET, self.contents_url(dir))
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .context(format!("GitHub: Failed to list '{}'", dir))?;

        // The folder only appears after the first upload.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok((0, 0));
        }
        let response = error_for_status(response, "list", dir).await?;
        let entries: Vec<ContentsEntry> = response
            .json()
            .await
            .context(format!("GitHub: Unexpected listing for '{}'", dir))?;

        let files = entries.iter().filter(|e| e.kind == "file");
        let count = files.clone().count() as u64;
        let size = files.map(|e| e.size).sum();
        Ok((count, size))
    }
}

async fn error_for_status(
    response: reqwest::Response,
    action: &str,
    path: &str,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%status, path = %path, body = %body, "GitHub: Request failed");
    Err(StorageError::BackendError(anyhow::anyhow!(
        "GitHub: Failed to {} '{}': {} {}",
        action,
        path,
        status,
        body
    )))
}

#[async_trait]
impl FileStorage for GitHubFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: Option<String>) -> Result<StoredFile, StorageError> {
        tracing::debug!(path = %key, size = data.len(), repo = %self.config.repo, "GitHub: Committing file");

        let body = PutContents {
            message: format!("Upload {}", key),
            content: STANDARD.encode(&data),
            branch: &self.config.branch,
        };
        let response = self
            .request(reqwest::Method::PUT, self.contents_url(key))
            .json(&body)
            .send()
            .await
            .context(format!("GitHub: Failed to commit '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UploadFailed(format!("GitHub responded {} for '{}': {}", status, key, body)));
        }
        let created: PutContentsResponse = response
            .json()
            .await
            .context(format!("GitHub: Unexpected commit response for '{}'", key))?;

        tracing::info!(path = %key, sha = %created.content.sha, "GitHub: File committed");
        Ok(StoredFile {
            key: key.to_string(),
            url: created.content.download_url.unwrap_or_else(|| self.raw_url(key)),
        })
    }

    async fn download(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError> {
        let response = self
            .request(reqwest::Method::GET, self.contents_url(key))
            .header(header::ACCEPT, GITHUB_RAW)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .context(format!("GitHub: Failed to download '{}'", key))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let response = error_for_status(response, "download", key).await?;
        let data = response
            .bytes()
            .await
            .context(format!("GitHub: Failed to read '{}'", key))?;
        let content_type = mime_guess::from_path(key).first_raw().map(str::to_string);
        Ok((data, content_type))
    }

    /// The contents API needs the blob sha, so the file is looked up first.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let entry = self.entry(key).await?;

        let body = DeleteContents {
            message: format!("Delete {}", key),
            sha: &entry.sha,
            branch: &self.config.branch,
        };
        let response = self
            .request(reqwest::Method::DELETE, self.contents_url(key))
            .json(&body)
            .send()
            .await
            .context(format!("GitHub: Failed to delete '{}'", key))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        error_for_status(response, "delete", key).await?;
        tracing::info!(path = %key, "GitHub: File deleted");
        Ok(())
    }

    fn folder_prefix(&self) -> Option<&str> {
        Some(&self.config.upload_dir)
    }

    async fn usage(&self) -> Result<Option<StorageUsage>, StorageError> {
        let response = self
            .request(
                reqwest::Method::GET,
                format!("{}/repos/{}/{}", self.config.api_base, self.config.owner, self.config.repo),
            )
            .send()
            .await
            .context("GitHub: Failed to fetch repository info")?;
        let response = error_for_status(response, "inspect", &self.config.repo).await?;
        let info: RepositoryInfo = response
            .json()
            .await
            .context("GitHub: Unexpected repository info")?;

        let (file_count, dir_bytes) = self.directory_stats().await?;
        // Repository size lags behind recent pushes; never report less than
        // what the upload folder alone holds.
        let size_bytes = (info.size * 1024).max(dir_bytes);
        Ok(Some(StorageUsage::new(size_bytes, file_count, self.config.quota_bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> GitHubFileStorage {
        GitHubFileStorage::new(GitHubConfig {
            token: "ghp_test".into(),
            owner: "imagi".into(),
            repo: "screenshots".into(),
            branch: "main".into(),
            upload_dir: "uploads".into(),
            quota_bytes: 1024,
            api_base: "https://api.github.com".into(),
        })
    }

    #[test]
    fn urls_point_at_the_configured_repository() {
        let storage = storage();
        assert_eq!(
            storage.contents_url("/uploads/a.jpg"),
            "https://api.github.com/repos/imagi/screenshots/contents/uploads/a.jpg"
        );
        assert_eq!(
            storage.raw_url("uploads/a.jpg"),
            "https://raw.githubusercontent.com/imagi/screenshots/main/uploads/a.jpg"
        );
        assert_eq!(storage.folder_prefix(), Some("uploads"));
    }

    #[test]
    fn listing_entries_parse() {
        let entries: Vec<ContentsEntry> = serde_json::from_str(
            r#"[{"sha":"a1","size":120,"type":"file","download_url":"https://raw/x"},
                {"sha":"b2","type":"dir","download_url":null}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, 120);
        assert_eq!(entries[1].kind, "dir");
        assert!(entries[1].download_url.is_none());
    }
}
