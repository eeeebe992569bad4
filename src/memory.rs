//! In-process backends for local runs (`DATA_BACKEND=memory`) and tests.
//!
//! All documents sit behind one lock, so multi-record operations such as
//! promotion are atomic here too.

use crate::{
    domain::{ConfigRepository, FileStorage, ImageRepository, RequestRepository, UserRepository},
    errors::{RepoError, StorageError},
    models::{
        Image, ImageDetails, RequestStatus, SiteConfig, StorageUsage, StoredFile, UploadRequest, UserProfile,
    },
    site_config::ConfigChange,
    voting::VoteKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Documents {
    // Vecs keep insertion order, which is the "store order" listings return.
    images: Vec<Image>,
    requests: Vec<UploadRequest>,
    config: SiteConfig,
    users: HashMap<String, UserProfile>,
}

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn image_not_found(id: Uuid) -> RepoError {
    RepoError::NotFound(format!("Image {}", id))
}

fn request_not_found(id: Uuid) -> RepoError {
    RepoError::NotFound(format!("Request {}", id))
}

#[async_trait]
impl ImageRepository for MemoryStore {
    async fn create(&self, image: &Image) -> Result<(), RepoError> {
        let mut docs = self.docs.lock().await;
        if docs.images.iter().any(|i| i.image_id == image.image_id) {
            return Err(RepoError::Conflict(format!("image {} already exists", image.image_id)));
        }
        docs.images.push(image.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Image>, RepoError> {
        let docs = self.docs.lock().await;
        Ok(docs.images.iter().find(|i| i.image_id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Image>, RepoError> {
        Ok(self.docs.lock().await.images.clone())
    }

    async fn update_details(&self, id: Uuid, details: &ImageDetails) -> Result<Image, RepoError> {
        let mut docs = self.docs.lock().await;
        let image = docs
            .images
            .iter_mut()
            .find(|i| i.image_id == id)
            .ok_or_else(|| image_not_found(id))?;
        details.apply_to(&mut image.submission);
        Ok(image.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.docs.lock().await.images.retain(|i| i.image_id != id);
        Ok(())
    }

    async fn apply_vote(&self, id: Uuid, user_id: &str, kind: VoteKind) -> Result<Image, RepoError> {
        let mut docs = self.docs.lock().await;
        let image = docs
            .images
            .iter_mut()
            .find(|i| i.image_id == id)
            .ok_or_else(|| image_not_found(id))?;
        image.toggle_vote(user_id, kind);
        Ok(image.clone())
    }
}

#[async_trait]
impl RequestRepository for MemoryStore {
    async fn create(&self, request: &UploadRequest) -> Result<(), RepoError> {
        let mut docs = self.docs.lock().await;
        if docs.requests.iter().any(|r| r.request_id == request.request_id) {
            return Err(RepoError::Conflict(format!("request {} already exists", request.request_id)));
        }
        docs.requests.push(request.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UploadRequest>, RepoError> {
        let docs = self.docs.lock().await;
        Ok(docs.requests.iter().find(|r| r.request_id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<UploadRequest>, RepoError> {
        Ok(self.docs.lock().await.requests.clone())
    }

    async fn set_status(&self, id: Uuid, status: RequestStatus) -> Result<UploadRequest, RepoError> {
        let mut docs = self.docs.lock().await;
        let request = docs
            .requests
            .iter_mut()
            .find(|r| r.request_id == id)
            .ok_or_else(|| request_not_found(id))?;
        request.status = status;
        Ok(request.clone())
    }

    async fn promote(&self, id: Uuid, image_id: Uuid, approved_at: DateTime<Utc>) -> Result<Image, RepoError> {
        let mut docs = self.docs.lock().await;
        let position = docs
            .requests
            .iter()
            .position(|r| r.request_id == id)
            .ok_or_else(|| request_not_found(id))?;
        if docs.requests[position].status != RequestStatus::Pending {
            return Err(RepoError::Conflict(format!("request {} is not pending", id)));
        }
        if docs.images.iter().any(|i| i.image_id == image_id) {
            return Err(RepoError::Conflict(format!("image {} already exists", image_id)));
        }

        let request = docs.requests.remove(position);
        let image = Image::from_submission(image_id, request.submission, approved_at);
        docs.images.push(image.clone());
        Ok(image)
    }
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn get(&self) -> Result<SiteConfig, RepoError> {
        Ok(self.docs.lock().await.config.clone())
    }

    async fn apply(&self, change: &ConfigChange) -> Result<SiteConfig, RepoError> {
        let mut docs = self.docs.lock().await;
        let mut next = docs.config.clone();
        let changed = next.apply(change)?;
        if changed {
            next.version += 1;
            docs.config = next;
        }
        Ok(docs.config.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, profile: &UserProfile) -> Result<(), RepoError> {
        let mut docs = self.docs.lock().await;
        if docs.users.contains_key(&profile.user_id) {
            return Err(RepoError::Conflict(format!("user {} already exists", profile.user_id)));
        }
        docs.users.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError> {
        Ok(self.docs.lock().await.users.get(user_id).cloned())
    }

    async fn update(&self, profile: &UserProfile) -> Result<(), RepoError> {
        let mut docs = self.docs.lock().await;
        docs.users.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

/// Blob store kept in memory. URLs point at `{base_url}/assets/{key}`.
pub struct MemoryFileStorage {
    objects: Mutex<BTreeMap<String, (Bytes, Option<String>)>>,
    base_url: String,
    folder_prefix: Option<String>,
    quota_bytes: Option<u64>,
}

impl MemoryFileStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            base_url: base_url.into(),
            folder_prefix: None,
            quota_bytes: None,
        }
    }

    pub fn with_folder_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.folder_prefix = Some(prefix.into());
        self
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<StoredFile, StorageError> {
        tracing::debug!(key = %key, size = data.len(), "Memory: storing object");
        self.objects
            .lock()
            .await
            .insert(key.to_string(), (Bytes::from(data), content_type));
        Ok(StoredFile {
            key: key.to_string(),
            url: format!("{}/assets/{}", self.base_url, key),
        })
    }

    async fn download(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.objects.lock().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn folder_prefix(&self) -> Option<&str> {
        self.folder_prefix.as_deref()
    }

    async fn usage(&self) -> Result<Option<StorageUsage>, StorageError> {
        let Some(quota) = self.quota_bytes else {
            return Ok(None);
        };
        let objects = self.objects.lock().await;
        let size: u64 = objects.values().map(|(data, _)| data.len() as u64).sum();
        Ok(Some(StorageUsage::new(size, objects.len() as u64, quota)))
    }
}
