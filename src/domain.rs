use crate::errors::{RepoError, StorageError};
use crate::models::{
    Image, ImageDetails, RequestStatus, SiteConfig, StorageUsage, StoredFile, UploadRequest, UserProfile,
};
use crate::site_config::ConfigChange;
use crate::voting::VoteKind;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Approved images.
#[async_trait]
pub trait ImageRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Stores a new image. Fails with `Conflict` if the id is taken.
    async fn create(&self, image: &Image) -> Result<(), RepoError>;

    /// Returns Ok(None) if the image is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Image>, RepoError>;

    /// Every image, in store order.
    async fn list_all(&self) -> Result<Vec<Image>, RepoError>;

    async fn update_details(&self, id: Uuid, details: &ImageDetails) -> Result<Image, RepoError>;

    /// Succeeds whether or not the image existed.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Toggles `user_id`'s vote atomically and returns the updated image.
    async fn apply_vote(&self, id: Uuid, user_id: &str, kind: VoteKind) -> Result<Image, RepoError>;
}

/// Upload requests awaiting moderation.
#[async_trait]
pub trait RequestRepository: Send + Sync + 'static {
    async fn create(&self, request: &UploadRequest) -> Result<(), RepoError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UploadRequest>, RepoError>;

    async fn list_all(&self) -> Result<Vec<UploadRequest>, RepoError>;

    async fn set_status(&self, id: Uuid, status: RequestStatus) -> Result<UploadRequest, RepoError>;

    /// Turns a pending request into an image with id `image_id`, deleting the
    /// request in the same transaction.
    async fn promote(&self, id: Uuid, image_id: Uuid, approved_at: DateTime<Utc>) -> Result<Image, RepoError>;
}

/// The single site configuration record.
#[async_trait]
pub trait ConfigRepository: Send + Sync + 'static {
    /// A missing record reads as the empty config.
    async fn get(&self) -> Result<SiteConfig, RepoError>;

    /// Applies one change and returns the record as stored afterwards.
    async fn apply(&self, change: &ConfigChange) -> Result<SiteConfig, RepoError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Fails with `Conflict` if the profile exists.
    async fn create(&self, profile: &UserProfile) -> Result<(), RepoError>;

    async fn get_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError>;

    async fn update(&self, profile: &UserProfile) -> Result<(), RepoError>;
}

/// Trait defining operations for storing and retrieving uploaded files.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data and returns where it can be fetched.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<StoredFile, StorageError>;

    async fn download(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError>;

    /// Fails with `StorageError::NotFound` when nothing is stored at `key`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Folder that keys may or may not have been recorded with.
    fn folder_prefix(&self) -> Option<&str> {
        None
    }

    /// Usage against a quota, for stores that have one.
    async fn usage(&self) -> Result<Option<StorageUsage>, StorageError> {
        Ok(None)
    }
}
