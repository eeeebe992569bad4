use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Fields shared by a pending upload request and the image it becomes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Submission {
    pub title: String,
    pub url: String,
    pub genre: String,
    pub game: String,
    pub uploader_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_email: Option<String>,
    /// Path inside the repository store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// Object key inside the hosted image store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
}

/// An approved, publicly browsable screenshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub image_id: Uuid,
    #[serde(flatten)]
    pub submission: Submission,
    pub uploaded_at: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
    pub likers: BTreeSet<String>,
    pub dislikers: BTreeSet<String>,
}

impl Image {
    /// A fresh image with zeroed counters and empty voter sets.
    pub fn from_submission(image_id: Uuid, submission: Submission, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            image_id,
            submission,
            uploaded_at,
            likes: 0,
            dislikes: 0,
            likers: BTreeSet::new(),
            dislikers: BTreeSet::new(),
        }
    }
}

/// Admin-editable image fields.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ImageDetails {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub game: Option<String>,
}

impl ImageDetails {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.genre.is_none() && self.game.is_none()
    }

    pub fn apply_to(&self, submission: &mut Submission) {
        if let Some(title) = &self.title {
            submission.title = title.clone();
        }
        if let Some(genre) = &self.genre {
            submission.genre = genre.clone();
        }
        if let Some(game) = &self.game {
            submission.game = game.clone();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    ImageUpload,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::ImageUpload => "image_upload",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image_upload" => Some(RequestKind::ImageUpload),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A user-submitted upload awaiting moderation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub request_id: Uuid,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub submission: Submission,
}

impl UploadRequest {
    pub fn pending(submission: Submission, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind: RequestKind::ImageUpload,
            status: RequestStatus::Pending,
            created_at,
            submission,
        }
    }
}

/// The single site-wide record of valid genres, games and game logos.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SiteConfig {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub game_logos: BTreeMap<String, String>,
    /// Bumped on every write; conditional writes compare against it.
    #[serde(default)]
    pub version: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_profile_edit: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

/// Where an uploaded blob ended up.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
}

/// Aggregate usage of a quota-limited store.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct StorageUsage {
    pub size_bytes: u64,
    pub file_count: u64,
    pub quota_bytes: u64,
    pub remaining_bytes: u64,
}

impl StorageUsage {
    pub fn new(size_bytes: u64, file_count: u64, quota_bytes: u64) -> Self {
        Self {
            size_bytes,
            file_count,
            quota_bytes,
            remaining_bytes: quota_bytes.saturating_sub(size_bytes),
        }
    }
}
