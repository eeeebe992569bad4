pub mod auth;
pub mod aws_clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gallery;
pub mod github;
pub mod handlers;
pub mod media;
pub mod memory;
pub mod models;
pub mod profiles;
pub mod repositories;
pub mod routes;
pub mod site_config;
pub mod startup;
pub mod storage;
pub mod voting;

use crate::{
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    config::{Config, DataBackend},
    domain::{ConfigRepository, FileStorage, ImageRepository, RequestRepository, UserRepository},
    errors::AppError,
    github::GitHubFileStorage,
    memory::{MemoryFileStorage, MemoryStore},
    repositories::{
        DynamoDbConfigRepository, DynamoDbImageRepository, DynamoDbRequestRepository, DynamoDbUserRepository,
    },
    storage::{S3FileStorage, SCREENSHOT_FOLDER},
};
use std::sync::Arc;

/// AppState holds shared resources, using trait objects for abstraction.
pub struct AppState {
    pub images: Arc<dyn ImageRepository>,
    pub requests: Arc<dyn RequestRepository>,
    pub site_config: Arc<dyn ConfigRepository>,
    pub users: Arc<dyn UserRepository>,
    /// Addressed by `public_id`.
    pub hosted_storage: Arc<dyn FileStorage>,
    /// Addressed by `storage_path`; absent when no repository is configured.
    pub repository_storage: Option<Arc<dyn FileStorage>>,
    pub config: Config,
}

impl AppState {
    /// Everything in process. The repository store exists when
    /// `config.github` is set and enforces its quota.
    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hosted_storage = MemoryFileStorage::new(config.public_base_url.clone()).with_folder_prefix(SCREENSHOT_FOLDER);
        let repository_storage = config.github.as_ref().map(|github| {
            Arc::new(
                MemoryFileStorage::new(config.public_base_url.clone())
                    .with_folder_prefix(github.upload_dir.clone())
                    .with_quota(github.quota_bytes),
            ) as Arc<dyn FileStorage>
        });

        Self {
            images: store.clone(),
            requests: store.clone(),
            site_config: store.clone(),
            users: store,
            hosted_storage: Arc::new(hosted_storage),
            repository_storage,
            config,
        }
    }
}

/// Connects the configured backends, creating AWS resources when missing.
pub async fn build_state(config: Config) -> Result<AppState, AppError> {
    match config.data_backend {
        DataBackend::Memory => {
            tracing::warn!("Using in-memory backend; data is lost on restart");
            Ok(AppState::in_memory(config))
        }
        DataBackend::DynamoDb => {
            let sdk_config = create_sdk_config(&config).await?;
            let db_client = create_dynamodb_client(&sdk_config);
            let s3_client = create_s3_client(&sdk_config);
            tracing::info!("AWS SDK clients initialized.");

            startup::init_resources(
                &db_client,
                &s3_client,
                &config.tables,
                &config.asset_bucket_name,
                &config.aws_region,
            )
            .await?;

            let tables = &config.tables;
            let images = DynamoDbImageRepository::new(db_client.clone(), tables.images.clone());
            let requests =
                DynamoDbRequestRepository::new(db_client.clone(), tables.requests.clone(), tables.images.clone());
            let site_config = DynamoDbConfigRepository::new(db_client.clone(), tables.config.clone());
            let users = DynamoDbUserRepository::new(db_client, tables.users.clone());
            let hosted_storage = S3FileStorage::new(
                s3_client,
                config.asset_bucket_name.clone(),
                config.public_base_url.clone(),
            );
            let repository_storage = config.github.clone().map(|github| {
                tracing::info!(owner = %github.owner, repo = %github.repo, "Repository storage enabled");
                Arc::new(GitHubFileStorage::new(github)) as Arc<dyn FileStorage>
            });

            Ok(AppState {
                images: Arc::new(images),
                requests: Arc::new(requests),
                site_config: Arc::new(site_config),
                users: Arc::new(users),
                hosted_storage: Arc::new(hosted_storage),
                repository_storage,
                config,
            })
        }
    }
}
