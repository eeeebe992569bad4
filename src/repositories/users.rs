use super::{get_s, get_time, s, Item};
use crate::{domain::UserRepository, errors::RepoError, models::UserProfile};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{error::SdkError, Client as DynamoDbClient};
use tracing::info;

#[derive(Debug, Clone)]
pub struct DynamoDbUserRepository {
    client: DynamoDbClient,
    table_name: String,
}

fn profile_to_item(profile: &UserProfile) -> Item {
    let mut item = Item::new();
    item.insert("user_id".into(), s(profile.user_id.clone()));
    item.insert("username".into(), s(profile.username.clone()));
    item.insert("email".into(), s(profile.email.clone()));
    item.insert("created_at".into(), s(profile.created_at.to_rfc3339()));
    if let Some(photo_url) = &profile.photo_url {
        item.insert("photo_url".into(), s(photo_url.clone()));
    }
    if let Some(edited) = profile.last_profile_edit {
        item.insert("last_profile_edit".into(), s(edited.to_rfc3339()));
    }
    item
}

fn item_to_profile(item: &Item) -> Option<UserProfile> {
    Some(UserProfile {
        user_id: get_s(item, "user_id")?.to_string(),
        username: get_s(item, "username")?.to_string(),
        email: get_s(item, "email")?.to_string(),
        photo_url: get_s(item, "photo_url").map(str::to_string),
        created_at: get_time(item, "created_at")?,
        last_profile_edit: get_time(item, "last_profile_edit"),
    })
}

impl DynamoDbUserRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbUserRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    async fn create(&self, profile: &UserProfile) -> Result<(), RepoError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(profile_to_item(profile)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", "user_id")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(RepoError::Conflict(format!("user {} already exists", profile.user_id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to create user (id: {})",
                self.table_name, profile.user_id
            )))),
        }
    }

    async fn get_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("user_id", s(user_id))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get user (id: {})", self.table_name, user_id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_profile(&item)
                .map(Some)
                .ok_or_else(|| RepoError::DataCorruption(format!("user {} in table '{}'", user_id, self.table_name))),
            None => Ok(None),
        }
    }

    // Last write wins.
    async fn update(&self, profile: &UserProfile) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(profile_to_item(profile)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to update user (id: {})", self.table_name, profile.user_id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}
