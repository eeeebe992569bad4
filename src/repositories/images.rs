use super::{conflict_backoff, image_to_item, item_to_image, n, retry_on_conflict, s, Item};
use crate::{
    domain::ImageRepository,
    errors::RepoError,
    models::{Image, ImageDetails},
    voting::{VoteKind, VoteTransition},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use tracing::{self, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DynamoDbImageRepository {
    client: DynamoDbClient,
    table_name: String, // Store the table name
}

/// Expression pair for one vote transition. The condition pins the voter
/// state the transition was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VotePlan {
    update: &'static str,
    condition: &'static str,
}

const VOTE_NAMES: [(&str, &str); 5] = [
    ("#id", "image_id"),
    ("#likes", "likes"),
    ("#dislikes", "dislikes"),
    ("#likers", "likers"),
    ("#dislikers", "dislikers"),
];

fn vote_plan(transition: VoteTransition) -> VotePlan {
    match transition {
        VoteTransition::AddLike => VotePlan {
            update: "ADD #likes :one, #likers :voter",
            condition: "attribute_exists(#id) AND NOT contains(#likers, :uid) AND NOT contains(#dislikers, :uid)",
        },
        VoteTransition::RemoveLike => VotePlan {
            update: "ADD #likes :minus DELETE #likers :voter",
            condition: "contains(#likers, :uid)",
        },
        VoteTransition::SwitchToLike => VotePlan {
            update: "ADD #likes :one, #likers :voter, #dislikes :minus DELETE #dislikers :voter",
            condition: "contains(#dislikers, :uid) AND NOT contains(#likers, :uid)",
        },
        VoteTransition::AddDislike => VotePlan {
            update: "ADD #dislikes :one, #dislikers :voter",
            condition: "attribute_exists(#id) AND NOT contains(#likers, :uid) AND NOT contains(#dislikers, :uid)",
        },
        VoteTransition::RemoveDislike => VotePlan {
            update: "ADD #dislikes :minus DELETE #dislikers :voter",
            condition: "contains(#dislikers, :uid)",
        },
        VoteTransition::SwitchToDislike => VotePlan {
            update: "ADD #dislikes :one, #dislikers :voter, #likes :minus DELETE #likers :voter",
            condition: "contains(#likers, :uid) AND NOT contains(#dislikers, :uid)",
        },
    }
}

impl VotePlan {
    // DynamoDB rejects placeholders that are defined but unused.
    fn uses(&self, placeholder: &str) -> bool {
        let mentions = |expr: &str| {
            expr.match_indices(placeholder).any(|(at, _)| {
                expr[at + placeholder.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
            })
        };
        mentions(self.update) || mentions(self.condition)
    }
}

impl DynamoDbImageRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbImageRepository");
        Self { client, table_name }
    }

    /// One vote attempt: read, resolve, conditional write. A lost race
    /// surfaces as `RepoError::Conflict`.
    async fn try_vote(&self, id: Uuid, user_id: &str, kind: VoteKind) -> Result<Image, RepoError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Image {}", id)))?;
        let transition = VoteTransition::resolve(current.vote_state(user_id), kind);
        let plan = vote_plan(transition);
        tracing::debug!(image_id = %id, user_id = %user_id, ?transition, "DynamoDB: Applying vote");

        let values = [
            (":one", n(1)),
            (":minus", n(-1)),
            (":voter", AttributeValue::Ss(vec![user_id.to_string()])),
            (":uid", s(user_id)),
        ];

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("image_id", s(id.to_string()))
            .update_expression(plan.update)
            .condition_expression(plan.condition)
            .return_values(ReturnValue::AllNew);
        for (placeholder, attribute) in VOTE_NAMES {
            if plan.uses(placeholder) {
                request = request.expression_attribute_names(placeholder, attribute);
            }
        }
        for (placeholder, value) in values {
            if plan.uses(placeholder) {
                request = request.expression_attribute_values(placeholder, value);
            }
        }

        match request.send().await {
            Ok(output) => output
                .attributes
                .as_ref()
                .and_then(item_to_image)
                .ok_or_else(|| RepoError::DataCorruption(format!("vote on image {} returned an unreadable item", id))),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                tracing::debug!(image_id = %id, user_id = %user_id, "DynamoDB: Vote lost a race, retrying");
                Err(RepoError::Conflict(format!("image {} changed while voting", id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to apply vote to image (id: {})",
                self.table_name, id
            )))),
        }
    }
}

#[async_trait]
impl ImageRepository for DynamoDbImageRepository {
    /// Stores an `Image` using PutItem, refusing to overwrite.
    async fn create(&self, image: &Image) -> Result<(), RepoError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name) // Use stored table name
            .set_item(Some(image_to_item(image)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", "image_id")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(RepoError::Conflict(format!("image {} already exists", image.image_id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to put image (id: {})",
                self.table_name, image.image_id
            )))),
        }
    }

    /// Retrieves an `Image` from DynamoDB using GetItem.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Image>, RepoError> {
        let id_str = id.to_string();
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("image_id", s(id_str.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get image (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_image(&item) {
                Some(image) => Ok(Some(image)),
                None => {
                    tracing::error!(image_id = %id_str, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Image");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse image data retrieved from DynamoDB table '{}' for id {}",
                        self.table_name, id_str
                    )))
                }
            },
            None => Ok(None), // Item not found is not an error
        }
    }

    /// Lists all images using DynamoDB Scan. Handles pagination.
    async fn list_all(&self) -> Result<Vec<Image>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all images", self.table_name);
        let mut images: Vec<Image> = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(last_evaluated_key.take())
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_image(&item) {
                    Some(image) => images.push(image),
                    None => {
                        let item_id = item.get("image_id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into Image");
                        // Fail fast if data in the table is corrupt
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            // Check for next page
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        tracing::info!("DynamoDB (table: {}): Successfully listed {} images", self.table_name, images.len());
        Ok(images)
    }

    async fn update_details(&self, id: Uuid, details: &ImageDetails) -> Result<Image, RepoError> {
        let fields = [
            ("title", &details.title),
            ("genre", &details.genre),
            ("game", &details.game),
        ];

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("image_id", s(id.to_string()))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", "image_id")
            .return_values(ReturnValue::AllNew);

        let mut assignments = Vec::new();
        for (name, value) in fields {
            if let Some(value) = value {
                assignments.push(format!("#{name} = :{name}"));
                request = request
                    .expression_attribute_names(format!("#{name}"), name)
                    .expression_attribute_values(format!(":{name}"), s(value.clone()));
            }
        }
        if assignments.is_empty() {
            return self
                .get_by_id(id)
                .await?
                .ok_or_else(|| RepoError::NotFound(format!("Image {}", id)));
        }

        let result = request
            .update_expression(format!("SET {}", assignments.join(", ")))
            .send()
            .await;

        match result {
            Ok(output) => output
                .attributes
                .as_ref()
                .and_then(item_to_image)
                .ok_or_else(|| RepoError::DataCorruption(format!("update of image {} returned an unreadable item", id))),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(RepoError::NotFound(format!("Image {}", id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to update image (id: {})",
                self.table_name, id
            )))),
        }
    }

    /// Deletes an item from DynamoDB using DeleteItem.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let id_str = id.to_string();
        tracing::debug!(image_id = %id_str, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("image_id", s(id_str.clone()))
            // DeleteItem succeeds even if item not found
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete image (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        Ok(())
    }

    async fn apply_vote(&self, id: Uuid, user_id: &str, kind: VoteKind) -> Result<Image, RepoError> {
        backoff::future::retry(conflict_backoff(), || async move {
            self.try_vote(id, user_id, kind).await.map_err(retry_on_conflict)
        })
        .await
    }
}
