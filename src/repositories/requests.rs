use super::{get_s, get_time, get_uuid, image_to_item, put_submission, read_submission, s, Item};
use crate::{
    domain::RequestRepository,
    errors::RepoError,
    models::{Image, RequestKind, RequestStatus, UploadRequest},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{Delete, Put, ReturnValue, TransactWriteItem},
    Client as DynamoDbClient,
};
use chrono::{DateTime, Utc};
use tracing::{self, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DynamoDbRequestRepository {
    client: DynamoDbClient,
    table_name: String,
    /// Promotion writes into this table.
    images_table: String,
}

fn request_to_item(request: &UploadRequest) -> Item {
    let mut item = Item::new();
    item.insert("request_id".into(), s(request.request_id.to_string()));
    item.insert("kind".into(), s(request.kind.as_str()));
    item.insert("status".into(), s(request.status.as_str()));
    item.insert("created_at".into(), s(request.created_at.to_rfc3339()));
    put_submission(&mut item, &request.submission);
    item
}

fn item_to_request(item: &Item) -> Option<UploadRequest> {
    Some(UploadRequest {
        request_id: get_uuid(item, "request_id")?,
        kind: RequestKind::parse(get_s(item, "kind")?)?,
        status: RequestStatus::parse(get_s(item, "status")?)?,
        created_at: get_time(item, "created_at")?,
        submission: read_submission(item)?,
    })
}

fn not_found(id: Uuid) -> RepoError {
    RepoError::NotFound(format!("Request {}", id))
}

impl DynamoDbRequestRepository {
    pub fn new(client: DynamoDbClient, table_name: String, images_table: String) -> Self {
        info!(%table_name, %images_table, "Initializing DynamoDbRequestRepository");
        Self { client, table_name, images_table }
    }
}

#[async_trait]
impl RequestRepository for DynamoDbRequestRepository {
    async fn create(&self, request: &UploadRequest) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(request_to_item(request)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put request (id: {})", self.table_name, request.request_id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UploadRequest>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("request_id", s(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get request (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_request(&item).map(Some).ok_or_else(|| {
                tracing::error!(request_id = %id, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into UploadRequest");
                RepoError::DataCorruption(format!("request {} in table '{}'", id, self.table_name))
            }),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<UploadRequest>, RepoError> {
        let mut requests = Vec::new();
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
                let request = item_to_request(&item).ok_or_else(|| {
                    let item_id = item.get("request_id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into UploadRequest");
                    RepoError::DataCorruption(format!("request {:?} in table '{}'", item_id, self.table_name))
                })?;
                requests.push(request);
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        tracing::debug!("DynamoDB (table: {}): Listed {} requests", self.table_name, requests.len());
        Ok(requests)
    }

    async fn set_status(&self, id: Uuid, status: RequestStatus) -> Result<UploadRequest, RepoError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("request_id", s(id.to_string()))
            .update_expression("SET #status = :status")
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#status", "status")
            .expression_attribute_names("#id", "request_id")
            .expression_attribute_values(":status", s(status.as_str()))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => output
                .attributes
                .as_ref()
                .and_then(item_to_request)
                .ok_or_else(|| RepoError::DataCorruption(format!("status update of request {} returned an unreadable item", id))),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(not_found(id))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to set status of request (id: {})",
                self.table_name, id
            )))),
        }
    }

    /// Writes the image and deletes the request in one TransactWriteItems
    /// call, conditioned on the request still being pending.
    async fn promote(&self, id: Uuid, image_id: Uuid, approved_at: DateTime<Utc>) -> Result<Image, RepoError> {
        let request = self.get_by_id(id).await?.ok_or_else(|| not_found(id))?;
        if request.status != RequestStatus::Pending {
            return Err(RepoError::Conflict(format!(
                "request {} is {}, only pending requests can be approved",
                id,
                request.status.as_str()
            )));
        }

        let image = Image::from_submission(image_id, request.submission, approved_at);

        let put = Put::builder()
            .table_name(&self.images_table)
            .set_item(Some(image_to_item(&image)))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", "image_id")
            .build()
            .context("Failed to build image Put for promotion")?;
        let delete = Delete::builder()
            .table_name(&self.table_name)
            .key("request_id", s(id.to_string()))
            .condition_expression("#status = :pending")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":pending", s(RequestStatus::Pending.as_str()))
            .build()
            .context("Failed to build request Delete for promotion")?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(TransactWriteItem::builder().delete(delete).build())
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(request_id = %id, image_id = %image_id, "DynamoDB: Request promoted to image");
                Ok(image)
            }
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_transaction_canceled_exception() => {
                tracing::warn!(request_id = %id, reasons = ?service_err.err(), "DynamoDB: Promotion transaction cancelled");
                Err(RepoError::Conflict(format!("request {} was modified during approval", id)))
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB: Failed to promote request (id: {}) into table '{}'",
                id, self.images_table
            )))),
        }
    }
}
