use super::{conflict_backoff, get_n, n, retry_on_conflict, s, Item};
use crate::{domain::ConfigRepository, errors::RepoError, models::SiteConfig, site_config::ConfigChange};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{error::SdkError, types::AttributeValue, Client as DynamoDbClient};
use std::collections::BTreeMap;
use tracing::{self, info};

/// Key of the one config record.
pub const SITE_CONFIG_ID: &str = "site";

#[derive(Debug, Clone)]
pub struct DynamoDbConfigRepository {
    client: DynamoDbClient,
    table_name: String,
}

fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().map(|v| s(v.clone())).collect())
}

fn read_string_list(item: &Item, name: &str) -> Vec<String> {
    item.get(name)
        .and_then(|v| v.as_l().ok())
        .map(|values| values.iter().filter_map(|v| v.as_s().ok().cloned()).collect())
        .unwrap_or_default()
}

fn config_to_item(config: &SiteConfig) -> Item {
    let logos = config
        .game_logos
        .iter()
        .map(|(game, url)| (game.clone(), s(url.clone())))
        .collect();

    let mut item = Item::new();
    item.insert("config_id".into(), s(SITE_CONFIG_ID));
    item.insert("genres".into(), string_list(&config.genres));
    item.insert("games".into(), string_list(&config.games));
    item.insert("game_logos".into(), AttributeValue::M(logos));
    item.insert("version".into(), n(config.version));
    item
}

fn item_to_config(item: &Item) -> SiteConfig {
    let game_logos: BTreeMap<String, String> = item
        .get("game_logos")
        .and_then(|v| v.as_m().ok())
        .map(|logos| {
            logos
                .iter()
                .filter_map(|(game, url)| Some((game.clone(), url.as_s().ok()?.clone())))
                .collect()
        })
        .unwrap_or_default();

    SiteConfig {
        genres: read_string_list(item, "genres"),
        games: read_string_list(item, "games"),
        game_logos,
        version: get_n(item, "version").unwrap_or(0),
    }
}

impl DynamoDbConfigRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbConfigRepository");
        Self { client, table_name }
    }

    async fn try_apply(&self, change: &ConfigChange) -> Result<SiteConfig, RepoError> {
        let current = self.get().await?;
        let mut next = current.clone();
        if !next.apply(change)? {
            return Ok(current);
        }
        next.version = current.version + 1;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(config_to_item(&next)))
            .condition_expression("attribute_not_exists(#id) OR #version = :expected")
            .expression_attribute_names("#id", "config_id")
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", n(current.version))
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(version = next.version, ?change, "DynamoDB: Site config updated");
                Ok(next)
            }
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                Err(RepoError::Conflict(format!("site config changed from version {}", current.version)))
            }
            Err(e) => Err(RepoError::BackendError(
                anyhow::Error::new(e).context(format!("DynamoDB (table: {}): Failed to write site config", self.table_name)),
            )),
        }
    }
}

#[async_trait]
impl ConfigRepository for DynamoDbConfigRepository {
    async fn get(&self) -> Result<SiteConfig, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("config_id", s(SITE_CONFIG_ID))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get site config", self.table_name))
            .map_err(RepoError::BackendError)?;

        Ok(resp.item.as_ref().map(item_to_config).unwrap_or_default())
    }

    async fn apply(&self, change: &ConfigChange) -> Result<SiteConfig, RepoError> {
        backoff::future::retry(conflict_backoff(), || async move {
            self.try_apply(change).await.map_err(retry_on_conflict)
        })
        .await
    }
}
