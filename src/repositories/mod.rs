//! DynamoDB-backed repositories.
//!
//! Items are mapped by hand to and from `AttributeValue` maps. Voter sets are
//! string sets, which DynamoDB cannot store empty, so an absent set attribute
//! reads as an empty set.

mod images;
mod requests;
mod site_config;
mod users;

pub use images::DynamoDbImageRepository;
pub use requests::DynamoDbRequestRepository;
pub use site_config::DynamoDbConfigRepository;
pub use users::DynamoDbUserRepository;

use crate::errors::RepoError;
use crate::models::{Image, Submission};
use aws_sdk_dynamodb::types::AttributeValue;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub(crate) type Item = HashMap<String, AttributeValue>;

pub(crate) fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub(crate) fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub(crate) fn get_s<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name)?.as_s().ok().map(String::as_str)
}

pub(crate) fn get_n<T: FromStr>(item: &Item, name: &str) -> Option<T> {
    item.get(name)?.as_n().ok()?.parse().ok()
}

pub(crate) fn get_ss(item: &Item, name: &str) -> BTreeSet<String> {
    item.get(name)
        .and_then(|v| v.as_ss().ok())
        .map(|values| values.iter().cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn get_time(item: &Item, name: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(get_s(item, name)?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn get_uuid(item: &Item, name: &str) -> Option<Uuid> {
    Uuid::parse_str(get_s(item, name)?).ok()
}

fn put_opt(item: &mut Item, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        item.insert(name.to_string(), s(value.clone()));
    }
}

fn put_set(item: &mut Item, name: &str, values: &BTreeSet<String>) {
    if !values.is_empty() {
        item.insert(name.to_string(), AttributeValue::Ss(values.iter().cloned().collect()));
    }
}

pub(crate) fn put_submission(item: &mut Item, submission: &Submission) {
    item.insert("title".into(), s(submission.title.clone()));
    item.insert("url".into(), s(submission.url.clone()));
    item.insert("genre".into(), s(submission.genre.clone()));
    item.insert("game".into(), s(submission.game.clone()));
    item.insert("uploader_id".into(), s(submission.uploader_id.clone()));
    put_opt(item, "uploader_email", &submission.uploader_email);
    put_opt(item, "storage_path", &submission.storage_path);
    put_opt(item, "public_id", &submission.public_id);
}

pub(crate) fn read_submission(item: &Item) -> Option<Submission> {
    Some(Submission {
        title: get_s(item, "title")?.to_string(),
        url: get_s(item, "url")?.to_string(),
        genre: get_s(item, "genre")?.to_string(),
        game: get_s(item, "game")?.to_string(),
        uploader_id: get_s(item, "uploader_id")?.to_string(),
        uploader_email: get_s(item, "uploader_email").map(str::to_string),
        storage_path: get_s(item, "storage_path").map(str::to_string),
        public_id: get_s(item, "public_id").map(str::to_string),
    })
}

pub(crate) fn image_to_item(image: &Image) -> Item {
    let mut item = Item::new();
    item.insert("image_id".into(), s(image.image_id.to_string()));
    put_submission(&mut item, &image.submission);
    item.insert("uploaded_at".into(), s(image.uploaded_at.to_rfc3339()));
    item.insert("likes".into(), n(image.likes));
    item.insert("dislikes".into(), n(image.dislikes));
    put_set(&mut item, "likers", &image.likers);
    put_set(&mut item, "dislikers", &image.dislikers);
    item
}

pub(crate) fn item_to_image(item: &Item) -> Option<Image> {
    Some(Image {
        image_id: get_uuid(item, "image_id")?,
        submission: read_submission(item)?,
        uploaded_at: get_time(item, "uploaded_at")?,
        likes: get_n(item, "likes").unwrap_or(0),
        dislikes: get_n(item, "dislikes").unwrap_or(0),
        likers: get_ss(item, "likers"),
        dislikers: get_ss(item, "dislikers"),
    })
}

/// Retry schedule for writes that lost a conditional check.
pub(crate) fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(20),
        max_interval: Duration::from_millis(500),
        max_elapsed_time: Some(Duration::from_secs(3)),
        ..ExponentialBackoff::default()
    }
}

/// Conflicts are worth retrying; everything else is final.
pub(crate) fn retry_on_conflict(err: RepoError) -> backoff::Error<RepoError> {
    match err {
        e @ RepoError::Conflict(_) => backoff::Error::transient(e),
        other => backoff::Error::permanent(other),
    }
}
