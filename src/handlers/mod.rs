pub mod assets;
pub mod images;
pub mod moderation;
pub mod site_config;
pub mod uploads;
pub mod users;

use crate::errors::AppError;
use axum::{
    extract::{FromRequest, FromRequestParts, Multipart},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// `Json` whose rejection is answered with the usual `{error, details}` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// `Query` with the same rejection handling as [`JsonBody`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// The file part of a multipart upload.
pub(crate) struct FilePart {
    pub data: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// A fully read multipart form: text fields by name plus the `image` part.
pub(crate) struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<FilePart>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut fields = HashMap::new();
        let mut image = None;

        while let Some(field) = multipart.next_field().await? {
            let field_name = match field.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if field_name == "image" {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await?.to_vec();
                image = Some(FilePart { data, file_name, content_type });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read {}: {}", field_name, e)))?;
                fields.insert(field_name, value);
            }
        }

        Ok(Self { fields, image })
    }

    /// Trimmed value of a text field; blank counts as absent.
    pub fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn required(&self, name: &str) -> Result<String, AppError> {
        self.optional(name)
            .ok_or_else(|| AppError::MissingFormField(name.to_string()))
    }

    pub fn take_image(&mut self) -> Result<FilePart, AppError> {
        self.image
            .take()
            .ok_or_else(|| AppError::MissingFormField("image".to_string()))
    }
}

/// Object key under `folder`, or at the root when there is none.
pub(crate) fn object_key(folder: Option<&str>, name: &str) -> String {
    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{}/{}", folder, name),
        None => name.to_string(),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
