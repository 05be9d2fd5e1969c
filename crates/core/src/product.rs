//! Products, avatars and organizations as exchanged with the backend.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{iso_timestamp, EntityId, Timestamp};

/// Background processing stage of an uploaded product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStage {
    Queued,
    InProgress,
    Completed,
    Error,
}

/// User that created a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreator {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
}

/// A product whose photos are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub organization_id: EntityId,
    #[serde(default)]
    pub created_by: Option<ProductCreator>,
    pub primary_image_url: String,
    #[serde(default)]
    pub additional_image_urls: Vec<String>,
    pub stage: ProductStage,
    #[serde(default)]
    pub log: String,
    #[serde(with = "iso_timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "iso_timestamp")]
    pub updated_at: Timestamp,
    #[serde(default)]
    pub background_removed_image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Product {
    /// Generation is only meaningful once background processing finished.
    pub fn is_ready(&self) -> bool {
        self.stage == ProductStage::Completed
    }
}

/// Body of `POST /product`. Images must already be uploaded; only their
/// ids and URLs are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub organization_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_image_id: Option<EntityId>,
    #[validate(length(min = 1))]
    pub primary_image_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_image_ids: Vec<EntityId>,
    pub additional_image_urls: Vec<String>,
}

impl CreateProductRequest {
    pub fn new(
        name: impl Into<String>,
        organization_id: impl Into<EntityId>,
        primary_image_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            organization_id: organization_id.into(),
            primary_image_id: None,
            primary_image_url: primary_image_url.into(),
            additional_image_ids: Vec::new(),
            additional_image_urls: Vec::new(),
        }
    }

    pub fn with_primary_image_id(mut self, id: impl Into<EntityId>) -> Self {
        self.primary_image_id = Some(id.into());
        self
    }

    /// Attach an already uploaded additional image.
    pub fn with_additional_image(mut self, id: Option<EntityId>, url: impl Into<String>) -> Self {
        if let Some(id) = id {
            self.additional_image_ids.push(id);
        }
        self.additional_image_urls.push(url.into());
        self
    }

    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Please enter a product name".to_string(),
            ));
        }
        if self.additional_image_urls.iter().any(|u| u.trim().is_empty()) {
            return Err(CoreError::Validation(
                "Additional image URLs must not be empty".to_string(),
            ));
        }
        Validate::validate(self)
            .map_err(|e| CoreError::Validation(format!("Invalid product: {e}")))
    }
}

/// Preview renders of an avatar in its three aspect ratios.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPreviewImages {
    #[serde(default, alias = "previewImage169")]
    pub preview_image_16_9: Option<String>,
    #[serde(default, alias = "previewImage11")]
    pub preview_image_1_1: Option<String>,
    #[serde(default, alias = "previewImage916")]
    pub preview_image_9_16: Option<String>,
}

/// A model avatar available to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub id: EntityId,
    pub name: String,
    pub gender: String,
    #[serde(default, alias = "previewImages")]
    pub preview_images: AvatarPreviewImages,
}

impl Avatar {
    /// Square preview if present, else any other.
    pub fn preview_url(&self) -> Option<&str> {
        let p = &self.preview_images;
        p.preview_image_1_1
            .as_deref()
            .or(p.preview_image_16_9.as_deref())
            .or(p.preview_image_9_16.as_deref())
    }
}

/// An organization the signed-in user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}
