//! Generation jobs, image groups and the request/response shapes used to
//! drive them.
//!
//! An [`ImageGroup`] is one logical slot in the gallery. Every generation
//! request creates `count` groups; every refinement appends one more
//! [`GeneratedImage`] to an existing group, so a group's `images` vector is
//! its version history (oldest first).

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{iso_timestamp, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sentinel id shared by every placeholder group and placeholder image.
pub const PLACEHOLDER_ID: &str = "placeholder";

/// Number of images requested by a default generate action.
pub const DEFAULT_GENERATION_COUNT: u32 = 4;
/// Upper bound on images per generation request.
pub const MAX_GENERATION_COUNT: u32 = 8;

/// Default refinement noise strength (no added noise).
pub const DEFAULT_NOISE_STRENGTH: f32 = 0.0;
/// Default refinement denoise amount.
pub const DEFAULT_DENOISE_AMOUNT: f32 = 0.9;

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Server-side lifecycle of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Failed,
}

impl JobStatus {
    /// Polling stops once a job reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generation job as reported by `GET /generation/{id}`.
///
/// Transient: it only exists for the duration of the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    #[serde(alias = "_id")]
    pub id: EntityId,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// Images and groups
// ---------------------------------------------------------------------------

/// Generation state of a single image version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Generated,
    Failed,
}

/// One version inside an [`ImageGroup`]. Never shared between groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GeneratedImageWire")]
pub struct GeneratedImage {
    pub id: EntityId,
    /// `None` while the image is still pending.
    pub url: Option<String>,
    pub status: ImageStatus,
    #[serde(with = "iso_timestamp")]
    pub created_at: Timestamp,
}

/// Wire shape of a generated image. The product image-group listing omits
/// `status`; it is inferred from the presence of a URL.
#[derive(Deserialize)]
struct GeneratedImageWire {
    id: EntityId,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<ImageStatus>,
    #[serde(with = "iso_timestamp")]
    created_at: Timestamp,
}

impl From<GeneratedImageWire> for GeneratedImage {
    fn from(wire: GeneratedImageWire) -> Self {
        let status = wire.status.unwrap_or(if wire.url.is_some() {
            ImageStatus::Generated
        } else {
            ImageStatus::Pending
        });
        Self {
            id: wire.id,
            url: wire.url,
            status,
            created_at: wire.created_at,
        }
    }
}

impl GeneratedImage {
    /// A finished image that can actually be displayed.
    pub fn is_displayable(&self) -> bool {
        self.status == ImageStatus::Generated && self.url.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_ID
    }
}

/// A set of versions of one generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGroup {
    pub id: EntityId,
    #[serde(with = "iso_timestamp")]
    pub created_at: Timestamp,
    #[serde(with = "iso_timestamp")]
    pub updated_at: Timestamp,
    /// Version pinned by the user; must reference an image in `images`.
    #[serde(default)]
    pub default_image_id: Option<EntityId>,
    pub images: Vec<GeneratedImage>,
}

impl ImageGroup {
    /// Build a placeholder group holding a single pending image.
    pub fn placeholder(now: Timestamp) -> Self {
        Self {
            id: PLACEHOLDER_ID.to_string(),
            created_at: now,
            updated_at: now,
            default_image_id: None,
            images: vec![GeneratedImage {
                id: PLACEHOLDER_ID.to_string(),
                url: None,
                status: ImageStatus::Pending,
                created_at: now,
            }],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_ID
    }

    /// Look up a version by id.
    pub fn image(&self, image_id: &str) -> Option<&GeneratedImage> {
        self.images.iter().find(|image| image.id == image_id)
    }

    /// Position of a version in the history.
    pub fn image_index(&self, image_id: &str) -> Option<usize> {
        self.images.iter().position(|image| image.id == image_id)
    }

    /// True while at least one version is still being generated.
    pub fn has_pending(&self) -> bool {
        self.images
            .iter()
            .any(|image| image.status == ImageStatus::Pending)
    }

    /// Check the structural invariants of a group received from the server.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.images.is_empty() {
            return Err(CoreError::Validation(format!(
                "Image group {} has no images",
                self.id
            )));
        }
        if let Some(default_id) = &self.default_image_id {
            if self.image(default_id).is_none() {
                return Err(CoreError::Validation(format!(
                    "Default image {default_id} does not belong to group {}",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Poll snapshots
// ---------------------------------------------------------------------------

/// Body of `GET /generation/{job_id}`: the job plus any groups it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub generation_job: GenerationJob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_groups: Option<Vec<ImageGroup>>,
}

impl JobSnapshot {
    pub fn status(&self) -> JobStatus {
        self.generation_job.status
    }

    pub fn is_terminal(&self) -> bool {
        self.generation_job.status.is_terminal()
    }

    /// True when the snapshot carries at least one group update.
    pub fn has_updates(&self) -> bool {
        self.image_groups
            .as_ref()
            .is_some_and(|groups| !groups.is_empty())
    }

    /// Group updates carried by this snapshot (empty when absent).
    pub fn groups(&self) -> &[ImageGroup] {
        self.image_groups.as_deref().unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Reject prompts that are empty once trimmed.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Please enter a prompt before generating images".to_string(),
        ));
    }
    Ok(())
}

/// Body of `POST /product/{id}/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct GenerateRequest {
    pub prompt: String,
    #[validate(range(min = 1, max = 8))]
    pub count: u32,
}

impl GenerateRequest {
    /// Build a validated request. The prompt is sent as typed.
    pub fn new(prompt: impl Into<String>, count: u32) -> Result<Self, CoreError> {
        let request = Self {
            prompt: prompt.into(),
            count,
        };
        request.ensure_valid()?;
        Ok(request)
    }

    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        Validate::validate(self).map_err(|e| {
            CoreError::Validation(format!(
                "count must be between 1 and {MAX_GENERATION_COUNT}: {e}"
            ))
        })
    }
}

/// Body of `POST /image_group/{group_id}/image/{image_id}/refine`.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct RefineRequest {
    pub prompt: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub noise_strength: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoise_amount: f32,
}

impl RefineRequest {
    /// Build a request with the default noise and denoise parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            noise_strength: DEFAULT_NOISE_STRENGTH,
            denoise_amount: DEFAULT_DENOISE_AMOUNT,
        }
    }

    pub fn with_noise_strength(mut self, noise_strength: f32) -> Self {
        self.noise_strength = noise_strength;
        self
    }

    pub fn with_denoise_amount(mut self, denoise_amount: f32) -> Self {
        self.denoise_amount = denoise_amount;
        self
    }

    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        validate_prompt(&self.prompt)?;
        Validate::validate(self).map_err(|e| {
            CoreError::Validation(format!(
                "noise_strength and denoise_amount must be within [0, 1]: {e}"
            ))
        })
    }
}

/// Body returned by `POST /product/{id}/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub generation_job_id: EntityId,
    #[serde(default)]
    pub image_group_ids: Vec<EntityId>,
}

/// Body returned by the refine endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineResponse {
    pub generation_job_id: EntityId,
    pub image_group_id: EntityId,
    pub image_id: EntityId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
