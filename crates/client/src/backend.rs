//! The seam between workspace logic and the HTTP layer.
//!
//! Pollers, sessions and the search controller only see
//! [`StudioBackend`]; [`StudioApi`](crate::api::StudioApi) is the
//! production implementation.

use std::sync::Arc;

use async_trait::async_trait;

use shotcraft_core::generation::{
    GenerateRequest, GenerateResponse, ImageGroup, JobSnapshot, RefineRequest, RefineResponse,
};
use shotcraft_core::product::{Avatar, CreateProductRequest, Organization, Product};
use shotcraft_core::search::{SearchRequest, SearchResponse};

use crate::api::ApiError;
use crate::session::AuthStatus;

#[async_trait]
pub trait StudioBackend: Send + Sync {
    /// `POST /product/{product_id}/generate`
    async fn generate(
        &self,
        product_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiError>;

    /// `GET /generation/{job_id}`
    async fn get_generation(&self, job_id: &str) -> Result<JobSnapshot, ApiError>;

    /// `POST /image_group/{group_id}/image/{image_id}/refine`
    async fn refine(
        &self,
        group_id: &str,
        image_id: &str,
        request: &RefineRequest,
    ) -> Result<RefineResponse, ApiError>;

    async fn set_default_image(&self, group_id: &str, image_id: &str) -> Result<(), ApiError>;

    async fn delete_image_group(&self, product_id: &str, group_id: &str) -> Result<(), ApiError>;

    /// Recent groups of a product, newest first.
    async fn list_image_groups(&self, product_id: &str) -> Result<Vec<ImageGroup>, ApiError>;

    /// Raw image bytes.
    async fn download_image(&self, image_id: &str) -> Result<Vec<u8>, ApiError>;

    async fn search_images(
        &self,
        organization_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ApiError>;

    async fn list_products(&self, organization_id: &str) -> Result<Vec<Product>, ApiError>;

    /// `POST /product` from already uploaded images.
    async fn create_product(&self, request: &CreateProductRequest) -> Result<Product, ApiError>;

    /// `GET /organization/{organization_id}/avatar`
    async fn list_avatars(&self, organization_id: &str) -> Result<Vec<Avatar>, ApiError>;

    async fn list_organizations(&self) -> Result<Vec<Organization>, ApiError>;

    async fn auth_status(&self) -> Result<AuthStatus, ApiError>;

    async fn sign_out(&self) -> Result<(), ApiError>;
}

/// Shared handle passed to pollers and sessions.
pub type SharedBackend = Arc<dyn StudioBackend>;
