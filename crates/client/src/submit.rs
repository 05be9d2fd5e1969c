//! Submission: validate locally, then create the job or product on the
//! backend.
//!
//! Every function rejects bad input with [`StudioError::UserInput`] before a
//! single byte goes over the wire.

use shotcraft_core::generation::{GenerateRequest, RefineRequest, RefineResponse};
use shotcraft_core::product::{CreateProductRequest, Product};
use shotcraft_core::types::EntityId;

use crate::backend::StudioBackend;
use crate::error::{StudioError, StudioResult};

/// Start a generation job for a product. Returns the job id.
pub async fn submit_generation(
    backend: &dyn StudioBackend,
    product_id: &str,
    prompt: &str,
    count: u32,
) -> StudioResult<EntityId> {
    let request = GenerateRequest::new(prompt, count)?;
    let response = backend.generate(product_id, &request).await?;
    tracing::info!(
        product_id,
        job_id = %response.generation_job_id,
        count,
        "Generation job submitted",
    );
    Ok(response.generation_job_id)
}

/// Start a refinement of one version of a group.
pub async fn submit_refinement(
    backend: &dyn StudioBackend,
    group_id: &str,
    image_id: &str,
    request: &RefineRequest,
) -> StudioResult<RefineResponse> {
    request.ensure_valid()?;
    if group_id.is_empty() || image_id.is_empty() {
        return Err(StudioError::UserInput(
            "Select an image before refining".to_string(),
        ));
    }
    let response = backend.refine(group_id, image_id, request).await?;
    tracing::info!(
        group_id,
        image_id,
        job_id = %response.generation_job_id,
        "Refinement job submitted",
    );
    Ok(response)
}

/// Create a product from images that were already uploaded.
pub async fn create_product(
    backend: &dyn StudioBackend,
    request: &CreateProductRequest,
) -> StudioResult<Product> {
    request.ensure_valid()?;
    let product = backend.create_product(request).await?;
    tracing::info!(
        product_id = %product.id,
        organization_id = %product.organization_id,
        images = 1 + request.additional_image_urls.len(),
        "Product created",
    );
    Ok(product)
}
