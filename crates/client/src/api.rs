//! REST API client for the shotcraft backend.
//!
//! Wraps the product, avatar, generation, image-group, search and auth endpoints
//! using [`reqwest`]. Bodies are snake_case JSON on the wire, matching the
//! serde field names in `shotcraft-core`, so no key conversion happens here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use shotcraft_core::generation::{
    GenerateRequest, GenerateResponse, ImageGroup, JobSnapshot, RefineRequest, RefineResponse,
};
use shotcraft_core::product::{Avatar, CreateProductRequest, Organization, Product};
use shotcraft_core::search::{SearchRequest, SearchResponse};

use crate::backend::StudioBackend;
use crate::config::ClientConfig;
use crate::session::AuthStatus;

/// HTTP client for one backend deployment.
#[derive(Clone)]
pub struct StudioApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, or the raw body.
        message: String,
    },

    /// The body did not match the expected shape.
    #[error("Unexpected response format: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status code, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }

    /// Network or HTTP-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { .. })
    }

    /// Response shape mismatch.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

// ---- wire envelopes ----

#[derive(Deserialize)]
struct ImageGroupsEnvelope {
    image_groups: Vec<ImageGroup>,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    products: Vec<Product>,
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: Product,
}

#[derive(Deserialize)]
struct AvatarsEnvelope {
    avatars: Vec<Avatar>,
}

#[derive(Deserialize)]
struct OrganizationsEnvelope {
    organizations: Vec<Organization>,
}

#[derive(Deserialize)]
struct AuthStatusEnvelope {
    status: String,
}

/// Error bodies seen from the backend: FastAPI `detail`, or the
/// `error_message` / `message` shapes.
#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return body.to_string();
    };
    let detail = envelope.detail.map(|detail| match detail {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    });
    detail
        .or(envelope.error_message)
        .or(envelope.message)
        .unwrap_or_else(|| body.to_string())
}

impl StudioApi {
    /// Create a client for a backend.
    ///
    /// * `api_url` - Base URL including the API prefix, e.g. `http://host:8000/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Build a client from configuration (timeout, base URL, token).
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let api = Self::with_client(client, config.api_url.clone());
        Ok(match &config.api_token {
            Some(token) => api.with_token(token.clone()),
            None => api,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.api_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or an [`ApiError::Status`] carrying the status
    /// and the server's message on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = if body.is_empty() {
                format!("Request failed with status {}", status.as_u16())
            } else {
                error_message(&body)
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON body. Shape mismatches surface as
    /// [`ApiError::Decode`], not as transport errors.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StudioBackend for StudioApi {
    async fn generate(
        &self,
        product_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiError> {
        let response = self
            .request(Method::POST, &format!("/product/{product_id}/generate"))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_generation(&self, job_id: &str) -> Result<JobSnapshot, ApiError> {
        let response = self
            .request(Method::GET, &format!("/generation/{job_id}"))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn refine(
        &self,
        group_id: &str,
        image_id: &str,
        request: &RefineRequest,
    ) -> Result<RefineResponse, ApiError> {
        let response = self
            .request(
                Method::POST,
                &format!("/image_group/{group_id}/image/{image_id}/refine"),
            )
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn set_default_image(&self, group_id: &str, image_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(
                Method::POST,
                &format!("/image_group/{group_id}/set_default_image/{image_id}"),
            )
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn delete_image_group(&self, product_id: &str, group_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/product/{product_id}/image-group/{group_id}"),
            )
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn list_image_groups(&self, product_id: &str) -> Result<Vec<ImageGroup>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/product/{product_id}/image-groups"))
            .send()
            .await?;
        let envelope: ImageGroupsEnvelope = Self::parse_response(response).await?;
        Ok(envelope.image_groups)
    }

    async fn download_image(&self, image_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/image/{image_id}/download"))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn search_images(
        &self,
        organization_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ApiError> {
        let response = self
            .request(Method::POST, &format!("/{organization_id}/image/search"))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn list_products(&self, organization_id: &str) -> Result<Vec<Product>, ApiError> {
        let response = self
            .request(Method::GET, "/product")
            .query(&[("organization_id", organization_id)])
            .send()
            .await?;
        let envelope: ProductsEnvelope = Self::parse_response(response).await?;
        Ok(envelope.products)
    }

    async fn create_product(&self, request: &CreateProductRequest) -> Result<Product, ApiError> {
        let response = self
            .request(Method::POST, "/product")
            .json(request)
            .send()
            .await?;
        let envelope: ProductEnvelope = Self::parse_response(response).await?;
        Ok(envelope.product)
    }

    async fn list_avatars(&self, organization_id: &str) -> Result<Vec<Avatar>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/organization/{organization_id}/avatar"))
            .send()
            .await?;
        let envelope: AvatarsEnvelope = Self::parse_response(response).await?;
        Ok(envelope.avatars)
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, ApiError> {
        let response = self
            .request(Method::GET, "/user/organization")
            .send()
            .await?;
        let envelope: OrganizationsEnvelope = Self::parse_response(response).await?;
        Ok(envelope.organizations)
    }

    async fn auth_status(&self) -> Result<AuthStatus, ApiError> {
        let response = self.request(Method::GET, "/auth/status").send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(AuthStatus::Unauthenticated);
        }
        let envelope: AuthStatusEnvelope = Self::parse_response(response).await?;
        Ok(AuthStatus::from_wire(&envelope.status))
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, "/auth/sign_out")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check_status(response).await
    }
}
