#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use shotcraft_client::api::ApiError;
use shotcraft_client::backend::{SharedBackend, StudioBackend};
use shotcraft_client::poller::PollConfig;
use shotcraft_client::session::AuthStatus;
use shotcraft_core::generation::{
    GenerateRequest, GenerateResponse, GeneratedImage, GenerationJob, ImageGroup, ImageStatus,
    JobSnapshot, JobStatus, RefineRequest, RefineResponse,
};
use shotcraft_core::product::{Avatar, CreateProductRequest, Organization, Product, ProductStage};
use shotcraft_core::search::{SearchRequest, SearchResponse};
use shotcraft_core::types::Timestamp;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn image(id: &str, status: ImageStatus, at: i64) -> GeneratedImage {
    GeneratedImage {
        id: id.to_string(),
        url: (status == ImageStatus::Generated).then(|| format!("https://cdn.test/{id}.png")),
        status,
        created_at: ts(at),
    }
}

pub fn group(id: &str, images: Vec<GeneratedImage>) -> ImageGroup {
    ImageGroup {
        id: id.to_string(),
        created_at: ts(0),
        updated_at: ts(0),
        default_image_id: None,
        images,
    }
}

/// A group with a single version in the given state.
pub fn single(id: &str, status: ImageStatus) -> ImageGroup {
    group(id, vec![image(&format!("{id}-v0"), status, 1)])
}

pub fn snapshot(job_id: &str, status: JobStatus, groups: Vec<ImageGroup>) -> JobSnapshot {
    JobSnapshot {
        generation_job: GenerationJob {
            id: job_id.to_string(),
            status,
        },
        image_groups: Some(groups),
    }
}

/// A snapshot without any `image_groups` key.
pub fn bare(job_id: &str, status: JobStatus) -> JobSnapshot {
    JobSnapshot {
        generation_job: GenerationJob {
            id: job_id.to_string(),
            status,
        },
        image_groups: None,
    }
}

pub fn fast_poll(max_attempts: u32) -> PollConfig {
    PollConfig {
        max_attempts,
        interval: Duration::from_millis(5),
    }
}

pub fn search_response(page: u32) -> SearchResponse {
    SearchResponse {
        images: Vec::new(),
        total: 0,
        page,
        page_size: 20,
        total_pages: 1,
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// One scripted reply to `GET /generation/{id}`.
#[derive(Clone)]
pub enum Step {
    Snapshot(JobSnapshot),
    Fail(u16, String),
}

/// In-memory backend replaying scripted poll responses.
///
/// For each job the steps are consumed in order; the last step repeats
/// forever. Every call is recorded by endpoint name.
#[derive(Default)]
pub struct ScriptedBackend {
    pub calls: Mutex<Vec<String>>,
    pub jobs: Mutex<HashMap<String, VecDeque<Step>>>,
    /// Job ids handed out by `generate`, in order.
    pub generate_jobs: Mutex<VecDeque<String>>,
    pub generate_error: Mutex<Option<(u16, String)>>,
    pub refine_response: Mutex<Option<RefineResponse>>,
    pub set_default_error: Mutex<Option<(u16, String)>>,
    pub set_default_delay: Mutex<Duration>,
    pub image_groups: Mutex<Vec<ImageGroup>>,
    pub organizations: Mutex<Vec<Organization>>,
    pub avatars: Mutex<Vec<Avatar>>,
    /// Product creation requests received, in order.
    pub created_products: Mutex<Vec<CreateProductRequest>>,
    pub auth: Mutex<Option<AuthStatus>>,
    /// Artificial latency per search, keyed by search text.
    pub search_delays: Mutex<HashMap<String, Duration>>,
    /// Number of upcoming searches that fail before one succeeds.
    pub search_failures: Mutex<u32>,
    pub poll_delay: Mutex<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shared(self: &Arc<Self>) -> SharedBackend {
        self.clone()
    }

    pub fn script(&self, job_id: &str, steps: Vec<Step>) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.to_string(), steps.into());
    }

    pub fn queue_job(&self, job_id: &str) {
        self.generate_jobs
            .lock()
            .unwrap()
            .push_back(job_id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| *c == endpoint).count()
    }

    fn record(&self, endpoint: &str) {
        self.calls.lock().unwrap().push(endpoint.to_string());
    }

    fn status(status: u16, message: &str) -> ApiError {
        ApiError::Status {
            status,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl StudioBackend for ScriptedBackend {
    async fn generate(
        &self,
        _product_id: &str,
        _request: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiError> {
        self.record("generate");
        if let Some((status, message)) = self.generate_error.lock().unwrap().clone() {
            return Err(Self::status(status, &message));
        }
        let job_id = self
            .generate_jobs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "job-1".to_string());
        Ok(GenerateResponse {
            generation_job_id: job_id,
            image_group_ids: Vec::new(),
        })
    }

    async fn get_generation(&self, job_id: &str) -> Result<JobSnapshot, ApiError> {
        self.record("get_generation");
        let delay = *self.poll_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let step = {
            let mut jobs = self.jobs.lock().unwrap();
            let steps = jobs
                .get_mut(job_id)
                .ok_or_else(|| Self::status(404, "Generation job not found"))?;
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };
        match step {
            Some(Step::Snapshot(snapshot)) => Ok(snapshot),
            Some(Step::Fail(status, message)) => Err(Self::status(status, &message)),
            None => Err(Self::status(500, "empty script")),
        }
    }

    async fn refine(
        &self,
        _group_id: &str,
        _image_id: &str,
        _request: &RefineRequest,
    ) -> Result<RefineResponse, ApiError> {
        self.record("refine");
        self.refine_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Self::status(500, "no refine scripted"))
    }

    async fn set_default_image(&self, _group_id: &str, _image_id: &str) -> Result<(), ApiError> {
        self.record("set_default_image");
        let delay = *self.set_default_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.set_default_error.lock().unwrap().clone() {
            Some((status, message)) => Err(Self::status(status, &message)),
            None => Ok(()),
        }
    }

    async fn delete_image_group(&self, _product_id: &str, _group_id: &str) -> Result<(), ApiError> {
        self.record("delete_image_group");
        Ok(())
    }

    async fn list_image_groups(&self, _product_id: &str) -> Result<Vec<ImageGroup>, ApiError> {
        self.record("list_image_groups");
        Ok(self.image_groups.lock().unwrap().clone())
    }

    async fn download_image(&self, image_id: &str) -> Result<Vec<u8>, ApiError> {
        self.record("download_image");
        Ok(image_id.as_bytes().to_vec())
    }

    async fn search_images(
        &self,
        _organization_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ApiError> {
        self.record("search_images");
        let text = request.text.clone().unwrap_or_default();
        let delay = self.search_delays.lock().unwrap().get(&text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.search_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Self::status(503, "search index warming up"));
            }
        }
        let mut response = search_response(request.page);
        response.total = text.len() as u64;
        Ok(response)
    }

    async fn list_products(&self, organization_id: &str) -> Result<Vec<Product>, ApiError> {
        self.record("list_products");
        let _ = organization_id;
        Ok(Vec::new())
    }

    async fn create_product(&self, request: &CreateProductRequest) -> Result<Product, ApiError> {
        self.record("create_product");
        self.created_products.lock().unwrap().push(request.clone());
        Ok(Product {
            id: "prod-new".to_string(),
            name: request.name.clone(),
            organization_id: request.organization_id.clone(),
            created_by: None,
            primary_image_url: request.primary_image_url.clone(),
            additional_image_urls: request.additional_image_urls.clone(),
            stage: ProductStage::Queued,
            log: String::new(),
            created_at: ts(0),
            updated_at: ts(0),
            background_removed_image_url: None,
            description: None,
        })
    }

    async fn list_avatars(&self, _organization_id: &str) -> Result<Vec<Avatar>, ApiError> {
        self.record("list_avatars");
        Ok(self.avatars.lock().unwrap().clone())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, ApiError> {
        self.record("list_organizations");
        Ok(self.organizations.lock().unwrap().clone())
    }

    async fn auth_status(&self) -> Result<AuthStatus, ApiError> {
        self.record("auth_status");
        (*self.auth.lock().unwrap()).ok_or_else(|| Self::status(503, "auth service down"))
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        self.record("sign_out");
        *self.auth.lock().unwrap() = Some(AuthStatus::Unauthenticated);
        Ok(())
    }
}
