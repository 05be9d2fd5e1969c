//! Product workspace orchestration.
//!
//! A [`ProductSession`] owns the gallery of one product page: the groups
//! generated in this session, the product's recent groups, and the
//! full-screen viewer. Jobs are submitted through [`crate::submit`], polled
//! with a [`JobPoller`] whose tokens are children of the session's master
//! token, and every snapshot is merged into the gallery as it arrives.
//!
//! Any number of jobs may run at once (`tokio::join!` on several
//! `generate` calls); the gallery merges by id so interleaved snapshots
//! never duplicate a group. No lock is held across a network call.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use shotcraft_core::error::CoreError;
use shotcraft_core::generation::{
    GenerateRequest, ImageGroup, JobSnapshot, JobStatus, RefineRequest,
};
use shotcraft_core::reconcile::{PlaceholderBatch, ProductGallery};
use shotcraft_core::selector::VersionViewer;
use shotcraft_core::types::EntityId;

use crate::backend::SharedBackend;
use crate::error::{StudioError, StudioResult};
use crate::events::{StudioEvent, EVENT_CHANNEL_CAPACITY};
use crate::poller::{JobPoller, PollConfig};
use crate::submit::{submit_generation, submit_refinement};

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: EntityId,
    pub status: JobStatus,
    /// Ids of the groups the job touched, in snapshot order.
    pub group_ids: Vec<EntityId>,
}

impl JobOutcome {
    fn from_snapshot(job_id: EntityId, snapshot: &JobSnapshot) -> Self {
        Self {
            job_id,
            status: snapshot.status(),
            group_ids: snapshot.groups().iter().map(|g| g.id.clone()).collect(),
        }
    }
}

/// Apply `release` to shared state from a `Drop` impl.
///
/// Uses the lock directly when it is free, otherwise hands the update to the
/// runtime.
fn release_on_drop<T, F>(lock: &Arc<RwLock<T>>, release: F)
where
    T: Send + Sync + 'static,
    F: FnOnce(&mut T) + Send + 'static,
{
    if let Ok(mut state) = lock.try_write() {
        release(&mut state);
        return;
    }
    let lock = lock.clone();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                release(&mut *lock.write().await);
            });
        }
        Err(_) => tracing::warn!("No runtime available to release session state"),
    }
}

/// Owns a placeholder batch until its job is over.
///
/// [`PlaceholderGuard::finish`] removes the leftovers on the normal path;
/// dropping the guard (the `generate` future was dropped) does the same.
struct PlaceholderGuard {
    gallery: Arc<RwLock<ProductGallery>>,
    batch: Option<PlaceholderBatch>,
}

impl PlaceholderGuard {
    fn new(gallery: Arc<RwLock<ProductGallery>>, batch: PlaceholderBatch) -> Self {
        Self {
            gallery,
            batch: Some(batch),
        }
    }

    /// Remove the batch's unused placeholders. Returns how many were removed.
    async fn finish(mut self) -> usize {
        let Some(batch) = self.batch else {
            return 0;
        };
        let removed = self.gallery.write().await.generated.finalize(batch);
        self.batch = None;
        removed
    }
}

impl Drop for PlaceholderGuard {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            tracing::debug!("Generation abandoned, dropping its placeholders");
            release_on_drop(&self.gallery, move |gallery: &mut ProductGallery| {
                gallery.generated.finalize(batch);
            });
        }
    }
}

/// Marks a group as being refined; the mark is cleared on release or drop.
struct RefiningGuard {
    refining: Arc<RwLock<HashSet<EntityId>>>,
    group_id: Option<EntityId>,
}

impl RefiningGuard {
    fn new(refining: Arc<RwLock<HashSet<EntityId>>>, group_id: &str) -> Self {
        Self {
            refining,
            group_id: Some(group_id.to_string()),
        }
    }

    async fn release(mut self) {
        if let Some(group_id) = self.group_id.as_deref() {
            self.refining.write().await.remove(group_id);
        }
        self.group_id = None;
    }
}

impl Drop for RefiningGuard {
    fn drop(&mut self) {
        if let Some(group_id) = self.group_id.take() {
            release_on_drop(&self.refining, move |refining: &mut HashSet<EntityId>| {
                refining.remove(&group_id);
            });
        }
    }
}

/// How snapshots of a job are folded into the gallery.
#[derive(Debug, Clone, Copy)]
enum JobKind<'a> {
    Generate(PlaceholderBatch),
    Refine { group_id: &'a str },
}

/// Workspace state for one product.
pub struct ProductSession {
    product_id: EntityId,
    backend: SharedBackend,
    poller: JobPoller,
    gallery: Arc<RwLock<ProductGallery>>,
    viewer: Arc<RwLock<Option<VersionViewer>>>,
    /// Groups with a refinement in flight.
    refining: Arc<RwLock<HashSet<EntityId>>>,
    event_tx: broadcast::Sender<StudioEvent>,
    /// Master token; every poll sequence runs on a child of it.
    cancel: CancellationToken,
}

impl ProductSession {
    pub fn new(backend: SharedBackend, product_id: impl Into<EntityId>, poll: PollConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(backend.clone(), poll).with_parent(&cancel);

        Self {
            product_id: product_id.into(),
            backend,
            poller,
            gallery: Arc::new(RwLock::new(ProductGallery::new())),
            viewer: Arc::new(RwLock::new(None)),
            refining: Arc::new(RwLock::new(HashSet::new())),
            event_tx,
            cancel,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Subscribe to gallery events.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: StudioEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    // ---- queries ----

    /// Session list in display order, placeholders first.
    pub async fn groups(&self) -> Vec<ImageGroup> {
        self.gallery.read().await.generated.to_vec()
    }

    /// Recent groups loaded from the server, newest first.
    pub async fn recent(&self) -> Vec<ImageGroup> {
        self.gallery.read().await.recent.to_vec()
    }

    pub async fn placeholder_count(&self) -> usize {
        self.gallery.read().await.generated.placeholder_count()
    }

    pub async fn find_group(&self, group_id: &str) -> Option<ImageGroup> {
        self.gallery.read().await.find(group_id).cloned()
    }

    pub async fn is_refining(&self, group_id: &str) -> bool {
        self.refining.read().await.contains(group_id)
    }

    /// Fetch the product's recent groups, replacing the recent list.
    pub async fn load_recent(&self) -> StudioResult<usize> {
        let groups = self.backend.list_image_groups(&self.product_id).await?;
        let mut gallery = self.gallery.write().await;
        gallery.recent.replace_all(groups);
        tracing::debug!(
            product_id = %self.product_id,
            count = gallery.recent.len(),
            "Recent image groups loaded",
        );
        Ok(gallery.recent.len())
    }

    // ---- generation ----

    /// Generate `count` new groups from `prompt` and wait for the job.
    ///
    /// Placeholders appear immediately and are swapped for real groups as
    /// snapshots arrive. Whatever happens, the batch's leftover
    /// placeholders are removed before this returns, or as soon as the
    /// returned future is dropped.
    pub async fn generate(&self, prompt: &str, count: u32) -> StudioResult<JobOutcome> {
        GenerateRequest::new(prompt, count)?;

        let batch = self
            .gallery
            .write()
            .await
            .generated
            .add_placeholders(count as usize, Utc::now());
        let placeholders = PlaceholderGuard::new(self.gallery.clone(), batch);

        let job_id =
            match submit_generation(self.backend.as_ref(), &self.product_id, prompt, count).await {
                Ok(job_id) => job_id,
                Err(e) => {
                    placeholders.finish().await;
                    return Err(e);
                }
            };

        self.emit(StudioEvent::JobSubmitted {
            job_id: job_id.clone(),
            placeholders: count as usize,
        });

        self.drive(job_id, JobKind::Generate(batch), Some(placeholders))
            .await
    }

    /// Refine one version of a known group and wait for the job.
    ///
    /// On success the refined group is returned and, if it is open in the
    /// viewer, the viewer moves to the new version.
    pub async fn refine(
        &self,
        group_id: &str,
        image_id: &str,
        request: &RefineRequest,
    ) -> StudioResult<ImageGroup> {
        request.ensure_valid()?;
        {
            let gallery = self.gallery.read().await;
            let group = gallery.find(group_id).ok_or_else(|| CoreError::NotFound {
                entity: "ImageGroup",
                id: group_id.to_string(),
            })?;
            if group.image(image_id).is_none() {
                return Err(StudioError::UserInput(format!(
                    "Image {image_id} does not belong to group {group_id}"
                )));
            }
        }
        if !self.refining.write().await.insert(group_id.to_string()) {
            return Err(StudioError::UserInput(
                "This image is already being refined".to_string(),
            ));
        }
        let refining = RefiningGuard::new(self.refining.clone(), group_id);

        let result = self.run_refinement(group_id, image_id, request).await;
        refining.release().await;
        result
    }

    async fn run_refinement(
        &self,
        group_id: &str,
        image_id: &str,
        request: &RefineRequest,
    ) -> StudioResult<ImageGroup> {
        let response = submit_refinement(self.backend.as_ref(), group_id, image_id, request).await?;
        self.emit(StudioEvent::JobSubmitted {
            job_id: response.generation_job_id.clone(),
            placeholders: 0,
        });

        self.drive(
            response.generation_job_id,
            JobKind::Refine {
                group_id: &response.image_group_id,
            },
            None,
        )
        .await?;

        let group = self
            .find_group(&response.image_group_id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                entity: "ImageGroup",
                id: response.image_group_id.clone(),
            })?;
        Ok(group)
    }

    /// Follow a job to the end, folding every snapshot into the gallery.
    async fn drive(
        &self,
        job_id: EntityId,
        kind: JobKind<'_>,
        placeholders: Option<PlaceholderGuard>,
    ) -> StudioResult<JobOutcome> {
        let mut updates = self.poller.start(job_id.clone());

        let result = loop {
            match updates.recv().await {
                Some(Ok(snapshot)) => {
                    self.apply_snapshot(&job_id, kind, &snapshot).await;
                    if snapshot.is_terminal() {
                        break Ok(JobOutcome::from_snapshot(job_id.clone(), &snapshot));
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Err(StudioError::Cancelled),
            }
        };

        if let Some(placeholders) = placeholders {
            let removed = placeholders.finish().await;
            if removed > 0 {
                tracing::debug!(job_id = %job_id, removed, "Dropped unused placeholders");
            }
        }

        match result {
            Ok(outcome) if outcome.status.is_success() => {
                self.emit(StudioEvent::JobFinished {
                    job_id: job_id.clone(),
                    status: outcome.status,
                });
                Ok(outcome)
            }
            Ok(outcome) => {
                self.emit(StudioEvent::JobFinished {
                    job_id: job_id.clone(),
                    status: outcome.status,
                });
                Err(StudioError::JobFailed {
                    job_id,
                    status: outcome.status,
                })
            }
            Err(e) => {
                self.emit(StudioEvent::JobAbandoned {
                    job_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn apply_snapshot(&self, job_id: &str, kind: JobKind<'_>, snapshot: &JobSnapshot) {
        let groups = snapshot.groups();
        if groups.is_empty() {
            return;
        }
        for group in groups {
            if let Err(e) = group.check_invariants() {
                tracing::warn!(job_id, group_id = %group.id, error = %e, "Malformed image group");
            }
        }

        {
            let mut gallery = self.gallery.write().await;
            match kind {
                JobKind::Generate(batch) => {
                    let summary = gallery.generated.merge(Some(batch), groups.iter().cloned());
                    tracing::debug!(
                        job_id,
                        inserted = summary.inserted,
                        replaced = summary.replaced,
                        placeholders_consumed = summary.placeholders_consumed,
                        "Merged generation snapshot",
                    );
                }
                JobKind::Refine { .. } => {
                    for group in groups {
                        gallery.apply_refined(group.clone());
                    }
                }
            }
        }

        {
            let mut viewer = self.viewer.write().await;
            if let Some(viewer) = viewer.as_mut() {
                for group in groups {
                    match kind {
                        JobKind::Refine { group_id }
                            if snapshot.is_terminal() && group.id == group_id =>
                        {
                            viewer.on_refined(group)
                        }
                        _ => viewer.on_updated(group),
                    }
                }
            }
        }

        if let (JobKind::Refine { group_id }, true) = (kind, snapshot.is_terminal()) {
            if let Some(group) = groups.iter().find(|g| g.id == group_id) {
                self.emit(StudioEvent::GroupRefined {
                    group: group.clone(),
                });
            }
        }

        self.emit(StudioEvent::GroupsUpdated {
            job_id: job_id.to_string(),
            groups: groups.to_vec(),
        });
    }

    // ---- default image / delete / download ----

    /// Pin `image_id` as the group's default.
    ///
    /// Local state changes only after the backend accepted the change; on
    /// failure nothing is touched and the error is returned. A group deleted
    /// locally while the request was in flight is skipped.
    pub async fn set_default_image(&self, group_id: &str, image_id: &str) -> StudioResult<()> {
        {
            let gallery = self.gallery.read().await;
            let group = gallery.find(group_id).ok_or_else(|| CoreError::NotFound {
                entity: "ImageGroup",
                id: group_id.to_string(),
            })?;
            if group.image(image_id).is_none() {
                return Err(StudioError::UserInput(format!(
                    "Image {image_id} does not belong to group {group_id}"
                )));
            }
        }

        self.backend.set_default_image(group_id, image_id).await?;

        match self.gallery.write().await.set_default(group_id, image_id) {
            Ok(()) => {}
            Err(CoreError::NotFound { .. }) => {
                tracing::info!(group_id, image_id, "Default image updated, group no longer local");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(viewer) = self.viewer.write().await.as_mut() {
            if viewer.group_id() == group_id {
                viewer.on_default_changed(image_id);
            }
        }
        tracing::info!(group_id, image_id, "Default image updated");
        self.emit(StudioEvent::DefaultImageChanged {
            group_id: group_id.to_string(),
            image_id: image_id.to_string(),
        });
        Ok(())
    }

    /// Pin whatever version the viewer is showing.
    pub async fn set_default_from_viewer(&self) -> StudioResult<()> {
        let (group_id, image_id) = {
            let viewer = self.viewer.read().await;
            let viewer = viewer
                .as_ref()
                .ok_or_else(|| StudioError::UserInput("No image group is open".to_string()))?;
            let image = viewer
                .image()
                .ok_or_else(|| StudioError::UserInput("No version selected".to_string()))?;
            (viewer.group_id().to_string(), image.id.clone())
        };
        self.set_default_image(&group_id, &image_id).await
    }

    /// Delete a group on the server and purge it from both lists.
    pub async fn delete_group(&self, group_id: &str) -> StudioResult<()> {
        self.backend
            .delete_image_group(&self.product_id, group_id)
            .await?;

        let removed = self.gallery.write().await.remove_group(group_id);
        {
            let mut viewer = self.viewer.write().await;
            if viewer.as_ref().is_some_and(|v| v.group_id() == group_id) {
                *viewer = None;
            }
        }
        tracing::info!(product_id = %self.product_id, group_id, removed, "Image group deleted");
        self.emit(StudioEvent::GroupDeleted {
            group_id: group_id.to_string(),
        });
        Ok(())
    }

    pub async fn download_image(&self, image_id: &str) -> StudioResult<Vec<u8>> {
        Ok(self.backend.download_image(image_id).await?)
    }

    // ---- viewer ----

    /// Open a group in the full-screen viewer on its current version.
    pub async fn open_viewer(&self, group_id: &str) -> StudioResult<VersionViewer> {
        let group = self
            .find_group(group_id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                entity: "ImageGroup",
                id: group_id.to_string(),
            })?;
        let viewer = VersionViewer::open(group);
        *self.viewer.write().await = Some(viewer.clone());
        Ok(viewer)
    }

    pub async fn close_viewer(&self) {
        *self.viewer.write().await = None;
    }

    pub async fn viewer(&self) -> Option<VersionViewer> {
        self.viewer.read().await.clone()
    }

    /// Move the viewer to a version. Returns the index actually selected.
    pub async fn select_version(&self, index: usize) -> Option<usize> {
        let mut viewer = self.viewer.write().await;
        let viewer = viewer.as_mut()?;
        viewer.select(index);
        Some(viewer.index())
    }

    pub async fn next_version(&self) -> Option<usize> {
        let mut viewer = self.viewer.write().await;
        let viewer = viewer.as_mut()?;
        viewer.next();
        Some(viewer.index())
    }

    pub async fn prev_version(&self) -> Option<usize> {
        let mut viewer = self.viewer.write().await;
        let viewer = viewer.as_mut()?;
        viewer.prev();
        Some(viewer.index())
    }

    // ---- lifecycle ----

    /// Stop every poll sequence started by this session.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ProductSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

