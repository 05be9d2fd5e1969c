//! Process-wide session context.
//!
//! [`SessionContext`] holds who is signed in and which organization is
//! active. It is created once with [`SessionContext::load`] (or
//! [`SessionContext::start`], which also begins refreshing), kept fresh by a
//! background task ([`SessionContext::spawn_refresh`]), and torn down by
//! [`SessionContext::sign_out`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shotcraft_core::error::CoreError;
use shotcraft_core::product::Organization;

use crate::backend::SharedBackend;
use crate::error::StudioResult;

/// Result of `GET /auth/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Authenticated,
    Unauthenticated,
}

impl AuthStatus {
    /// Anything other than `"authenticated"` counts as signed out.
    pub fn from_wire(status: &str) -> Self {
        if status == "authenticated" {
            Self::Authenticated
        } else {
            Self::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    organizations: Vec<Organization>,
    current_organization: Option<Organization>,
}

pub struct SessionContext {
    backend: SharedBackend,
    state: Arc<RwLock<SessionState>>,
    cancel: CancellationToken,
}

impl SessionContext {
    /// Check the auth status and, when signed in, load organizations. The
    /// first organization becomes the current one.
    pub async fn load(backend: SharedBackend) -> StudioResult<Self> {
        let context = Self {
            backend,
            state: Arc::new(RwLock::new(SessionState::default())),
            cancel: CancellationToken::new(),
        };
        context.refresh().await?;
        Ok(context)
    }

    /// [`load`](Self::load), then refresh every `refresh_interval` for as
    /// long as the returned context is alive.
    pub async fn start(backend: SharedBackend, refresh_interval: Duration) -> StudioResult<Arc<Self>> {
        let context = Arc::new(Self::load(backend).await?);
        context.spawn_refresh(refresh_interval);
        tracing::debug!(interval_secs = refresh_interval.as_secs(), "Session refresh started");
        Ok(context)
    }

    /// Re-check `/auth/status` and reload organizations.
    ///
    /// A failed status check counts as signed out rather than an error.
    /// Returns the resulting status.
    pub async fn refresh(&self) -> StudioResult<AuthStatus> {
        let status = match self.backend.auth_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Auth status check failed");
                AuthStatus::Unauthenticated
            }
        };

        if !status.is_authenticated() {
            *self.state.write().await = SessionState::default();
            return Ok(status);
        }

        let organizations = self.backend.list_organizations().await?;
        let mut state = self.state.write().await;
        let current = state
            .current_organization
            .as_ref()
            .and_then(|current| organizations.iter().find(|org| org.id == current.id))
            .or_else(|| organizations.first())
            .cloned();
        state.authenticated = true;
        state.current_organization = current;
        state.organizations = organizations;
        tracing::debug!(
            organizations = state.organizations.len(),
            current = ?state.current_organization.as_ref().map(|o| o.id.as_str()),
            "Session refreshed",
        );
        Ok(status)
    }

    /// Refresh on an interval until the context is signed out or dropped.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let context = Arc::downgrade(self);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session refresh stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                let Some(context) = context.upgrade() else {
                    return;
                };
                if let Err(e) = context.refresh().await {
                    tracing::warn!(error = %e, "Session refresh failed");
                }
            }
        })
    }

    /// Sign out on the server, clear local state and stop refreshing.
    pub async fn sign_out(&self) -> StudioResult<()> {
        self.backend.sign_out().await?;
        *self.state.write().await = SessionState::default();
        self.cancel.cancel();
        tracing::info!("Signed out");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.authenticated
    }

    pub async fn organizations(&self) -> Vec<Organization> {
        self.state.read().await.organizations.clone()
    }

    pub async fn current_organization(&self) -> Option<Organization> {
        self.state.read().await.current_organization.clone()
    }

    /// Make another of the user's organizations current.
    pub async fn switch_organization(&self, organization_id: &str) -> StudioResult<Organization> {
        let mut state = self.state.write().await;
        let organization = state
            .organizations
            .iter()
            .find(|org| org.id == organization_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                entity: "Organization",
                id: organization_id.to_string(),
            })?;
        state.current_organization = Some(organization.clone());
        tracing::info!(organization_id, "Switched organization");
        Ok(organization)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
