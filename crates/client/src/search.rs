//! Cancellable, retried library search.
//!
//! Issuing a search cancels the one before it. Each search carries a
//! [`SearchTicket`]; results are stored through [`SearchState::apply`],
//! which refuses superseded tickets, so a slow response that slips past
//! cancellation still cannot overwrite newer results.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use shotcraft_core::search::{SearchRequest, SearchResponse, SearchState, MAX_SEARCH_ATTEMPTS};

use crate::backend::SharedBackend;
use crate::error::{StudioError, StudioResult};

/// Delay before the first retry; doubles on each further retry.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

struct Inner {
    state: SearchState,
    in_flight: Option<CancellationToken>,
}

pub struct SearchController {
    backend: SharedBackend,
    max_attempts: u32,
    retry_delay: Duration,
    inner: Mutex<Inner>,
}

impl SearchController {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            max_attempts: MAX_SEARCH_ATTEMPTS,
            retry_delay: RETRY_BASE_DELAY,
            inner: Mutex::new(Inner {
                state: SearchState::new(),
                in_flight: None,
            }),
        }
    }

    /// Attempts per search, first try included. Values below 1 become 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run a search, superseding any search still in flight.
    ///
    /// Returns `Ok(None)` when this search was itself superseded or
    /// cancelled before its results could be applied.
    pub async fn search(
        &self,
        organization_id: &str,
        request: SearchRequest,
    ) -> StudioResult<Option<SearchResponse>> {
        request.ensure_valid()?;

        let token = CancellationToken::new();
        let ticket = {
            let mut inner = self.inner.lock().await;
            if let Some(previous) = inner.in_flight.replace(token.clone()) {
                previous.cancel();
            }
            inner.state.begin()
        };

        let result = self.fetch(&token, organization_id, &request).await;

        let mut inner = self.inner.lock().await;
        if inner.state.is_current(ticket) {
            inner.in_flight = None;
        }
        match result {
            Ok(response) => {
                if inner.state.apply(ticket, response.clone()) {
                    tracing::debug!(
                        organization_id,
                        total = response.total,
                        page = response.page,
                        "Search results applied",
                    );
                    Ok(Some(response))
                } else {
                    tracing::debug!(organization_id, "Discarding superseded search results");
                    Ok(None)
                }
            }
            Err(StudioError::Cancelled) => {
                inner.state.settle(ticket);
                Ok(None)
            }
            Err(e) => {
                if inner.state.fail(ticket, e.to_string()) {
                    Err(e)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Cancel the search in flight, if any.
    pub async fn cancel(&self) {
        if let Some(token) = self.inner.lock().await.in_flight.take() {
            token.cancel();
        }
    }

    /// Snapshot of what the search page displays.
    pub async fn state(&self) -> SearchState {
        self.inner.lock().await.state.clone()
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        organization_id: &str,
        request: &SearchRequest,
    ) -> StudioResult<SearchResponse> {
        let mut delay = self.retry_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(StudioError::Cancelled),
                result = self.backend.search_images(organization_id, request) => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        organization_id,
                        attempt,
                        error = %e,
                        "Search attempt {attempt} failed, retrying",
                    );
                }
                Err(e) => {
                    tracing::warn!(organization_id, attempt, error = %e, "Search failed");
                    return Err(e.into());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(StudioError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay *= 2;
        }
    }
}
