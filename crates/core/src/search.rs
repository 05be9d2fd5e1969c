//! Library search request/response model and result bookkeeping.
//!
//! The I/O side (cancellation, retries) lives in `shotcraft-client`. This
//! module owns the rule that only the latest issued search may update what
//! is displayed: every search gets a [`SearchTicket`], and
//! [`SearchState::apply`] refuses any ticket that has been superseded.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Pagination defaults
// ---------------------------------------------------------------------------

/// First page number (1-based).
pub const DEFAULT_PAGE: u32 = 1;

/// Default number of results per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum number of results per page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Attempts made for one search before giving up.
pub const MAX_SEARCH_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// Body of `POST /{organization_id}/image/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Hex colour codes.
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    /// Face ids.
    #[serde(default)]
    pub faces: Vec<String>,
    /// Product ids.
    #[serde(default)]
    pub products: Vec<String>,
    #[validate(range(min = 1))]
    pub page: u32,
    #[validate(range(min = 1, max = 100))]
    pub page_size: u32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            dominant_colors: Vec::new(),
            faces: Vec::new(),
            products: Vec::new(),
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchRequest {
    /// Free-text search on the first page.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            text: (!text.trim().is_empty()).then_some(text),
            ..Self::default()
        }
    }

    pub fn with_colors(mut self, colors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dominant_colors = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_faces(mut self, faces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.faces = faces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_products(mut self, products: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        Validate::validate(self).map_err(|e| {
            CoreError::Validation(format!(
                "page must be >= 1 and page_size within 1..={MAX_PAGE_SIZE}: {e}"
            ))
        })
    }
}

/// Pixel dimensions of a library image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryImage {
    #[serde(alias = "_id")]
    pub id: EntityId,
    /// `generated` or `uploaded`.
    pub creation_method: String,
    pub url: String,
    pub dimensions: Dimensions,
    /// DPI.
    pub resolution: u32,
    pub format: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Body returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub images: Vec<LibraryImage>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl SearchResponse {
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }
}

// ---------------------------------------------------------------------------
// Result bookkeeping
// ---------------------------------------------------------------------------

/// Identifies one issued search. Only the newest ticket may apply results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchTicket(u64);

/// What the search page displays.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    latest: u64,
    loading: bool,
    results: Option<SearchResponse>,
    error: Option<String>,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one.
    pub fn begin(&mut self) -> SearchTicket {
        self.latest += 1;
        self.loading = true;
        self.error = None;
        SearchTicket(self.latest)
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        ticket.0 == self.latest
    }

    /// Store results for `ticket`. Returns false (and changes nothing) when
    /// the ticket has been superseded.
    pub fn apply(&mut self, ticket: SearchTicket, response: SearchResponse) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        self.error = None;
        self.results = Some(response);
        true
    }

    /// Record a failure for `ticket`, with the same supersession rule.
    pub fn fail(&mut self, ticket: SearchTicket, message: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        self.error = Some(message.into());
        true
    }

    /// Stop loading for `ticket` without touching results (cancelled).
    pub fn settle(&mut self, ticket: SearchTicket) {
        if self.is_current(ticket) {
            self.loading = false;
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn results(&self) -> Option<&SearchResponse> {
        self.results.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
