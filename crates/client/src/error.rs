use shotcraft_core::error::CoreError;
use shotcraft_core::generation::JobStatus;
use shotcraft_core::types::EntityId;

use crate::api::ApiError;

/// Errors surfaced by the studio client: workspace sessions, pollers,
/// search and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// The backend request failed or returned an unexpected body.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The job never reached a terminal status within the attempt budget.
    #[error("Generation job {job_id} did not finish after {attempts} polls")]
    PollTimeout { job_id: EntityId, attempts: u32 },

    /// Rejected locally before any request was sent.
    #[error("{0}")]
    UserInput(String),

    /// The job reached a terminal failure status.
    #[error("Generation job {job_id} ended with status {status}")]
    JobFailed { job_id: EntityId, status: JobStatus },

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for StudioError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => Self::UserInput(message),
            other => Self::Core(other),
        }
    }
}

impl StudioError {
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::UserInput(_))
    }

    /// Transport-level failure (network or non-2xx).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_transport())
    }
}

pub type StudioResult<T> = Result<T, StudioError>;
