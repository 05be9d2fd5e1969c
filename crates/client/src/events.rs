//! Events emitted by a [`ProductSession`](crate::studio::ProductSession).
//!
//! Front ends subscribe to these to re-render the gallery instead of
//! re-reading the whole state after every poll.

use serde::Serialize;
use shotcraft_core::generation::{ImageGroup, JobStatus};
use shotcraft_core::types::EntityId;

/// Broadcast channel capacity for session events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    /// A job was accepted and placeholders are on screen.
    JobSubmitted { job_id: EntityId, placeholders: usize },

    /// Groups from a poll snapshot were merged.
    GroupsUpdated {
        job_id: EntityId,
        groups: Vec<ImageGroup>,
    },

    /// A job reached a terminal status.
    JobFinished { job_id: EntityId, status: JobStatus },

    /// Polling stopped without a terminal status (timeout, transport
    /// error or cancellation).
    JobAbandoned { job_id: EntityId, reason: String },

    /// A refinement appended a version to a group.
    GroupRefined { group: ImageGroup },

    DefaultImageChanged {
        group_id: EntityId,
        image_id: EntityId,
    },

    GroupDeleted { group_id: EntityId },
}
