//! In-memory reconciliation of image groups streamed from generation jobs.
//!
//! [`ImageGroupList`] is the authoritative ordered list a product page shows:
//! placeholder groups first (newest batch first), then real groups newest
//! first. Real groups are keyed by id in an [`IndexMap`] so merging an update
//! is a hash lookup and never produces duplicates, no matter how many poll
//! sequences interleave.
//!
//! Placeholders are tracked per submission ([`PlaceholderBatch`]). Each real
//! group that arrives for a batch consumes one of its placeholders;
//! [`ImageGroupList::finalize`] drops whatever the batch has left.

use std::collections::VecDeque;

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::generation::ImageGroup;
use crate::types::{EntityId, Timestamp};

/// Ticket for the placeholders created by one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderBatch(u64);

#[derive(Debug, Clone)]
struct PendingBatch {
    batch: PlaceholderBatch,
    groups: Vec<ImageGroup>,
}

/// Outcome of a [`ImageGroupList::merge`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Groups seen for the first time (inserted at the front).
    pub inserted: usize,
    /// Groups that replaced an existing entry in place.
    pub replaced: usize,
    /// Placeholders consumed by newly inserted groups.
    pub placeholders_consumed: usize,
}

/// Ordered, id-keyed list of image groups plus outstanding placeholders.
#[derive(Debug, Clone, Default)]
pub struct ImageGroupList {
    /// Front is the most recent batch.
    placeholders: VecDeque<PendingBatch>,
    /// Insertion order, oldest first. Displayed in reverse.
    groups: IndexMap<EntityId, ImageGroup>,
    next_batch: u64,
}

impl ImageGroupList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from groups given in display order (first shown first).
    pub fn from_display_order(groups: impl IntoIterator<Item = ImageGroup>) -> Self {
        let mut list = Self::new();
        list.replace_all(groups);
        list
    }

    /// Replace every real group, keeping outstanding placeholders.
    ///
    /// `groups` is in display order. Duplicate ids collapse into one entry.
    pub fn replace_all(&mut self, groups: impl IntoIterator<Item = ImageGroup>) {
        let incoming: Vec<ImageGroup> = groups
            .into_iter()
            .filter(|group| !group.is_placeholder())
            .collect();
        self.groups.clear();
        for group in incoming.into_iter().rev() {
            match self.groups.get_mut(&group.id) {
                Some(existing) => *existing = group,
                None => {
                    self.groups.insert(group.id.clone(), group);
                }
            }
        }
    }

    // -- Placeholders --

    /// Prepend `count` placeholder groups for immediate feedback.
    pub fn add_placeholders(&mut self, count: usize, now: Timestamp) -> PlaceholderBatch {
        let batch = PlaceholderBatch(self.next_batch);
        self.next_batch += 1;
        self.placeholders.push_front(PendingBatch {
            batch,
            groups: (0..count).map(|_| ImageGroup::placeholder(now)).collect(),
        });
        batch
    }

    /// Total placeholders across all outstanding batches.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.iter().map(|pending| pending.groups.len()).sum()
    }

    /// Placeholders still held by one batch.
    pub fn placeholders_for(&self, batch: PlaceholderBatch) -> usize {
        self.placeholders
            .iter()
            .find(|pending| pending.batch == batch)
            .map_or(0, |pending| pending.groups.len())
    }

    /// Drop the remaining placeholders of a batch. Returns how many were
    /// removed. Other batches are left alone.
    pub fn finalize(&mut self, batch: PlaceholderBatch) -> usize {
        match self
            .placeholders
            .iter()
            .position(|pending| pending.batch == batch)
        {
            Some(index) => self
                .placeholders
                .remove(index)
                .map_or(0, |pending| pending.groups.len()),
            None => 0,
        }
    }

    fn consume_placeholder(&mut self, batch: PlaceholderBatch) -> bool {
        let Some(index) = self
            .placeholders
            .iter()
            .position(|pending| pending.batch == batch)
        else {
            return false;
        };
        let pending = &mut self.placeholders[index];
        let consumed = pending.groups.pop().is_some();
        if pending.groups.is_empty() {
            self.placeholders.remove(index);
        }
        consumed
    }

    // -- Merging --

    /// Merge group updates from a poll snapshot.
    ///
    /// Known ids are replaced in place. Unknown ids are inserted at the
    /// front, each consuming one placeholder of `batch` when one is given.
    /// Placeholder groups in `groups` are ignored.
    pub fn merge(
        &mut self,
        batch: Option<PlaceholderBatch>,
        groups: impl IntoIterator<Item = ImageGroup>,
    ) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for group in groups {
            if group.is_placeholder() {
                continue;
            }
            if let Some(existing) = self.groups.get_mut(&group.id) {
                *existing = group;
                summary.replaced += 1;
                continue;
            }
            self.groups.insert(group.id.clone(), group);
            summary.inserted += 1;
            if let Some(batch) = batch {
                if self.consume_placeholder(batch) {
                    summary.placeholders_consumed += 1;
                }
            }
        }
        summary
    }

    /// Replace a group only if it is already present.
    pub fn replace_existing(&mut self, group: &ImageGroup) -> bool {
        match self.groups.get_mut(&group.id) {
            Some(existing) => {
                *existing = group.clone();
                true
            }
            None => false,
        }
    }

    /// Purge a group, preserving the order of the rest.
    pub fn remove(&mut self, group_id: &str) -> Option<ImageGroup> {
        self.groups.shift_remove(group_id)
    }

    /// Pin a version as the group's default.
    pub fn set_default(&mut self, group_id: &str, image_id: &str) -> Result<(), CoreError> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "ImageGroup",
                id: group_id.to_string(),
            })?;
        if group.image(image_id).is_none() {
            return Err(CoreError::Validation(format!(
                "Image {image_id} does not belong to group {group_id}"
            )));
        }
        group.default_image_id = Some(image_id.to_string());
        Ok(())
    }

    // -- Queries --

    pub fn get(&self, group_id: &str) -> Option<&ImageGroup> {
        self.groups.get(group_id)
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Number of real (non-placeholder) groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.placeholders.is_empty()
    }

    /// Real groups, newest first.
    pub fn groups(&self) -> impl Iterator<Item = &ImageGroup> {
        self.groups.values().rev()
    }

    /// Everything on screen: placeholders, then real groups newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ImageGroup> {
        self.placeholders
            .iter()
            .flat_map(|pending| pending.groups.iter())
            .chain(self.groups.values().rev())
    }

    /// Display-order snapshot.
    pub fn to_vec(&self) -> Vec<ImageGroup> {
        self.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Product gallery
// ---------------------------------------------------------------------------

/// The two lists a product page keeps: groups generated in this session and
/// the product's recent groups loaded from the server.
#[derive(Debug, Clone, Default)]
pub struct ProductGallery {
    pub generated: ImageGroupList,
    pub recent: ImageGroupList,
}

impl ProductGallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a group in either list, session list first.
    pub fn find(&self, group_id: &str) -> Option<&ImageGroup> {
        self.generated
            .get(group_id)
            .or_else(|| self.recent.get(group_id))
    }

    /// Purge a group from both lists. Returns true if it was present anywhere.
    pub fn remove_group(&mut self, group_id: &str) -> bool {
        let from_generated = self.generated.remove(group_id).is_some();
        let from_recent = self.recent.remove(group_id).is_some();
        from_generated || from_recent
    }

    /// Apply a refined group wherever it lives; unknown groups land at the
    /// front of the session list.
    pub fn apply_refined(&mut self, group: ImageGroup) {
        let in_recent = self.recent.replace_existing(&group);
        if in_recent && !self.generated.contains(&group.id) {
            return;
        }
        self.generated.merge(None, [group]);
    }

    /// Pin a default in every list holding the group.
    pub fn set_default(&mut self, group_id: &str, image_id: &str) -> Result<(), CoreError> {
        let group = self.find(group_id).ok_or_else(|| CoreError::NotFound {
            entity: "ImageGroup",
            id: group_id.to_string(),
        })?;
        if group.image(image_id).is_none() {
            return Err(CoreError::Validation(format!(
                "Image {image_id} does not belong to group {group_id}"
            )));
        }
        if self.generated.contains(group_id) {
            self.generated.set_default(group_id, image_id)?;
        }
        if self.recent.contains(group_id) {
            self.recent.set_default(group_id, image_id)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
