//! Which version of an [`ImageGroup`] is "current".
//!
//! Priority:
//! 1. The pinned default, if it resolves to a generated image with a URL.
//! 2. The most recently created generated image (ties go to the later one in
//!    the list).
//! 3. Nothing; the group renders as pending or failed.

use crate::generation::{GeneratedImage, ImageGroup, ImageStatus};

/// The pinned default image, if it is displayable.
pub fn default_image(group: &ImageGroup) -> Option<&GeneratedImage> {
    let default_id = group.default_image_id.as_deref()?;
    group
        .images
        .iter()
        .find(|image| image.id == default_id && image.is_displayable())
}

/// The newest `generated` image by creation time.
pub fn latest_generated(group: &ImageGroup) -> Option<&GeneratedImage> {
    latest_generated_index(group).map(|index| &group.images[index])
}

fn latest_generated_index(group: &ImageGroup) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, image) in group.images.iter().enumerate() {
        if image.status != ImageStatus::Generated {
            continue;
        }
        match best {
            Some(current) if group.images[current].created_at > image.created_at => {}
            _ => best = Some(index),
        }
    }
    best
}

/// The image shown for this group in compact and full-screen views.
pub fn current_image(group: &ImageGroup) -> Option<&GeneratedImage> {
    default_image(group).or_else(|| latest_generated(group))
}

/// Index of [`current_image`] in the version history.
///
/// Falls back to the newest version when nothing is selectable, which is
/// where the full-screen viewer opens.
pub fn current_version_index(group: &ImageGroup) -> usize {
    let default_index = default_image(group).and_then(|image| group.image_index(&image.id));
    default_index
        .or_else(|| latest_generated_index(group))
        .unwrap_or_else(|| group.images.len().saturating_sub(1))
}

// ---------------------------------------------------------------------------
// Full-screen version viewer
// ---------------------------------------------------------------------------

/// State of the full-screen viewer: which group is open and which version
/// of it is on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionViewer {
    group: ImageGroup,
    index: usize,
}

impl VersionViewer {
    /// Open a group on its current version.
    pub fn open(group: ImageGroup) -> Self {
        let index = current_version_index(&group);
        Self { group, index }
    }

    pub fn group(&self) -> &ImageGroup {
        &self.group
    }

    pub fn group_id(&self) -> &str {
        &self.group.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn version_count(&self) -> usize {
        self.group.images.len()
    }

    /// The version currently on screen.
    pub fn image(&self) -> Option<&GeneratedImage> {
        self.group.images.get(self.index)
    }

    /// Jump to a version; out-of-range indices are clamped.
    pub fn select(&mut self, index: usize) {
        self.index = index.min(self.version_count().saturating_sub(1));
    }

    pub fn next(&mut self) {
        self.select(self.index + 1);
    }

    pub fn prev(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Refresh the open group after a background update without moving the
    /// slider (clamped if history shrank).
    pub fn on_updated(&mut self, group: &ImageGroup) {
        if group.id != self.group.id {
            return;
        }
        self.group = group.clone();
        self.select(self.index);
    }

    /// A refinement appended a version: show it.
    pub fn on_refined(&mut self, group: &ImageGroup) {
        if group.id != self.group.id {
            return;
        }
        self.group = group.clone();
        self.index = self.version_count().saturating_sub(1);
    }

    /// Record a new default locally (after the server accepted it).
    pub fn on_default_changed(&mut self, image_id: &str) {
        self.group.default_image_id = Some(image_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn image(id: &str, status: ImageStatus, at: i64) -> GeneratedImage {
        GeneratedImage {
            id: id.into(),
            url: (status == ImageStatus::Generated).then(|| format!("https://cdn/{id}.png")),
            status,
            created_at: ts(at),
        }
    }

    /// `[v0(generated, t=1), v1(generated, t=3), v2(failed)]`
    fn three_versions(default: Option<&str>) -> ImageGroup {
        ImageGroup {
            id: "g1".into(),
            created_at: ts(0),
            updated_at: ts(5),
            default_image_id: default.map(str::to_string),
            images: vec![
                image("v0", ImageStatus::Generated, 1),
                image("v1", ImageStatus::Generated, 3),
                image("v2", ImageStatus::Failed, 5),
            ],
        }
    }

    // -- Selection --

    #[test]
    fn default_wins_when_displayable() {
        let group = three_versions(Some("v1"));
        assert_eq!(current_image(&group).unwrap().id, "v1");
    }

    #[test]
    fn pinned_older_version_overrides_recency() {
        let group = three_versions(Some("v0"));
        assert_eq!(current_image(&group).unwrap().id, "v0");
        assert_eq!(current_version_index(&group), 0);
    }

    #[test]
    fn latest_generated_without_default() {
        let group = three_versions(None);
        assert_eq!(current_image(&group).unwrap().id, "v1");
        assert_eq!(current_version_index(&group), 1);
    }

    #[test]
    fn failed_default_falls_back_to_latest() {
        let group = three_versions(Some("v2"));
        assert!(default_image(&group).is_none());
        assert_eq!(current_image(&group).unwrap().id, "v1");
    }

    #[test]
    fn default_without_url_is_ignored() {
        let mut group = three_versions(Some("v0"));
        group.images[0].url = None;
        assert_eq!(current_image(&group).unwrap().id, "v1");
    }

    #[test]
    fn recency_uses_timestamps_not_position() {
        let mut group = three_versions(None);
        group.images.swap(0, 1);
        assert_eq!(current_image(&group).unwrap().id, "v1");
        assert_eq!(current_version_index(&group), 0);
    }

    #[test]
    fn timestamp_ties_go_to_later_entry() {
        let mut group = three_versions(None);
        group.images[0].created_at = ts(3);
        assert_eq!(current_image(&group).unwrap().id, "v1");
    }

    #[test]
    fn no_generated_image_means_no_current() {
        let mut group = three_versions(None);
        for version in &mut group.images {
            version.status = ImageStatus::Pending;
            version.url = None;
        }
        assert!(current_image(&group).is_none());
        assert_eq!(current_version_index(&group), 2);
    }

    // -- Viewer --

    #[test]
    fn viewer_opens_on_current_version() {
        let viewer = VersionViewer::open(three_versions(Some("v0")));
        assert_eq!(viewer.index(), 0);
        assert_eq!(viewer.image().unwrap().id, "v0");
    }

    #[test]
    fn viewer_navigation_is_clamped() {
        let mut viewer = VersionViewer::open(three_versions(None));
        viewer.next();
        viewer.next();
        assert_eq!(viewer.index(), 2);
        viewer.select(10);
        assert_eq!(viewer.index(), 2);
        viewer.prev();
        viewer.prev();
        viewer.prev();
        assert_eq!(viewer.index(), 0);
    }

    #[test]
    fn refinement_advances_open_viewer() {
        let mut viewer = VersionViewer::open(three_versions(None));
        let mut refined = three_versions(None);
        refined.images.push(image("v3", ImageStatus::Generated, 7));

        viewer.on_refined(&refined);

        assert_eq!(viewer.version_count(), 4);
        assert_eq!(viewer.index(), 3);
        assert_eq!(viewer.image().unwrap().id, "v3");
    }

    #[test]
    fn refinement_of_other_group_is_ignored() {
        let mut viewer = VersionViewer::open(three_versions(None));
        let mut other = three_versions(None);
        other.id = "g2".into();
        other.images.push(image("x", ImageStatus::Generated, 9));

        viewer.on_refined(&other);

        assert_eq!(viewer.version_count(), 3);
        assert_eq!(viewer.index(), 1);
    }
}
