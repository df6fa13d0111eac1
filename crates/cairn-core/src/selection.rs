use std::collections::BTreeSet;

use tracing::debug;

use crate::task::TaskId;

/// Multi-select state for bulk actions. The set is only meaningful while
/// `active`; it never outlives the mode.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    active: bool,
    ids: BTreeSet<TaskId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.ids.iter().copied().collect()
    }

    /// Long-press entry: selection mode with exactly `id` selected.
    pub fn enter_with_seed(&mut self, id: TaskId) {
        self.ids.clear();
        self.ids.insert(id);
        self.active = true;
        debug!(%id, "entered selection mode");
    }

    pub fn toggle(&mut self, id: TaskId) {
        if !self.active {
            debug!(%id, "toggle outside selection mode ignored");
            return;
        }
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
        if self.ids.is_empty() {
            self.active = false;
            debug!("selection emptied; leaving selection mode");
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.active = false;
    }

    /// Drops ids that no longer name an active task.
    pub fn retain_existing(&mut self, exists: impl Fn(TaskId) -> bool) {
        if !self.active {
            return;
        }
        self.ids.retain(|id| exists(*id));
        if self.ids.is_empty() {
            self.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Selection;

    #[test]
    fn seed_then_toggle_same_id_deactivates() {
        let t1 = Uuid::new_v4();
        let mut selection = Selection::new();
        selection.enter_with_seed(t1);
        assert!(selection.is_active());
        assert!(selection.contains(t1));

        selection.toggle(t1);
        assert!(!selection.is_active());
        assert!(selection.is_empty());
    }

    #[test]
    fn toggle_is_ignored_when_inactive() {
        let mut selection = Selection::new();
        selection.toggle(Uuid::new_v4());
        assert!(!selection.is_active());
        assert!(selection.is_empty());
    }

    #[test]
    fn toggle_flips_membership() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut selection = Selection::new();
        selection.enter_with_seed(a);
        selection.toggle(b);
        assert_eq!(selection.len(), 2);
        selection.toggle(a);
        assert_eq!(selection.ids(), vec![b]);
        assert!(selection.is_active());
    }

    #[test]
    fn seed_replaces_previous_selection() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut selection = Selection::new();
        selection.enter_with_seed(a);
        selection.enter_with_seed(b);
        assert_eq!(selection.ids(), vec![b]);
    }

    #[test]
    fn retain_existing_prunes_and_deactivates() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut selection = Selection::new();
        selection.enter_with_seed(a);
        selection.toggle(b);

        selection.retain_existing(|id| id == b);
        assert_eq!(selection.ids(), vec![b]);

        selection.retain_existing(|_| false);
        assert!(!selection.is_active());
    }

    #[test]
    fn clear_is_unconditional() {
        let mut selection = Selection::new();
        selection.clear();
        selection.enter_with_seed(Uuid::new_v4());
        selection.clear();
        assert_eq!(selection, Selection::new());
    }
}
