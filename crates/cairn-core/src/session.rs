use chrono::{Duration, NaiveDate};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::ordering::{SortPolicy, project};
use crate::pipeline::{ConfirmOutcome, DEFAULT_UNDO_SECONDS, DeletionPipeline, DeletionState};
use crate::recycle_bin::{DEFAULT_RETENTION_DAYS, RecycleBin};
use crate::selection::Selection;
use crate::storage::{DELETED_TASKS_KEY, KeyValueStore, TASKS_KEY, load_list, save_list};
use crate::store::TaskStore;
use crate::task::{DeletedTask, Task, TaskId};
use crate::timer::Clock;
use crate::transcript::clean_transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub undo_window: Duration,
    pub retention: Duration,
    pub initial_policy: SortPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            undo_window: Duration::seconds(DEFAULT_UNDO_SECONDS),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            initial_policy: SortPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub active: usize,
    pub completed: usize,
    pub pending_undo: usize,
    pub undo_remaining: Option<Duration>,
    pub bin: usize,
    pub selection_active: bool,
    pub selected: usize,
    pub policy: SortPolicy,
}

impl Status {
    pub fn undo_notice(&self) -> Option<String> {
        (self.pending_undo > 0).then(|| format!("Deleted {} task(s).", self.pending_undo))
    }
}

/// Every piece of task-list state behind one handle: the active
/// collection, the deletion pipeline, the recycle bin, the selection, and
/// the display policy. Mutations persist the affected aggregate right
/// away; a failed save is logged and the in-memory change stands.
#[derive(Debug)]
pub struct Session<S, C> {
    storage: S,
    clock: C,
    store: TaskStore,
    bin: RecycleBin,
    pipeline: DeletionPipeline,
    selection: Selection,
    policy: SortPolicy,
}

impl<S: KeyValueStore, C: Clock> Session<S, C> {
    /// Loads both aggregates, dropping expired bin entries on the way in.
    #[instrument(skip_all)]
    pub fn open(storage: S, clock: C, settings: SessionSettings) -> Self {
        let tasks: Vec<Task> = load_list(&storage, TASKS_KEY);
        let deleted: Vec<DeletedTask> = load_list(&storage, DELETED_TASKS_KEY);

        let mut session = Self {
            store: TaskStore::from_tasks(tasks),
            bin: RecycleBin::from_entries(deleted, settings.retention),
            pipeline: DeletionPipeline::new(settings.undo_window),
            selection: Selection::new(),
            policy: settings.initial_policy,
            storage,
            clock,
        };

        let pruned = session.bin.prune_expired(session.clock.now());
        if pruned > 0 {
            session.persist_bin();
        }

        info!(
            tasks = session.store.len(),
            bin = session.bin.len(),
            policy = %session.policy,
            "session opened"
        );
        session
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.store.get(id)
    }

    /// The active collection in display order.
    pub fn visible(&self) -> Vec<&Task> {
        project(self.store.tasks(), self.policy)
    }

    pub fn policy(&self) -> SortPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SortPolicy) {
        debug!(from = %self.policy, to = %policy, "sort policy changed");
        self.policy = policy;
    }

    pub fn bin(&self) -> &RecycleBin {
        &self.bin
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn deletion_state(&self) -> DeletionState {
        self.pipeline.state(&self.store)
    }

    pub fn pending_undo(&self) -> Option<&[Task]> {
        self.store.pending()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Counts as of the clock's current instant. A batch whose window
    /// has closed but that `tick` has not yet filed is counted in the bin.
    pub fn status(&self) -> Status {
        let pending = self.store.pending().map_or(0, <[Task]>::len);
        let undo_remaining = self
            .pipeline
            .remaining(self.clock.now())
            .filter(|left| *left > Duration::zero());
        let (pending_undo, overdue) = match undo_remaining {
            Some(_) => (pending, 0),
            None => (0, pending),
        };
        Status {
            active: self.store.len(),
            completed: self.store.tasks().iter().filter(|t| t.completed).count(),
            pending_undo,
            undo_remaining,
            bin: self.bin.len() + overdue,
            selection_active: self.selection.is_active(),
            selected: self.selection.len(),
            policy: self.policy,
        }
    }

    #[instrument(skip(self, text))]
    pub fn add(&mut self, text: &str, due_date: Option<NaiveDate>) -> CoreResult<TaskId> {
        let bin = &self.bin;
        let id = self.store.add(text, due_date, |id| bin.contains(id))?;
        info!(%id, "task created");
        self.persist_tasks();
        Ok(id)
    }

    /// Adds a task from raw speech-to-text output.
    pub fn add_transcript(&mut self, raw: &str) -> CoreResult<TaskId> {
        self.add(&clean_transcript(raw), None)
    }

    pub fn set_completed(&mut self, id: TaskId, value: bool) {
        if self.store.set_completed(id, value) {
            self.persist_tasks();
        }
    }

    pub fn set_important(&mut self, id: TaskId, value: bool) {
        if self.store.set_important(id, value) {
            self.persist_tasks();
        }
    }

    pub fn toggle_completed(&mut self, id: TaskId) {
        if self.store.toggle_completed(id) {
            self.persist_tasks();
        }
    }

    pub fn toggle_important(&mut self, id: TaskId) {
        if self.store.toggle_important(id) {
            self.persist_tasks();
        }
    }

    pub fn set_notes(&mut self, id: TaskId, notes: &str) {
        if self.store.set_notes(id, notes) {
            self.persist_tasks();
        }
    }

    /// Rewrites the canonical order and switches to manual ordering.
    pub fn reorder(&mut self, moved: TaskId, target: TaskId) {
        if !self.store.reorder(moved, target) {
            return;
        }
        if self.policy != SortPolicy::Manual {
            self.set_policy(SortPolicy::Manual);
        }
        self.persist_tasks();
    }

    pub fn request_delete(&mut self, ids: Vec<TaskId>) {
        self.pipeline.request_delete(ids);
    }

    pub fn cancel_delete(&mut self) -> Option<Vec<TaskId>> {
        self.pipeline.cancel()
    }

    /// Answers the confirmation dialog with "delete".
    pub fn confirm_delete(&mut self) -> ConfirmOutcome {
        self.tick();
        let now = self.clock.now();
        let outcome = self.pipeline.confirm(&mut self.store, &mut self.bin, now);
        self.after_confirm(outcome);
        outcome
    }

    /// Confirms deletion of `ids` without a prior request.
    pub fn delete(&mut self, ids: &[TaskId]) -> ConfirmOutcome {
        self.tick();
        let now = self.clock.now();
        let outcome = self
            .pipeline
            .confirm_ids(ids, &mut self.store, &mut self.bin, now);
        self.after_confirm(outcome);
        outcome
    }

    fn after_confirm(&mut self, outcome: ConfirmOutcome) {
        if self.selection.is_active() {
            self.selection.clear();
        }
        if outcome.flushed > 0 {
            self.persist_bin();
        }
        if outcome.pending > 0 {
            self.persist_tasks();
        }
    }

    /// Brings back the pending batch. Once the window has closed this
    /// files the batch in the bin and returns zero, whether or not `tick`
    /// ran in between.
    pub fn undo(&mut self) -> usize {
        if self.tick() > 0 {
            return 0;
        }
        let now = self.clock.now();
        let restored = self.pipeline.undo(&mut self.store, &mut self.bin, now);
        if restored > 0 {
            self.persist_tasks();
        }
        restored
    }

    pub fn dismiss_undo(&mut self) -> usize {
        if self.tick() > 0 {
            return 0;
        }
        let now = self.clock.now();
        let finalized = self.pipeline.dismiss(&mut self.store, &mut self.bin, now);
        if finalized > 0 {
            self.persist_bin();
        }
        finalized
    }

    /// Gives the undo countdown a chance to fire. Call on every event
    /// loop turn.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let finalized = self.pipeline.tick(&mut self.store, &mut self.bin, now);
        if finalized > 0 {
            self.persist_bin();
        }
        finalized
    }

    /// Moves a bin entry back to the end of the active collection and
    /// returns the id it now has there. An id already in use is replaced
    /// with a fresh one.
    #[instrument(skip(self))]
    pub fn restore(&mut self, id: TaskId) -> Option<TaskId> {
        let Some(mut task) = self.bin.take(id) else {
            debug!(%id, "restore of unknown id ignored");
            return None;
        };

        if self.store.holds(task.id) {
            let mut fresh = Uuid::new_v4();
            while self.store.holds(fresh) || self.bin.contains(fresh) {
                fresh = Uuid::new_v4();
            }
            info!(old = %task.id, new = %fresh, "re-keyed restored task");
            task.id = fresh;
        }

        let restored = task.id;
        self.store.append_many(vec![task]);
        self.persist_tasks();
        self.persist_bin();
        Some(restored)
    }

    pub fn purge(&mut self, id: TaskId) -> bool {
        let purged = self.bin.purge(id);
        if purged {
            self.persist_bin();
        }
        purged
    }

    pub fn empty_bin(&mut self) -> usize {
        let emptied = self.bin.empty_all();
        if emptied > 0 {
            self.persist_bin();
        }
        emptied
    }

    pub fn enter_selection(&mut self, id: TaskId) {
        if self.store.contains(id) {
            self.selection.enter_with_seed(id);
        }
    }

    /// Ids outside the active collection can be deselected but never
    /// added.
    pub fn toggle_selection(&mut self, id: TaskId) {
        if !self.store.contains(id) && !self.selection.contains(id) {
            debug!(%id, "toggle of inactive id ignored");
            return;
        }
        self.selection.toggle(id);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn bulk_mark_complete(&mut self) -> usize {
        self.bulk_apply(|store, id| store.set_completed(id, true))
    }

    pub fn bulk_mark_important(&mut self) -> usize {
        self.bulk_apply(|store, id| store.set_important(id, true))
    }

    fn bulk_apply(&mut self, apply: impl Fn(&mut TaskStore, TaskId) -> bool) -> usize {
        let store = &self.store;
        self.selection.retain_existing(|id| store.contains(id));
        let ids = self.selection.ids();
        let changed = ids.iter().filter(|id| apply(&mut self.store, **id)).count();
        self.selection.clear();
        if changed > 0 {
            self.persist_tasks();
        }
        changed
    }

    /// Routes the selection through the confirmation dialog so the
    /// removal stays undoable. The selection clears on confirm.
    pub fn bulk_delete(&mut self) {
        let ids = self.selection.ids();
        if ids.is_empty() {
            return;
        }
        self.pipeline.request_delete(ids);
    }

    /// Flushes any batch still waiting on undo. Call before exit.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) -> usize {
        let now = self.clock.now();
        self.pipeline.cancel();
        let finalized = self.pipeline.finalize(&mut self.store, &mut self.bin, now);
        if finalized > 0 {
            self.persist_bin();
        }
        info!(finalized, "session shut down");
        finalized
    }

    fn persist_tasks(&mut self) {
        if let Err(err) = save_list(&mut self.storage, TASKS_KEY, self.store.tasks()) {
            error!(error = %format!("{err:#}"), "failed to persist tasks");
        }
    }

    fn persist_bin(&mut self) {
        self.bin.prune_expired(self.clock.now());
        let entries = self.bin.list();
        if let Err(err) = save_list(&mut self.storage, DELETED_TASKS_KEY, &entries) {
            error!(error = %format!("{err:#}"), "failed to persist recycle bin");
        }
    }
}
