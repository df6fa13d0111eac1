use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::task::{Task, TaskId};

/// Canonical active collection plus the single pending-undo batch.
///
/// Mutations on ids that are not present are no-ops and report `false`;
/// a task can disappear between a user intent and its delivery.
#[derive(Debug, Default, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
    pending: Option<Vec<Task>>,
}

/// Trims task text and rejects what is left empty.
pub fn validate_text(text: &str) -> CoreResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation);
    }
    Ok(trimmed.to_string())
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from persisted tasks, dropping later duplicates of
    /// an id already seen.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut seen = HashSet::with_capacity(tasks.len());
        let before = tasks.len();
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|task| seen.insert(task.id))
            .collect();
        if tasks.len() != before {
            warn!(
                before,
                after = tasks.len(),
                "dropped tasks with duplicate ids"
            );
        }
        Self {
            tasks,
            pending: None,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// True when `id` is active or parked in the pending batch.
    pub fn holds(&self, id: TaskId) -> bool {
        self.contains(id)
            || self
                .pending
                .as_ref()
                .is_some_and(|batch| batch.iter().any(|task| task.id == id))
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Appends a new task. `reserved` reports ids in use elsewhere (the
    /// recycle bin) so a fresh id never collides with them.
    #[instrument(skip(self, text, reserved))]
    pub fn add(
        &mut self,
        text: &str,
        due_date: Option<NaiveDate>,
        reserved: impl Fn(TaskId) -> bool,
    ) -> CoreResult<TaskId> {
        let text = validate_text(text)?;

        let mut id = Uuid::new_v4();
        while self.holds(id) || reserved(id) {
            debug!(%id, "regenerating colliding id");
            id = Uuid::new_v4();
        }

        self.tasks.push(Task::new(id, text, due_date));
        debug!(%id, count = self.tasks.len(), "task added");
        Ok(id)
    }

    pub fn set_completed(&mut self, id: TaskId, value: bool) -> bool {
        self.update(id, |task| {
            let changed = task.completed != value;
            task.completed = value;
            changed
        })
    }

    pub fn set_important(&mut self, id: TaskId, value: bool) -> bool {
        self.update(id, |task| {
            let changed = task.is_important != value;
            task.is_important = value;
            changed
        })
    }

    pub fn toggle_completed(&mut self, id: TaskId) -> bool {
        self.update(id, |task| {
            task.completed = !task.completed;
            true
        })
    }

    pub fn toggle_important(&mut self, id: TaskId) -> bool {
        self.update(id, |task| {
            task.is_important = !task.is_important;
            true
        })
    }

    /// Notes are stored verbatim, whitespace included.
    pub fn set_notes(&mut self, id: TaskId, notes: &str) -> bool {
        self.update(id, |task| {
            let changed = task.notes != notes;
            task.notes = notes.to_string();
            changed
        })
    }

    fn update(&mut self, id: TaskId, apply: impl FnOnce(&mut Task) -> bool) -> bool {
        match self.get_mut(id) {
            Some(task) => apply(task),
            None => {
                debug!(%id, "task not found; ignoring update");
                false
            }
        }
    }

    /// Moves `moved` into the slot `target` occupied. Missing ids or
    /// `moved == target` leave the collection alone.
    #[instrument(skip(self))]
    pub fn reorder(&mut self, moved: TaskId, target: TaskId) -> bool {
        if moved == target {
            return false;
        }
        let (Some(from), Some(to)) = (self.position(moved), self.position(target)) else {
            debug!("reorder endpoint missing; ignoring");
            return false;
        };

        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        true
    }

    /// Removes every task whose id is listed, returning them in their
    /// original relative order.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub fn remove_many(&mut self, ids: &[TaskId]) -> Vec<Task> {
        let wanted: HashSet<TaskId> = ids.iter().copied().collect();
        let (removed, kept): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| wanted.contains(&task.id));
        self.tasks = kept;
        debug!(removed = removed.len(), "removed tasks");
        removed
    }

    /// Re-inserts tasks at the end of the collection. Ids already active
    /// are skipped.
    pub fn append_many(&mut self, tasks: Vec<Task>) -> usize {
        let mut appended = 0;
        for task in tasks {
            if self.contains(task.id) {
                warn!(id = %task.id, "task already active; not appending");
                continue;
            }
            self.tasks.push(task);
            appended += 1;
        }
        appended
    }

    pub fn pending(&self) -> Option<&[Task]> {
        self.pending.as_deref()
    }

    /// Parks a batch awaiting undo. Returns the batch it displaced, which
    /// callers must have finalized already.
    pub fn stash_pending(&mut self, batch: Vec<Task>) -> Option<Vec<Task>> {
        self.pending.replace(batch)
    }

    pub fn take_pending(&mut self) -> Option<Vec<Task>> {
        self.pending.take()
    }
}
