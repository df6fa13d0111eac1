use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::{
  debug,
  info,
  instrument
};

use crate::task::{
  DeletedTask,
  Task,
  TaskId
};

pub const DEFAULT_RETENTION_DAYS: i64 =
  30;

/// Finalized deletions keyed by id.
/// Entries expire once their
/// `deleted_at` falls at or behind the
/// retention horizon.
#[derive(Debug, Clone)]
pub struct RecycleBin {
  entries:   BTreeMap<TaskId, DeletedTask>,
  retention: Duration
}

impl Default for RecycleBin {
  fn default() -> Self {
    Self::new(Duration::days(
      DEFAULT_RETENTION_DAYS
    ))
  }
}

impl RecycleBin {
  pub fn new(
    retention: Duration
  ) -> Self {
    Self {
      entries: BTreeMap::new(),
      retention
    }
  }

  pub fn from_entries(
    entries: Vec<DeletedTask>,
    retention: Duration
  ) -> Self {
    let mut bin = Self::new(retention);
    for entry in entries {
      bin
        .entries
        .insert(entry.id(), entry);
    }
    bin
  }

  pub fn retention(&self) -> Duration {
    self.retention
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(
    &self,
    id: TaskId
  ) -> bool {
    self.entries.contains_key(&id)
  }

  pub fn get(
    &self,
    id: TaskId
  ) -> Option<&DeletedTask> {
    self.entries.get(&id)
  }

  /// Newest deletion first.
  pub fn list(
    &self
  ) -> Vec<&DeletedTask> {
    let mut out: Vec<&DeletedTask> =
      self.entries.values().collect();
    out.sort_by(|a, b| {
      b.deleted_at.cmp(&a.deleted_at)
    });
    out
  }

  /// Stamps every task with
  /// `deleted_at` and files it.
  #[instrument(skip(self, tasks), fields(count = tasks.len()))]
  pub fn finalize(
    &mut self,
    tasks: Vec<Task>,
    deleted_at: DateTime<Utc>
  ) -> usize {
    let count = tasks.len();
    for task in tasks {
      self.entries.insert(
        task.id,
        DeletedTask::new(
          task, deleted_at
        )
      );
    }
    info!(
      count,
      total = self.entries.len(),
      "moved tasks into recycle bin"
    );
    count
  }

  /// Removes an entry and hands back
  /// the task without its deletion
  /// stamp.
  pub fn take(
    &mut self,
    id: TaskId
  ) -> Option<Task> {
    self
      .entries
      .remove(&id)
      .map(DeletedTask::into_task)
  }

  pub fn purge(
    &mut self,
    id: TaskId
  ) -> bool {
    let removed =
      self.entries.remove(&id).is_some();
    if !removed {
      debug!(%id, "purge of unknown id ignored");
    }
    removed
  }

  pub fn empty_all(&mut self) -> usize {
    let count = self.entries.len();
    self.entries.clear();
    count
  }

  #[instrument(skip(self))]
  pub fn prune_expired(
    &mut self,
    now: DateTime<Utc>
  ) -> usize {
    let Some(horizon) = now
      .checked_sub_signed(self.retention)
    else {
      debug!(
        "retention reaches past the \
         earliest date; nothing expires"
      );
      return 0;
    };
    let before = self.entries.len();
    self.entries.retain(|_, entry| {
      entry.deleted_at > horizon
    });
    let pruned =
      before - self.entries.len();
    if pruned > 0 {
      info!(
        pruned,
        remaining = self.entries.len(),
        "pruned expired recycle bin entries"
      );
    }
    pruned
  }
}
