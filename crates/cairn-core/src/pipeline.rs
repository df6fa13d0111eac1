use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::recycle_bin::RecycleBin;
use crate::store::TaskStore;
use crate::task::TaskId;
use crate::timer::{OneShotTimer, TimerId};

pub const DEFAULT_UNDO_SECONDS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Idle,
    /// Waiting on the confirmation dialog.
    Requested(Vec<TaskId>),
    /// A removed batch can still be undone until `deadline`.
    PendingUndo {
        count: usize,
        deadline: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmOutcome {
    /// Tasks from an earlier batch flushed into the bin first.
    pub flushed: usize,
    /// Tasks now waiting in the undo window.
    pub pending: usize,
}

/// Drives `Requested -> PendingUndo -> Finalized` for one batch at a time.
/// The pending batch itself lives in the [`TaskStore`]; this owns the
/// request and the countdown.
#[derive(Debug)]
pub struct DeletionPipeline {
    requested: Option<Vec<TaskId>>,
    timer: OneShotTimer,
    countdown: Option<TimerId>,
    undo_window: Duration,
}

impl Default for DeletionPipeline {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_UNDO_SECONDS))
    }
}

impl DeletionPipeline {
    pub fn new(undo_window: Duration) -> Self {
        Self {
            requested: None,
            timer: OneShotTimer::new(),
            countdown: None,
            undo_window,
        }
    }

    pub fn state(&self, store: &TaskStore) -> DeletionState {
        if let Some(ids) = &self.requested {
            return DeletionState::Requested(ids.clone());
        }
        match (store.pending(), self.timer.deadline()) {
            (Some(batch), Some(deadline)) => DeletionState::PendingUndo {
                count: batch.len(),
                deadline,
            },
            _ => DeletionState::Idle,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timer.remaining(now)
    }

    /// Records the candidates for the confirmation dialog. Nothing is
    /// removed yet; a newer request replaces an unanswered one.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn request_delete(&mut self, ids: Vec<TaskId>) {
        if self.requested.is_some() {
            debug!("replacing unanswered delete request");
        }
        self.requested = Some(ids);
    }

    pub fn cancel(&mut self) -> Option<Vec<TaskId>> {
        self.requested.take()
    }

    /// Confirms the recorded request. Without one this does nothing.
    pub fn confirm(
        &mut self,
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        match self.requested.take() {
            Some(ids) => self.confirm_ids(&ids, store, bin, now),
            None => {
                debug!("confirm without a pending request ignored");
                ConfirmOutcome::default()
            }
        }
    }

    /// Flushes any batch still in its undo window, then removes `ids`
    /// and opens a fresh window for them.
    #[instrument(skip(self, ids, store, bin), fields(count = ids.len()))]
    pub fn confirm_ids(
        &mut self,
        ids: &[TaskId],
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        self.requested = None;
        let flushed = self.finalize(store, bin, now);

        let removed = store.remove_many(ids);
        if removed.is_empty() {
            debug!("no requested task is active; nothing to delete");
            return ConfirmOutcome {
                flushed,
                pending: 0,
            };
        }

        let pending = removed.len();
        if store.stash_pending(removed).is_some() {
            warn!("pending batch present after flush");
        }
        self.countdown = Some(self.timer.schedule(now, self.undo_window));
        info!(
            pending,
            flushed,
            window_secs = self.undo_window.num_seconds(),
            "deletion pending undo"
        );

        ConfirmOutcome { flushed, pending }
    }

    /// Puts the pending batch back at the end of the collection. Returns
    /// how many tasks came back; zero when the window already closed,
    /// in which case an overdue batch is finalized first.
    #[instrument(skip(self, store, bin))]
    pub fn undo(
        &mut self,
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> usize {
        if self.tick(store, bin, now) > 0 {
            debug!("undo after the window closed ignored");
            return 0;
        }
        self.cancel_countdown();
        let Some(batch) = store.take_pending() else {
            debug!("undo with nothing pending ignored");
            return 0;
        };
        let restored = store.append_many(batch);
        info!(restored, "deletion undone");
        restored
    }

    /// The user closed the undo notice without restoring.
    pub fn dismiss(
        &mut self,
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> usize {
        self.finalize(store, bin, now)
    }

    /// Fires the countdown if its deadline has passed.
    pub fn tick(
        &mut self,
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> usize {
        match self.timer.poll(now) {
            Some(fired) if Some(fired) == self.countdown => {
                self.countdown = None;
                debug!("undo window elapsed");
                self.finalize(store, bin, now)
            }
            Some(stale) => {
                warn!(?stale, "unexpected timer fired; ignoring");
                0
            }
            None => 0,
        }
    }

    /// Commits the pending batch to the bin with `deleted_at = now`.
    #[instrument(skip(self, store, bin))]
    pub fn finalize(
        &mut self,
        store: &mut TaskStore,
        bin: &mut RecycleBin,
        now: DateTime<Utc>,
    ) -> usize {
        self.cancel_countdown();
        match store.take_pending() {
            Some(batch) => bin.finalize(batch, now),
            None => 0,
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(id) = self.countdown.take() {
            self.timer.cancel(id);
        }
    }
}
