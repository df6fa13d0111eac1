use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::due_date_serde;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub is_important: bool,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "due_date_serde"
    )]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: String,
}

impl Task {
    /// `text` is stored as given; callers trim and validate first.
    pub fn new(id: TaskId, text: String, due_date: Option<NaiveDate>) -> Self {
        Self {
            id,
            text,
            completed: false,
            is_important: false,
            due_date,
            notes: String::new(),
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.map(|due| due < today).unwrap_or(false)
    }
}

/// A task sitting in the recycle bin. `deleted_at` is the instant the
/// undo window closed, not the instant deletion was requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTask {
    #[serde(flatten)]
    pub task: Task,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deleted_at: DateTime<Utc>,
}

impl DeletedTask {
    pub fn new(task: Task, deleted_at: DateTime<Utc>) -> Self {
        Self { task, deleted_at }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::{DeletedTask, Task};

    #[test]
    fn serializes_camel_case_with_iso_due_date() {
        let id = Uuid::new_v4();
        let mut task = Task::new(
            id,
            "Water plants".to_string(),
            NaiveDate::from_ymd_opt(2026, 3, 1),
        );
        task.is_important = true;

        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": id.to_string(),
                "text": "Water plants",
                "completed": false,
                "isImportant": true,
                "dueDate": "2026-03-01",
                "notes": ""
            })
        );
    }

    #[test]
    fn reads_sparse_records() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"id":"{id}","text":"Call mom","dueDate":""}}"#);
        let task: Task = serde_json::from_str(&raw).expect("parse");
        assert_eq!(task.due_date, None);
        assert_eq!(task.notes, "");
        assert!(!task.completed);
        assert!(!task.is_important);
    }

    #[test]
    fn deleted_at_is_epoch_millis() {
        let at = Utc
            .timestamp_millis_opt(1_760_000_000_123)
            .single()
            .expect("valid millis");
        let deleted = DeletedTask::new(Task::new(Uuid::new_v4(), "x".to_string(), None), at);

        let value = serde_json::to_value(&deleted).expect("serialize");
        assert_eq!(value["deletedAt"], json!(1_760_000_000_123_i64));
        assert_eq!(value["text"], json!("x"));

        let back: DeletedTask = serde_json::from_value(value).expect("parse");
        assert_eq!(back, deleted);
    }

    #[test]
    fn overdue_requires_incomplete_past_due() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");
        let mut task = Task::new(Uuid::new_v4(), "x".to_string(), NaiveDate::from_ymd_opt(2026, 3, 9));
        assert!(task.is_overdue(today));
        task.completed = true;
        assert!(!task.is_overdue(today));
        task.completed = false;
        task.due_date = Some(today);
        assert!(!task.is_overdue(today));
    }
}
