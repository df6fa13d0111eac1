use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortPolicy {
  Manual,
  Importance,
  DueDate,
  Creation,
  #[default]
  Smart
}

impl SortPolicy {
  pub const ALL: [SortPolicy; 5] = [
    SortPolicy::Smart,
    SortPolicy::Manual,
    SortPolicy::Importance,
    SortPolicy::DueDate,
    SortPolicy::Creation
  ];

  pub fn wire_name(
    self
  ) -> &'static str {
    match self {
      | SortPolicy::Manual => "manual",
      | SortPolicy::Importance => {
        "importance"
      }
      | SortPolicy::DueDate => "dueDate",
      | SortPolicy::Creation => {
        "creation"
      }
      | SortPolicy::Smart => "default"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | SortPolicy::Manual => {
        "Manual Order"
      }
      | SortPolicy::Importance => {
        "By Importance"
      }
      | SortPolicy::DueDate => {
        "By Due Date"
      }
      | SortPolicy::Creation => {
        "By Creation Date"
      }
      | SortPolicy::Smart => "Smart Sort"
    }
  }
}

impl fmt::Display for SortPolicy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.wire_name())
  }
}

impl FromStr for SortPolicy {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "manual" => Ok(SortPolicy::Manual),
      | "importance" | "important" => {
        Ok(SortPolicy::Importance)
      }
      | "duedate" | "due" => {
        Ok(SortPolicy::DueDate)
      }
      | "creation" | "created" => {
        Ok(SortPolicy::Creation)
      }
      | "default" | "smart" => {
        Ok(SortPolicy::Smart)
      }
      | other => {
        Err(anyhow!(
          "unknown sort policy: {other} \
           (expected one of manual, \
           importance, dueDate, \
           creation, default)"
        ))
      }
    }
  }
}

/// Display order of `tasks` under
/// `policy`. The input is never
/// reordered; every policy except
/// `Creation` is a stable sort over the
/// canonical order.
#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn project(
  tasks: &[Task],
  policy: SortPolicy
) -> Vec<&Task> {
  let mut view: Vec<&Task> =
    tasks.iter().collect();

  match policy {
    | SortPolicy::Manual => {}
    | SortPolicy::Importance => {
      view.sort_by(|a, b| {
        important_first(a, b)
      });
    }
    | SortPolicy::DueDate => {
      view.sort_by(|a, b| {
        dated_first(
          a.due_date, b.due_date
        )
      });
    }
    | SortPolicy::Creation => {
      view.reverse();
    }
    | SortPolicy::Smart => {
      view.sort_by(|a, b| {
        a.completed
          .cmp(&b.completed)
          .then_with(|| {
            important_first(a, b)
          })
          .then_with(|| {
            dated_first(
              a.due_date, b.due_date
            )
          })
      });
    }
  }

  trace!(%policy, "projected view");
  view
}

fn important_first(
  a: &Task,
  b: &Task
) -> Ordering {
  b.is_important.cmp(&a.is_important)
}

fn dated_first(
  a: Option<NaiveDate>,
  b: Option<NaiveDate>
) -> Ordering {
  match (a, b) {
    | (Some(a), Some(b)) => a.cmp(&b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use pretty_assertions::assert_eq;
  use uuid::Uuid;

  use super::{
    SortPolicy,
    project
  };
  use crate::task::Task;

  fn task(
    text: &str,
    completed: bool,
    important: bool,
    due: Option<(i32, u32, u32)>
  ) -> Task {
    let mut task = Task::new(
      Uuid::new_v4(),
      text.to_string(),
      due.and_then(|(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d)
      })
    );
    task.completed = completed;
    task.is_important = important;
    task
  }

  fn names(
    view: Vec<&Task>
  ) -> Vec<&str> {
    view
      .into_iter()
      .map(|t| t.text.as_str())
      .collect()
  }

  #[test]
  fn smart_sort_ranks_completion_then_importance_then_due()
  {
    let tasks = vec![
      task(
        "C",
        true,
        true,
        None
      ),
      task(
        "B",
        false,
        false,
        Some((2026, 2, 17))
      ),
      task(
        "A",
        false,
        true,
        Some((2026, 2, 18))
      ),
    ];

    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::Smart
      )),
      vec!["A", "B", "C"]
    );
  }

  #[test]
  fn smart_sort_puts_undated_last_and_stays_stable()
  {
    let tasks = vec![
      task("u1", false, false, None),
      task(
        "d2",
        false,
        false,
        Some((2026, 3, 2))
      ),
      task("u2", false, false, None),
      task(
        "d1",
        false,
        false,
        Some((2026, 3, 1))
      ),
    ];

    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::Smart
      )),
      vec!["d1", "d2", "u1", "u2"]
    );
  }

  #[test]
  fn importance_is_stable() {
    let tasks = vec![
      task("a", false, false, None),
      task("b", true, false, None),
      task("c", false, false, None),
      task("d", true, false, None),
    ];

    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::Importance
      )),
      vec!["b", "d", "a", "c"]
    );
  }

  #[test]
  fn due_date_orders_ascending_with_undated_last()
  {
    let tasks = vec![
      task("none", false, false, None),
      task(
        "late",
        true,
        false,
        Some((2026, 5, 1))
      ),
      task(
        "early",
        false,
        false,
        Some((2026, 1, 1))
      ),
    ];

    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::DueDate
      )),
      vec!["early", "late", "none"]
    );
  }

  #[test]
  fn creation_reverses_and_manual_is_identity()
  {
    let tasks = vec![
      task("1", true, false, None),
      task("2", false, true, None),
      task("3", false, false, None),
    ];

    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::Creation
      )),
      vec!["3", "2", "1"]
    );
    assert_eq!(
      names(project(
        &tasks,
        SortPolicy::Manual
      )),
      vec!["1", "2", "3"]
    );
    assert_eq!(tasks[0].text, "1");
  }

  #[test]
  fn policy_names_roundtrip() {
    for policy in SortPolicy::ALL {
      assert_eq!(
        policy
          .wire_name()
          .parse::<SortPolicy>()
          .expect("parse"),
        policy
      );
    }
    assert!(
      "sideways"
        .parse::<SortPolicy>()
        .is_err()
    );
  }
}
