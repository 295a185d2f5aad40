use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Utc
};
use serde::Serialize;
use tracing::trace;

use crate::datetime::{
  DisplayZone,
  display_zone
};
use crate::state::{
  FilterKey,
  StoreState
};
use crate::task::{
  Category,
  Priority,
  Task
};

/// Aggregate counters over the full,
/// unfiltered task list.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
  pub total:           usize,
  pub completed:       usize,
  pub active:          usize,
  pub overdue:         usize,
  pub completion_rate: u32,
  pub by_priority:
    BTreeMap<Priority, usize>,
  pub by_category:
    BTreeMap<Category, usize>
}

/// Case-insensitive substring match
/// over text, notes, tags and category.
/// `needle` must already be lowercased.
pub fn matches_search(
  task: &Task,
  needle: &str
) -> bool {
  if needle.is_empty() {
    return true;
  }

  task
    .text
    .to_lowercase()
    .contains(needle)
    || task
      .notes
      .to_lowercase()
      .contains(needle)
    || task.tags.iter().any(|tag| {
      tag.to_lowercase().contains(needle)
    })
    || task
      .category
      .as_str()
      .contains(needle)
}

pub fn matches_filter(
  filter: FilterKey,
  task: &Task,
  now: DateTime<Utc>,
  zone: &DisplayZone
) -> bool {
  match filter {
    | FilterKey::All => true,
    | FilterKey::Active => {
      !task.completed
    }
    | FilterKey::Completed => {
      task.completed
    }
    | FilterKey::Overdue => {
      task.is_overdue(now)
    }
    | FilterKey::HighPriority => {
      task.priority == Priority::High
    }
    | FilterKey::Today => {
      task.due_date.is_some_and(|due| {
        zone.date_of(due)
          == zone.date_of(now)
      })
    }
  }
}

/// Search first, then filter, in store
/// order. Calendar days are taken in
/// the display zone.
#[tracing::instrument(skip(tasks, now))]
pub fn filtered_tasks<'a>(
  tasks: &'a [Task],
  filter: FilterKey,
  search_term: &str,
  now: DateTime<Utc>
) -> Vec<&'a Task> {
  filtered_tasks_in(
    display_zone(),
    tasks,
    filter,
    search_term,
    now
  )
}

pub fn filtered_tasks_in<'a>(
  zone: &DisplayZone,
  tasks: &'a [Task],
  filter: FilterKey,
  search_term: &str,
  now: DateTime<Utc>
) -> Vec<&'a Task> {
  let needle =
    search_term.to_lowercase();

  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      matches_search(task, &needle)
    })
    .filter(|task| {
      matches_filter(
        filter, task, now, zone
      )
    })
    .collect();

  trace!(
    total = tasks.len(),
    visible = out.len(),
    "computed filtered view"
  );
  out
}

/// The list a UI renders for the
/// snapshot's own filter and search.
pub fn visible_tasks(
  state: &StoreState,
  now: DateTime<Utc>
) -> Vec<&Task> {
  filtered_tasks(
    &state.tasks,
    state.filter,
    &state.search_term,
    now
  )
}

pub fn compute_stats(
  tasks: &[Task],
  now: DateTime<Utc>
) -> TaskStats {
  let mut stats = TaskStats {
    total: tasks.len(),
    ..TaskStats::default()
  };

  for task in tasks {
    if task.completed {
      stats.completed += 1;
    }
    if task.is_overdue(now) {
      stats.overdue += 1;
    }
    *stats
      .by_priority
      .entry(task.priority)
      .or_insert(0) += 1;
    *stats
      .by_category
      .entry(task.category)
      .or_insert(0) += 1;
  }

  stats.active =
    stats.total - stats.completed;
  stats.completion_rate =
    completion_rate(
      stats.completed,
      stats.total
    );
  stats
}

fn completion_rate(
  completed: usize,
  total: usize
) -> u32 {
  if total == 0 {
    return 0;
  }
  ((completed as f64 / total as f64)
    * 100.0)
    .round() as u32
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc
  };
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::task::{
    TaskId,
    TaskOptions
  };

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 5, 20, 15, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn zone() -> DisplayZone {
    DisplayZone::Named(chrono_tz::UTC)
  }

  fn make(
    id: &str,
    text: &str,
    options: TaskOptions
  ) -> Task {
    Task::new(
      TaskId::from(id),
      text,
      options,
      now() - Duration::days(3)
    )
    .expect("valid task")
  }

  fn scenario() -> Vec<Task> {
    vec![
      make(
        "milk",
        "Buy milk",
        TaskOptions {
          category: Some(
            Category::Personal
          ),
          priority: Some(Priority::Low),
          ..TaskOptions::default()
        }
      ),
      make(
        "report",
        "Finish report",
        TaskOptions {
          category: Some(Category::Work),
          priority: Some(
            Priority::High
          ),
          due_date: Some(
            now() - Duration::days(1)
          ),
          ..TaskOptions::default()
        }
      ),
    ]
  }

  fn texts(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|task| task.text.clone())
      .collect()
  }

  #[test]
  fn overdue_scenario() {
    let tasks = scenario();
    let stats =
      compute_stats(&tasks, now());
    assert_eq!(stats.overdue, 1);
    assert_eq!(
      stats.by_priority,
      BTreeMap::from([
        (Priority::Low, 1),
        (Priority::High, 1)
      ])
    );

    let overdue = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::Overdue,
      "",
      now()
    );
    assert_eq!(
      texts(&overdue),
      vec!["Finish report".to_string()]
    );
  }

  #[test]
  fn search_is_case_insensitive_across_fields()
  {
    let mut tasks = scenario();
    tasks[0].tags =
      vec!["Groceries".to_string()];
    tasks[0].notes =
      "Oat milk preferred".to_string();

    let by_category = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::All,
      "Work",
      now()
    );
    assert_eq!(
      texts(&by_category),
      vec!["Finish report".to_string()]
    );

    let by_tag = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::All,
      "grocer",
      now()
    );
    assert_eq!(
      texts(&by_tag),
      vec!["Buy milk".to_string()]
    );

    let by_notes = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::All,
      "OAT",
      now()
    );
    assert_eq!(by_notes.len(), 1);
  }

  #[test]
  fn search_and_filter_compose() {
    let mut tasks = scenario();
    tasks.push(make(
      "memo",
      "Report memo",
      TaskOptions {
        priority: Some(Priority::High),
        ..TaskOptions::default()
      }
    ));
    tasks[2].completed = true;

    let high_report = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::HighPriority,
      "report",
      now()
    );
    assert_eq!(high_report.len(), 2);

    let active_report = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::Active,
      "report",
      now()
    );
    assert_eq!(
      texts(&active_report),
      vec!["Finish report".to_string()]
    );

    let completed = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::Completed,
      "",
      now()
    );
    assert_eq!(
      texts(&completed),
      vec!["Report memo".to_string()]
    );
  }

  #[test]
  fn today_matches_calendar_day_only() {
    let mut tasks = scenario();
    tasks[0].due_date = Some(
      now() + Duration::hours(2)
    );

    let today = filtered_tasks_in(
      &zone(),
      &tasks,
      FilterKey::Today,
      "",
      now()
    );
    assert_eq!(
      texts(&today),
      vec!["Buy milk".to_string()]
    );
  }

  #[test]
  fn stats_over_empty_and_full_lists() {
    assert_eq!(
      compute_stats(&[], now()),
      TaskStats::default()
    );

    let mut tasks = scenario();
    tasks.push(make(
      "walk",
      "Walk",
      TaskOptions::default()
    ));
    tasks[1].completed = true;

    let stats =
      compute_stats(&tasks, now());
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.overdue, 0);
    assert_eq!(stats.completion_rate, 33);
    assert_eq!(
      stats
        .by_category
        .get(&Category::General),
      Some(&1)
    );
    assert!(
      !stats
        .by_category
        .contains_key(&Category::Finance)
    );
  }
}
