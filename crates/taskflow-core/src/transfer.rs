use std::collections::HashSet;
use std::fmt;

use anyhow::Context;
use chrono::{
  DateTime,
  SecondsFormat,
  Utc
};
use serde::Serialize;
use serde_json::Value;
use tracing::{
  debug,
  info
};

use crate::error::StoreError;
use crate::task::{
  Task,
  TaskRecord
};

pub const EXPORT_VERSION: &str =
  "1.0.0";

const CSV_HEADER: &str = "ID,Text,\
                          Completed,\
                          CreatedAt,\
                          Category,\
                          Priority,\
                          DueDate,Tags";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum ExportFormat {
  #[default]
  Json,
  Csv
}

impl ExportFormat {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "json" => Ok(Self::Json),
      | "csv" => Ok(Self::Csv),
      | other => {
        Err(anyhow::anyhow!(
          "unknown export format: \
           {other}"
        ))
      }
    }
  }

  pub fn extension(
    &self
  ) -> &'static str {
    match self {
      | Self::Json => "json",
      | Self::Csv => "csv"
    }
  }
}

impl fmt::Display for ExportFormat {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.extension())
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
  tasks:       &'a [Task],
  export_date: String,
  version:     &'static str
}

/// Renders `tasks` in the requested
/// format. Pure: nothing in the store
/// changes.
#[tracing::instrument(skip(
  tasks, now
))]
pub fn export(
  tasks: &[Task],
  format: ExportFormat,
  now: DateTime<Utc>
) -> anyhow::Result<String> {
  info!(
    count = tasks.len(),
    "exporting tasks"
  );
  match format {
    | ExportFormat::Json => {
      export_json(tasks, now)
    }
    | ExportFormat::Csv => {
      Ok(export_csv(tasks))
    }
  }
}

pub fn export_json(
  tasks: &[Task],
  now: DateTime<Utc>
) -> anyhow::Result<String> {
  let doc = ExportDocument {
    tasks,
    export_date: iso(now),
    version: EXPORT_VERSION
  };
  serde_json::to_string_pretty(&doc)
    .context(
      "failed serializing export"
    )
}

pub fn export_csv(
  tasks: &[Task]
) -> String {
  let mut out =
    String::from(CSV_HEADER);
  for task in tasks {
    out.push('\n');
    out.push_str(&format!(
      "{},{},{},{},{},{},{},{}",
      task.id,
      quoted(&task.text),
      task.completed,
      iso(task.created_at),
      task.category,
      task.priority,
      task
        .due_date
        .map(iso)
        .unwrap_or_default(),
      quoted(&task.tags.join(";"))
    ));
  }
  out
}

/// `taskflow-backup-YYYY-MM-DD.<ext>`,
/// dated in UTC.
pub fn backup_file_name(
  format: ExportFormat,
  now: DateTime<Utc>
) -> String {
  format!(
    "taskflow-backup-{}.{}",
    now.format("%Y-%m-%d"),
    format.extension()
  )
}

/// Reads an export or persisted
/// document and returns its tasks.
///
/// Any record that cannot become a
/// task rejects the whole import.
#[tracing::instrument(skip(raw, now))]
pub fn parse_import(
  raw: &str,
  now: DateTime<Utc>
) -> Result<Vec<Task>, StoreError> {
  let doc: Value =
    serde_json::from_str(raw.trim())
      .map_err(|err| {
        StoreError::InvalidFormat(
          format!(
            "import is not valid \
             JSON: {err}"
          )
        )
      })?;

  let Some(Value::Array(records)) =
    doc.get("tasks").cloned()
  else {
    return Err(
      StoreError::InvalidFormat(
        "import needs a `tasks` array"
          .to_string()
      )
    );
  };

  let mut seen = HashSet::new();
  let mut tasks =
    Vec::with_capacity(records.len());
  for (idx, value) in
    records.into_iter().enumerate()
  {
    let task =
      serde_json::from_value::<
        TaskRecord
      >(value)
      .map_err(|err| err.to_string())
      .and_then(|record| {
        record
          .into_task(now)
          .map_err(|err| err.to_string())
      })
      .map_err(|reason| {
        StoreError::InvalidFormat(
          format!(
            "task #{}: {reason}",
            idx + 1
          )
        )
      })?;

    if !seen.insert(task.id.clone()) {
      return Err(
        StoreError::InvalidFormat(
          format!(
            "task #{}: duplicate id {}",
            idx + 1,
            task.id
          )
        )
      );
    }
    tasks.push(task);
  }

  debug!(
    count = tasks.len(),
    "parsed import"
  );
  Ok(tasks)
}

fn iso(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

fn quoted(raw: &str) -> String {
  format!(
    "\"{}\"",
    raw.replace('"', "\"\"")
  )
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;
  use crate::task::{
    Category,
    Priority,
    TaskId,
    TaskOptions
  };

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 7, 4, 18, 30, 0
      )
      .single()
      .expect("valid now")
  }

  fn sample() -> Vec<Task> {
    let due = Utc
      .with_ymd_and_hms(
        2026, 7, 10, 0, 0, 0
      )
      .single()
      .expect("valid due");
    vec![
      Task::new(
        TaskId::from("t-1"),
        "Say \"hi\", then leave",
        TaskOptions {
          category: Some(
            Category::Work
          ),
          priority: Some(
            Priority::Urgent
          ),
          due_date: Some(due),
          tags: vec![
            "a".to_string(),
            "b".to_string(),
          ],
          ..TaskOptions::default()
        },
        now()
      )
      .expect("task"),
      Task::new(
        TaskId::from("t-2"),
        "plain",
        TaskOptions::default(),
        now()
      )
      .expect("task"),
    ]
  }

  #[test]
  fn csv_quotes_text_and_tags() {
    let csv = export_csv(&sample());
    let lines: Vec<&str> =
      csv.lines().collect();
    assert_eq!(
      lines[0],
      "ID,Text,Completed,CreatedAt,\
       Category,Priority,DueDate,Tags"
    );
    assert_eq!(
      lines[1],
      "t-1,\"Say \"\"hi\"\", then \
       leave\",false,2026-07-04T18:\
       30:00.000Z,work,urgent,\
       2026-07-10T00:00:00.000Z,\"a;\
       b\""
    );
    assert_eq!(
      lines[2],
      "t-2,\"plain\",false,2026-07-\
       04T18:30:00.000Z,general,\
       medium,,\"\""
    );
  }

  #[test]
  fn json_export_carries_metadata() {
    let raw = export_json(
      &sample(),
      now()
    )
    .expect("export");
    let doc: Value =
      serde_json::from_str(&raw)
        .expect("valid json");
    assert_eq!(
      doc["version"],
      json!("1.0.0")
    );
    assert_eq!(
      doc["exportDate"],
      json!("2026-07-04T18:30:00.000Z")
    );
    assert_eq!(
      doc["tasks"][0]["id"],
      json!("t-1")
    );

    let back =
      parse_import(&raw, now())
        .expect("own export imports");
    assert_eq!(back, sample());
  }

  #[test]
  fn import_requires_tasks_array() {
    for raw in [
      "not json",
      "[]",
      r#"{"items": []}"#,
      r#"{"tasks": {"id": 1}}"#
    ] {
      let err =
        parse_import(raw, now())
          .expect_err("rejected");
      assert_eq!(
        err.kind(),
        "invalid_format"
      );
    }

    assert_eq!(
      parse_import(
        r#"{"tasks": []}"#,
        now()
      ),
      Ok(vec![])
    );
  }

  #[test]
  fn import_fills_gaps_and_rejects_bad_records()
  {
    let tasks = parse_import(
      &json!({
        "tasks": [
          {"text": "no id"},
          {"id": 42, "text": "legacy", "priority": "high"}
        ]
      })
      .to_string(),
      now()
    )
    .expect("valid import");
    assert_eq!(tasks.len(), 2);
    assert!(
      !tasks[0].id.as_str().is_empty()
    );
    assert_eq!(
      tasks[0].created_at,
      now()
    );
    assert_eq!(
      tasks[1].id.as_str(),
      "42"
    );
    assert_eq!(
      tasks[1].priority,
      Priority::High
    );

    for bad in [
      json!({"tasks": [{"text": "  "}]}),
      json!({"tasks": [{"id": "x", "text": "a"}, {"id": "x", "text": "b"}]}),
      json!({"tasks": ["just a string"]})
    ] {
      let err = parse_import(
        &bad.to_string(),
        now()
      )
      .expect_err("rejected");
      assert_eq!(
        err.kind(),
        "invalid_format"
      );
    }
  }

  #[test]
  fn backup_name_uses_utc_date() {
    assert_eq!(
      backup_file_name(
        ExportFormat::Csv,
        now()
      ),
      "taskflow-backup-2026-07-04.csv"
    );
    assert_eq!(
      ExportFormat::parse("JSON")
        .expect("known"),
      ExportFormat::Json
    );
    assert!(
      ExportFormat::parse("xml")
        .is_err()
    );
  }
}
