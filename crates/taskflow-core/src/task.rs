use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::datetime::{due_date_serde, parse_stored_due};
use crate::error::StoreError;

/// Opaque task identifier.
///
/// New tasks get a UUID v4. Older data written by the browser build used
/// numeric ids; those are accepted on load and kept in their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for table output.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Category {
    Work,
    Personal,
    Health,
    Education,
    Finance,
    #[default]
    General,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Self::Work),
            "personal" => Some(Self::Personal),
            "health" => Some(Self::Health),
            "education" => Some(Self::Education),
            "finance" => Some(Self::Finance),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Health => "health",
            Self::Education => "education",
            Self::Finance => "finance",
            Self::General => "general",
        }
    }
}

impl From<Option<String>> for Category {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Self::Low),
            "medium" | "med" | "m" => Some(Self::Medium),
            "high" | "h" => Some(Self::High),
            "urgent" | "u" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl From<Option<String>> for Priority {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub estimated_time: Option<Value>,

    #[serde(default)]
    pub actual_time: Option<Value>,

    #[serde(default)]
    pub subtasks: Vec<Value>,

    #[serde(default)]
    pub attachments: Vec<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Optional metadata accepted when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOptions {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    #[serde(with = "due_date_serde")]
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub estimated_time: Option<Value>,
    pub actual_time: Option<Value>,
    pub subtasks: Vec<Value>,
    pub attachments: Vec<Value>,
}

/// Partial field set merged into an existing task.
///
/// `None` leaves a field untouched. The nested options clear a field when
/// set to `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub estimated_time: Option<Option<Value>>,
    pub actual_time: Option<Option<Value>>,
    pub subtasks: Option<Vec<Value>>,
    pub attachments: Option<Vec<Value>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Task {
    /// Builds a fresh, incomplete task. Fails when `text` trims to nothing.
    pub fn new(
        id: TaskId,
        text: &str,
        options: TaskOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let text = normalize_text(text)?;
        Ok(Self {
            id,
            text,
            completed: false,
            created_at: now,
            updated_at: now,
            category: options.category.unwrap_or_default(),
            priority: options.priority.unwrap_or_default(),
            due_date: options.due_date,
            tags: normalize_tags(options.tags),
            notes: options
                .notes
                .map(|notes| notes.trim().to_string())
                .unwrap_or_default(),
            estimated_time: options.estimated_time,
            actual_time: options.actual_time,
            subtasks: options.subtasks,
            attachments: options.attachments,
            extra: BTreeMap::new(),
        })
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Merges `patch` into the task and stamps `updated_at`.
    ///
    /// Validation happens before any field is written, so a rejected patch
    /// leaves the task as it was.
    pub fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<(), StoreError> {
        let text = patch.text.as_deref().map(normalize_text).transpose()?;

        if let Some(text) = text {
            self.text = text;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(notes) = patch.notes {
            self.notes = notes.trim().to_string();
        }
        if let Some(estimated_time) = patch.estimated_time {
            self.estimated_time = estimated_time;
        }
        if let Some(actual_time) = patch.actual_time {
            self.actual_time = actual_time;
        }
        if let Some(subtasks) = patch.subtasks {
            self.subtasks = subtasks;
        }
        if let Some(attachments) = patch.attachments {
            self.attachments = attachments;
        }

        self.touch(now);
        Ok(())
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.updated_at);
    }
}

fn normalize_text(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("task text cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Trims tags, drops blanks and keeps the first occurrence of duplicates.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || out.iter().any(|existing| existing == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// Lenient task shape read from persisted or imported documents.
///
/// Every field is optional; [`TaskRecord::into_task`] fills the gaps with
/// the creation defaults. Dates, `completed` and `tags` of the wrong shape
/// are dropped with a warning instead of failing the record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(default)]
    id: Option<TaskId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    completed: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    due_date: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    estimated_time: Option<Value>,
    #[serde(default)]
    actual_time: Option<Value>,
    #[serde(default)]
    subtasks: Option<Vec<Value>>,
    #[serde(default)]
    attachments: Option<Vec<Value>>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl TaskRecord {
    pub fn into_task(self, now: DateTime<Utc>) -> Result<Task, StoreError> {
        let text = self.text.unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::InvalidFormat("task record has empty text".to_string()));
        }

        let id = self
            .id
            .filter(|id| !id.as_str().trim().is_empty())
            .unwrap_or_else(TaskId::generate);
        let created_at = self
            .created_at
            .and_then(|value| stored_instant("createdAt", &value))
            .unwrap_or(now);
        let updated_at = self
            .updated_at
            .and_then(|value| stored_instant("updatedAt", &value))
            .unwrap_or(created_at);
        let due_date = self.due_date.and_then(|value| stored_instant("dueDate", &value));

        let completed = match self.completed {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                warn!(id = %id, value = %other, "ignoring non-boolean completed flag");
                false
            }
        };
        let tags = match self.tags {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(tag) => Some(tag),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                warn!(id = %id, value = %other, "ignoring tags that are not a list");
                Vec::new()
            }
        };

        Ok(Task {
            id,
            text: text.to_string(),
            completed,
            created_at,
            updated_at,
            category: self.category,
            priority: self.priority,
            due_date,
            tags: normalize_tags(tags),
            notes: self.notes.unwrap_or_default(),
            estimated_time: self.estimated_time,
            actual_time: self.actual_time,
            subtasks: self.subtasks.unwrap_or_default(),
            attachments: self.attachments.unwrap_or_default(),
            extra: self.extra,
        })
    }
}

/// Reads a stored timestamp: RFC 3339, a bare `YYYY-MM-DD` (UTC midnight)
/// or epoch milliseconds. Anything else is logged and read as absent.
pub(crate) fn stored_instant(field: &str, value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Null => return None,
        Value::String(raw) if raw.trim().is_empty() => return None,
        Value::String(raw) => parse_stored_due(raw).ok().flatten(),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    if parsed.is_none() {
        warn!(field, value = %value, "ignoring unreadable stored timestamp");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn new_task_applies_defaults_and_trims() {
        let task = Task::new(
            TaskId::from("t1"),
            "  Buy milk  ",
            TaskOptions {
                tags: vec![" home ".to_string(), "home".to_string(), "".to_string()],
                ..TaskOptions::default()
            },
            now(),
        )
        .expect("valid task");

        assert_eq!(task.text, "Buy milk");
        assert!(!task.completed);
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(task.category, Category::General);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.tags, vec!["home".to_string()]);
        assert_eq!(task.notes, "");
    }

    #[test]
    fn blank_text_is_rejected() {
        for text in ["", "   ", "\t\n"] {
            let err = Task::new(TaskId::generate(), text, TaskOptions::default(), now())
                .expect_err("blank text must fail");
            assert_eq!(err.kind(), "invalid_input");
        }
    }

    #[test]
    fn overdue_requires_open_task_with_past_due() {
        let mut task = Task::new(TaskId::generate(), "report", TaskOptions::default(), now())
            .expect("valid task");
        assert!(!task.is_overdue(now()));

        task.due_date = Some(now() - Duration::hours(1));
        assert!(task.is_overdue(now()));

        task.completed = true;
        assert!(!task.is_overdue(now()));

        task.completed = false;
        task.due_date = Some(now() + Duration::hours(1));
        assert!(!task.is_overdue(now()));
    }

    #[test]
    fn rejected_patch_leaves_task_untouched() {
        let mut task = Task::new(TaskId::generate(), "report", TaskOptions::default(), now())
            .expect("valid task");
        let before = task.clone();

        let err = task
            .apply_patch(
                TaskPatch {
                    text: Some("  ".to_string()),
                    priority: Some(Priority::High),
                    ..TaskPatch::default()
                },
                now() + Duration::minutes(5),
            )
            .expect_err("blank text patch");
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(task, before);
    }

    #[test]
    fn unknown_enum_values_fall_back_to_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": 1700000000000.25,
            "text": "legacy",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z",
            "category": "hobby",
            "priority": null,
            "dueDate": "2024-01-05",
            "color": "teal"
        }))
        .expect("legacy task parses");

        assert_eq!(task.id.as_str(), "1700000000000.25");
        assert_eq!(task.category, Category::General);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.due_date.is_some());
        assert_eq!(task.extra.get("color"), Some(&json!("teal")));

        let back = serde_json::to_value(&task).expect("serialize");
        assert_eq!(back["color"], json!("teal"));
        assert_eq!(back["category"], json!("general"));
        assert_eq!(back["estimatedTime"], Value::Null);
    }

    #[test]
    fn record_fills_missing_fields() {
        let record: TaskRecord = serde_json::from_value(json!({
            "text": "  imported ",
            "tags": ["a", "a", " b"]
        }))
        .expect("record parses");
        let task = record.into_task(now()).expect("valid record");

        assert_eq!(task.text, "imported");
        assert_eq!(task.created_at, now());
        assert_eq!(task.updated_at, now());
        assert_eq!(task.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(!task.id.as_str().is_empty());
    }
}
