//! Store transitions as a closed set of actions.
//!
//! [`reduce`] is pure: it reads the current state, never mutates it, and
//! returns the next state or the error the caller should see.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::StoreError;
use crate::state::{FilterKey, SettingsPatch, StoreState, Theme};
use crate::task::{Task, TaskId, TaskPatch};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddTask(Task),
    ToggleTask(TaskId),
    UpdateTask { id: TaskId, patch: TaskPatch },
    DeleteTask(TaskId),
    ReorderTasks(Vec<Task>),
    ClearCompleted,
    SetTasks(Vec<Task>),
    SetFilter(FilterKey),
    SetSearch(String),
    SetTheme(Theme),
    UpdateSettings(SettingsPatch),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddTask(_) => "add_task",
            Self::ToggleTask(_) => "toggle_task",
            Self::UpdateTask { .. } => "update_task",
            Self::DeleteTask(_) => "delete_task",
            Self::ReorderTasks(_) => "reorder_tasks",
            Self::ClearCompleted => "clear_completed",
            Self::SetTasks(_) => "set_tasks",
            Self::SetFilter(_) => "set_filter",
            Self::SetSearch(_) => "set_search",
            Self::SetTheme(_) => "set_theme",
            Self::UpdateSettings(_) => "update_settings",
        }
    }

    /// True when the action changes the persisted subset (tasks, theme or
    /// settings). Filter and search are session-only.
    pub fn touches_persisted(&self) -> bool {
        !matches!(self, Self::SetFilter(_) | Self::SetSearch(_))
    }
}

pub fn reduce(state: &StoreState, action: Action, now: DateTime<Utc>) -> Result<StoreState, StoreError> {
    trace!(action = action.name(), "reducing");
    let stamp = state.last_updated.map_or(now, |last| now.max(last));

    match action {
        Action::AddTask(task) => add_task(state, task, stamp),
        Action::ToggleTask(id) => toggle_task(state, &id, stamp),
        Action::UpdateTask { id, patch } => update_task(state, &id, patch, stamp),
        Action::DeleteTask(id) => delete_task(state, &id, stamp),
        Action::ReorderTasks(tasks) => reorder_tasks(state, tasks, stamp),
        Action::ClearCompleted => Ok(clear_completed(state, stamp)),
        Action::SetTasks(tasks) => set_tasks(state, tasks, stamp),
        Action::SetFilter(filter) => Ok(StoreState {
            filter,
            ..state.clone()
        }),
        Action::SetSearch(search_term) => Ok(StoreState {
            search_term,
            ..state.clone()
        }),
        Action::SetTheme(theme) => Ok(StoreState {
            theme,
            ..state.clone()
        }),
        Action::UpdateSettings(patch) => Ok(StoreState {
            settings: state.settings.merged(patch),
            ..state.clone()
        }),
    }
}

fn with_tasks(state: &StoreState, tasks: Vec<Task>, stamp: DateTime<Utc>) -> StoreState {
    StoreState {
        tasks,
        last_updated: Some(stamp),
        filter: state.filter,
        search_term: state.search_term.clone(),
        theme: state.theme,
        settings: state.settings,
    }
}

fn add_task(state: &StoreState, task: Task, stamp: DateTime<Utc>) -> Result<StoreState, StoreError> {
    if state.task(&task.id).is_some() {
        return Err(StoreError::InvalidArgument(format!("duplicate task id: {}", task.id)));
    }

    let mut tasks = Vec::with_capacity(state.tasks.len() + 1);
    tasks.push(task);
    tasks.extend(state.tasks.iter().cloned());
    Ok(with_tasks(state, tasks, stamp))
}

fn toggle_task(state: &StoreState, id: &TaskId, stamp: DateTime<Utc>) -> Result<StoreState, StoreError> {
    let idx = state.position(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let mut tasks = state.tasks.clone();
    let task = &mut tasks[idx];
    task.completed = !task.completed;
    task.touch(stamp);
    Ok(with_tasks(state, tasks, stamp))
}

fn update_task(
    state: &StoreState,
    id: &TaskId,
    patch: TaskPatch,
    stamp: DateTime<Utc>,
) -> Result<StoreState, StoreError> {
    let idx = state.position(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let mut tasks = state.tasks.clone();
    tasks[idx].apply_patch(patch, stamp)?;
    Ok(with_tasks(state, tasks, stamp))
}

fn delete_task(state: &StoreState, id: &TaskId, stamp: DateTime<Utc>) -> Result<StoreState, StoreError> {
    if state.position(id).is_none() {
        return Err(StoreError::NotFound(id.clone()));
    }

    let tasks = state.tasks.iter().filter(|task| &task.id != id).cloned().collect();
    Ok(with_tasks(state, tasks, stamp))
}

fn reorder_tasks(
    state: &StoreState,
    tasks: Vec<Task>,
    stamp: DateTime<Utc>,
) -> Result<StoreState, StoreError> {
    if tasks.len() != state.tasks.len() {
        return Err(StoreError::InvalidArgument(format!(
            "reorder expects {} tasks, got {}",
            state.tasks.len(),
            tasks.len()
        )));
    }

    let current: HashSet<&TaskId> = state.tasks.iter().map(|task| &task.id).collect();
    let mut seen: HashSet<&TaskId> = HashSet::with_capacity(tasks.len());
    for task in &tasks {
        if !current.contains(&task.id) {
            return Err(StoreError::InvalidArgument(format!("reorder names unknown task: {}", task.id)));
        }
        if !seen.insert(&task.id) {
            return Err(StoreError::InvalidArgument(format!("reorder repeats task: {}", task.id)));
        }
    }

    Ok(with_tasks(state, tasks, stamp))
}

fn clear_completed(state: &StoreState, stamp: DateTime<Utc>) -> StoreState {
    let tasks = state.tasks.iter().filter(|task| !task.completed).cloned().collect();
    with_tasks(state, tasks, stamp)
}

fn set_tasks(state: &StoreState, tasks: Vec<Task>, stamp: DateTime<Utc>) -> Result<StoreState, StoreError> {
    let mut seen: HashSet<&TaskId> = HashSet::with_capacity(tasks.len());
    for task in &tasks {
        if !seen.insert(&task.id) {
            return Err(StoreError::InvalidArgument(format!("duplicate task id: {}", task.id)));
        }
    }
    Ok(with_tasks(state, tasks, stamp))
}
