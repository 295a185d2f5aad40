//! The single owner of task state.
//!
//! Every successful operation runs one [`Action`] through [`reduce`] and
//! publishes the result as a fresh `Arc<StoreState>`. Snapshots handed out
//! earlier are never touched again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::PersistenceBridge;
use crate::reducer::{Action, reduce};
use crate::state::{FilterKey, SettingsPatch, StoreState, Theme};
use crate::task::{Task, TaskId, TaskOptions, TaskPatch};
use crate::views::{self, TaskStats};

/// Source of "now" for timestamps and date-relative filters.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub struct TaskStore {
    current: Arc<StoreState>,
    revision: u64,
    clock: Box<dyn Clock>,
    bridge: Option<PersistenceBridge>,
    last_persist_error: Option<StoreError>,
}

impl TaskStore {
    /// An unpersisted store with default state.
    pub fn in_memory(clock: Box<dyn Clock>) -> Self {
        Self {
            current: Arc::new(StoreState::default()),
            revision: 0,
            clock,
            bridge: None,
            last_persist_error: None,
        }
    }

    /// Loads through `bridge`, falling back to defaults, and keeps the
    /// bridge for saving.
    #[tracing::instrument(skip_all, fields(key = %bridge.key()))]
    pub fn open(bridge: PersistenceBridge, clock: Box<dyn Clock>) -> Self {
        let state = match bridge.load(clock.now()) {
            Some(state) => {
                info!(tasks = state.tasks.len(), "restored stored state");
                state
            }
            None => {
                debug!("starting from default state");
                StoreState::default()
            }
        };

        Self {
            current: Arc::new(state),
            revision: 0,
            clock,
            bridge: Some(bridge),
            last_persist_error: None,
        }
    }

    /// Current snapshot. Cheap to clone and safe to hold across mutations.
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.current)
    }

    pub fn state(&self) -> &StoreState {
        &self.current
    }

    /// Number of snapshots published since the store was built.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Error from the most recent save, cleared by the next good one.
    pub fn last_persist_error(&self) -> Option<&StoreError> {
        self.last_persist_error.as_ref()
    }

    #[tracing::instrument(skip(self, action), fields(action = action.name(), revision = self.revision))]
    pub fn dispatch(&mut self, action: Action) -> Result<(), StoreError> {
        let persist = action.touches_persisted();
        let next = reduce(&self.current, action, self.clock.now())?;

        self.current = Arc::new(next);
        self.revision += 1;
        debug!(revision = self.revision, tasks = self.current.tasks.len(), "published snapshot");

        if persist {
            self.persist();
        }
        Ok(())
    }

    fn persist(&mut self) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        match bridge.save(&self.current) {
            Ok(()) => self.last_persist_error = None,
            Err(err) => {
                warn!(error = %err, "save failed; in-memory state kept");
                self.last_persist_error = Some(err);
            }
        }
    }

    pub fn create_task(&mut self, text: &str, options: TaskOptions) -> Result<Task, StoreError> {
        let task = Task::new(TaskId::generate(), text, options, self.clock.now())?;
        self.dispatch(Action::AddTask(task.clone()))?;
        Ok(task)
    }

    pub fn toggle_task(&mut self, id: &TaskId) -> Result<(), StoreError> {
        self.dispatch(Action::ToggleTask(id.clone()))
    }

    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        self.dispatch(Action::UpdateTask {
            id: id.clone(),
            patch,
        })
    }

    pub fn delete_task(&mut self, id: &TaskId) -> Result<(), StoreError> {
        self.dispatch(Action::DeleteTask(id.clone()))
    }

    pub fn reorder_tasks(&mut self, sequence: Vec<Task>) -> Result<(), StoreError> {
        self.dispatch(Action::ReorderTasks(sequence))
    }

    pub fn clear_completed(&mut self) -> Result<usize, StoreError> {
        let before = self.current.tasks.len();
        self.dispatch(Action::ClearCompleted)?;
        Ok(before - self.current.tasks.len())
    }

    /// Replaces the whole task list, as an import does.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) -> Result<(), StoreError> {
        self.dispatch(Action::SetTasks(tasks))
    }

    pub fn set_filter(&mut self, key: &str) -> Result<(), StoreError> {
        let filter = FilterKey::parse(key)?;
        self.dispatch(Action::SetFilter(filter))
    }

    pub fn set_search_term(&mut self, term: &str) -> Result<(), StoreError> {
        self.dispatch(Action::SetSearch(term.to_string()))
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<(), StoreError> {
        let theme = Theme::parse(theme)?;
        self.dispatch(Action::SetTheme(theme))
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, StoreError> {
        let theme = self.current.theme.toggled();
        self.dispatch(Action::SetTheme(theme))?;
        Ok(theme)
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<(), StoreError> {
        self.dispatch(Action::UpdateSettings(patch))
    }

    /// Tasks matching the current filter and search, in store order.
    pub fn filtered_tasks(&self) -> Vec<&Task> {
        views::visible_tasks(&self.current, self.clock.now())
    }

    pub fn stats(&self) -> TaskStats {
        views::compute_stats(&self.current.tasks, self.clock.now())
    }

    /// Resolves a full id or a unique prefix of one.
    pub fn resolve_id(&self, raw: &str) -> Result<TaskId, StoreError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StoreError::InvalidInput("task id cannot be empty".to_string()));
        }
        if let Some(task) = self.current.tasks.iter().find(|task| task.id.as_str() == raw) {
            return Ok(task.id.clone());
        }

        let mut matches = self
            .current
            .tasks
            .iter()
            .filter(|task| task.id.as_str().starts_with(raw));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id.clone()),
            (Some(_), Some(_)) => Err(StoreError::InvalidArgument(format!(
                "id prefix {raw} matches more than one task"
            ))),
            (None, _) => Err(StoreError::NotFound(TaskId::from(raw))),
        }
    }
}
