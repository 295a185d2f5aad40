//! Turns pick-up / hover / drop events into a single reorder on the store.

use tracing::debug;

use crate::error::StoreError;
use crate::store::TaskStore;
use crate::task::{Task, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging {
        dragged: TaskId,
        over: Option<TaskId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    PickUp(TaskId),
    /// Pointer is over another task. Only recorded for highlighting.
    DragOver(TaskId),
    /// Pointer left the hovered task.
    Leave,
    Drop(TaskId),
    /// Drag ended without a drop, or left the list entirely.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Ignored,
    Tracking,
    Reordered,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct DragCoordinator {
    phase: DragPhase,
}

impl DragCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &DragPhase {
        &self.phase
    }

    pub fn dragged_item(&self) -> Option<&TaskId> {
        match &self.phase {
            DragPhase::Dragging { dragged, .. } => Some(dragged),
            DragPhase::Idle => None,
        }
    }

    pub fn drag_over_item(&self) -> Option<&TaskId> {
        match &self.phase {
            DragPhase::Dragging { over, .. } => over.as_ref(),
            DragPhase::Idle => None,
        }
    }

    /// Applies one event. A drop issues at most one `reorder_tasks` call and
    /// always returns the coordinator to idle, even when the store rejects
    /// the reorder.
    #[tracing::instrument(skip(self, store))]
    pub fn handle(&mut self, event: DragEvent, store: &mut TaskStore) -> Result<DragOutcome, StoreError> {
        match event {
            DragEvent::PickUp(id) => {
                self.phase = DragPhase::Dragging {
                    dragged: id,
                    over: None,
                };
                Ok(DragOutcome::Tracking)
            }
            DragEvent::DragOver(target) => match &mut self.phase {
                DragPhase::Dragging { over, .. } => {
                    *over = Some(target);
                    Ok(DragOutcome::Tracking)
                }
                DragPhase::Idle => Ok(DragOutcome::Ignored),
            },
            DragEvent::Leave => match &mut self.phase {
                DragPhase::Dragging { over, .. } => {
                    *over = None;
                    Ok(DragOutcome::Tracking)
                }
                DragPhase::Idle => Ok(DragOutcome::Ignored),
            },
            DragEvent::Cancel => {
                let was_dragging = self.phase != DragPhase::Idle;
                self.phase = DragPhase::Idle;
                Ok(if was_dragging {
                    DragOutcome::Cancelled
                } else {
                    DragOutcome::Ignored
                })
            }
            DragEvent::Drop(target) => {
                let DragPhase::Dragging { dragged, .. } = std::mem::take(&mut self.phase) else {
                    return Ok(DragOutcome::Ignored);
                };
                if dragged == target {
                    return Ok(DragOutcome::Cancelled);
                }

                let Some(sequence) = move_task(&store.state().tasks, &dragged, &target) else {
                    debug!(%dragged, %target, "drop names a task that is gone; ignoring");
                    return Ok(DragOutcome::Cancelled);
                };
                store.reorder_tasks(sequence)?;
                Ok(DragOutcome::Reordered)
            }
        }
    }
}

/// Removes `dragged` and reinserts it at the index `target` held before the
/// removal. `None` when either id is missing.
pub fn move_task(tasks: &[Task], dragged: &TaskId, target: &TaskId) -> Option<Vec<Task>> {
    let from = tasks.iter().position(|task| &task.id == dragged)?;
    let to = tasks.iter().position(|task| &task.id == target)?;

    let mut sequence = tasks.to_vec();
    let task = sequence.remove(from);
    sequence.insert(to, task);
    Some(sequence)
}
