// MockIoT - Task registry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Task registry for asynchronous generation runs.
//!
//! Lifecycle:
//!
//! ```text
//! pending ──> running ──> completed
//!                    └──> failed
//! ```
//!
//! Status polling takes the read lock; only the runner that owns a task
//! mutates it. Terminal tasks are frozen. The registry broadcasts a
//! [`TaskEvent`] for every change so observers do not have to poll.

use crate::config::RetentionPolicy;
use crate::error::TaskError;
use crate::runner::GenerationSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Highest progress a running task can report; 100 is reserved for completion.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

const EVENT_CAPACITY: usize = 256;

/// Opaque task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| TaskError::NotFound(s.to_string()))
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which generator a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TimeSeries,
    PredictionDataset,
    LoadingScenario,
    VehicleEntry,
    CarbonPeak,
    CarbonReduction,
    TimePattern,
}

impl TaskKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TimeSeries => "time_series",
            TaskKind::PredictionDataset => "prediction_dataset",
            TaskKind::LoadingScenario => "loading_scenario",
            TaskKind::VehicleEntry => "vehicle_entry",
            TaskKind::CarbonPeak => "carbon_peak",
            TaskKind::CarbonReduction => "carbon_reduction",
            TaskKind::TimePattern => "time_pattern",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// State change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
}

impl TaskEvent {
    fn of(task: &GenerationTask) -> Self {
        Self {
            task_id: task.task_id,
            kind: task.kind,
            status: task.status,
            progress: task.progress,
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    task: GenerationTask,
}

/// Concurrent map of generation tasks.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Entry>>,
    events: broadcast::Sender<TaskEvent>,
    retention: RetentionPolicy,
    next_seq: AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new(retention: RetentionPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
            retention,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Retention policy in force.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Allocate a pending task.
    pub async fn create(&self, kind: TaskKind) -> TaskId {
        let id = TaskId::new();
        let task = GenerationTask {
            task_id: id,
            kind,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Task created, waiting to run".to_string(),
            result: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        };
        let event = TaskEvent::of(&task);

        {
            let mut tasks = self.tasks.write().await;
            self.sweep(&mut tasks);
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            tasks.insert(id, Entry { seq, task });
        }

        log::debug!("task {} created ({})", id, kind);
        self.publish(event);
        id
    }

    /// `pending -> running`.
    pub async fn mark_running(&self, id: TaskId, message: impl Into<String>) -> bool {
        self.transition(id, |task| {
            if task.status != TaskStatus::Pending {
                return false;
            }
            task.status = TaskStatus::Running;
            task.message = message.into();
            true
        })
        .await
    }

    /// Raise the progress of a running task.
    ///
    /// Progress never decreases and stays at or below
    /// [`MAX_RUNNING_PROGRESS`]; the message is always replaced.
    pub async fn update_progress(&self, id: TaskId, progress: u8, message: impl Into<String>) -> bool {
        self.transition(id, |task| {
            if task.status != TaskStatus::Running {
                return false;
            }
            task.progress = task.progress.max(progress.min(MAX_RUNNING_PROGRESS));
            task.message = message.into();
            true
        })
        .await
    }

    /// `running -> completed`, progress 100.
    pub async fn complete(&self, id: TaskId, result: GenerationSummary) -> bool {
        self.transition(id, |task| {
            if task.status != TaskStatus::Running {
                return false;
            }
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.message = result.message();
            task.result = Some(result);
            task.end_time = Some(Utc::now());
            true
        })
        .await
    }

    /// `running -> failed`.
    pub async fn fail(&self, id: TaskId, error: impl Into<String>) -> bool {
        self.transition(id, |task| {
            if task.status != TaskStatus::Running {
                return false;
            }
            let error = error.into();
            task.status = TaskStatus::Failed;
            task.message = format!("Generation failed: {}", error);
            task.error = Some(error);
            task.end_time = Some(Utc::now());
            true
        })
        .await
    }

    /// Snapshot of one task.
    pub async fn get(&self, id: TaskId) -> Result<GenerationTask, TaskError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .map(|e| e.task.clone())
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// Snapshots of every retained task, oldest first.
    pub async fn list(&self) -> Vec<GenerationTask> {
        let tasks = self.tasks.read().await;
        let mut entries: Vec<&Entry> = tasks.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.task.clone()).collect()
    }

    /// Number of retained tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether no task is retained.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of tasks not yet terminal.
    pub async fn active(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|e| !e.task.status.is_terminal())
            .count()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    async fn transition<F>(&self, id: TaskId, apply: F) -> bool
    where
        F: FnOnce(&mut GenerationTask) -> bool,
    {
        let event = {
            let mut tasks = self.tasks.write().await;
            let Some(entry) = tasks.get_mut(&id) else {
                log::debug!("task {} vanished before update", id);
                return false;
            };
            if !apply(&mut entry.task) {
                log::debug!("ignored update of task {} in state {}", id, entry.task.status);
                return false;
            }
            TaskEvent::of(&entry.task)
        };
        self.publish(event);
        true
    }

    fn publish(&self, event: TaskEvent) {
        // no subscriber is fine
        let _ = self.events.send(event);
    }

    fn sweep(&self, tasks: &mut HashMap<TaskId, Entry>) {
        if let Some(ttl) = self.retention.ttl {
            if let Ok(ttl) = chrono::Duration::from_std(ttl) {
                let cutoff = Utc::now() - ttl;
                tasks.retain(|_, e| match e.task.end_time {
                    Some(end) => end >= cutoff,
                    None => true,
                });
            }
        }

        let Some(max) = self.retention.max_tasks else {
            return;
        };
        if tasks.len() < max {
            return;
        }

        let mut terminal: Vec<(u64, TaskId)> = tasks
            .iter()
            .filter(|(_, e)| e.task.status.is_terminal())
            .map(|(id, e)| (e.seq, *id))
            .collect();
        terminal.sort_unstable_by_key(|(seq, _)| *seq);

        let excess = tasks.len() + 1 - max;
        for (_, id) in terminal.into_iter().take(excess) {
            tasks.remove(&id);
        }
        if tasks.len() >= max {
            log::warn!(
                "task registry over capacity: {} tasks retained, limit {}",
                tasks.len(),
                max
            );
        }
    }
}

/// Progress sink handed to the engines.
///
/// Synchronous runs use a detached handle, which drops every report.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    target: Option<(Arc<TaskRegistry>, TaskId)>,
}

impl ProgressHandle {
    /// Handle reporting nowhere.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Handle reporting to a registry task.
    pub fn attached(registry: Arc<TaskRegistry>, id: TaskId) -> Self {
        Self {
            target: Some((registry, id)),
        }
    }

    /// Task this handle reports to.
    pub fn task_id(&self) -> Option<TaskId> {
        self.target.as_ref().map(|(_, id)| *id)
    }

    /// Report progress and a status message.
    pub async fn report(&self, progress: u8, message: impl Into<String>) {
        if let Some((registry, id)) = &self.target {
            registry.update_progress(*id, progress, message).await;
        }
    }

    /// Replace the status message, keeping the current progress.
    pub async fn message(&self, message: impl Into<String>) {
        self.report(0, message).await;
    }
}

/// Integer percentage of `done` over `total`.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total).min(100) as u8
}
