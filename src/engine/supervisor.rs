// SPDX-License-Identifier: MIT

//! Background task supervision for self re-triggering runs
//!
//! Repeating and scheduled-start nodes hand a delayed re-run here instead of
//! keeping their own run alive. Every scheduled task is tracked process-wide
//! and carries a cancellation token; shutdown cancels the whole set
//! cooperatively, so no orphaned timers outlive the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle for one scheduled background re-trigger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub flow_id: String,
    pub node_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub delay_secs: f64,
}

struct TaskEntry {
    info: TaskInfo,
    cancel: CancellationToken,
}

/// Process-wide collection of scheduled re-triggers
pub struct TaskSupervisor {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    root: CancellationToken,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Schedule `task` to start after `delay`. The task runs fire-and-forget;
    /// the supervisor does not wait for it. Returns immediately with the
    /// tracking handle.
    pub fn schedule(
        self: &std::sync::Arc<Self>,
        flow_id: &str,
        node_id: &str,
        delay: Duration,
        task: BoxFuture<'static, ()>,
    ) -> TaskId {
        let id = TaskId::new();
        let cancel = self.root.child_token();
        let info = TaskInfo {
            id: id.clone(),
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            scheduled_at: Utc::now(),
            delay_secs: delay.as_secs_f64(),
        };

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(
                id.clone(),
                TaskEntry {
                    info,
                    cancel: cancel.clone(),
                },
            );
        }

        let supervisor = std::sync::Arc::clone(self);
        let task_id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    log::debug!("Background task {} firing", task_id);
                    tokio::spawn(task);
                }
                _ = cancel.cancelled() => {
                    log::debug!("Background task {} cancelled", task_id);
                }
            }
            supervisor.deregister(&task_id);
        });

        id
    }

    fn deregister(&self, id: &TaskId) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.remove(id);
        }
    }

    /// Cancel one scheduled task. Returns false for an unknown (or already
    /// fired) handle.
    pub fn cancel(&self, id: &TaskId) -> bool {
        match self.tasks.lock() {
            Ok(mut tasks) => match tasks.remove(id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Currently scheduled tasks, optionally filtered by flow id.
    pub fn list_active(&self, flow_id: Option<&str>) -> Vec<TaskInfo> {
        match self.tasks.lock() {
            Ok(tasks) => tasks
                .values()
                .filter(|entry| flow_id.is_none_or(|f| entry.info.flow_id == f))
                .map(|entry| entry.info.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Cancel every tracked task. Called once at process shutdown.
    pub fn shutdown(&self) {
        self.root.cancel();
        if let Ok(mut tasks) = self.tasks.lock() {
            let count = tasks.len();
            tasks.clear();
            if count > 0 {
                log::info!("Cancelled {} background task(s) on shutdown", count);
            }
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
