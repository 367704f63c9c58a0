//! Poll-driven timer dispatcher.

use crate::core::Event;
use crate::dispatch::{DispatchError, EventDispatcher, SendSpec, SendTarget};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A scheduled send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    pub send_id: String,
    pub fire_at: DateTime<Utc>,
    pub event: Event,
    pub target: SendTarget,
    /// Scheduling order, used to break ties between equal fire times
    #[serde(default)]
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct TaskTable {
    tasks: BTreeMap<String, PendingTask>,
    next_sequence: u64,
}

/// Dispatcher that keeps delayed sends in a task table until polled.
///
/// The table is guarded by a mutex, so a timer thread may call
/// [`take_due`](EventDispatcher::take_due) while the machine sends and
/// cancels. Pending tasks can be snapshotted and restored independently of
/// the machine's own checkpoint.
///
/// # Example
///
/// ```rust
/// use stateflow::core::Event;
/// use stateflow::dispatch::{EventDispatcher, SendSpec, SendTarget, TimerDispatcher};
/// use chrono::{Duration, Utc};
///
/// let dispatcher = TimerDispatcher::new();
/// dispatcher
///     .send(SendSpec {
///         send_id: "t1".to_string(),
///         event: Event::new("timeout"),
///         target: SendTarget::SelfChart,
///         target_type: "scxml".to_string(),
///         delay: std::time::Duration::from_secs(5),
///     })
///     .unwrap();
///
/// assert!(dispatcher.take_due(Utc::now()).is_empty());
/// let due = dispatcher.take_due(Utc::now() + Duration::seconds(10));
/// assert_eq!(due[0].event.name(), "timeout");
/// ```
#[derive(Debug, Default)]
pub struct TimerDispatcher {
    table: Mutex<TaskTable>,
}

impl TimerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of pending tasks.
    pub fn pending(&self) -> usize {
        self.table().tasks.len()
    }

    pub fn is_pending(&self, send_id: &str) -> bool {
        self.table().tasks.contains_key(send_id)
    }

    /// Earliest fire time, if anything is pending.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.table().tasks.values().map(|t| t.fire_at).min()
    }

    /// Copy of every pending task, earliest first.
    pub fn snapshot(&self) -> Vec<PendingTask> {
        let mut tasks: Vec<PendingTask> = self.table().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.fire_at, t.sequence));
        tasks
    }

    /// Replace the task table with `tasks`.
    pub fn restore(&self, tasks: Vec<PendingTask>) {
        let mut table = self.table();
        table.tasks.clear();
        table.next_sequence = tasks.iter().map(|t| t.sequence + 1).max().unwrap_or(0);
        for task in tasks {
            table.tasks.insert(task.send_id.clone(), task);
        }
    }

    pub fn snapshot_json(&self) -> Result<String, DispatchError> {
        serde_json::to_string(&self.snapshot())
            .map_err(|e| DispatchError::SerializationFailed(e.to_string()))
    }

    pub fn restore_json(&self, json: &str) -> Result<(), DispatchError> {
        let tasks: Vec<PendingTask> = serde_json::from_str(json)
            .map_err(|e| DispatchError::DeserializationFailed(e.to_string()))?;
        self.restore(tasks);
        Ok(())
    }
}

impl EventDispatcher for TimerDispatcher {
    fn send(&self, spec: SendSpec) -> Result<(), DispatchError> {
        let delay = chrono::Duration::from_std(spec.delay).map_err(|e| DispatchError::Rejected {
            reason: format!("delay out of range: {e}"),
        })?;
        let fire_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| DispatchError::Rejected {
                reason: format!("delay of {}s is past the latest fire time", delay.num_seconds()),
            })?;
        let mut table = self.table();
        let sequence = table.next_sequence;
        table.next_sequence += 1;
        tracing::info!(
            send_id = %spec.send_id,
            event = %spec.event.name(),
            %fire_at,
            "scheduled delayed send"
        );
        table.tasks.insert(
            spec.send_id.clone(),
            PendingTask {
                send_id: spec.send_id,
                fire_at,
                event: spec.event,
                target: spec.target,
                sequence,
            },
        );
        Ok(())
    }

    fn cancel(&self, send_id: &str) {
        if self.table().tasks.remove(send_id).is_some() {
            tracing::info!(send_id, "cancelled delayed send");
        }
    }

    fn take_due(&self, now: DateTime<Utc>) -> Vec<PendingTask> {
        let mut table = self.table();
        let due_ids: Vec<String> = table
            .tasks
            .values()
            .filter(|t| t.fire_at <= now)
            .map(|t| t.send_id.clone())
            .collect();
        let mut due: Vec<PendingTask> = due_ids
            .iter()
            .filter_map(|id| table.tasks.remove(id))
            .collect();
        due.sort_by_key(|t| (t.fire_at, t.sequence));
        due
    }
}
