use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::camera::CameraId;
use crate::error::CaptureError;
use crate::format::VideoFormat;

pub type TaskId = Uuid;

/// Lifecycle of a capture task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered, job not started yet
    Pending,

    /// Recorder open and writing
    Running,

    /// Stopped cleanly on deadline, stop request or end of stream
    Completed,

    /// Stream unreachable, read/write error or internal fault
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Why a recording loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    StopRequested,
    StreamEnded,
    Error,
}

/// Frame and duration statistics of a finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    pub frames: u64,
    pub duration_secs: f64,
    pub stop_reason: StopReason,
    pub file_size_bytes: Option<u64>,
}

/// Externally visible record of one capture attempt for one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureTask {
    pub id: TaskId,
    pub camera_id: CameraId,
    pub state: TaskState,

    /// Format captured at dispatch time
    pub format: VideoFormat,

    pub dispatched_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,

    /// Set iff the state is terminal
    pub finished_at: Option<DateTime<Utc>>,

    pub output_path: Option<PathBuf>,
    pub stats: Option<RecordingStats>,
    pub error: Option<String>,
}

impl CaptureTask {
    fn new(id: TaskId, camera_id: CameraId, format: VideoFormat) -> Self {
        Self {
            id,
            camera_id,
            state: TaskState::Pending,
            format,
            dispatched_at: Utc::now(),
            started_at: None,
            finished_at: None,
            output_path: None,
            stats: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Sole write handle of a task record.
///
/// Owned by the job that runs the task; every update is applied atomically
/// to the watch cell, so readers always see a whole record.
#[derive(Debug)]
pub struct TaskWriter {
    tx: watch::Sender<CaptureTask>,
}

impl TaskWriter {
    pub fn id(&self) -> TaskId {
        self.tx.borrow().id
    }

    pub fn snapshot(&self) -> CaptureTask {
        self.tx.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.tx.borrow().is_terminal()
    }

    /// Pending -> Running
    pub fn mark_running(&self) {
        self.tx.send_if_modified(|task| {
            if task.state != TaskState::Pending {
                warn!("Task {} cannot start from state {:?}", task.id, task.state);
                return false;
            }
            task.state = TaskState::Running;
            task.started_at = Some(Utc::now());
            true
        });
    }

    pub fn set_output_path(&self, path: PathBuf) {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                return false;
            }
            task.output_path = Some(path);
            true
        });
    }

    /// Running -> Completed
    pub fn complete(&self, stats: RecordingStats, output_path: Option<PathBuf>) {
        self.finish(TaskState::Completed, Some(stats), output_path, None);
    }

    /// Any non-terminal state -> Failed
    pub fn fail(&self, detail: impl Into<String>, stats: Option<RecordingStats>) {
        let mut detail = detail.into();
        if detail.trim().is_empty() {
            detail = "unknown failure".to_string();
        }
        self.finish(TaskState::Failed, stats, None, Some(detail));
    }

    fn finish(
        &self,
        state: TaskState,
        stats: Option<RecordingStats>,
        output_path: Option<PathBuf>,
        error: Option<String>,
    ) {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                warn!("Task {} already finished as {:?}, ignoring {:?}", task.id, task.state, state);
                return false;
            }
            if state == TaskState::Completed && task.state != TaskState::Running {
                warn!("Task {} cannot complete from state {:?}", task.id, task.state);
                return false;
            }
            task.state = state;
            task.stats = stats;
            if output_path.is_some() {
                task.output_path = output_path;
            }
            task.error = error;
            task.finished_at = Some(Utc::now());
            true
        });
    }
}

/// A freshly registered task: its id, the job-side write handle and stop signal
#[derive(Debug)]
pub struct RegisteredTask {
    pub id: TaskId,
    pub writer: TaskWriter,
    pub stop_rx: watch::Receiver<bool>,
}

#[derive(Debug)]
struct TaskSlot {
    record: watch::Receiver<CaptureTask>,
    stop_tx: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    tasks: HashMap<TaskId, TaskSlot>,

    /// Dispatch order, oldest first
    order: VecDeque<TaskId>,

    /// Most recent task per camera, used to reject overlapping captures
    latest_by_camera: HashMap<CameraId, TaskId>,
}

/// In-memory task registry.
///
/// The map lock is held only to insert or look up a slot; task contents live
/// in per-task watch cells so readers of one task never wait on another.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    max_finished_tasks: Option<usize>,
}

impl TaskRegistry {
    pub fn new(max_finished_tasks: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            max_finished_tasks,
        }
    }

    /// Register a Pending task for a camera.
    ///
    /// Fails with [`CaptureError::CameraBusy`] while another task for the same
    /// camera has not reached a terminal state.
    pub async fn register(&self, camera_id: &str, format: VideoFormat) -> Result<RegisteredTask, CaptureError> {
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.latest_by_camera.get(camera_id) {
            if let Some(slot) = inner.tasks.get(previous) {
                if !slot.record.borrow().is_terminal() {
                    return Err(CaptureError::CameraBusy {
                        camera_id: camera_id.to_string(),
                        task_id: *previous,
                    });
                }
            }
        }

        let id = Uuid::new_v4();
        let (record_tx, record_rx) = watch::channel(CaptureTask::new(id, camera_id.to_string(), format));
        let (stop_tx, stop_rx) = watch::channel(false);

        let previous = inner.tasks.insert(
            id,
            TaskSlot {
                record: record_rx,
                stop_tx,
            },
        );
        assert!(previous.is_none(), "duplicate task id generated: {id}");
        inner.order.push_back(id);
        inner.latest_by_camera.insert(camera_id.to_string(), id);

        if let Some(limit) = self.max_finished_tasks {
            Self::evict_finished(&mut inner, limit);
        }

        debug!("🆕 Registered task {} for camera {}", id, camera_id);
        Ok(RegisteredTask {
            id,
            writer: TaskWriter { tx: record_tx },
            stop_rx,
        })
    }

    /// Drop the oldest finished tasks until at most `limit` remain
    fn evict_finished(inner: &mut RegistryInner, limit: usize) {
        let finished = inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .tasks
                    .get(id)
                    .is_some_and(|slot| slot.record.borrow().is_terminal())
            })
            .count();
        if finished <= limit {
            return;
        }

        let mut to_evict = finished - limit;
        let mut kept = VecDeque::with_capacity(inner.order.len());
        while let Some(id) = inner.order.pop_front() {
            let terminal = inner
                .tasks
                .get(&id)
                .is_some_and(|slot| slot.record.borrow().is_terminal());
            if to_evict > 0 && terminal {
                inner.tasks.remove(&id);
                to_evict -= 1;
            } else {
                kept.push_back(id);
            }
        }
        inner.order = kept;

        let tasks = &inner.tasks;
        inner.latest_by_camera.retain(|_, id| tasks.contains_key(id));
        info!("🧹 Evicted {} finished tasks", finished - limit);
    }

    /// Point-in-time copy of a task record
    pub async fn snapshot(&self, id: &TaskId) -> Option<CaptureTask> {
        let inner = self.inner.read().await;
        inner.tasks.get(id).map(|slot| slot.record.borrow().clone())
    }

    /// Receiver that observes every update of a task
    pub async fn subscribe(&self, id: &TaskId) -> Option<watch::Receiver<CaptureTask>> {
        let inner = self.inner.read().await;
        inner.tasks.get(id).map(|slot| slot.record.clone())
    }

    /// Deliver a stop signal to the job owning the task.
    ///
    /// Returns the snapshot at the time of the request; a finished task is left
    /// untouched.
    pub async fn request_stop(&self, id: &TaskId) -> Result<CaptureTask, CaptureError> {
        let inner = self.inner.read().await;
        let slot = inner.tasks.get(id).ok_or(CaptureError::TaskNotFound(*id))?;
        let snapshot = slot.record.borrow().clone();
        if !snapshot.is_terminal() {
            slot.stop_tx.send_replace(true);
            info!("🛑 Stop requested for task {}", id);
        }
        Ok(snapshot)
    }

    /// Snapshots of all retained tasks in dispatch order
    pub async fn list(&self) -> Vec<CaptureTask> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .map(|slot| slot.record.borrow().clone())
            .collect()
    }

    pub async fn statistics(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for task in self.list().await {
            stats.total += 1;
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Task counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}
